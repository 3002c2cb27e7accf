use anyhow::Result;
use rusqlite::{Connection, Row, TransactionBehavior, params};
use thiserror::Error;
use tracing::info;

use rewear_types::api::{Swap, SwapStats, SwapSummary};
use rewear_types::models::{SwapStatus, TransactionType};

use crate::Database;
use crate::models::{OptionalExt, StringList, parse_enum, timestamp};

const SWAP_COLUMNS: &str = "s.id, s.requester_id, s.item_id, s.offered_item_id, s.offered_points, \
     s.status, s.message, s.created_at, s.updated_at";
const SWAP_COLUMN_COUNT: usize = 9;

/// A swap together with what every lifecycle endpoint needs to authorize it.
#[derive(Debug, Clone)]
pub struct SwapContext {
    pub swap: Swap,
    pub item_owner_id: i64,
    pub item_title: String,
    pub requester_points: i64,
}

/// What `accept_swap` settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub swap_id: i64,
    pub requester_id: i64,
    pub owner_id: i64,
    pub item_id: i64,
    pub item_title: String,
    pub points_transferred: i64,
}

#[derive(Debug, Error)]
pub enum SettleError {
    #[error("swap not found")]
    NotFound,
    #[error("swap is no longer pending")]
    NotPending,
    #[error("only the item owner may accept")]
    NotOwner,
    #[error("requester has insufficient points")]
    InsufficientPoints,
    #[error("item is no longer available")]
    ItemUnavailable,
    #[error(transparent)]
    Db(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for SettleError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Db(e.into())
    }
}

impl Database {
    pub fn create_swap(
        &self,
        requester_id: i64,
        item_id: i64,
        offered_item_id: Option<i64>,
        offered_points: Option<i64>,
        message: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO swaps (requester_id, item_id, offered_item_id, offered_points, message)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![requester_id, item_id, offered_item_id, offered_points, message],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn has_pending_swap(&self, requester_id: i64, item_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM swaps
                               WHERE requester_id = ?1 AND item_id = ?2 AND status = 'pending')",
                params![requester_id, item_id],
                |r| r.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn get_swap_context(&self, id: i64) -> Result<Option<SwapContext>> {
        self.with_conn(|conn| query_context(conn, id))
    }

    /// Single swap with item title/images and requester display fields.
    pub fn get_swap_summary(&self, id: i64) -> Result<Option<SwapSummary>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS}, i.title, i.images, i.points_value,
                        NULL, NULL, u.name, u.avatar, oi.title, oi.images
                 FROM swaps s
                 LEFT JOIN items i ON s.item_id = i.id
                 LEFT JOIN users u ON s.requester_id = u.id
                 LEFT JOIN items oi ON s.offered_item_id = oi.id
                 WHERE s.id = ?1"
            );
            conn.query_row(&sql, [id], summary_from_row).optional()
        })
    }

    /// Requests the user sent, with the item owner's name.
    pub fn list_sent_swaps(&self, user_id: i64) -> Result<Vec<SwapSummary>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS}, i.title, i.images, i.points_value,
                        u.name, u.avatar, NULL, NULL, oi.title, oi.images
                 FROM swaps s
                 LEFT JOIN items i ON s.item_id = i.id
                 LEFT JOIN users u ON i.user_id = u.id
                 LEFT JOIN items oi ON s.offered_item_id = oi.id
                 WHERE s.requester_id = ?1
                 ORDER BY s.created_at DESC, s.id DESC"
            );
            collect_summaries(conn, &sql, user_id)
        })
    }

    /// Requests against the user's items, with the requester's name.
    pub fn list_received_swaps(&self, user_id: i64) -> Result<Vec<SwapSummary>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS}, i.title, i.images, i.points_value,
                        NULL, NULL, u.name, u.avatar, oi.title, oi.images
                 FROM swaps s
                 JOIN items i ON s.item_id = i.id
                 LEFT JOIN users u ON s.requester_id = u.id
                 LEFT JOIN items oi ON s.offered_item_id = oi.id
                 WHERE i.user_id = ?1
                 ORDER BY s.created_at DESC, s.id DESC"
            );
            collect_summaries(conn, &sql, user_id)
        })
    }

    /// Every swap the user is on either side of, named after the other party.
    pub fn list_user_swap_history(&self, user_id: i64) -> Result<Vec<SwapSummary>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {SWAP_COLUMNS}, i.title, i.images, i.points_value,
                        NULL, NULL, NULL, NULL, oi.title, oi.images, u.name, u.avatar
                 FROM swaps s
                 LEFT JOIN items i ON s.item_id = i.id
                 LEFT JOIN items oi ON s.offered_item_id = oi.id
                 LEFT JOIN users u ON u.id = CASE WHEN s.requester_id = ?1 THEN i.user_id
                                                  ELSE s.requester_id END
                 WHERE s.requester_id = ?1 OR i.user_id = ?1
                 ORDER BY s.created_at DESC, s.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], |row| {
                    let mut summary = summary_from_row(row)?;
                    let n = SWAP_COLUMN_COUNT + 9;
                    summary.other_user_name = row.get(n)?;
                    summary.other_user_avatar = row.get(n + 1)?;
                    Ok(summary)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Status counts over swaps the user sent or received.
    pub fn swap_stats(&self, user_id: i64) -> Result<SwapStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'accepted'), 0),
                        COALESCE(SUM(status = 'completed'), 0),
                        COALESCE(SUM(status = 'rejected'), 0)
                 FROM swaps
                 WHERE requester_id = ?1
                    OR item_id IN (SELECT id FROM items WHERE user_id = ?1)",
                [user_id],
                |row| {
                    Ok(SwapStats {
                        total_swaps: row.get(0)?,
                        pending_swaps: row.get(1)?,
                        accepted_swaps: row.get(2)?,
                        completed_swaps: row.get(3)?,
                        rejected_swaps: row.get(4)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    /// Moves a swap from `from` to `to` only if it is still in `from`.
    /// Returns false when the guard did not match (already moved on).
    pub fn transition_swap(&self, id: i64, from: SwapStatus, to: SwapStatus) -> Result<bool> {
        self.with_conn(|conn| guarded_transition(conn, id, from, to))
    }

    /// Accepts a pending swap and settles it atomically.
    ///
    /// Runs under `BEGIN IMMEDIATE` so the points check, the deduction and
    /// the status flip see one consistent snapshot. On any error the whole
    /// transaction rolls back. Notifications are left to the caller.
    pub fn accept_swap(&self, swap_id: i64, owner_id: i64) -> Result<Settlement, SettleError> {
        let settlement = self.with_conn_mut(|conn| settle(conn, swap_id, owner_id))?;

        info!(
            "Swap {} accepted: item {} from user {} to user {}, {} points",
            settlement.swap_id,
            settlement.item_id,
            settlement.owner_id,
            settlement.requester_id,
            settlement.points_transferred
        );
        Ok(settlement)
    }
}

fn settle(conn: &mut Connection, swap_id: i64, owner_id: i64) -> Result<Settlement, SettleError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let ctx = query_context(&tx, swap_id)?.ok_or(SettleError::NotFound)?;
    if ctx.item_owner_id != owner_id {
        return Err(SettleError::NotOwner);
    }
    if ctx.swap.status != SwapStatus::Pending {
        return Err(SettleError::NotPending);
    }

    if !guarded_transition(&tx, swap_id, SwapStatus::Pending, SwapStatus::Accepted)? {
        return Err(SettleError::NotPending);
    }

    if !take_item(&tx, ctx.swap.item_id)? {
        return Err(SettleError::ItemUnavailable);
    }
    if let Some(offered_item_id) = ctx.swap.offered_item_id {
        if !take_item(&tx, offered_item_id)? {
            return Err(SettleError::ItemUnavailable);
        }
    }

    let points = ctx.swap.offered_points.unwrap_or(0);
    if points > 0 {
        let debited = tx.execute(
            "UPDATE users SET points = points - ?2, updated_at = datetime('now')
             WHERE id = ?1 AND points >= ?2",
            params![ctx.swap.requester_id, points],
        )?;
        if debited == 0 {
            return Err(SettleError::InsufficientPoints);
        }
        tx.execute(
            "UPDATE users SET points = points + ?2, updated_at = datetime('now') WHERE id = ?1",
            params![owner_id, points],
        )?;

        let description = format!("Swap for item: {}", ctx.item_title);
        insert_ledger(&tx, ctx.swap.requester_id, TransactionType::Spent, points, &description, ctx.swap.item_id)?;
        insert_ledger(&tx, owner_id, TransactionType::Earned, points, &description, ctx.swap.item_id)?;
    }

    tx.commit()?;

    Ok(Settlement {
        swap_id,
        requester_id: ctx.swap.requester_id,
        owner_id,
        item_id: ctx.swap.item_id,
        item_title: ctx.item_title,
        points_transferred: points,
    })
}

/// Marks an item unavailable. False if another swap already took it.
fn take_item(conn: &Connection, item_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE items SET is_available = 0, updated_at = datetime('now')
         WHERE id = ?1 AND is_available = 1",
        [item_id],
    )?;
    Ok(changed > 0)
}

fn guarded_transition(conn: &Connection, id: i64, from: SwapStatus, to: SwapStatus) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE swaps SET status = ?3, updated_at = datetime('now') WHERE id = ?1 AND status = ?2",
        params![id, from.as_str(), to.as_str()],
    )?;
    Ok(changed > 0)
}

fn insert_ledger(
    conn: &Connection,
    user_id: i64,
    kind: TransactionType,
    amount: i64,
    description: &str,
    item_id: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO point_transactions (user_id, type, amount, description, related_item_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, kind.as_str(), amount, description, item_id],
    )?;
    Ok(())
}

fn query_context(conn: &Connection, id: i64) -> Result<Option<SwapContext>> {
    let sql = format!(
        "SELECT {SWAP_COLUMNS}, i.user_id, i.title, u.points
         FROM swaps s
         JOIN items i ON s.item_id = i.id
         JOIN users u ON s.requester_id = u.id
         WHERE s.id = ?1"
    );
    conn.query_row(&sql, [id], |row| {
        let n = SWAP_COLUMN_COUNT;
        Ok(SwapContext {
            swap: swap_from_row(row)?,
            item_owner_id: row.get(n)?,
            item_title: row.get(n + 1)?,
            requester_points: row.get(n + 2)?,
        })
    })
    .optional()
}

fn swap_from_row(row: &Row<'_>) -> rusqlite::Result<Swap> {
    Ok(Swap {
        id: row.get(0)?,
        requester_id: row.get(1)?,
        item_id: row.get(2)?,
        offered_item_id: row.get(3)?,
        offered_points: row.get(4)?,
        status: parse_enum(row, 5)?,
        message: row.get(6)?,
        created_at: timestamp(row, 7)?,
        updated_at: timestamp(row, 8)?,
    })
}

/// Swap columns followed by: item title, images, points, owner name, owner
/// avatar, requester name, requester avatar, offered title, offered images.
pub(crate) fn summary_from_row(row: &Row<'_>) -> rusqlite::Result<SwapSummary> {
    let n = SWAP_COLUMN_COUNT;
    Ok(SwapSummary {
        swap: swap_from_row(row)?,
        item_title: row.get(n)?,
        item_images: row.get::<_, StringList>(n + 1)?.0,
        item_points: row.get(n + 2)?,
        item_owner_name: row.get(n + 3)?,
        item_owner_avatar: row.get(n + 4)?,
        requester_name: row.get(n + 5)?,
        requester_avatar: row.get(n + 6)?,
        other_user_name: None,
        other_user_avatar: None,
        offered_item_title: row.get(n + 7)?,
        offered_item_images: row.get::<_, StringList>(n + 8)?.0,
    })
}

fn collect_summaries(conn: &Connection, sql: &str, user_id: i64) -> Result<Vec<SwapSummary>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([user_id], summary_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::NewItem;
    use rewear_types::models::{ItemCondition, Role};

    struct Fixture {
        db: Database,
        owner: i64,
        requester: i64,
        item: i64,
    }

    fn add_item(db: &Database, owner: i64, title: &str, points: i64) -> i64 {
        let listing = db
            .create_item(&NewItem {
                user_id: owner,
                title: title.to_string(),
                description: String::new(),
                category: "Tops".to_string(),
                item_type: "T-shirt".to_string(),
                size: None,
                condition: ItemCondition::LikeNew,
                tags: vec![],
                images: vec![],
                points_value: points,
                ai_category: None,
            })
            .unwrap();
        db.set_item_approved(listing.item.id).unwrap();
        listing.item.id
    }

    fn fixture() -> Fixture {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("a@example.com", "h", "A", Role::User).unwrap().id;
        let requester = db.create_user("b@example.com", "h", "B", Role::User).unwrap().id;
        let item = add_item(&db, owner, "Item X", 30);
        Fixture { db, owner, requester, item }
    }

    fn points(db: &Database, user: i64) -> i64 {
        db.get_user_by_id(user).unwrap().unwrap().points
    }

    fn ledger_rows(db: &Database) -> Vec<(i64, String, i64, Option<i64>)> {
        db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, type, amount, related_item_id FROM point_transactions ORDER BY id",
            )?;
            let rows = stmt
                .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap()
    }

    #[test]
    fn accepting_points_offer_transfers_exactly_once() {
        let f = fixture();
        let swap = f.db.create_swap(f.requester, f.item, None, Some(30), Some("please")).unwrap();
        assert!(f.db.has_pending_swap(f.requester, f.item).unwrap());

        let settlement = f.db.accept_swap(swap, f.owner).unwrap();
        assert_eq!(settlement.points_transferred, 30);

        assert_eq!(points(&f.db, f.requester), 70);
        assert_eq!(points(&f.db, f.owner), 130);
        assert!(!f.db.get_item(f.item).unwrap().unwrap().is_available);

        let ctx = f.db.get_swap_context(swap).unwrap().unwrap();
        assert_eq!(ctx.swap.status, SwapStatus::Accepted);

        assert_eq!(
            ledger_rows(&f.db),
            vec![
                (f.requester, "spent".to_string(), 30, Some(f.item)),
                (f.owner, "earned".to_string(), 30, Some(f.item)),
            ]
        );

        // A second accept is refused and moves nothing.
        assert!(matches!(f.db.accept_swap(swap, f.owner), Err(SettleError::NotPending)));
        assert_eq!(points(&f.db, f.requester), 70);
        assert_eq!(ledger_rows(&f.db).len(), 2);
    }

    #[test]
    fn item_for_item_marks_both_unavailable_without_ledger() {
        let f = fixture();
        let offered = add_item(&f.db, f.requester, "Offered", 25);
        let swap = f.db.create_swap(f.requester, f.item, Some(offered), None, None).unwrap();

        f.db.accept_swap(swap, f.owner).unwrap();

        assert!(!f.db.get_item(f.item).unwrap().unwrap().is_available);
        assert!(!f.db.get_item(offered).unwrap().unwrap().is_available);
        assert_eq!(points(&f.db, f.requester), 100);
        assert!(ledger_rows(&f.db).is_empty());
    }

    #[test]
    fn insufficient_points_rolls_back_everything() {
        let f = fixture();
        let swap = f.db.create_swap(f.requester, f.item, None, Some(30), None).unwrap();

        // Drain the requester's balance after the request was made.
        f.db.with_conn(|conn| {
            conn.execute("UPDATE users SET points = 10 WHERE id = ?1", [f.requester])?;
            Ok(())
        })
        .unwrap();

        assert!(matches!(f.db.accept_swap(swap, f.owner), Err(SettleError::InsufficientPoints)));

        let ctx = f.db.get_swap_context(swap).unwrap().unwrap();
        assert_eq!(ctx.swap.status, SwapStatus::Pending);
        assert!(f.db.get_item(f.item).unwrap().unwrap().is_available);
        assert_eq!(points(&f.db, f.requester), 10);
        assert_eq!(points(&f.db, f.owner), 100);
        assert!(ledger_rows(&f.db).is_empty());
    }

    #[test]
    fn two_swaps_cannot_overdraw_one_balance() {
        let f = fixture();
        let second_item = add_item(&f.db, f.owner, "Item Y", 80);
        let s1 = f.db.create_swap(f.requester, f.item, None, Some(60), None).unwrap();
        let s2 = f.db.create_swap(f.requester, second_item, None, Some(60), None).unwrap();

        f.db.accept_swap(s1, f.owner).unwrap();
        assert!(matches!(f.db.accept_swap(s2, f.owner), Err(SettleError::InsufficientPoints)));
        assert_eq!(points(&f.db, f.requester), 40);
    }

    #[test]
    fn item_is_settled_only_once() {
        let f = fixture();
        let third = f.db.create_user("c@example.com", "h", "C", Role::User).unwrap().id;
        let s1 = f.db.create_swap(f.requester, f.item, None, Some(30), None).unwrap();
        let s2 = f.db.create_swap(third, f.item, None, Some(30), None).unwrap();

        f.db.accept_swap(s1, f.owner).unwrap();
        assert!(matches!(f.db.accept_swap(s2, f.owner), Err(SettleError::ItemUnavailable)));

        assert_eq!(points(&f.db, f.owner), 130);
        assert_eq!(points(&f.db, f.requester), 70);
        assert_eq!(points(&f.db, third), 100);
        assert_eq!(ledger_rows(&f.db).len(), 2);
        let ctx = f.db.get_swap_context(s2).unwrap().unwrap();
        assert_eq!(ctx.swap.status, SwapStatus::Pending);
    }

    #[test]
    fn offered_item_already_traded_rolls_back() {
        let f = fixture();
        let offered = add_item(&f.db, f.requester, "Offered", 25);
        let other_item = add_item(&f.db, f.owner, "Item Z", 25);
        let s1 = f.db.create_swap(f.requester, f.item, Some(offered), None, None).unwrap();
        let s2 = f.db.create_swap(f.requester, other_item, Some(offered), Some(10), None).unwrap();

        f.db.accept_swap(s1, f.owner).unwrap();
        assert!(matches!(f.db.accept_swap(s2, f.owner), Err(SettleError::ItemUnavailable)));

        assert!(f.db.get_item(other_item).unwrap().unwrap().is_available);
        assert_eq!(points(&f.db, f.requester), 100);
        assert!(ledger_rows(&f.db).is_empty());
    }

    #[test]
    fn only_owner_accepts() {
        let f = fixture();
        let swap = f.db.create_swap(f.requester, f.item, None, Some(10), None).unwrap();
        assert!(matches!(f.db.accept_swap(swap, f.requester), Err(SettleError::NotOwner)));
        assert!(matches!(f.db.accept_swap(swap + 99, f.owner), Err(SettleError::NotFound)));
    }

    #[test]
    fn guarded_transitions_do_not_reapply() {
        let f = fixture();
        let swap = f.db.create_swap(f.requester, f.item, None, None, None).unwrap();

        assert!(f.db.transition_swap(swap, SwapStatus::Pending, SwapStatus::Rejected).unwrap());
        assert!(!f.db.transition_swap(swap, SwapStatus::Pending, SwapStatus::Cancelled).unwrap());
        assert!(!f.db.has_pending_swap(f.requester, f.item).unwrap());
    }

    #[test]
    fn listings_by_role() {
        let f = fixture();
        let swap = f.db.create_swap(f.requester, f.item, None, Some(5), None).unwrap();

        let sent = f.db.list_sent_swaps(f.requester).unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].item_owner_name.as_deref(), Some("A"));
        assert_eq!(sent[0].item_title.as_deref(), Some("Item X"));

        let received = f.db.list_received_swaps(f.owner).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].requester_name.as_deref(), Some("B"));

        let history = f.db.list_user_swap_history(f.requester).unwrap();
        assert_eq!(history[0].other_user_name.as_deref(), Some("A"));

        let stats = f.db.swap_stats(f.owner).unwrap();
        assert_eq!(stats.total_swaps, 1);
        assert_eq!(stats.pending_swaps, 1);

        let summary = f.db.get_swap_summary(swap).unwrap().unwrap();
        assert_eq!(summary.swap.offered_points, Some(5));
    }
}

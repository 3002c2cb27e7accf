use anyhow::Result;
use rusqlite::{Connection, params};

use rewear_types::api::{
    Item, Notification, OwnItemStats, PointTransaction, PublicProfile, ReceivedSwapStats,
    SentSwapStats, UserStats,
};
use rewear_types::models::{NotificationKind, Role};

use crate::Database;
use crate::models::{ITEM_COLUMNS, OptionalExt, UserRow, item_from_row, parse_enum, timestamp};

impl Database {
    // -- Users --

    pub fn create_user(&self, email: &str, password_hash: &str, name: &str, role: Role) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (email, password, name, role) VALUES (?1, ?2, ?3, ?4)",
                params![email, password_hash, name, role.as_str()],
            )?;
            let id = conn.last_insert_rowid();
            query_user(conn, "id = ?1", id)?
                .ok_or_else(|| anyhow::anyhow!("User {} vanished after insert", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email = ?1", email))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", id))
    }

    /// Applies whichever profile fields are present. Returns the fresh row.
    pub fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        bio: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users
                 SET name = COALESCE(?2, name),
                     bio = COALESCE(?3, bio),
                     avatar = COALESCE(?4, avatar),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![id, name, bio, avatar],
            )?;
            query_user(conn, "id = ?1", id)
        })
    }

    /// Returns false if no such user exists.
    pub fn set_role(&self, id: i64, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET role = ?2, updated_at = datetime('now') WHERE id = ?1",
                params![id, role.as_str()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Public profile plus up to six of the user's visible items.
    pub fn get_public_profile(&self, id: i64) -> Result<Option<(PublicProfile, Vec<Item>)>> {
        self.with_conn(|conn| {
            // Counts come from scalar subqueries; joining both tables at once
            // would multiply the rows.
            let profile = conn
                .query_row(
                    "SELECT u.id, u.name, u.avatar, u.bio, u.points, u.created_at,
                        (SELECT COUNT(*) FROM items i WHERE i.user_id = u.id AND i.is_approved = 1),
                        (SELECT COUNT(*) FROM swaps s
                          WHERE s.requester_id = u.id AND s.status IN ('accepted', 'completed'))
                     FROM users u
                     WHERE u.id = ?1",
                    [id],
                    |row| {
                        Ok(PublicProfile {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            avatar: row.get(2)?,
                            bio: row.get(3)?,
                            points: row.get(4)?,
                            created_at: timestamp(row, 5)?,
                            items_count: row.get(6)?,
                            swaps_count: row.get(7)?,
                        })
                    },
                )
                .optional()?;

            let Some(profile) = profile else {
                return Ok(None);
            };

            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items i
                 WHERE i.user_id = ?1 AND i.is_available = 1 AND i.is_approved = 1
                 ORDER BY i.created_at DESC, i.id DESC
                 LIMIT 6"
            );
            let mut stmt = conn.prepare(&sql)?;
            let items = stmt
                .query_map([id], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(Some((profile, items)))
        })
    }

    pub fn user_stats(&self, user_id: i64) -> Result<UserStats> {
        self.with_conn(|conn| {
            let items = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_available = 1), 0),
                        COALESCE(SUM(is_approved = 0), 0),
                        COALESCE(SUM(points_value), 0)
                 FROM items WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(OwnItemStats {
                        total_items: row.get(0)?,
                        available_items: row.get(1)?,
                        pending_items: row.get(2)?,
                        total_points_value: row.get(3)?,
                    })
                },
            )?;

            let swaps = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'accepted'), 0),
                        COALESCE(SUM(status = 'completed'), 0)
                 FROM swaps WHERE requester_id = ?1",
                [user_id],
                |row| {
                    Ok(SentSwapStats {
                        total_swaps: row.get(0)?,
                        pending_swaps: row.get(1)?,
                        accepted_swaps: row.get(2)?,
                        completed_swaps: row.get(3)?,
                    })
                },
            )?;

            let received_swaps = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(s.status = 'pending'), 0)
                 FROM swaps s
                 JOIN items i ON s.item_id = i.id
                 WHERE i.user_id = ?1",
                [user_id],
                |row| {
                    Ok(ReceivedSwapStats {
                        total_received: row.get(0)?,
                        pending_received: row.get(1)?,
                    })
                },
            )?;

            Ok(UserStats { items, swaps, received_swaps })
        })
    }

    // -- Notifications --

    pub fn create_notification(
        &self,
        user_id: i64,
        kind: NotificationKind,
        title: &str,
        message: &str,
        related_id: Option<i64>,
    ) -> Result<i64> {
        self.with_conn(|conn| insert_notification(conn, user_id, kind, title, message, related_id))
    }

    /// Newest first. Returns the page and the caller's total count.
    pub fn list_notifications(&self, user_id: i64, limit: u32, offset: u32) -> Result<(Vec<Notification>, u64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, type, title, message, is_read, related_id, created_at
                 FROM notifications
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit, offset], |row| {
                    Ok(Notification {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: row.get(2)?,
                        title: row.get(3)?,
                        message: row.get(4)?,
                        is_read: row.get(5)?,
                        related_id: row.get(6)?,
                        created_at: timestamp(row, 7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok((rows, total.max(0) as u64))
        })
    }

    pub fn unread_count(&self, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(count)
        })
    }

    /// Only flips notifications owned by `user_id`. Returns whether one matched.
    pub fn mark_read(&self, id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_read(&self, user_id: i64) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE user_id = ?1 AND is_read = 0",
                [user_id],
            )?;
            Ok(changed)
        })
    }

    // -- Points ledger --

    pub fn list_point_transactions(
        &self,
        user_id: i64,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<PointTransaction>, u64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT pt.id, pt.user_id, pt.type, pt.amount, pt.description,
                        pt.related_item_id, i.title, pt.created_at
                 FROM point_transactions pt
                 LEFT JOIN items i ON pt.related_item_id = i.id
                 WHERE pt.user_id = ?1
                 ORDER BY pt.created_at DESC, pt.id DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![user_id, limit, offset], |row| {
                    Ok(PointTransaction {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        kind: parse_enum(row, 2)?,
                        amount: row.get(3)?,
                        description: row.get(4)?,
                        related_item_id: row.get(5)?,
                        item_title: row.get(6)?,
                        created_at: timestamp(row, 7)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM point_transactions WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok((rows, total.max(0) as u64))
        })
    }
}

pub(crate) fn query_user<P: rusqlite::ToSql>(conn: &Connection, predicate: &str, value: P) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {}", UserRow::COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    stmt.query_row([value], UserRow::from_row).optional()
}

pub(crate) fn insert_notification(
    conn: &Connection,
    user_id: i64,
    kind: NotificationKind,
    title: &str,
    message: &str,
    related_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO notifications (user_id, type, title, message, related_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![user_id, kind.as_str(), title, message, related_id],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn new_users_start_with_100_points() {
        let db = db();
        let user = db.create_user("a@example.com", "hash", "Ada", Role::User).unwrap();
        assert_eq!(user.points, 100);
        assert_eq!(user.role, Role::User);

        let found = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert!(db.get_user_by_email("b@example.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_is_rejected() {
        let db = db();
        db.create_user("a@example.com", "hash", "Ada", Role::User).unwrap();
        assert!(db.create_user("a@example.com", "hash", "Ada 2", Role::User).is_err());
    }

    #[test]
    fn profile_update_keeps_missing_fields() {
        let db = db();
        let user = db.create_user("a@example.com", "hash", "Ada", Role::User).unwrap();
        let updated = db.update_profile(user.id, None, Some("knits"), None).unwrap().unwrap();
        assert_eq!(updated.name, "Ada");
        assert_eq!(updated.bio.as_deref(), Some("knits"));
    }

    #[test]
    fn notifications_are_scoped_to_owner() {
        let db = db();
        let a = db.create_user("a@example.com", "hash", "Ada", Role::User).unwrap();
        let b = db.create_user("b@example.com", "hash", "Bo", Role::User).unwrap();

        let n1 = db
            .create_notification(a.id, NotificationKind::SwapRequest, "New Swap Request", "hi", Some(1))
            .unwrap();
        db.create_notification(a.id, NotificationKind::ItemApproved, "Item Approved", "yay", None)
            .unwrap();

        assert_eq!(db.unread_count(a.id).unwrap(), 2);
        assert!(!db.mark_read(n1, b.id).unwrap());
        assert!(db.mark_read(n1, a.id).unwrap());
        assert_eq!(db.unread_count(a.id).unwrap(), 1);

        assert_eq!(db.mark_all_read(a.id).unwrap(), 1);
        assert_eq!(db.unread_count(a.id).unwrap(), 0);

        let (page, total) = db.list_notifications(a.id, 1, 0).unwrap();
        assert_eq!(total, 2);
        assert_eq!(page.len(), 1);
    }
}

use anyhow::Result;

use rewear_types::api::{
    AdminStats, AdminUser, CategoryCount, PlatformItemStats, PlatformSwapStats, PlatformUserStats,
    RecentActivity, RecentUser,
};

use crate::Database;
use crate::items::listing_from_row;
use crate::models::{ITEM_COLUMNS, parse_enum, timestamp};
use crate::swaps::summary_from_row;

const RECENT_LIMIT: u32 = 10;

impl Database {
    pub fn list_users_with_counts(&self) -> Result<Vec<AdminUser>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.name, u.email, u.avatar, u.bio, u.points, u.role, u.is_verified,
                        u.created_at,
                        (SELECT COUNT(*) FROM items i WHERE i.user_id = u.id),
                        (SELECT COUNT(*) FROM swaps s WHERE s.requester_id = u.id)
                 FROM users u
                 ORDER BY u.created_at DESC, u.id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(AdminUser {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        avatar: row.get(3)?,
                        bio: row.get(4)?,
                        points: row.get(5)?,
                        role: parse_enum(row, 6)?,
                        is_verified: row.get(7)?,
                        created_at: timestamp(row, 8)?,
                        items_count: row.get(9)?,
                        swaps_count: row.get(10)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn admin_stats(&self) -> Result<AdminStats> {
        self.with_conn(|conn| {
            let users = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(created_at >= datetime('now', '-7 days')), 0),
                        COALESCE(SUM(created_at >= datetime('now', '-30 days')), 0)
                 FROM users",
                [],
                |row| {
                    Ok(PlatformUserStats {
                        total_users: row.get(0)?,
                        new_users_week: row.get(1)?,
                        new_users_month: row.get(2)?,
                    })
                },
            )?;

            let items = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_approved = 0), 0),
                        COALESCE(SUM(is_available = 1), 0),
                        COALESCE(SUM(created_at >= datetime('now', '-7 days')), 0)
                 FROM items",
                [],
                |row| {
                    Ok(PlatformItemStats {
                        total_items: row.get(0)?,
                        pending_items: row.get(1)?,
                        available_items: row.get(2)?,
                        new_items_week: row.get(3)?,
                    })
                },
            )?;

            let swaps = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(status = 'pending'), 0),
                        COALESCE(SUM(status = 'accepted'), 0),
                        COALESCE(SUM(status = 'completed'), 0),
                        COALESCE(SUM(created_at >= datetime('now', '-7 days')), 0)
                 FROM swaps",
                [],
                |row| {
                    Ok(PlatformSwapStats {
                        total_swaps: row.get(0)?,
                        pending_swaps: row.get(1)?,
                        accepted_swaps: row.get(2)?,
                        completed_swaps: row.get(3)?,
                        new_swaps_week: row.get(4)?,
                    })
                },
            )?;

            let mut stmt = conn.prepare(
                "SELECT category, COUNT(*) AS count FROM items
                 WHERE is_approved = 1
                 GROUP BY category
                 ORDER BY count DESC, category ASC",
            )?;
            let categories = stmt
                .query_map([], |row| Ok(CategoryCount { category: row.get(0)?, count: row.get(1)? }))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(AdminStats { users, items, swaps, categories })
        })
    }

    pub fn recent_activity(&self) -> Result<RecentActivity> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS}, u.name, u.avatar
                 FROM items i LEFT JOIN users u ON i.user_id = u.id
                 ORDER BY i.created_at DESC, i.id DESC
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let recent_items = stmt
                .query_map([RECENT_LIMIT], |row| listing_from_row(row, false))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT s.id, s.requester_id, s.item_id, s.offered_item_id, s.offered_points,
                        s.status, s.message, s.created_at, s.updated_at,
                        i.title, i.images, i.points_value,
                        NULL, NULL, u.name, u.avatar, oi.title, oi.images
                 FROM swaps s
                 LEFT JOIN items i ON s.item_id = i.id
                 LEFT JOIN users u ON s.requester_id = u.id
                 LEFT JOIN items oi ON s.offered_item_id = oi.id
                 ORDER BY s.created_at DESC, s.id DESC
                 LIMIT ?1",
            )?;
            let recent_swaps = stmt
                .query_map([RECENT_LIMIT], summary_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut stmt = conn.prepare(
                "SELECT id, name, email, created_at FROM users
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let recent_users = stmt
                .query_map([RECENT_LIMIT], |row| {
                    Ok(RecentUser {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        created_at: timestamp(row, 3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(RecentActivity { recent_items, recent_swaps, recent_users })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::NewItem;
    use rewear_types::models::{ItemCondition, Role};

    #[test]
    fn stats_and_activity_reflect_rows() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("a@example.com", "h", "A", Role::Admin).unwrap();
        let b = db.create_user("b@example.com", "h", "B", Role::User).unwrap();
        let item = db
            .create_item(&NewItem {
                user_id: a.id,
                title: "Coat".into(),
                description: String::new(),
                category: "Outerwear".into(),
                item_type: "Coat".into(),
                size: None,
                condition: ItemCondition::Fair,
                tags: vec![],
                images: vec![],
                points_value: 40,
                ai_category: None,
            })
            .unwrap();
        db.set_item_approved(item.item.id).unwrap();
        db.create_swap(b.id, item.item.id, None, Some(40), None).unwrap();

        let stats = db.admin_stats().unwrap();
        assert_eq!(stats.users.total_users, 2);
        assert_eq!(stats.users.new_users_week, 2);
        assert_eq!(stats.items.total_items, 1);
        assert_eq!(stats.items.pending_items, 0);
        assert_eq!(stats.swaps.pending_swaps, 1);
        assert_eq!(stats.categories.len(), 1);
        assert_eq!(stats.categories[0].category, "Outerwear");

        let activity = db.recent_activity().unwrap();
        assert_eq!(activity.recent_items.len(), 1);
        assert_eq!(activity.recent_swaps.len(), 1);
        assert_eq!(activity.recent_swaps[0].requester_name.as_deref(), Some("B"));
        assert_eq!(activity.recent_users.len(), 2);

        let users = db.list_users_with_counts().unwrap();
        let a_row = users.iter().find(|u| u.id == a.id).unwrap();
        assert_eq!(a_row.items_count, 1);
        assert_eq!(a_row.role, Role::Admin);
    }

    #[test]
    fn deleting_item_keeps_ledger_with_null_reference() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("a@example.com", "h", "A", Role::User).unwrap();
        let b = db.create_user("b@example.com", "h", "B", Role::User).unwrap();
        let item = db
            .create_item(&NewItem {
                user_id: a.id,
                title: "Scarf".into(),
                description: String::new(),
                category: "Accessories".into(),
                item_type: "Scarf".into(),
                size: None,
                condition: ItemCondition::New,
                tags: vec![],
                images: vec![],
                points_value: 20,
                ai_category: None,
            })
            .unwrap();
        db.set_item_approved(item.item.id).unwrap();
        let swap = db.create_swap(b.id, item.item.id, None, Some(20), None).unwrap();
        db.accept_swap(swap, a.id).unwrap();

        assert!(db.delete_item(item.item.id).unwrap());

        let (txs, total) = db.list_point_transactions(b.id, 20, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(txs[0].related_item_id, None);
        assert!(db.get_swap_context(swap).unwrap().is_none());
    }
}

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, params};

use rewear_types::api::{Interest, Item, ItemDetail, ItemListing};
use rewear_types::models::ItemCondition;

use crate::Database;
use crate::models::{ITEM_COLUMNS, ITEM_COLUMN_COUNT, OptionalExt, StringList, item_from_row};

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    PointsValue,
    Title,
}

impl SortField {
    /// Unknown names fall back to `created_at`; the column name is never
    /// taken from user input.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some("updated_at") => Self::UpdatedAt,
            Some("points_value") | Some("pointsValue") => Self::PointsValue,
            Some("title") => Self::Title,
            _ => Self::CreatedAt,
        }
    }

    fn column(self) -> &'static str {
        match self {
            Self::CreatedAt => "i.created_at",
            Self::UpdatedAt => "i.updated_at",
            Self::PointsValue => "i.points_value",
            Self::Title => "i.title",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("ASC") => Self::Asc,
            _ => Self::Desc,
        }
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Catalog filter. Every present field adds one AND predicate.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    pub category: Option<String>,
    pub item_type: Option<String>,
    pub condition: Option<ItemCondition>,
    pub min_points: Option<i64>,
    pub max_points: Option<i64>,
    pub search: Option<String>,
    pub sort_by: SortField,
    pub sort_order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl ItemFilter {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }

    fn offset(&self) -> u32 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    /// Builds the WHERE clause and its positional parameters.
    fn where_clause(&self) -> (String, Vec<Box<dyn ToSql>>) {
        let mut conditions = vec!["i.is_available = 1".to_string(), "i.is_approved = 1".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        let mut push = |sql: &str, value: Box<dyn ToSql>, params: &mut Vec<Box<dyn ToSql>>| {
            params.push(value);
            conditions.push(sql.replace('?', &format!("?{}", params.len())));
        };

        if let Some(category) = non_blank(&self.category) {
            push("i.category = ?", Box::new(category.to_string()), &mut params);
        }
        if let Some(item_type) = non_blank(&self.item_type) {
            push("i.type = ?", Box::new(item_type.to_string()), &mut params);
        }
        if let Some(condition) = self.condition {
            push("i.condition = ?", Box::new(condition.as_str()), &mut params);
        }
        if let Some(min) = self.min_points {
            push("i.points_value >= ?", Box::new(min), &mut params);
        }
        if let Some(max) = self.max_points {
            push("i.points_value <= ?", Box::new(max), &mut params);
        }
        if let Some(search) = non_blank(&self.search) {
            push(
                "(i.title LIKE ? OR i.description LIKE ? OR i.tags LIKE ?)",
                Box::new(format!("%{}%", search)),
                &mut params,
            );
        }

        (conditions.join(" AND "), params)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Fields for a new listing. Items always start unapproved.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub user_id: i64,
    pub title: String,
    pub description: String,
    pub category: String,
    pub item_type: String,
    pub size: Option<String>,
    pub condition: ItemCondition,
    pub tags: Vec<String>,
    pub images: Vec<String>,
    pub points_value: i64,
    pub ai_category: Option<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ItemChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub item_type: Option<String>,
    pub size: Option<String>,
    pub condition: Option<ItemCondition>,
    pub tags: Option<Vec<String>>,
    pub points_value: Option<i64>,
}

const LISTING_JOIN: &str = "FROM items i LEFT JOIN users u ON i.user_id = u.id";

impl Database {
    pub fn create_item(&self, item: &NewItem) -> Result<ItemListing> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO items (user_id, title, description, category, type, size, condition,
                                    tags, images, points_value, ai_category, ai_tags)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?8)",
                params![
                    item.user_id,
                    item.title,
                    item.description,
                    item.category,
                    item.item_type,
                    item.size,
                    item.condition.as_str(),
                    StringList(item.tags.clone()),
                    StringList(item.images.clone()),
                    item.points_value,
                    item.ai_category,
                ],
            )?;
            let id = conn.last_insert_rowid();
            query_listing(conn, id)?.ok_or_else(|| anyhow::anyhow!("Item {} vanished after insert", id))
        })
    }

    pub fn get_item(&self, id: i64) -> Result<Option<Item>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {ITEM_COLUMNS} FROM items i WHERE i.id = ?1");
            conn.query_row(&sql, [id], item_from_row).optional()
        })
    }

    /// Detail view of an available item. `viewer` decides `canSwap`.
    pub fn get_item_detail(&self, id: i64, viewer: Option<i64>) -> Result<Option<ItemDetail>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS}, u.name, u.avatar, u.bio
                 {LISTING_JOIN}
                 WHERE i.id = ?1 AND i.is_available = 1"
            );
            conn.query_row(&sql, [id], |row| {
                let item = item_from_row(row)?;
                let n = ITEM_COLUMN_COUNT;
                let can_swap = viewer.is_some_and(|v| v != item.user_id);
                Ok(ItemDetail {
                    uploader_id: item.user_id,
                    uploader_name: row.get(n)?,
                    uploader_avatar: row.get(n + 1)?,
                    uploader_bio: row.get(n + 2)?,
                    can_swap,
                    item,
                })
            })
            .optional()
        })
    }

    pub fn update_item(&self, id: i64, changes: &ItemChanges) -> Result<Option<ItemListing>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE items
                 SET title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     category = COALESCE(?4, category),
                     type = COALESCE(?5, type),
                     size = COALESCE(?6, size),
                     condition = COALESCE(?7, condition),
                     tags = COALESCE(?8, tags),
                     points_value = COALESCE(?9, points_value),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                params![
                    id,
                    changes.title,
                    changes.description,
                    changes.category,
                    changes.item_type,
                    changes.size,
                    changes.condition.map(ItemCondition::as_str),
                    changes.tags.clone().map(StringList),
                    changes.points_value,
                ],
            )?;
            query_listing(conn, id)
        })
    }

    /// Hard delete. Swaps on the item cascade; ledger rows keep a NULL item.
    pub fn delete_item(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM items WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn set_item_approved(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE items SET is_approved = 1, updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Public catalog page plus the total matching count.
    pub fn list_items(&self, filter: &ItemFilter) -> Result<(Vec<ItemListing>, u64)> {
        let (where_clause, mut params) = filter.where_clause();

        self.with_conn(|conn| {
            let count_sql = format!("SELECT COUNT(*) FROM items i WHERE {where_clause}");
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
            let total: i64 = conn.query_row(&count_sql, param_refs.as_slice(), |r| r.get(0))?;

            let limit_idx = params.len() + 1;
            let sql = format!(
                "SELECT {ITEM_COLUMNS}, u.name, u.avatar, COUNT(s.id)
                 {LISTING_JOIN}
                 LEFT JOIN swaps s ON i.id = s.item_id AND s.status = 'pending'
                 WHERE {where_clause}
                 GROUP BY i.id
                 ORDER BY {} {}, i.id {}
                 LIMIT ?{} OFFSET ?{}",
                filter.sort_by.column(),
                filter.sort_order.keyword(),
                filter.sort_order.keyword(),
                limit_idx,
                limit_idx + 1,
            );
            params.push(Box::new(filter.limit()));
            params.push(Box::new(filter.offset()));
            let param_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(param_refs.as_slice(), |row| listing_from_row(row, true))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok((rows, total.max(0) as u64))
        })
    }

    /// Every listing the owner has, approved or not, newest first.
    pub fn list_items_by_owner(&self, user_id: i64) -> Result<Vec<Item>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS} FROM items i
                 WHERE i.user_id = ?1
                 ORDER BY i.created_at DESC, i.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], item_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Approved items of one user as seen by others, with pending request counts.
    pub fn list_public_items_by_owner(&self, user_id: i64, limit: u32, offset: u32) -> Result<(Vec<ItemListing>, u64)> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS}, u.name, u.avatar, COUNT(s.id)
                 {LISTING_JOIN}
                 LEFT JOIN swaps s ON i.id = s.item_id AND s.status = 'pending'
                 WHERE i.user_id = ?1 AND i.is_approved = 1
                 GROUP BY i.id
                 ORDER BY i.created_at DESC, i.id DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![user_id, limit, offset], |row| listing_from_row(row, true))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM items WHERE user_id = ?1 AND is_approved = 1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok((rows, total.max(0) as u64))
        })
    }

    /// Moderation queue, oldest first, with uploader contact details.
    pub fn list_pending_items(&self) -> Result<Vec<ItemListing>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {ITEM_COLUMNS}, u.name, u.avatar, u.email
                 {LISTING_JOIN}
                 WHERE i.is_approved = 0
                 ORDER BY i.created_at ASC, i.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], |row| {
                    let mut listing = listing_from_row(row, false)?;
                    listing.uploader_email = row.get(ITEM_COLUMN_COUNT + 2)?;
                    Ok(listing)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Category → distinct types, over publicly visible items.
    pub fn category_map(&self) -> Result<BTreeMap<String, Vec<String>>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT category, type FROM items
                 WHERE is_available = 1 AND is_approved = 1
                 ORDER BY category, type",
            )?;
            let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (category, item_type) = row?;
                map.entry(category).or_default().push(item_type);
            }
            Ok(map)
        })
    }

    /// Taste signals for recommendations: the user's approved listings plus
    /// the items they obtained through accepted or completed swaps.
    pub fn user_interests(&self, user_id: i64) -> Result<Vec<Interest>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT category, type, tags FROM items
                 WHERE user_id = ?1 AND is_approved = 1
                 UNION ALL
                 SELECT i.category, i.type, i.tags
                 FROM swaps s JOIN items i ON s.item_id = i.id
                 WHERE s.requester_id = ?1 AND s.status IN ('accepted', 'completed')",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(Interest {
                        category: row.get(0)?,
                        item_type: row.get(1)?,
                        tags: row.get::<_, StringList>(2)?.0,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_listing(conn: &Connection, id: i64) -> Result<Option<ItemListing>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS}, u.name, u.avatar
         {LISTING_JOIN}
         WHERE i.id = ?1"
    );
    conn.query_row(&sql, [id], |row| listing_from_row(row, false)).optional()
}

/// Reads an item followed by uploader name, avatar and optionally a
/// pending-swap count column.
pub(crate) fn listing_from_row(row: &Row<'_>, with_swap_count: bool) -> rusqlite::Result<ItemListing> {
    let n = ITEM_COLUMN_COUNT;
    Ok(ItemListing {
        item: item_from_row(row)?,
        uploader_name: row.get(n)?,
        uploader_avatar: row.get(n + 1)?,
        uploader_email: None,
        swap_requests: if with_swap_count { Some(row.get(n + 2)?) } else { None },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rewear_types::models::Role;

    fn seed_item(db: &Database, owner: i64, title: &str, category: &str, points: i64, approved: bool) -> i64 {
        let listing = db
            .create_item(&NewItem {
                user_id: owner,
                title: title.to_string(),
                description: format!("{} description", title),
                category: category.to_string(),
                item_type: "Shirt".to_string(),
                size: Some("M".to_string()),
                condition: ItemCondition::Good,
                tags: vec!["cotton".to_string()],
                images: vec![],
                points_value: points,
                ai_category: None,
            })
            .unwrap();
        if approved {
            db.set_item_approved(listing.item.id).unwrap();
        }
        listing.item.id
    }

    #[test]
    fn new_items_are_unapproved_and_hidden() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("o@example.com", "h", "Owner", Role::User).unwrap();
        let id = seed_item(&db, owner.id, "Tee", "Tops", 30, false);

        let item = db.get_item(id).unwrap().unwrap();
        assert!(!item.is_approved);
        assert!(item.is_available);
        assert_eq!(item.tags, vec!["cotton"]);

        let (items, total) = db.list_items(&ItemFilter { page: 1, limit: 12, ..Default::default() }).unwrap();
        assert!(items.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn catalog_filters_by_category_and_point_range() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("o@example.com", "h", "Owner", Role::User).unwrap();
        seed_item(&db, owner.id, "Cheap top", "Tops", 10, true);
        seed_item(&db, owner.id, "Mid top", "Tops", 50, true);
        seed_item(&db, owner.id, "Nice top", "Tops", 90, true);
        seed_item(&db, owner.id, "Pricey top", "Tops", 150, true);
        seed_item(&db, owner.id, "Jeans", "Bottoms", 60, true);
        seed_item(&db, owner.id, "Hidden top", "Tops", 40, false);

        let filter = ItemFilter {
            category: Some("Tops".into()),
            min_points: Some(20),
            max_points: Some(100),
            sort_by: SortField::PointsValue,
            sort_order: SortOrder::Asc,
            page: 1,
            limit: 12,
            ..Default::default()
        };
        let (items, total) = db.list_items(&filter).unwrap();
        let titles: Vec<_> = items.iter().map(|l| l.item.title.as_str()).collect();
        assert_eq!(titles, vec!["Mid top", "Nice top"]);
        assert_eq!(total, 2);
        assert!(items.iter().all(|l| l.item.is_approved && l.item.is_available));
        assert_eq!(items[0].swap_requests, Some(0));
    }

    #[test]
    fn catalog_search_and_paging() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("o@example.com", "h", "Owner", Role::User).unwrap();
        for i in 0..5 {
            seed_item(&db, owner.id, &format!("Linen shirt {}", i), "Tops", 20 + i, true);
        }
        seed_item(&db, owner.id, "Wool coat", "Outerwear", 80, true);

        let filter = ItemFilter {
            search: Some("linen".into()),
            page: 2,
            limit: 2,
            ..Default::default()
        };
        let (items, total) = db.list_items(&filter).unwrap();
        assert_eq!(total, 5);
        assert_eq!(items.len(), 2);

        let by_tag = ItemFilter { search: Some("cotton".into()), page: 1, limit: 50, ..Default::default() };
        assert_eq!(db.list_items(&by_tag).unwrap().1, 6);
    }

    #[test]
    fn partial_update_and_category_map() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("o@example.com", "h", "Owner", Role::User).unwrap();
        let id = seed_item(&db, owner.id, "Tee", "Tops", 30, true);

        let updated = db
            .update_item(id, &ItemChanges {
                title: Some("Vintage tee".into()),
                tags: Some(vec!["retro".into()]),
                ..Default::default()
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.item.title, "Vintage tee");
        assert_eq!(updated.item.category, "Tops");
        assert_eq!(updated.item.tags, vec!["retro"]);

        let map = db.category_map().unwrap();
        assert_eq!(map.get("Tops"), Some(&vec!["Shirt".to_string()]));
    }

    #[test]
    fn detail_can_swap_only_for_other_viewers() {
        let db = Database::open_in_memory().unwrap();
        let owner = db.create_user("o@example.com", "h", "Owner", Role::User).unwrap();
        let other = db.create_user("x@example.com", "h", "Other", Role::User).unwrap();
        let id = seed_item(&db, owner.id, "Tee", "Tops", 30, true);

        assert!(!db.get_item_detail(id, None).unwrap().unwrap().can_swap);
        assert!(!db.get_item_detail(id, Some(owner.id)).unwrap().unwrap().can_swap);
        assert!(db.get_item_detail(id, Some(other.id)).unwrap().unwrap().can_swap);
        assert!(db.get_item_detail(id + 100, None).unwrap().is_none());
    }

    #[test]
    fn sort_inputs_are_whitelisted() {
        assert_eq!(SortField::parse(Some("points_value; DROP TABLE items")), SortField::CreatedAt);
        assert_eq!(SortField::parse(Some("title")), SortField::Title);
        assert_eq!(SortOrder::parse(Some("asc")), SortOrder::Asc);
        assert_eq!(SortOrder::parse(None), SortOrder::Desc);
    }

    #[test]
    fn interests_cover_listings_and_obtained_items() {
        let db = Database::open_in_memory().unwrap();
        let a = db.create_user("a@example.com", "h", "A", Role::User).unwrap();
        let b = db.create_user("b@example.com", "h", "B", Role::User).unwrap();
        seed_item(&db, b.id, "Own tee", "Tops", 30, true);
        seed_item(&db, b.id, "Unreviewed", "Bottoms", 30, false);
        let target = seed_item(&db, a.id, "Coat", "Outerwear", 20, true);
        let swap = db.create_swap(b.id, target, None, Some(20), None).unwrap();
        db.accept_swap(swap, a.id).unwrap();

        let interests = db.user_interests(b.id).unwrap();
        let categories: Vec<_> = interests.iter().map(|i| i.category.as_str()).collect();
        assert_eq!(categories.len(), 2);
        assert!(categories.contains(&"Tops"));
        assert!(categories.contains(&"Outerwear"));
        assert_eq!(interests[0].tags, vec!["cotton"]);
    }
}

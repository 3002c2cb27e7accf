//! Row types and column codecs.
//!
//! Most queries map straight into `rewear_types::api` structs; only the user
//! row, which carries the password hash, stays private to the DB layer.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use tracing::warn;

use rewear_types::api::{Item, UserProfile};
use rewear_types::models::{ItemCondition, Role};

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub password: String,
    pub name: String,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub points: i64,
    pub role: Role,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub const COLUMNS: &'static str =
        "id, email, password, name, avatar, bio, points, role, is_verified, created_at";

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password: row.get(2)?,
            name: row.get(3)?,
            avatar: row.get(4)?,
            bio: row.get(5)?,
            points: row.get(6)?,
            role: parse_enum(row, 7)?,
            is_verified: row.get(8)?,
            created_at: timestamp(row, 9)?,
        })
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            email: self.email.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            bio: self.bio.clone(),
            points: self.points,
            role: self.role,
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }
}

/// Item columns in the order `item_from_row` expects, qualified with `i.`.
pub const ITEM_COLUMNS: &str = "i.id, i.user_id, i.title, i.description, i.category, i.type, i.size, \
     i.condition, i.tags, i.images, i.points_value, i.is_available, i.is_approved, \
     i.ai_category, i.ai_tags, i.created_at, i.updated_at";

/// Number of columns consumed by `item_from_row`; joined columns follow.
pub const ITEM_COLUMN_COUNT: usize = 17;

pub fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        category: row.get(4)?,
        item_type: row.get(5)?,
        size: row.get(6)?,
        condition: parse_enum::<ItemCondition>(row, 7)?,
        tags: row.get::<_, StringList>(8)?.0,
        images: row.get::<_, StringList>(9)?.0,
        points_value: row.get(10)?,
        is_available: row.get(11)?,
        is_approved: row.get(12)?,
        ai_category: row.get(13)?,
        ai_tags: row.get::<_, StringList>(14)?.0,
        created_at: timestamp(row, 15)?,
        updated_at: timestamp(row, 16)?,
    })
}

/// JSON array of strings stored in a TEXT column (tags, images).
///
/// Writes always serialize a `Vec<String>`. Reads tolerate NULL or malformed
/// text as an empty list so one bad row never fails a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringList(pub Vec<String>);

impl ToSql for StringList {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        Ok(ToSqlOutput::from(json))
    }
}

impl FromSql for StringList {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = match value {
            ValueRef::Null => return Ok(Self::default()),
            ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => {
                warn!("Unexpected {:?} value in JSON list column", other.data_type());
                return Ok(Self::default());
            }
        };
        match serde_json::from_str::<Vec<String>>(&text) {
            Ok(list) => Ok(Self(list)),
            Err(e) => {
                warn!("Malformed JSON list column '{}': {}", text, e);
                Ok(Self::default())
            }
        }
    }
}

/// Parses the `datetime('now')` format SQLite stores, or RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>().ok().or_else(|| {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
            .map(|ndt| ndt.and_utc())
            .ok()
    })
}

pub fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    Ok(parse_timestamp(&raw).unwrap_or_else(|| {
        warn!("Corrupt timestamp '{}' in column {}", raw, idx);
        DateTime::default()
    }))
}

pub fn parse_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> anyhow::Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> anyhow::Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn string_list_tolerates_bad_json() {
        let conn = Connection::open_in_memory().unwrap();
        let read = |sql: &str| -> StringList { conn.query_row(sql, [], |r| r.get(0)).unwrap() };

        assert_eq!(read("SELECT '[\"a\",\"b\"]'").0, vec!["a", "b"]);
        assert_eq!(read("SELECT 'not json'"), StringList::default());
        assert_eq!(read("SELECT NULL"), StringList::default());
        assert_eq!(read("SELECT 42"), StringList::default());
    }

    #[test]
    fn string_list_writes_json() {
        let conn = Connection::open_in_memory().unwrap();
        let stored: String = conn
            .query_row("SELECT ?1", [StringList(vec!["x".into()])], |r| r.get(0))
            .unwrap();
        assert_eq!(stored, "[\"x\"]");
    }

    #[test]
    fn sqlite_timestamps_parse() {
        let ts = parse_timestamp("2024-03-01 12:30:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2024-03-01T12:30:00+00:00");
        assert!(parse_timestamp("2024-03-01T12:30:00Z").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}

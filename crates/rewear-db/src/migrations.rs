use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                name        TEXT NOT NULL,
                avatar      TEXT,
                bio         TEXT,
                points      INTEGER NOT NULL DEFAULT 100,
                role        TEXT NOT NULL DEFAULT 'user' CHECK (role IN ('user', 'admin')),
                is_verified INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE items (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title        TEXT NOT NULL,
                description  TEXT NOT NULL DEFAULT '',
                category     TEXT NOT NULL,
                type         TEXT NOT NULL,
                size         TEXT,
                condition    TEXT NOT NULL
                    CHECK (condition IN ('new', 'like_new', 'good', 'fair', 'poor')),
                tags         TEXT NOT NULL DEFAULT '[]',
                images       TEXT NOT NULL DEFAULT '[]',
                points_value INTEGER NOT NULL DEFAULT 0,
                is_available INTEGER NOT NULL DEFAULT 1,
                is_approved  INTEGER NOT NULL DEFAULT 0,
                ai_category  TEXT,
                ai_tags      TEXT NOT NULL DEFAULT '[]',
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at   TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_items_listing ON items(is_available, is_approved, category);
            CREATE INDEX idx_items_owner ON items(user_id, created_at);

            CREATE TABLE swaps (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                requester_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                item_id         INTEGER NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                offered_item_id INTEGER REFERENCES items(id) ON DELETE SET NULL,
                offered_points  INTEGER,
                status          TEXT NOT NULL DEFAULT 'pending'
                    CHECK (status IN ('pending', 'accepted', 'rejected', 'completed', 'cancelled')),
                message         TEXT,
                created_at      TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_swaps_item ON swaps(item_id, status);
            CREATE INDEX idx_swaps_requester ON swaps(requester_id, status);

            CREATE TABLE point_transactions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id         INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type            TEXT NOT NULL CHECK (type IN ('earned', 'spent', 'refunded')),
                amount          INTEGER NOT NULL CHECK (amount > 0),
                description     TEXT,
                related_item_id INTEGER REFERENCES items(id) ON DELETE SET NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_point_transactions_user ON point_transactions(user_id, created_at);

            CREATE TABLE notifications (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                type        TEXT NOT NULL,
                title       TEXT NOT NULL,
                message     TEXT,
                is_read     INTEGER NOT NULL DEFAULT 0,
                related_id  INTEGER,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read);

            -- The ledger is append-only. related_item_id stays writable so
            -- deleting an item can still null it out.
            CREATE TRIGGER point_transactions_no_update
                BEFORE UPDATE OF user_id, type, amount, description ON point_transactions
            BEGIN
                SELECT RAISE(ABORT, 'point_transactions is append-only');
            END;

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}

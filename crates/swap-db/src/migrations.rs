use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                image       TEXT,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE items (
                id          TEXT PRIMARY KEY,
                owner_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name        TEXT NOT NULL,
                description TEXT NOT NULL,
                location    TEXT NOT NULL,
                image_url   TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_items_owner ON items(owner_id);

            CREATE TABLE decisions (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                item_id     TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                liked       INTEGER NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE(user_id, item_id)
            );

            CREATE INDEX idx_decisions_item ON decisions(item_id);

            CREATE TABLE matches (
                id          TEXT PRIMARY KEY,
                user1_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                user2_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                item1_id    TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                item2_id    TEXT NOT NULL REFERENCES items(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE INDEX idx_matches_user1 ON matches(user1_id);
            CREATE INDEX idx_matches_user2 ON matches(user2_id);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                match_id    TEXT NOT NULL REFERENCES matches(id) ON DELETE CASCADE,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                read        INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_messages_match ON messages(match_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            "
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, channels, content)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                role        TEXT NOT NULL DEFAULT 'user',
                status      TEXT NOT NULL DEFAULT 'beginner',
                is_blocked  INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE TABLE channels (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE COLLATE NOCASE,
                created_by  TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL
            );

            -- One JSON document per message or reply. The scalar columns are
            -- copies of document fields so queries can filter without parsing.
            CREATE TABLE content (
                id               TEXT PRIMARY KEY,
                kind             TEXT NOT NULL,
                channel_id       TEXT,
                root_message_id  TEXT,
                body             TEXT NOT NULL,
                revision         INTEGER NOT NULL,
                created_at       TEXT NOT NULL
            );

            CREATE INDEX idx_content_channel
                ON content(kind, channel_id);

            CREATE INDEX idx_content_root
                ON content(root_message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

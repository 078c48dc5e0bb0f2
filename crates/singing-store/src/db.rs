use rusqlite::Connection;

use crate::error::Result;

/// Initialise the subscription store schema in `conn`.
///
/// Idempotent. Subscriptions keep SQLite's implicit rowid so channel loads
/// come back in insertion order.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS subscriptions (
            id              TEXT    NOT NULL PRIMARY KEY,
            channel         TEXT    NOT NULL,
            key             TEXT    NOT NULL,
            secret          TEXT    NOT NULL,
            format          TEXT    NOT NULL,
            pending         INTEGER NOT NULL DEFAULT 0,
            composer_data   TEXT    NOT NULL,   -- JSON object
            collector_data  TEXT    NOT NULL,   -- JSON object
            metadata        TEXT    NOT NULL,   -- JSON-encoded Metadata
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel ON subscriptions (channel);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_subscriptions_secret
            ON subscriptions (channel, secret);

        CREATE TABLE IF NOT EXISTS scheduler_state (
            channel         TEXT    NOT NULL PRIMARY KEY,
            kind            TEXT    NOT NULL,
            active          INTEGER NOT NULL DEFAULT 1,
            triggered_last  TEXT,               -- RFC 3339 or NULL
            updated_at      TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS feed_entries (
            seq             INTEGER PRIMARY KEY AUTOINCREMENT,
            channel         TEXT    NOT NULL,
            published       TEXT    NOT NULL,   -- RFC 3339
            title           TEXT    NOT NULL,
            topic           TEXT
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_feed_entries_channel ON feed_entries (channel, seq);
        ",
    )?;
    Ok(())
}

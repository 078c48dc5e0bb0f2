use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use singing_assembler::{Channel, Data, FeedEntry, Metadata, Subscription, Subscriptions};
use singing_core::SubscriptionId;
use singing_scheduler::{ChannelStore, Scheduler, SchedulerKind, SchedulerState};
use tracing::{debug, info, warn};

use crate::{
    db::init_db,
    error::{Result, StoreError},
};

const SUBSCRIPTION_COLUMNS: &str = "id, key, secret, composer_data, collector_data, metadata";

/// SQLite-backed catalog of subscriptions, feed entries and scheduler
/// state, keyed by channel name.
///
/// Thread-safe: the connection sits behind a `Mutex`.
pub struct SubscriptionDb {
    conn: Mutex<Connection>,
}

impl SubscriptionDb {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    /// Insert or update one subscription of `channel`.
    pub fn save(&self, channel: &str, subscription: &Subscription) -> Result<()> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        upsert(&conn, channel, subscription)?;
        debug!(channel, subscription = %subscription.id, "subscription saved");
        Ok(())
    }

    /// Write the cue of every subscription in `subscriptions` that still
    /// exists, in one transaction. Nothing else about a row changes, and rows
    /// deleted since the subscriptions were loaded are not written back.
    pub fn save_cues(&self, channel: &str, subscriptions: &Subscriptions) -> Result<usize> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();
        let mut n = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE subscriptions
                 SET metadata = json_set(metadata, '$.cue', json(?3)), updated_at = ?4
                 WHERE id = ?1 AND channel = ?2",
            )?;
            for sub in subscriptions {
                let cue = serde_json::to_string(&sub.metadata.cue)?;
                n += stmt.execute(params![sub.id.as_str(), channel, cue, now])?;
            }
        }
        tx.commit()?;
        debug!(channel, count = n, "cues saved");
        Ok(n)
    }

    /// Delete a subscription. Returns `NotFound` if no row is deleted.
    pub fn remove(&self, id: &SubscriptionId) -> Result<()> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        let n = conn.execute("DELETE FROM subscriptions WHERE id = ?1", [id.as_str()])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                id: id.to_string(),
            });
        }
        info!(subscription = %id, "subscription removed");
        Ok(())
    }

    /// All subscriptions of `channel`, in insertion order.
    pub fn load_channel(&self, channel: &str) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        select(
            &conn,
            &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                 WHERE channel = ?1 ORDER BY rowid"
            ),
            params![channel],
        )
    }

    /// Subscriptions whose composer or collector data has `field == value`.
    pub fn query_by_field(
        &self,
        channel: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Subscription>> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        // `->` yields the minified JSON text of the member, as serde_json writes it.
        let needle = serde_json::to_string(value)?;
        select(
            &conn,
            &format!(
                "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                 WHERE channel = ?1
                   AND (composer_data -> ?2 = ?3 OR collector_data -> ?2 = ?3)
                 ORDER BY rowid"
            ),
            params![channel, field, needle],
        )
    }

    /// Case-insensitive substring search over key and composer data values,
    /// matching exactly what [`Subscriptions::search`] matches in memory.
    pub fn search(&self, channel: &str, text: &str) -> Result<Vec<Subscription>> {
        let subscriptions: Subscriptions = self.load_channel(channel)?.into_iter().collect();
        Ok(subscriptions.search(text).into_iter().cloned().collect())
    }

    /// Append a feed entry to `channel` and return its sequence number.
    pub fn publish(
        &self,
        channel: &str,
        published: DateTime<Utc>,
        title: &str,
        topic: Option<&str>,
    ) -> Result<u64> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        conn.execute(
            "INSERT INTO feed_entries (channel, published, title, topic)
             VALUES (?1, ?2, ?3, ?4)",
            params![channel, published.to_rfc3339(), title, topic],
        )?;
        let seq = conn.last_insert_rowid() as u64;
        info!(channel, seq, title, "feed entry published");
        Ok(seq)
    }

    /// Feed entries of `channel` with a sequence number above `after`.
    pub fn feed_entries(&self, channel: &str, after: Option<u64>) -> Result<Vec<FeedEntry>> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        let mut stmt = conn.prepare(
            "SELECT seq, published, title, topic FROM feed_entries
             WHERE channel = ?1 AND seq > ?2
             ORDER BY seq",
        )?;
        let after = after.unwrap_or(0) as i64;
        let rows = stmt
            .query_map(params![channel, after], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(seq, published, title, topic)| -> Result<FeedEntry> {
                let published = DateTime::parse_from_rfc3339(&published)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?
                    .with_timezone(&Utc);
                Ok(FeedEntry {
                    seq: seq as u64,
                    published,
                    title,
                    topic,
                })
            })
            .collect()
    }

    pub fn save_state(&self, channel: &str, state: &SchedulerState) -> Result<()> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        conn.execute(
            "INSERT INTO scheduler_state (channel, kind, active, triggered_last, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(channel) DO UPDATE SET
                kind = excluded.kind,
                active = excluded.active,
                triggered_last = excluded.triggered_last,
                updated_at = excluded.updated_at",
            params![
                channel,
                state.kind.to_string(),
                state.active,
                state.triggered_last.map(|t| t.to_rfc3339()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        debug!(channel, kind = %state.kind, "scheduler state saved");
        Ok(())
    }

    pub fn load_state(&self, channel: &str) -> Result<Option<SchedulerState>> {
        let conn = self.conn.lock().expect("subscription db poisoned");
        let row = conn
            .query_row(
                "SELECT kind, active, triggered_last FROM scheduler_state WHERE channel = ?1",
                [channel],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, bool>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((kind, active, triggered_last)) = row else {
            return Ok(None);
        };
        let kind: SchedulerKind = kind.parse().map_err(StoreError::Serialization)?;
        let triggered_last = triggered_last
            .map(|t| DateTime::parse_from_rfc3339(&t).map(|t| t.with_timezone(&Utc)))
            .transpose()
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        Ok(Some(SchedulerState {
            kind,
            active,
            triggered_last,
        }))
    }
}

impl ChannelStore for SubscriptionDb {
    fn refresh(&self, channel: &mut Channel) -> singing_scheduler::Result<()> {
        channel.subscriptions = self.load_channel(&channel.name)?.into_iter().collect();
        Ok(())
    }

    fn persist(&self, channel: &Channel, scheduler: &Scheduler) -> singing_scheduler::Result<()> {
        self.save_cues(&channel.name, &channel.subscriptions)?;
        self.save_state(&channel.name, &scheduler.state())?;
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionDb").finish_non_exhaustive()
    }
}

// --- private helpers -------------------------------------------------------

fn upsert(conn: &Connection, channel: &str, sub: &Subscription) -> Result<()> {
    conn.execute(
        "INSERT INTO subscriptions
         (id, channel, key, secret, format, pending,
          composer_data, collector_data, metadata, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)
         ON CONFLICT(id) DO UPDATE SET
            key = excluded.key,
            secret = excluded.secret,
            format = excluded.format,
            pending = excluded.pending,
            composer_data = excluded.composer_data,
            collector_data = excluded.collector_data,
            metadata = excluded.metadata,
            updated_at = excluded.updated_at",
        params![
            sub.id.as_str(),
            channel,
            sub.key,
            sub.secret,
            sub.metadata.format,
            sub.metadata.pending,
            serde_json::to_string(&sub.composer_data)?,
            serde_json::to_string(&sub.collector_data)?,
            serde_json::to_string(&sub.metadata)?,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn select(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Subscription>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    // Rows that no longer decode are skipped rather than failing the load.
    Ok(rows
        .into_iter()
        .filter_map(|raw| match raw.decode() {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(subscription = %raw.id, error = %e, "skipping undecodable subscription");
                None
            }
        })
        .collect())
}

struct RawRow {
    id: String,
    key: String,
    secret: String,
    composer_data: String,
    collector_data: String,
    metadata: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        key: row.get(1)?,
        secret: row.get(2)?,
        composer_data: row.get(3)?,
        collector_data: row.get(4)?,
        metadata: row.get(5)?,
    })
}

impl RawRow {
    fn decode(&self) -> Result<Subscription> {
        let composer_data: Data = serde_json::from_str(&self.composer_data)?;
        let collector_data: Data = serde_json::from_str(&self.collector_data)?;
        let metadata: Metadata = serde_json::from_str(&self.metadata)?;
        Ok(Subscription {
            id: SubscriptionId::from(self.id.clone()),
            key: self.key.clone(),
            secret: self.secret.clone(),
            composer_data,
            collector_data,
            metadata,
        })
    }
}

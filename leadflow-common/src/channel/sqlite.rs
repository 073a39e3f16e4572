//! Durable event channel stored in SQLite
//!
//! Tables:
//! - `channel_messages`: the append-only log, `seq` is the message id
//! - `channel_groups`: one cursor (`last_delivered_seq`) per consumer group
//! - `channel_pending`: delivered-but-unacknowledged entries per group
//! - `channel_dead_letters`: messages a group gave up on
//!
//! Every claim runs in one transaction whose first statement is a write, so
//! concurrent consumers serialize on SQLite's writer lock and never hand the
//! same new message to two consumers of one group.

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use super::{Delivery, EventChannel, MessageId};
use crate::config::ChannelConfig;
use crate::db::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::models::LeadEvent;
use crate::time::{now_millis, to_storage};
use crate::{Error, Result};

/// SQLite-backed stream with consumer groups
#[derive(Clone)]
pub struct SqliteEventChannel {
    pool: SqlitePool,
    stream: String,
    visibility_timeout: Duration,
    poll_interval: Duration,
    /// Wakes consumers blocked in this process when a message is published
    published: Arc<Notify>,
}

impl SqliteEventChannel {
    /// Open the channel in its own SQLite file, creating tables if needed
    pub async fn open(db_path: &Path, config: &ChannelConfig) -> Result<Self> {
        let pool = crate::db::open_pool(db_path).await?;
        Self::with_pool(pool, config).await
    }

    /// Build the channel on an existing pool, creating tables if needed
    pub async fn with_pool(pool: SqlitePool, config: &ChannelConfig) -> Result<Self> {
        create_channel_tables(&pool).await?;

        Ok(Self {
            pool,
            stream: config.stream.clone(),
            visibility_timeout: Duration::from_millis(config.visibility_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            published: Arc::new(Notify::new()),
        })
    }

    /// Stream this channel reads and writes
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Number of messages dead-lettered by a group
    pub async fn dead_letter_count(&self, group: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM channel_dead_letters WHERE stream = ? AND group_name = ?",
        )
        .bind(&self.stream)
        .bind(group)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    /// Claim a batch in one transaction: expired pending entries first, then
    /// new messages past the group cursor
    async fn claim_batch(&self, group: &str, consumer: &str, max_count: usize) -> Result<Vec<Delivery>> {
        let now_ms = now_millis();
        let expired_before = now_ms - self.visibility_timeout.as_millis() as i64;
        let limit = max_count as i64;

        let mut tx = self.pool.begin().await?;

        let mut claimed: Vec<(i64, i64)> = sqlx::query_as(
            r#"
            UPDATE channel_pending
            SET consumer = ?, delivered_at_ms = ?, delivery_count = delivery_count + 1
            WHERE stream = ? AND group_name = ? AND seq IN (
                SELECT seq FROM channel_pending
                WHERE stream = ? AND group_name = ? AND delivered_at_ms <= ?
                ORDER BY seq
                LIMIT ?
            )
            RETURNING seq, delivery_count
            "#,
        )
        .bind(consumer)
        .bind(now_ms)
        .bind(&self.stream)
        .bind(group)
        .bind(&self.stream)
        .bind(group)
        .bind(expired_before)
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        if !claimed.is_empty() {
            debug!(
                stream = %self.stream,
                group,
                consumer,
                count = claimed.len(),
                "Reclaimed expired pending deliveries"
            );
        }

        let remaining = limit - claimed.len() as i64;
        if remaining > 0 {
            let cursor: Option<i64> = sqlx::query_scalar(
                "SELECT last_delivered_seq FROM channel_groups WHERE stream = ? AND group_name = ?",
            )
            .bind(&self.stream)
            .bind(group)
            .fetch_optional(&mut *tx)
            .await?;

            let Some(cursor) = cursor else {
                tx.rollback().await?;
                return Err(Error::Channel(format!(
                    "NOGROUP: consumer group '{}' does not exist on stream '{}'",
                    group, self.stream
                )));
            };

            let fresh: Vec<i64> = sqlx::query_scalar(
                "SELECT seq FROM channel_messages WHERE stream = ? AND seq > ? ORDER BY seq LIMIT ?",
            )
            .bind(&self.stream)
            .bind(cursor)
            .bind(remaining)
            .fetch_all(&mut *tx)
            .await?;

            for seq in &fresh {
                sqlx::query(
                    r#"
                    INSERT INTO channel_pending (stream, group_name, seq, consumer, delivered_at_ms, delivery_count)
                    VALUES (?, ?, ?, ?, ?, 1)
                    "#,
                )
                .bind(&self.stream)
                .bind(group)
                .bind(seq)
                .bind(consumer)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
            }

            if let Some(last) = fresh.last() {
                sqlx::query(
                    "UPDATE channel_groups SET last_delivered_seq = ? WHERE stream = ? AND group_name = ?",
                )
                .bind(last)
                .bind(&self.stream)
                .bind(group)
                .execute(&mut *tx)
                .await?;
            }

            claimed.extend(fresh.into_iter().map(|seq| (seq, 1)));
        }

        claimed.sort_by_key(|(seq, _)| *seq);

        let mut deliveries = Vec::with_capacity(claimed.len());
        for (seq, delivery_count) in claimed {
            let payload: String = sqlx::query_scalar(
                "SELECT payload FROM channel_messages WHERE stream = ? AND seq = ?",
            )
            .bind(&self.stream)
            .bind(seq)
            .fetch_one(&mut *tx)
            .await?;

            match serde_json::from_str::<LeadEvent>(&payload) {
                Ok(event) => deliveries.push(Delivery {
                    message_id: MessageId(seq),
                    delivery_count: delivery_count as u32,
                    event,
                }),
                Err(e) => {
                    // Undecodable payloads can never succeed; park them now
                    error!(
                        stream = %self.stream,
                        group,
                        message_id = seq,
                        error = %e,
                        "Undecodable channel payload, dead-lettering"
                    );
                    let reason = format!("undecodable payload: {}", e);
                    move_to_dead_letters(&mut tx, &self.stream, group, seq, delivery_count, &reason)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        Ok(deliveries)
    }
}

#[async_trait]
impl EventChannel for SqliteEventChannel {
    async fn publish(&self, event: &LeadEvent) -> Result<MessageId> {
        let payload = serde_json::to_string(event)?;
        let published_at = to_storage(&crate::time::now());

        let seq = retry_on_lock("channel publish", DEFAULT_MAX_LOCK_WAIT_MS, || async {
            let result = sqlx::query(
                r#"
                INSERT INTO channel_messages (stream, event_type, payload, published_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(&self.stream)
            .bind(event.event_type.as_str())
            .bind(&payload)
            .bind(&published_at)
            .execute(&self.pool)
            .await?;
            Ok(result.last_insert_rowid())
        })
        .await?;

        self.published.notify_waiters();

        debug!(
            stream = %self.stream,
            message_id = seq,
            event_id = %event.event_id,
            lead_id = %event.lead_id,
            "Published event"
        );

        Ok(MessageId(seq))
    }

    async fn ensure_consumer_group(&self, group: &str) -> Result<()> {
        let created_at = to_storage(&crate::time::now());
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_groups (stream, group_name, last_delivered_seq, created_at)
            VALUES (?, ?, 0, ?)
            "#,
        )
        .bind(&self.stream)
        .bind(group)
        .bind(&created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            debug!(stream = %self.stream, group, "Created consumer group");
        }
        Ok(())
    }

    async fn consume(
        &self,
        group: &str,
        consumer: &str,
        max_count: usize,
        block_timeout: Duration,
    ) -> Result<Vec<Delivery>> {
        let max_count = max_count.max(1);
        let deadline = Instant::now() + block_timeout;

        loop {
            // Registered before the claim so a publish racing it is not missed
            let published = self.published.notified();

            let batch = retry_on_lock("channel consume", DEFAULT_MAX_LOCK_WAIT_MS, || {
                self.claim_batch(group, consumer, max_count)
            })
            .await?;

            if !batch.is_empty() {
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            let wait = (deadline - now).min(self.poll_interval);
            tokio::select! {
                _ = published => {}
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    async fn ack(&self, group: &str, message_id: MessageId) -> Result<()> {
        retry_on_lock("channel ack", DEFAULT_MAX_LOCK_WAIT_MS, || async {
            sqlx::query(
                "DELETE FROM channel_pending WHERE stream = ? AND group_name = ? AND seq = ?",
            )
            .bind(&self.stream)
            .bind(group)
            .bind(message_id.0)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> Result<()> {
        warn!(
            stream = %self.stream,
            group,
            message_id = %delivery.message_id,
            delivery_count = delivery.delivery_count,
            reason,
            "Dead-lettering message"
        );

        retry_on_lock("channel dead_letter", DEFAULT_MAX_LOCK_WAIT_MS, || async {
            let mut tx = self.pool.begin().await?;
            move_to_dead_letters(
                &mut tx,
                &self.stream,
                group,
                delivery.message_id.0,
                i64::from(delivery.delivery_count),
                reason,
            )
            .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn pending_count(&self, group: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM channel_pending WHERE stream = ? AND group_name = ?",
        )
        .bind(&self.stream)
        .bind(group)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}

async fn move_to_dead_letters(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    stream: &str,
    group: &str,
    seq: i64,
    delivery_count: i64,
    reason: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT OR IGNORE INTO channel_dead_letters
            (stream, group_name, seq, payload, reason, delivery_count, dead_lettered_at)
        SELECT stream, ?, seq, payload, ?, ?, ?
        FROM channel_messages
        WHERE stream = ? AND seq = ?
        "#,
    )
    .bind(group)
    .bind(reason)
    .bind(delivery_count)
    .bind(to_storage(&crate::time::now()))
    .bind(stream)
    .bind(seq)
    .execute(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM channel_pending WHERE stream = ? AND group_name = ? AND seq = ?")
        .bind(stream)
        .bind(group)
        .bind(seq)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

async fn create_channel_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channel_messages (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            stream TEXT NOT NULL,
            event_type TEXT NOT NULL,
            payload TEXT NOT NULL,
            published_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_channel_messages_stream ON channel_messages(stream, seq)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channel_groups (
            stream TEXT NOT NULL,
            group_name TEXT NOT NULL,
            last_delivered_seq INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            PRIMARY KEY (stream, group_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channel_pending (
            stream TEXT NOT NULL,
            group_name TEXT NOT NULL,
            seq INTEGER NOT NULL,
            consumer TEXT NOT NULL,
            delivered_at_ms INTEGER NOT NULL,
            delivery_count INTEGER NOT NULL,
            PRIMARY KEY (stream, group_name, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS channel_dead_letters (
            stream TEXT NOT NULL,
            group_name TEXT NOT NULL,
            seq INTEGER NOT NULL,
            payload TEXT NOT NULL,
            reason TEXT NOT NULL,
            delivery_count INTEGER NOT NULL,
            dead_lettered_at TEXT NOT NULL,
            PRIMARY KEY (stream, group_name, seq)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

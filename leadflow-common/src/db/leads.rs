//! Lead persistence
//!
//! A lead and the idempotency record guarding it are committed together or
//! not at all.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::InsertOutcome;
use crate::error::is_unique_violation;
use crate::models::Lead;
use crate::time::{from_storage, to_storage};
use crate::Result;

/// Insert a lead and its idempotency record in one transaction
///
/// Returns `AlreadyExists` when another request committed the same token
/// first; in that case nothing from this call is persisted.
pub async fn insert_with_idempotency(
    pool: &SqlitePool,
    lead: &Lead,
    idempotency_key: &str,
    request_json: &str,
    response_json: &str,
) -> Result<InsertOutcome> {
    let mut tx = pool.begin().await?;

    let created_at = to_storage(&lead.created_at);

    sqlx::query(
        r#"
        INSERT INTO leads (id, email, phone, name, note, source, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&lead.id)
    .bind(&lead.email)
    .bind(&lead.phone)
    .bind(&lead.name)
    .bind(&lead.note)
    .bind(&lead.source)
    .bind(&created_at)
    .execute(&mut *tx)
    .await?;

    let key_insert = sqlx::query(
        r#"
        INSERT INTO idempotency_keys (key, request_json, response_json, lead_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(idempotency_key)
    .bind(request_json)
    .bind(response_json)
    .bind(&lead.id)
    .bind(&created_at)
    .execute(&mut *tx)
    .await;

    if let Err(err) = key_insert {
        if is_unique_violation(&err) {
            tx.rollback().await?;
            return Ok(InsertOutcome::AlreadyExists);
        }
        return Err(err.into());
    }

    tx.commit().await?;
    Ok(InsertOutcome::Inserted)
}

/// Fetch a lead by id
pub async fn get_lead(pool: &SqlitePool, lead_id: &str) -> Result<Option<Lead>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, phone, name, note, source, created_at
        FROM leads
        WHERE id = ?
        "#,
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| lead_from_row(&row)).transpose()
}

/// Record that the `lead.created` event for this lead reached the channel
pub async fn mark_event_published(
    pool: &SqlitePool,
    lead_id: &str,
    published_at: &DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "UPDATE leads SET event_published_at = ? WHERE id = ? AND event_published_at IS NULL",
    )
    .bind(to_storage(published_at))
    .bind(lead_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Leads committed before `created_before` whose event was never published
pub async fn list_unpublished(
    pool: &SqlitePool,
    created_before: &DateTime<Utc>,
    limit: i64,
) -> Result<Vec<Lead>> {
    let rows = sqlx::query(
        r#"
        SELECT id, email, phone, name, note, source, created_at
        FROM leads
        WHERE event_published_at IS NULL AND created_at < ?
        ORDER BY created_at
        LIMIT ?
        "#,
    )
    .bind(to_storage(created_before))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(lead_from_row).collect()
}

/// Number of stored leads
pub async fn count_leads(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn lead_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Lead> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Lead {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        name: row.try_get("name")?,
        note: row.try_get("note")?,
        source: row.try_get("source")?,
        created_at: from_storage(&created_at)?,
    })
}

//! Idempotency record lookup
//!
//! Records are written only by [`super::leads::insert_with_idempotency`] and
//! never mutated afterwards.

use sqlx::{Row, SqlitePool};

use crate::{Error, Result};

/// Stored snapshot for one idempotency token
#[derive(Debug, Clone)]
pub struct IdempotencyRecord {
    /// Canonical request that produced the first successful creation
    pub request: serde_json::Value,
    /// Exact response body returned for that request
    pub response_json: String,
    pub lead_id: String,
}

/// Look up the record for a token
///
/// A row whose request snapshot cannot be parsed is reported as
/// `Error::CorruptRecord`; callers must fail closed.
pub async fn find(pool: &SqlitePool, key: &str) -> Result<Option<IdempotencyRecord>> {
    let row = sqlx::query(
        "SELECT request_json, response_json, lead_id FROM idempotency_keys WHERE key = ?",
    )
    .bind(key)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let request_json: String = row.try_get("request_json")?;
    let request = serde_json::from_str(&request_json).map_err(|e| {
        Error::CorruptRecord(format!("Idempotency request for key '{}': {}", key, e))
    })?;

    let response_json: String = row.try_get("response_json")?;
    if serde_json::from_str::<serde_json::Value>(&response_json).is_err() {
        return Err(Error::CorruptRecord(format!(
            "Idempotency response for key '{}' is not valid JSON",
            key
        )));
    }

    Ok(Some(IdempotencyRecord {
        request,
        response_json,
        lead_id: row.try_get("lead_id")?,
    }))
}

/// Number of stored idempotency records
pub async fn count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idempotency_keys")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

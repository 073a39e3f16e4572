//! Idempotency guard for lead creation
//!
//! Decides, per request, whether to replay a stored response, reject the
//! request as a conflicting reuse of its token, or let it proceed. Lookups
//! have no side effects; the record for a proceeding request is written by
//! the intake service in the same transaction as the lead.

use leadflow_common::db::{idempotency, IdempotencyRecord};
use leadflow_common::Result;
use sqlx::SqlitePool;
use tracing::debug;

/// Guard decision for one request
#[derive(Debug, Clone)]
pub enum Admission {
    /// Same token, same request: return the stored response, create nothing
    Cached(IdempotencyRecord),
    /// Same token, different request: reject, create nothing
    Conflict,
    /// Unknown token: the caller creates the lead and the record atomically
    Proceed,
}

/// Idempotency guard backed by the `idempotency_keys` table
#[derive(Clone)]
pub struct IdempotencyGuard {
    db: SqlitePool,
}

impl IdempotencyGuard {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Decide how to handle a request carrying `token`
    ///
    /// `request` is the canonical snapshot of the validated body. Comparison
    /// is structural, so field order in the original JSON never matters.
    /// A stored record that cannot be decoded is an error: fail closed.
    pub async fn admit(&self, token: &str, request: &serde_json::Value) -> Result<Admission> {
        let Some(record) = idempotency::find(&self.db, token).await? else {
            debug!(idempotency_key = token, "New idempotency key");
            return Ok(Admission::Proceed);
        };

        if record.request == *request {
            debug!(idempotency_key = token, lead_id = %record.lead_id, "Idempotent replay");
            Ok(Admission::Cached(record))
        } else {
            debug!(idempotency_key = token, "Idempotency key reused with a different request");
            Ok(Admission::Conflict)
        }
    }
}

//! Intake service: idempotent lead creation
//!
//! Per request:
//! 1. Ask the idempotency guard (replay, conflict, or proceed)
//! 2. Build the lead, its response body and its `lead.created` event
//! 3. Commit lead + idempotency record in one transaction
//! 4. Only after the commit, publish the event
//!
//! If the commit loses a race on the idempotency key, the guard is consulted
//! once more and the winner's record decides the outcome. A publish failure
//! after commit is logged and left for the reconciliation scan.

use chrono::Duration as ChronoDuration;
use leadflow_common::channel::EventChannel;
use leadflow_common::db::retry::DEFAULT_MAX_LOCK_WAIT_MS;
use leadflow_common::db::{leads, retry_on_lock, InsertOutcome};
use leadflow_common::hashing::{mask_email, mask_phone};
use leadflow_common::models::{Lead, LeadEvent, LeadRequest};
use leadflow_common::{time, uuid_utils};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::idempotency::{Admission, IdempotencyGuard};

/// Lead creation failures
#[derive(Debug, Error)]
pub enum IntakeError {
    /// Missing token, blank note, or otherwise malformed input
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// Idempotency key already used for a different request
    #[error("Idempotency key '{0}' was already used with a different request")]
    Conflict(String),

    /// Record store or serialization failure
    #[error(transparent)]
    Store(#[from] leadflow_common::Error),
}

/// Outcome of `create_lead`
#[derive(Debug, Clone)]
pub struct LeadCreation {
    pub lead: Lead,
    /// Exact response body; byte-identical on every replay of the same key
    pub response_json: String,
    /// False when the response was replayed from the idempotency record
    pub newly_created: bool,
}

/// Orchestrates guard, record store and event channel
pub struct LeadService {
    db: SqlitePool,
    channel: Arc<dyn EventChannel>,
    guard: IdempotencyGuard,
}

impl LeadService {
    pub fn new(db: SqlitePool, channel: Arc<dyn EventChannel>) -> Self {
        let guard = IdempotencyGuard::new(db.clone());
        Self { db, channel, guard }
    }

    /// Create a lead exactly once per idempotency key
    pub async fn create_lead(
        &self,
        request: &LeadRequest,
        idempotency_key: &str,
    ) -> Result<LeadCreation, IntakeError> {
        if idempotency_key.trim().is_empty() {
            return Err(IntakeError::Invalid(
                "Idempotency-Key header must not be empty".to_string(),
            ));
        }
        request
            .validate()
            .map_err(|e| IntakeError::Invalid(e.to_string()))?;

        let canonical = request.canonical()?;

        info!(
            idempotency_key,
            email = request.email.as_deref().map(mask_email).unwrap_or_default(),
            phone = request.phone.as_deref().map(mask_phone).unwrap_or_default(),
            "Processing lead submission"
        );

        // Second pass only happens after losing the insert race
        for attempt in 1..=2 {
            match self.guard.admit(idempotency_key, &canonical).await? {
                Admission::Cached(record) => {
                    let lead: Lead = serde_json::from_str(&record.response_json).map_err(|e| {
                        leadflow_common::Error::CorruptRecord(format!(
                            "Stored response for key '{}': {}",
                            idempotency_key, e
                        ))
                    })?;
                    info!(idempotency_key, lead_id = %lead.id, "Returning cached response");
                    return Ok(LeadCreation {
                        lead,
                        response_json: record.response_json,
                        newly_created: false,
                    });
                }
                Admission::Conflict => {
                    warn!(idempotency_key, "Idempotency key conflict");
                    return Err(IntakeError::Conflict(idempotency_key.to_string()));
                }
                Admission::Proceed => {}
            }

            let lead = Lead::from_request(uuid_utils::generate_string(), request, time::now());
            let response_json = serde_json::to_string(&lead).map_err(leadflow_common::Error::from)?;
            let request_json =
                serde_json::to_string(&canonical).map_err(leadflow_common::Error::from)?;
            let event = LeadEvent::lead_created(&lead);

            let outcome = retry_on_lock("create lead", DEFAULT_MAX_LOCK_WAIT_MS, || {
                leads::insert_with_idempotency(
                    &self.db,
                    &lead,
                    idempotency_key,
                    &request_json,
                    &response_json,
                )
            })
            .await?;

            match outcome {
                InsertOutcome::Inserted => {
                    info!(idempotency_key, lead_id = %lead.id, "Created lead");
                    self.publish_created(&lead, &event).await;
                    return Ok(LeadCreation {
                        lead,
                        response_json,
                        newly_created: true,
                    });
                }
                InsertOutcome::AlreadyExists => {
                    info!(
                        idempotency_key,
                        attempt,
                        "Concurrent request committed this key first, re-checking"
                    );
                }
            }
        }

        Err(IntakeError::Store(leadflow_common::Error::Internal(format!(
            "Idempotency key '{}' reported taken but no record is visible",
            idempotency_key
        ))))
    }

    /// Fetch a lead by id
    pub async fn get_lead(&self, lead_id: &str) -> leadflow_common::Result<Option<Lead>> {
        leads::get_lead(&self.db, lead_id).await
    }

    /// Republish `lead.created` for committed leads whose event never made it
    ///
    /// Only leads older than `grace` are considered so requests still between
    /// commit and publish are left alone. Returns the number republished.
    pub async fn reconcile_unpublished(
        &self,
        grace: Duration,
        batch_size: i64,
    ) -> leadflow_common::Result<usize> {
        let grace = ChronoDuration::from_std(grace)
            .map_err(|e| leadflow_common::Error::Config(format!("Invalid grace period: {}", e)))?;
        let cutoff = time::now() - grace;

        let stale = leads::list_unpublished(&self.db, &cutoff, batch_size).await?;
        let mut republished = 0;

        for lead in stale {
            let event = LeadEvent::lead_created(&lead);
            match self.channel.publish(&event).await {
                Ok(message_id) => {
                    leads::mark_event_published(&self.db, &lead.id, &time::now()).await?;
                    info!(lead_id = %lead.id, %message_id, "Republished missing lead.created event");
                    republished += 1;
                }
                Err(e) => {
                    // Channel still down; the next scan tries again
                    warn!(lead_id = %lead.id, error = %e, "Republish failed");
                    break;
                }
            }
        }

        Ok(republished)
    }

    async fn publish_created(&self, lead: &Lead, event: &LeadEvent) {
        match self.channel.publish(event).await {
            Ok(message_id) => {
                info!(
                    lead_id = %lead.id,
                    event_id = %event.event_id,
                    %message_id,
                    "Published lead.created"
                );
                if let Err(e) = leads::mark_event_published(&self.db, &lead.id, &time::now()).await {
                    // Worst case the reconciliation scan publishes a duplicate,
                    // which triage absorbs
                    warn!(lead_id = %lead.id, error = %e, "Failed to record publish marker");
                }
            }
            Err(e) => {
                error!(
                    lead_id = %lead.id,
                    event_id = %event.event_id,
                    error = %e,
                    "Lead committed without event; left for reconciliation"
                );
            }
        }
    }
}

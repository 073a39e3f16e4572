//! Triage worker
//!
//! Per delivery: `Received -> Looked-up -> {SkippedNoLead |
//! SkippedAlreadyInsighted | Insighted} -> Acked`.
//!
//! The `(lead_id, content_hash)` unique constraint is the only coordination
//! between workers. A worker that loses the insert race acknowledges and moves
//! on. Any other failure leaves the message unacknowledged so the channel
//! redelivers it.

use std::sync::Arc;
use std::time::Duration;

use leadflow_common::channel::{Delivery, EventChannel};
use leadflow_common::classifier::Classifier;
use leadflow_common::config::LeadflowConfig;
use leadflow_common::db::retry::DEFAULT_MAX_LOCK_WAIT_MS;
use leadflow_common::db::{insights, leads, retry_on_lock, InsertOutcome};
use leadflow_common::models::Insight;
use leadflow_common::{time, uuid_utils, Result};
use sqlx::SqlitePool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a channel error before consuming again
const CHANNEL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// What happened to one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Lead does not exist; acknowledged and dropped
    SkippedNoLead,
    /// Insight for this (lead, content hash) already stored; acknowledged
    SkippedAlreadyInsighted,
    /// This worker stored the insight
    Insighted,
    /// Another worker committed the same insight first; acknowledged
    InsightedByOtherWriter,
    /// Delivered too many times; moved to the dead-letter table
    DeadLettered,
}

impl ProcessOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessOutcome::SkippedNoLead => "skipped_no_lead",
            ProcessOutcome::SkippedAlreadyInsighted => "skipped_already_insighted",
            ProcessOutcome::Insighted => "insighted",
            ProcessOutcome::InsightedByOtherWriter => "insighted_by_other_writer",
            ProcessOutcome::DeadLettered => "dead_lettered",
        }
    }
}

/// Worker identity and consume parameters
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub group: String,
    pub consumer_name: String,
    pub batch_size: usize,
    pub block_timeout: Duration,
    pub max_deliveries: u32,
}

impl WorkerSettings {
    /// Settings from configuration; a missing consumer name becomes `worker-<8 hex>`
    pub fn from_config(config: &LeadflowConfig) -> Self {
        let consumer_name = config
            .triage
            .consumer_name
            .clone()
            .unwrap_or_else(|| format!("worker-{}", uuid_utils::short_id()));

        Self {
            group: config.channel.consumer_group.clone(),
            consumer_name,
            batch_size: config.triage.batch_size.max(1),
            block_timeout: time::millis_to_duration(config.triage.block_timeout_ms),
            max_deliveries: config.triage.max_deliveries,
        }
    }
}

/// One consumer in the triage group
pub struct TriageWorker {
    db: SqlitePool,
    channel: Arc<dyn EventChannel>,
    classifier: Arc<dyn Classifier>,
    settings: WorkerSettings,
}

impl TriageWorker {
    pub fn new(
        db: SqlitePool,
        channel: Arc<dyn EventChannel>,
        classifier: Arc<dyn Classifier>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            db,
            channel,
            classifier,
            settings,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.settings.consumer_name
    }

    /// Consume until `cancel` fires
    ///
    /// The batch in hand is finished before returning; anything not yet
    /// acknowledged is redelivered to the group later.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.channel.ensure_consumer_group(&self.settings.group).await?;

        info!(
            group = %self.settings.group,
            consumer = %self.settings.consumer_name,
            "Triage worker started"
        );

        while !cancel.is_cancelled() {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = self.channel.consume(
                    &self.settings.group,
                    &self.settings.consumer_name,
                    self.settings.batch_size,
                    self.settings.block_timeout,
                ) => batch,
            };

            let deliveries = match batch {
                Ok(deliveries) => deliveries,
                Err(e) => {
                    error!(error = %e, "Failed to consume from channel");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(CHANNEL_ERROR_BACKOFF) => continue,
                    }
                }
            };

            for delivery in &deliveries {
                // Failures are logged inside; the message stays pending
                let _ = self.handle_delivery(delivery).await;
            }
        }

        info!(consumer = %self.settings.consumer_name, "Triage worker stopped");
        Ok(())
    }

    /// Apply the poison-message policy, then process
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<ProcessOutcome> {
        if delivery.delivery_count > self.settings.max_deliveries {
            let reason = format!(
                "delivered {} times (max {})",
                delivery.delivery_count, self.settings.max_deliveries
            );
            warn!(
                message_id = %delivery.message_id,
                lead_id = %delivery.event.lead_id,
                %reason,
                "Dead-lettering message"
            );
            if let Err(e) = self
                .channel
                .dead_letter(&self.settings.group, delivery, &reason)
                .await
            {
                error!(
                    message_id = %delivery.message_id,
                    lead_id = %delivery.event.lead_id,
                    error = %e,
                    "Dead-lettering failed; message left for redelivery"
                );
                return Err(e);
            }
            return Ok(ProcessOutcome::DeadLettered);
        }

        match self.process_event(delivery).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(
                    message_id = %delivery.message_id,
                    lead_id = %delivery.event.lead_id,
                    delivery_count = delivery.delivery_count,
                    error = %e,
                    "Processing failed; message left for redelivery"
                );
                Err(e)
            }
        }
    }

    /// Process one delivery and acknowledge it unless an error is returned
    pub async fn process_event(&self, delivery: &Delivery) -> Result<ProcessOutcome> {
        let event = &delivery.event;
        debug!(
            message_id = %delivery.message_id,
            lead_id = %event.lead_id,
            delivery_count = delivery.delivery_count,
            "Received event"
        );

        let Some(lead) = leads::get_lead(&self.db, &event.lead_id).await? else {
            warn!(lead_id = %event.lead_id, "Lead not found, dropping event");
            return self.finish(delivery, ProcessOutcome::SkippedNoLead).await;
        };

        if insights::find_by_lead_and_hash(&self.db, &lead.id, &event.content_hash)
            .await?
            .is_some()
        {
            debug!(lead_id = %lead.id, "Insight already exists");
            return self.finish(delivery, ProcessOutcome::SkippedAlreadyInsighted).await;
        }

        let payload = self.classifier.triage(&lead.note).await?;
        payload.validate()?;

        let insight = Insight::new(
            uuid_utils::generate_string(),
            lead.id.clone(),
            event.content_hash.clone(),
            payload,
            time::now(),
        );

        let outcome = retry_on_lock("insert insight", DEFAULT_MAX_LOCK_WAIT_MS, || {
            insights::insert_insight(&self.db, &insight)
        })
        .await?;

        let outcome = match outcome {
            InsertOutcome::Inserted => {
                info!(
                    lead_id = %lead.id,
                    intent = %insight.intent,
                    priority = %insight.priority,
                    next_action = %insight.next_action,
                    confidence = insight.confidence,
                    "Created insight"
                );
                ProcessOutcome::Insighted
            }
            InsertOutcome::AlreadyExists => {
                info!(lead_id = %lead.id, "Insight committed by another worker");
                ProcessOutcome::InsightedByOtherWriter
            }
        };

        self.finish(delivery, outcome).await
    }

    async fn finish(&self, delivery: &Delivery, outcome: ProcessOutcome) -> Result<ProcessOutcome> {
        self.channel
            .ack(&self.settings.group, delivery.message_id)
            .await?;
        debug!(
            message_id = %delivery.message_id,
            outcome = outcome.as_str(),
            "Acknowledged"
        );
        Ok(outcome)
    }
}

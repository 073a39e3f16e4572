//! Periodic republish of `lead.created` events lost between commit and publish

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::service::LeadService;

/// Leads scanned per pass
const RECONCILE_BATCH: i64 = 100;

/// Run the reconciliation scan every `interval` until `cancel` fires
pub async fn run_reconciliation(
    service: Arc<LeadService>,
    interval: Duration,
    grace: Duration,
    cancel: CancellationToken,
) {
    info!(
        interval_secs = interval.as_secs(),
        grace_secs = grace.as_secs(),
        "Event reconciliation started"
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Event reconciliation stopped");
                return;
            }
            _ = ticker.tick() => {
                match service.reconcile_unpublished(grace, RECONCILE_BATCH).await {
                    Ok(0) => debug!("No unpublished leads"),
                    Ok(n) => info!(republished = n, "Reconciliation pass complete"),
                    Err(e) => warn!(error = %e, "Reconciliation pass failed"),
                }
            }
        }
    }
}

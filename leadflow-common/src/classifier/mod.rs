//! Lead classification
//!
//! A classifier is a pure function of the note text. The triage worker may
//! call it more than once for the same lead (redelivery), so implementations
//! must not carry state between calls or cause side effects.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ClassifierKind;
use crate::models::InsightPayload;
use crate::Result;

pub mod rule_based;

pub use rule_based::RuleBasedClassifier;

/// Turns a lead note into an insight payload
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify a note
    ///
    /// # Returns
    /// * `Ok(InsightPayload)` - intent, priority, next action, confidence, tags
    /// * `Err(_)` - classification failed; the event stays unacknowledged
    async fn triage(&self, note: &str) -> Result<InsightPayload>;
}

/// Build the classifier selected in configuration
pub fn classifier_from_config(kind: ClassifierKind) -> Arc<dyn Classifier> {
    match kind {
        ClassifierKind::RuleBased => Arc::new(RuleBasedClassifier::new()),
    }
}

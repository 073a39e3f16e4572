//! leadflow-triage library - triage consumer
//!
//! Pulls `lead.created` events from the channel under a consumer group,
//! classifies each lead and stores exactly one insight per
//! (lead, content hash) however many times the event is delivered.

pub mod worker;

pub use worker::{ProcessOutcome, TriageWorker, WorkerSettings};

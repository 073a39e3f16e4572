//! Data model shared by intake, triage and insights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::{Error, Result};

/// Inbound lead submission (POST /leads body)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    pub note: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl LeadRequest {
    /// Reject requests whose note is empty or whitespace only
    pub fn validate(&self) -> Result<()> {
        if self.note.trim().is_empty() {
            return Err(Error::InvalidInput("note must not be empty".to_string()));
        }
        Ok(())
    }

    /// Canonical snapshot used for idempotency comparison
    ///
    /// `serde_json::Value` objects keep keys sorted, so two requests carrying
    /// the same fields compare equal regardless of the order they arrived in.
    pub fn canonical(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Persisted lead, immutable after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub note: String,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Build a new lead from a validated request
    pub fn from_request(id: String, request: &LeadRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            email: request.email.clone(),
            phone: request.phone.clone(),
            name: request.name.clone(),
            note: request.note.clone(),
            source: request.source.clone(),
            created_at,
        }
    }
}

/// Classified intent of a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Buy,
    Support,
    Spam,
    Job,
    Other,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Buy => "buy",
            Intent::Support => "support",
            Intent::Spam => "spam",
            Intent::Job => "job",
            Intent::Other => "other",
        }
    }
}

impl std::str::FromStr for Intent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "buy" => Ok(Intent::Buy),
            "support" => Ok(Intent::Support),
            "spam" => Ok(Intent::Spam),
            "job" => Ok(Intent::Job),
            "other" => Ok(Intent::Other),
            _ => Err(Error::CorruptRecord(format!("Unknown intent: {}", s))),
        }
    }
}

/// Follow-up priority, P0 most urgent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::P0 => "P0",
            Priority::P1 => "P1",
            Priority::P2 => "P2",
            Priority::P3 => "P3",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "P0" => Ok(Priority::P0),
            "P1" => Ok(Priority::P1),
            "P2" => Ok(Priority::P2),
            "P3" => Ok(Priority::P3),
            _ => Err(Error::CorruptRecord(format!("Unknown priority: {}", s))),
        }
    }
}

/// Recommended next step for a lead
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NextAction {
    Call,
    Email,
    Ignore,
    Qualify,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NextAction::Call => "call",
            NextAction::Email => "email",
            NextAction::Ignore => "ignore",
            NextAction::Qualify => "qualify",
        }
    }
}

impl std::str::FromStr for NextAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "call" => Ok(NextAction::Call),
            "email" => Ok(NextAction::Email),
            "ignore" => Ok(NextAction::Ignore),
            "qualify" => Ok(NextAction::Qualify),
            _ => Err(Error::CorruptRecord(format!("Unknown next action: {}", s))),
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for NextAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightPayload {
    pub intent: Intent,
    pub priority: Priority,
    pub next_action: NextAction,
    /// In [0, 1]
    pub confidence: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl InsightPayload {
    /// Confidence outside [0, 1] (or NaN) is a classifier bug
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(Error::Classifier(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Persisted classification result for a lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub lead_id: String,
    pub intent: Intent,
    pub priority: Priority,
    pub next_action: NextAction,
    pub confidence: f64,
    pub tags: BTreeSet<String>,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        id: String,
        lead_id: String,
        content_hash: String,
        payload: InsightPayload,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            lead_id,
            intent: payload.intent,
            priority: payload.priority,
            next_action: payload.next_action,
            confidence: payload.confidence,
            tags: payload.tags,
            content_hash,
            created_at,
        }
    }
}

/// Event types carried by the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "lead.created")]
    LeadCreated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::LeadCreated => "lead.created",
        }
    }
}

/// Immutable fact appended to the event channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadEvent {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub lead_id: String,
    pub content_hash: String,
    pub occurred_at: DateTime<Utc>,
}

impl LeadEvent {
    /// `lead.created` event for a freshly committed lead
    pub fn lead_created(lead: &Lead) -> Self {
        Self {
            event_id: crate::uuid_utils::generate_string(),
            event_type: EventType::LeadCreated,
            lead_id: lead.id.clone(),
            content_hash: crate::hashing::content_hash(&lead.note),
            occurred_at: crate::time::now(),
        }
    }
}

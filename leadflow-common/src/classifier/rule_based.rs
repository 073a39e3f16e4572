//! Keyword rule classifier (English and Russian)
//!
//! Intent is decided by the first matching rule family in the order
//! buy, support, job, spam. Priority and next action follow from intent plus
//! urgency keywords. Confidence starts at 0.7 and gains 0.1 per "clear"
//! keyword family match, capped at 0.95.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use super::Classifier;
use crate::models::{InsightPayload, Intent, NextAction, Priority};
use crate::Result;

fn rules(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static classifier pattern"))
        .collect()
}

static BUY: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(price|pricing|стоимость|купить|счёт|invoice|purchase|buy|order)\b",
        r"\b(trial|discount|скидка|пробная|демо)\b",
    ])
});

static SUPPORT: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(support|поддержка|помощь|не работает|bug|error|проблема|issue)\b",
        r"\b(сломан|broken|fix|repair|troubleshoot)\b",
    ])
});

static JOB: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(вакансия|резюме|собеседование|job|career|vacancy|cv|resume|interview)\b",
        r"\b(работа|position|hiring|recruit)\b",
    ])
});

static SPAM: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(spam|реклама|продам|купим|массовая|рассылка)\b",
        r"\b(win|won|lottery|prize|congratulations)\b",
    ])
});

static URGENT: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(urgent|срочно|asap|emergency|critical|немедленно)\b",
        r"\b(сегодня|today|now|right now|сейчас)\b",
    ])
});

static HIGH: Lazy<Vec<Regex>> = Lazy::new(|| {
    rules(&[
        r"\b(next week|на следующей неделе|завтра|tomorrow)\b",
        r"\b(important|важно|приоритет)\b",
    ])
});

static CLEAR_BUY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(price|pricing|купить|invoice)\b").expect("static pattern"));
static CLEAR_SUPPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(support|не работает|bug)\b").expect("static pattern"));
static CLEAR_JOB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(резюме|interview|вакансия)\b").expect("static pattern"));
static CLEAR_SPAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(spam|реклама|win)\b").expect("static pattern"));

static SEATS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d+)\s*(seat|license|user|пользователь)").expect("static pattern"));
static SMALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(small|startup|начинающ)").expect("static pattern"));
static URGENT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(urgent|срочно|asap)").expect("static pattern"));
static TECHNICAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(api|integration|техническ)").expect("static pattern"));

fn any_match(patterns: &[Regex], text: &str) -> bool {
    patterns.iter().any(|p| p.is_match(text))
}

/// Stateless keyword classifier
#[derive(Debug, Clone, Default)]
pub struct RuleBasedClassifier;

impl RuleBasedClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous core shared by the trait impl and tests
    pub fn classify(&self, note: &str) -> InsightPayload {
        let text = note.to_lowercase();

        let intent = detect_intent(&text);
        let priority = detect_priority(&text, intent);
        let next_action = detect_next_action(intent, priority);

        InsightPayload {
            intent,
            priority,
            next_action,
            confidence: confidence(&text, intent),
            tags: extract_tags(&text),
        }
    }
}

#[async_trait]
impl Classifier for RuleBasedClassifier {
    async fn triage(&self, note: &str) -> Result<InsightPayload> {
        Ok(self.classify(note))
    }
}

fn detect_intent(text: &str) -> Intent {
    if any_match(&BUY, text) {
        Intent::Buy
    } else if any_match(&SUPPORT, text) {
        Intent::Support
    } else if any_match(&JOB, text) {
        Intent::Job
    } else if any_match(&SPAM, text) {
        Intent::Spam
    } else {
        Intent::Other
    }
}

fn detect_priority(text: &str, intent: Intent) -> Priority {
    if intent == Intent::Spam {
        Priority::P3
    } else if any_match(&URGENT, text) {
        Priority::P0
    } else if any_match(&HIGH, text) {
        Priority::P1
    } else {
        match intent {
            Intent::Buy => Priority::P1,
            Intent::Support => Priority::P2,
            _ => Priority::P3,
        }
    }
}

fn detect_next_action(intent: Intent, priority: Priority) -> NextAction {
    match (intent, priority) {
        (Intent::Spam, _) => NextAction::Ignore,
        (Intent::Buy, Priority::P0 | Priority::P1) => NextAction::Call,
        (Intent::Support, _) | (Intent::Job, _) => NextAction::Email,
        (_, Priority::P0) => NextAction::Call,
        _ => NextAction::Qualify,
    }
}

fn confidence(text: &str, intent: Intent) -> f64 {
    let clear = match intent {
        Intent::Buy => Some(&*CLEAR_BUY),
        Intent::Support => Some(&*CLEAR_SUPPORT),
        Intent::Job => Some(&*CLEAR_JOB),
        Intent::Spam => Some(&*CLEAR_SPAM),
        Intent::Other => None,
    };

    let base: f64 = match clear {
        Some(pattern) if pattern.is_match(text) => (0.7_f64 + 0.1).min(0.95),
        _ => 0.7,
    };

    (base * 100.0).round() / 100.0
}

fn extract_tags(text: &str) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();

    if SEATS.is_match(text) {
        tags.insert("enterprise".to_string());
    } else if SMALL.is_match(text) {
        tags.insert("small_business".to_string());
    }

    if URGENT_TAG.is_match(text) {
        tags.insert("urgent".to_string());
    }

    if TECHNICAL.is_match(text) {
        tags.insert("technical".to_string());
    }

    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_urgent_pricing_request_is_hot_buy() {
        let classifier = RuleBasedClassifier::new();
        let payload = classifier
            .triage("I need urgent pricing for 50 seats")
            .await
            .unwrap();

        assert_eq!(payload.intent, Intent::Buy);
        assert!(matches!(payload.priority, Priority::P0 | Priority::P1));
        assert_eq!(payload.next_action, NextAction::Call);
        assert_eq!(payload.confidence, 0.8);
        assert!(payload.tags.contains("enterprise"));
        assert!(payload.tags.contains("urgent"));
    }

    #[test]
    fn test_support_request() {
        let payload = RuleBasedClassifier::new().classify("The API integration is broken, found a bug");
        assert_eq!(payload.intent, Intent::Support);
        assert_eq!(payload.priority, Priority::P2);
        assert_eq!(payload.next_action, NextAction::Email);
        assert!(payload.tags.contains("technical"));
    }

    #[test]
    fn test_spam_is_ignored_regardless_of_urgency() {
        let payload = RuleBasedClassifier::new().classify("Congratulations, you won a prize! Act now");
        assert_eq!(payload.intent, Intent::Spam);
        assert_eq!(payload.priority, Priority::P3);
        assert_eq!(payload.next_action, NextAction::Ignore);
    }

    #[test]
    fn test_job_application() {
        let payload = RuleBasedClassifier::new().classify("Please find my resume attached for the position");
        assert_eq!(payload.intent, Intent::Job);
        assert_eq!(payload.next_action, NextAction::Email);
        assert_eq!(payload.confidence, 0.7);
    }

    #[test]
    fn test_russian_keywords() {
        let payload = RuleBasedClassifier::new().classify("Хотим купить лицензии, срочно");
        assert_eq!(payload.intent, Intent::Buy);
        assert_eq!(payload.priority, Priority::P0);
        assert_eq!(payload.next_action, NextAction::Call);
    }

    #[test]
    fn test_unrecognized_text_is_other() {
        let payload = RuleBasedClassifier::new().classify("hello there");
        assert_eq!(payload.intent, Intent::Other);
        assert_eq!(payload.priority, Priority::P3);
        assert_eq!(payload.next_action, NextAction::Qualify);
        assert!(payload.tags.is_empty());
        assert!(payload.validate().is_ok());
    }

    #[test]
    fn test_classification_is_deterministic() {
        let classifier = RuleBasedClassifier::new();
        let note = "Need a startup discount for our small team tomorrow";
        assert_eq!(classifier.classify(note), classifier.classify(note));
    }
}

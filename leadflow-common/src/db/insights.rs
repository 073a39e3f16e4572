//! Insight persistence
//!
//! The `(lead_id, content_hash)` constraint makes redelivered events safe:
//! whichever writer commits first wins, later writers get `AlreadyExists`.

use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;

use super::InsertOutcome;
use crate::error::is_unique_violation;
use crate::models::Insight;
use crate::time::{from_storage, to_storage};
use crate::{Error, Result};

/// Insert an insight unless one already exists for its (lead, content hash)
pub async fn insert_insight(pool: &SqlitePool, insight: &Insight) -> Result<InsertOutcome> {
    let tags = serde_json::to_string(&insight.tags)?;

    let result = sqlx::query(
        r#"
        INSERT INTO insights (
            id, lead_id, intent, priority, next_action,
            confidence, tags, content_hash, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&insight.id)
    .bind(&insight.lead_id)
    .bind(insight.intent.as_str())
    .bind(insight.priority.as_str())
    .bind(insight.next_action.as_str())
    .bind(insight.confidence)
    .bind(&tags)
    .bind(&insight.content_hash)
    .bind(to_storage(&insight.created_at))
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::AlreadyExists),
        Err(err) => Err(err.into()),
    }
}

/// Insight for an exact (lead, content hash) pair
pub async fn find_by_lead_and_hash(
    pool: &SqlitePool,
    lead_id: &str,
    content_hash: &str,
) -> Result<Option<Insight>> {
    let row = sqlx::query(
        r#"
        SELECT id, lead_id, intent, priority, next_action,
               confidence, tags, content_hash, created_at
        FROM insights
        WHERE lead_id = ? AND content_hash = ?
        "#,
    )
    .bind(lead_id)
    .bind(content_hash)
    .fetch_optional(pool)
    .await?;

    row.map(|row| insight_from_row(&row)).transpose()
}

/// Most recent insight for a lead
pub async fn latest_for_lead(pool: &SqlitePool, lead_id: &str) -> Result<Option<Insight>> {
    let row = sqlx::query(
        r#"
        SELECT id, lead_id, intent, priority, next_action,
               confidence, tags, content_hash, created_at
        FROM insights
        WHERE lead_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(lead_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| insight_from_row(&row)).transpose()
}

/// Number of insights stored for a lead
pub async fn count_for_lead(pool: &SqlitePool, lead_id: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM insights WHERE lead_id = ?")
        .bind(lead_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn insight_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Insight> {
    let intent: String = row.try_get("intent")?;
    let priority: String = row.try_get("priority")?;
    let next_action: String = row.try_get("next_action")?;
    let tags: String = row.try_get("tags")?;
    let created_at: String = row.try_get("created_at")?;

    let tags: BTreeSet<String> = serde_json::from_str(&tags)
        .map_err(|e| Error::CorruptRecord(format!("Insight tags: {}", e)))?;

    Ok(Insight {
        id: row.try_get("id")?,
        lead_id: row.try_get("lead_id")?,
        intent: intent.parse()?,
        priority: priority.parse()?,
        next_action: next_action.parse()?,
        confidence: row.try_get("confidence")?,
        tags,
        content_hash: row.try_get("content_hash")?,
        created_at: from_storage(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_database, leads};
    use crate::hashing::content_hash;
    use crate::models::{Intent, InsightPayload, Lead, LeadRequest, NextAction, Priority};
    use tempfile::TempDir;

    async fn setup_with_lead(lead_id: &str, note: &str) -> (TempDir, SqlitePool) {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("insights.db")).await.unwrap();
        insert_lead(&pool, lead_id, note).await;
        (dir, pool)
    }

    async fn insert_lead(pool: &SqlitePool, lead_id: &str, note: &str) {
        let request = LeadRequest {
            email: None,
            phone: None,
            name: None,
            note: note.to_string(),
            source: None,
        };
        let lead = Lead::from_request(lead_id.to_string(), &request, crate::time::now());
        leads::insert_with_idempotency(pool, &lead, &format!("key-{}", lead_id), "{}", "{}")
            .await
            .unwrap();
    }

    fn insight(lead_id: &str, note: &str, intent: Intent) -> Insight {
        let payload = InsightPayload {
            intent,
            priority: Priority::P1,
            next_action: NextAction::Call,
            confidence: 0.8,
            tags: ["enterprise".to_string()].into_iter().collect(),
        };
        Insight::new(
            crate::uuid_utils::generate_string(),
            lead_id.to_string(),
            content_hash(note),
            payload,
            crate::time::now(),
        )
    }

    #[tokio::test]
    async fn test_second_insert_for_same_hash_is_already_exists() {
        let (_dir, pool) = setup_with_lead("lead-1", "note").await;

        let first = insert_insight(&pool, &insight("lead-1", "note", Intent::Buy)).await.unwrap();
        let second = insert_insight(&pool, &insight("lead-1", "note", Intent::Spam)).await.unwrap();

        assert_eq!(first, InsertOutcome::Inserted);
        assert_eq!(second, InsertOutcome::AlreadyExists);
        assert_eq!(count_for_lead(&pool, "lead-1").await.unwrap(), 1);

        // First committed write is preserved
        let stored = find_by_lead_and_hash(&pool, "lead-1", &content_hash("note"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.intent, Intent::Buy);
        assert!(stored.tags.contains("enterprise"));
    }

    #[tokio::test]
    async fn test_same_hash_on_different_leads_is_allowed() {
        let (_dir, pool) = setup_with_lead("lead-1", "same text").await;
        insert_lead(&pool, "lead-2", "same text").await;

        let a = insert_insight(&pool, &insight("lead-1", "same text", Intent::Buy)).await.unwrap();
        let b = insert_insight(&pool, &insight("lead-2", "same text", Intent::Buy)).await.unwrap();

        assert_eq!(a, InsertOutcome::Inserted);
        assert_eq!(b, InsertOutcome::Inserted);
    }

    #[tokio::test]
    async fn test_re_triage_of_new_content_keeps_both_and_latest_wins() {
        let (_dir, pool) = setup_with_lead("lead-1", "v1").await;

        insert_insight(&pool, &insight("lead-1", "v1", Intent::Other)).await.unwrap();
        insert_insight(&pool, &insight("lead-1", "v2", Intent::Buy)).await.unwrap();

        assert_eq!(count_for_lead(&pool, "lead-1").await.unwrap(), 2);
        let latest = latest_for_lead(&pool, "lead-1").await.unwrap().unwrap();
        assert_eq!(latest.intent, Intent::Buy);
    }

    #[tokio::test]
    async fn test_insight_for_unknown_lead_violates_foreign_key() {
        let (_dir, pool) = setup_with_lead("lead-1", "note").await;
        let result = insert_insight(&pool, &insight("ghost", "note", Intent::Buy)).await;
        assert!(matches!(result, Err(Error::Database(_))));
    }

    #[tokio::test]
    async fn test_latest_for_lead_none_before_processing() {
        let (_dir, pool) = setup_with_lead("lead-1", "note").await;
        assert!(latest_for_lead(&pool, "lead-1").await.unwrap().is_none());
    }
}

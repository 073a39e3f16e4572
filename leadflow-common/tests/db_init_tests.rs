//! Database initialization tests
//!
//! - Database file and parent directory are created on first run
//! - Re-running initialization against an existing file is harmless
//! - Uniqueness constraints the pipeline relies on are present

use leadflow_common::db::{connect_readonly, init_database};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("leadflow.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("leadflow.db");

    let pool1 = init_database(&db_path).await;
    assert!(pool1.is_ok());

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());

    let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
        .fetch_one(&pool2.unwrap())
        .await
        .unwrap();
    assert_eq!(versions, 1);
}

#[tokio::test]
async fn test_record_store_tables_exist() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("leadflow.db")).await.unwrap();

    for table in ["leads", "idempotency_keys", "insights", "schema_version"] {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(count, 1, "Missing table {}", table);
    }
}

#[tokio::test]
async fn test_foreign_keys_enabled_on_every_connection() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("leadflow.db")).await.unwrap();

    // Hold several connections so more than one is exercised
    let mut conns = Vec::new();
    for _ in 0..3 {
        conns.push(pool.acquire().await.unwrap());
    }
    for conn in conns.iter_mut() {
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}

#[tokio::test]
async fn test_readonly_connection_rejects_writes() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("leadflow.db");
    init_database(&db_path).await.unwrap();

    let ro = connect_readonly(&db_path).await.unwrap();
    let result = sqlx::query("CREATE TABLE _test_write (id INTEGER)")
        .execute(&ro)
        .await;

    assert!(result.is_err(), "Write operation should fail in read-only mode");
}

#[tokio::test]
async fn test_readonly_connection_requires_existing_database() {
    let dir = TempDir::new().unwrap();
    let result = connect_readonly(&dir.path().join("missing.db")).await;
    assert!(result.is_err());
}

use leaseq::{Queue, QueueOptions};
use serde_json::json;

mod common;

const LEGACY_TABLE: &str = r#"
    CREATE TABLE legacy_upgrade (
        id         BIGSERIAL PRIMARY KEY,
        payload    JSONB   NOT NULL,
        visible_at TEXT    NOT NULL,
        ack        TEXT,
        tries      INTEGER NOT NULL DEFAULT 0,
        deleted_at TEXT,
        debounce   TEXT
    );
"#;

#[tokio::test]
async fn migrate_rewrites_legacy_text_timestamps() {
    let pool = common::pool().await;

    sqlx::query(LEGACY_TABLE)
        .execute(&pool)
        .await
        .expect("create legacy table");
    sqlx::query("INSERT INTO legacy_upgrade (payload, visible_at) VALUES ($1, $2)")
        .bind(json!("carried over"))
        .bind("2020-01-01T00:00:00Z")
        .execute(&pool)
        .await
        .expect("insert legacy pending row");
    sqlx::query("INSERT INTO legacy_upgrade (payload, visible_at, deleted_at) VALUES ($1, $2, $3)")
        .bind(json!("already finished"))
        .bind("2020-01-01T00:00:00Z")
        .bind("2020-01-02T00:00:00Z")
        .execute(&pool)
        .await
        .expect("insert legacy done row");

    let queue = Queue::new(pool, "legacy_upgrade", QueueOptions::new()).expect("queue");

    assert_eq!(queue.migrate().await.expect("migrate"), 2);
    assert_eq!(queue.migrate().await.expect("repeat migrate"), 0, "one-shot upgrade");

    queue.create_indexes().await.expect("indexes after migrate");

    // The carried-over pending row is claimable with native timestamps.
    let message = queue.get().await.expect("get").expect("migrated message");
    assert_eq!(message.payload, json!("carried over"));
    assert_eq!(message.tries, 1);

    // The done row stayed done.
    assert_eq!(queue.done().await.expect("done"), 1);
}

#[tokio::test]
async fn migrate_is_a_no_op_on_native_tables() {
    let queue = common::queue("test_native", QueueOptions::new()).await;
    queue.add(&json!(1)).await.expect("add");

    assert_eq!(queue.migrate().await.expect("migrate"), 0);
    assert!(queue.get().await.expect("get").is_some(), "data untouched");
}

#[tokio::test]
async fn migrate_on_missing_table_matches_nothing() {
    let queue = Queue::new(common::pool().await, "test_absent", QueueOptions::new())
        .expect("queue");
    assert_eq!(queue.migrate().await.expect("migrate"), 0);
}

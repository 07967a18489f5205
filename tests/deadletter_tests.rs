use leaseq::{Queue, QueueOptions};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mod common;

/// Claim and deliberately let the lease lapse.
async fn expire_one(queue: &Queue) {
    let message = queue.get().await.expect("get").expect("claimable message");
    drop(message);
    tokio::time::sleep(Duration::from_secs(2)).await;
}

#[tokio::test]
async fn over_retried_message_moves_to_dead_queue() {
    let dead = Arc::new(
        Queue::new(common::pool().await, "test_dlq_dead", QueueOptions::new())
            .expect("dead queue"),
    );
    dead.create_indexes().await.expect("dead queue table");

    let queue = common::queue(
        "test_dlq_source",
        QueueOptions::new()
            .visibility(1)
            .dead_queue(dead.clone())
            .max_retries(2),
    )
    .await;

    queue.add(&json!("poison")).await.expect("add poison");
    queue.add(&json!("next")).await.expect("add next");

    // Two claims of the poison message, both left to expire.
    expire_one(&queue).await;
    expire_one(&queue).await;

    // Third claim trips the budget: the caller sees the next message, never
    // the over-retried one.
    let message = queue.get().await.expect("get").expect("next message");
    assert_eq!(message.payload, json!("next"));

    let buried = dead.get().await.expect("dead get").expect("dead-lettered message");
    assert_eq!(buried.payload["payload"], json!("poison"));
    assert_eq!(buried.payload["tries"], json!(3), "every claim counted");
    assert!(buried.payload["id"].is_string());
    assert!(buried.payload["ack"].is_string());

    // The original was acked on the source queue.
    assert_eq!(queue.done().await.expect("done"), 1);
}

#[tokio::test]
async fn over_retried_message_is_dropped_without_dead_queue() {
    let queue = common::queue(
        "test_drop",
        QueueOptions::new().visibility(1).max_retries(1),
    )
    .await;

    queue.add(&json!("doomed")).await.expect("add");

    expire_one(&queue).await;

    assert!(
        queue.get().await.expect("get").is_none(),
        "second claim exceeds the budget and nothing else is queued"
    );
    assert_eq!(queue.done().await.expect("done"), 1, "dropped message is acked");
}

#[tokio::test]
async fn default_policy_retries_forever() {
    let queue = common::queue("test_unbounded", QueueOptions::new().visibility(1)).await;
    queue.add(&json!("stubborn")).await.expect("add");

    expire_one(&queue).await;
    expire_one(&queue).await;

    let message = queue.get().await.expect("get").expect("still claimable");
    assert_eq!(message.tries, 3);
    assert_eq!(message.payload, json!("stubborn"));
}

pub mod postgres;

use leaseq::{Queue, QueueOptions};

/// Connection pool against the shared test database.
#[allow(dead_code)] // Used by multiple test binaries, but not by every one
pub async fn pool() -> sqlx::PgPool {
    leaseq::connect(&postgres::dsn().await)
        .await
        .expect("Failed to connect to test database")
}

/// Build a queue with its table and indexes in place.
#[allow(dead_code)] // Used by multiple test binaries, but not by every one
pub async fn queue(name: &str, options: QueueOptions) -> Queue {
    let queue = Queue::new(pool().await, name, options).expect("Failed to construct queue");
    queue
        .create_indexes()
        .await
        .expect("Failed to create table and indexes");
    queue
}

//! # leaseq
//!
//! `leaseq` is a library-only, PostgreSQL-backed work queue for Rust
//! applications: independent producers enqueue JSON payloads and
//! independent workers consume them with at-least-once delivery.
//!
//! ## Features
//! - **Lightweight**: no servers to operate, one table per queue. Directly
//!   use `leaseq` as a library in your Rust applications.
//! - **Visibility leases**: claimed messages stay hidden until acked or the
//!   lease expires; `ping` extends a lease mid-flight. Claims use
//!   PostgreSQL's `SKIP LOCKED` so concurrent workers never collide.
//! - **Dead-lettering**: messages claimed more times than the retry budget
//!   are re-enqueued onto a dead queue for out-of-band handling.
//! - **Delayed delivery and debouncing**: per-message delays, and a
//!   coalescing key that collapses repeated adds into one pending message
//!   carrying the most recent payload.
//!
//! ## Example
//!
//! ```no_run
//! use leaseq::{Queue, QueueOptions};
//! use serde_json::json;
//!
//! # async fn example() -> leaseq::Result<()> {
//! let pool = leaseq::connect("postgresql://localhost/jobs").await?;
//! let queue = Queue::new(pool, "emails", QueueOptions::new().visibility(60))?;
//! queue.create_indexes().await?;
//!
//! let id = queue.add(&json!({"to": "ops@example.com"})).await?;
//! println!("enqueued {id}");
//!
//! while let Some(message) = queue.get().await? {
//!     println!("processing {}", message.payload);
//!     queue.ack(&message.ack).await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Delivery is at-least-once: a worker that dies mid-lease loses nothing.
//! The message becomes claimable again once the lease expires, with its
//! `tries` counter incremented.

pub mod config;
pub mod error;
pub mod queue;
pub mod tables;
pub mod types;
mod validation;

pub use crate::config::{QueueOptions, RetryPolicy};
pub use crate::error::{Error, Result};
pub use crate::queue::{Queue, DEBOUNCED};
pub use crate::types::{AddOptions, Message, MessageRecord};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Open a connection pool with the default pool size.
pub async fn connect(dsn: &str) -> Result<PgPool> {
    connect_with_options(dsn, crate::config::DEFAULT_MAX_CONNECTIONS).await
}

/// Open a connection pool with an explicit pool size.
pub async fn connect_with_options(dsn: &str, max_connections: u32) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(dsn)
        .await
        .map_err(Error::from)
}

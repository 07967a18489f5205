//! The queue handle and message lifecycle operations.
//!
//! A [`Queue`] binds a connection pool to one table and carries the
//! queue-level defaults. Producers call [`Queue::add`] and friends;
//! consumers call [`Queue::get`], then [`Queue::ping`] to keep the lease
//! alive and [`Queue::ack`] to finish. Maintenance goes through
//! [`Queue::clean`] and the count methods.
//!
//! Every operation is a single round-trip to PostgreSQL except `get` on an
//! over-retried message, which additionally re-enqueues onto the dead queue
//! and acks the original before claiming again. That path is not
//! transactional: a crash between the dead-queue add and the ack yields a
//! duplicate, preserving at-least-once delivery.
//!
//! ### Example
//!
//! ```no_run
//! use leaseq::{Queue, QueueOptions};
//! use serde_json::json;
//!
//! # async fn example() -> leaseq::Result<()> {
//! let pool = leaseq::connect("postgresql://localhost/jobs").await?;
//! let queue = Queue::new(pool, "emails", QueueOptions::new())?;
//! queue.create_indexes().await?;
//!
//! queue.add(&json!({"to": "ops@example.com"})).await?;
//! if let Some(message) = queue.get().await? {
//!     // ... process ...
//!     queue.ack(&message.ack).await?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::{QueueOptions, RetryPolicy};
use crate::error::{Error, Result};
use crate::tables::Messages;
use crate::types::{AddOptions, Message};
use crate::validation::validate_queue_name;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Sentinel id returned by a debounced `add` that coalesced into an
/// existing message instead of inserting a new one.
pub const DEBOUNCED: &str = "(debounced)";

/// Mint a fresh 32-hex lease token.
fn ack_token() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A handle to one queue.
///
/// Handles are cheap to clone and share; all coordination happens in the
/// store, so any number of processes may hold handles to the same queue.
#[derive(Debug, Clone)]
pub struct Queue {
    messages: Messages,
    options: QueueOptions,
}

impl Queue {
    /// Create a queue handle bound to `name`.
    ///
    /// Validates the queue name and the retry policy; this is the only
    /// operation that fails without a store round-trip. The table itself is
    /// created by [`create_indexes`](Self::create_indexes).
    pub fn new(pool: PgPool, name: &str, options: QueueOptions) -> Result<Self> {
        validate_queue_name(name)?;
        if let RetryPolicy::Limited { max_retries: 0, .. } = options.retry {
            return Err(Error::InvalidConfig {
                field: "max_retries".to_string(),
                message: "max_retries must be a positive integer".to_string(),
            });
        }

        Ok(Self {
            messages: Messages::new(pool, name),
            options,
        })
    }

    pub fn name(&self) -> &str {
        self.messages.table()
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    /// Create the queue table and its indexes. Idempotent.
    ///
    /// # Returns
    /// The name of the claim-query index.
    pub async fn create_indexes(&self) -> Result<String> {
        self.messages
            .create_all(self.options.clean_after.is_some())
            .await
    }

    /// Enqueue a single payload with the queue defaults.
    ///
    /// # Returns
    /// The new message id, stringified.
    pub async fn add(&self, payload: &serde_json::Value) -> Result<String> {
        self.add_with(payload, &AddOptions::default()).await
    }

    /// Enqueue a single payload with per-call options.
    ///
    /// With a debounce key, a pending or delayed message carrying the same
    /// key absorbs this add: its payload is replaced, its visibility pushed
    /// forward, and [`DEBOUNCED`] is returned instead of an id. Leased and
    /// done messages are never coalesced.
    pub async fn add_with(
        &self,
        payload: &serde_json::Value,
        options: &AddOptions,
    ) -> Result<String> {
        let visible_at = self.visible_at(options);
        match &options.debounce {
            None => {
                let id = self.messages.insert(payload, visible_at).await?;
                Ok(id.to_string())
            }
            Some(key) => {
                let (id, inserted) = self.messages.upsert_debounced(payload, key, visible_at).await?;
                Ok(if inserted {
                    id.to_string()
                } else {
                    DEBOUNCED.to_string()
                })
            }
        }
    }

    /// Enqueue a non-empty batch with the queue defaults.
    ///
    /// # Returns
    /// One id per payload, in input order.
    pub async fn add_many(&self, payloads: &[serde_json::Value]) -> Result<Vec<String>> {
        self.add_many_with(payloads, &AddOptions::default()).await
    }

    /// Enqueue a non-empty batch with per-call options.
    ///
    /// All payloads share the options; with a debounce key the batch
    /// collapses to a single message carrying the last payload, and every
    /// coalesced slot reports [`DEBOUNCED`].
    pub async fn add_many_with(
        &self,
        payloads: &[serde_json::Value],
        options: &AddOptions,
    ) -> Result<Vec<String>> {
        if payloads.is_empty() {
            return Err(Error::ValidationFailed {
                reason: "add requires at least one payload".to_string(),
            });
        }

        let visible_at = self.visible_at(options);
        let ids = match &options.debounce {
            None => self
                .messages
                .insert_many(payloads, visible_at)
                .await?
                .iter()
                .map(ToString::to_string)
                .collect(),
            Some(key) => self
                .messages
                .upsert_debounced_many(payloads, key, visible_at)
                .await?
                .iter()
                .map(|(id, inserted)| {
                    if *inserted {
                        id.to_string()
                    } else {
                        DEBOUNCED.to_string()
                    }
                })
                .collect(),
        };

        Ok(ids)
    }

    /// Claim the oldest visible message with the queue's default lease.
    pub async fn get(&self) -> Result<Option<Message>> {
        self.get_with_visibility(self.options.visibility).await
    }

    /// Claim the oldest visible message, leasing it for
    /// `visibility_seconds`.
    ///
    /// `Ok(None)` means the queue has nothing claimable right now. A
    /// message whose claim count exceeds the retry budget is promoted to
    /// the dead queue (or dropped), acked here, and never surfaced; the
    /// loop then claims the next candidate.
    pub async fn get_with_visibility(&self, visibility_seconds: u32) -> Result<Option<Message>> {
        loop {
            let now = Utc::now();
            let token = ack_token();
            let record = match self.messages.claim(now, &token, visibility_seconds).await? {
                Some(record) => record,
                None => return Ok(None),
            };
            let message = record.to_message().ok_or_else(|| Error::Internal {
                message: format!("claim of message {} returned no lease token", record.id),
            })?;

            let (max_retries, dead_queue) = match &self.options.retry {
                RetryPolicy::Unbounded => return Ok(Some(message)),
                RetryPolicy::Limited {
                    max_retries,
                    dead_queue,
                } => (*max_retries, dead_queue),
            };
            if message.tries <= max_retries as i32 {
                return Ok(Some(message));
            }

            match dead_queue {
                Some(dead) => {
                    dead.add(&serde_json::to_value(&message)?).await?;
                    tracing::warn!(
                        "Message {} exceeded {} tries on '{}', moved to dead queue '{}'",
                        message.id,
                        max_retries,
                        self.name(),
                        dead.name()
                    );
                }
                None => {
                    tracing::warn!(
                        "Message {} exceeded {} tries on '{}', dropped",
                        message.id,
                        max_retries,
                        self.name()
                    );
                }
            }
            self.ack(&message.ack).await?;
        }
    }

    /// Extend a live lease by the queue's default visibility.
    ///
    /// # Returns
    /// The message id.
    ///
    /// # Errors
    /// [`Error::UnidentifiedAck`] if the token does not match a live lease
    /// (unknown, expired, or already acked).
    pub async fn ping(&self, ack: &str) -> Result<String> {
        self.ping_with_visibility(ack, self.options.visibility).await
    }

    /// Extend a live lease by `visibility_seconds`.
    pub async fn ping_with_visibility(
        &self,
        ack: &str,
        visibility_seconds: u32,
    ) -> Result<String> {
        let now = Utc::now();
        match self.messages.extend_lease(ack, now, visibility_seconds).await? {
            Some(id) => Ok(id.to_string()),
            None => Err(Error::UnidentifiedAck {
                ack: ack.to_string(),
            }),
        }
    }

    /// Finalize a leased message.
    ///
    /// An expired lease is rejected the same way as an unknown token; the
    /// caller must `get` the message again.
    ///
    /// # Returns
    /// The message id.
    ///
    /// # Errors
    /// [`Error::UnidentifiedAck`] if the token does not match a live lease.
    pub async fn ack(&self, ack: &str) -> Result<String> {
        let now = Utc::now();
        match self.messages.finalize(ack, now).await? {
            Some(id) => Ok(id.to_string()),
            None => Err(Error::UnidentifiedAck {
                ack: ack.to_string(),
            }),
        }
    }

    /// Remove acked messages.
    ///
    /// With `clean_after` configured, only messages acked before the
    /// retention window are removed; otherwise all of them.
    ///
    /// # Returns
    /// Number of messages removed.
    pub async fn clean(&self) -> Result<u64> {
        let cutoff = self
            .options
            .clean_after
            .map(|seconds| Utc::now() - Duration::seconds(i64::from(seconds)));
        let removed = self.messages.clean(cutoff).await?;
        tracing::debug!("Cleaned {} done messages from '{}'", removed, self.name());
        Ok(removed)
    }

    /// Count all messages, whatever their state.
    pub async fn total(&self) -> Result<i64> {
        self.messages.count_total().await
    }

    /// Count messages claimable right now.
    pub async fn size(&self) -> Result<i64> {
        self.messages.count_claimable(Utc::now()).await
    }

    /// Count messages under a live lease.
    pub async fn in_flight(&self) -> Result<i64> {
        self.messages.count_in_flight(Utc::now()).await
    }

    /// Count acked messages.
    pub async fn done(&self) -> Result<i64> {
        self.messages.count_done().await
    }

    /// One-shot upgrade of legacy text timestamps to native timestamps.
    ///
    /// # Returns
    /// Number of rows rewritten; 0 if the table is already native.
    pub async fn migrate(&self) -> Result<u64> {
        self.messages.migrate_legacy_timestamps().await
    }

    fn visible_at(&self, options: &AddOptions) -> DateTime<Utc> {
        let delay = options.delay.unwrap_or(self.options.delay);
        Utc::now() + Duration::seconds(i64::from(delay))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lazy_pool() -> PgPool {
        PgPool::connect_lazy("postgresql://localhost/leaseq_test").expect("lazy pool")
    }

    #[test]
    fn ack_tokens_are_32_hex_and_distinct() {
        let a = ack_token();
        let b = ack_token();
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn new_rejects_empty_name() {
        let err = Queue::new(lazy_pool(), "", QueueOptions::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn new_rejects_zero_max_retries() {
        let options = QueueOptions::new().max_retries(0);
        let err = Queue::new(lazy_pool(), "jobs", options).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn new_accepts_valid_name_and_policy() {
        let queue = Queue::new(lazy_pool(), "jobs", QueueOptions::new().max_retries(1)).unwrap();
        assert_eq!(queue.name(), "jobs");
    }
}

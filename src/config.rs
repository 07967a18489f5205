//! Configuration types for leaseq.
//!
//! This module defines [`QueueOptions`], the per-queue configuration bag,
//! and [`RetryPolicy`], which decides what happens to messages that keep
//! getting claimed without ever being acked.
//!
//! Options are immutable after `Queue` construction. Per-call overrides
//! (delay, debounce, visibility) go through the operation variants on
//! `Queue`, not through this type.
//!
//! ### Example
//!
//! ```no_run
//! use leaseq::{Queue, QueueOptions};
//! use std::sync::Arc;
//!
//! # async fn example(pool: sqlx::PgPool) -> leaseq::Result<()> {
//! let dead = Arc::new(Queue::new(pool.clone(), "emails_dead", QueueOptions::new())?);
//! let options = QueueOptions::new()
//!     .visibility(60)
//!     .dead_queue(dead)
//!     .max_retries(3);
//! let queue = Queue::new(pool, "emails", options)?;
//! # Ok(())
//! # }
//! ```

use crate::queue::Queue;
use std::sync::Arc;

/// Default lease duration (seconds) for `get` and `ping`
pub(crate) const DEFAULT_VISIBILITY_SECONDS: u32 = 30;
/// Default initial delay (seconds) applied by `add`
pub(crate) const DEFAULT_DELAY_SECONDS: u32 = 0;
/// Default retry budget when a dead queue is configured
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default connection pool size for the `connect` helpers
pub(crate) const DEFAULT_MAX_CONNECTIONS: u32 = 16;

/// What to do with a message whose claim count exceeds the retry budget.
///
/// "Never dead-letter" is a distinct variant rather than a sentinel retry
/// count; it is the default unless a budget or dead queue is configured.
#[derive(Debug, Clone, Default)]
pub enum RetryPolicy {
    /// Messages are retried forever; nothing is ever dead-lettered.
    #[default]
    Unbounded,
    /// Messages claimed more than `max_retries` times are removed. With a
    /// dead queue they are re-enqueued there first; without one they are
    /// dropped.
    Limited {
        max_retries: u32,
        dead_queue: Option<Arc<Queue>>,
    },
}

/// Configuration for a queue.
///
/// All fields have defaults; construct with [`QueueOptions::new`] and chain
/// the setters. No option is mutable after the queue is constructed.
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Default lease duration in seconds for `get`/`ping`
    pub visibility: u32,
    /// Default initial delay in seconds applied by `add`
    pub delay: u32,
    /// Retry/dead-letter policy
    pub retry: RetryPolicy,
    /// Retention window in seconds for acked messages; `clean()` removes
    /// acked messages older than this (all of them when unset)
    pub clean_after: Option<u32>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            visibility: DEFAULT_VISIBILITY_SECONDS,
            delay: DEFAULT_DELAY_SECONDS,
            retry: RetryPolicy::Unbounded,
            clean_after: None,
        }
    }
}

impl QueueOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default lease duration in seconds.
    pub fn visibility(mut self, seconds: u32) -> Self {
        self.visibility = seconds;
        self
    }

    /// Default initial delay in seconds.
    pub fn delay(mut self, seconds: u32) -> Self {
        self.delay = seconds;
        self
    }

    /// Cap the number of claims before a message is removed. Without an
    /// accompanying [`dead_queue`](Self::dead_queue), over-budget messages
    /// are dropped.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry = match self.retry {
            RetryPolicy::Limited { dead_queue, .. } => RetryPolicy::Limited {
                max_retries,
                dead_queue,
            },
            RetryPolicy::Unbounded => RetryPolicy::Limited {
                max_retries,
                dead_queue: None,
            },
        };
        self
    }

    /// Re-enqueue over-budget messages onto `queue`. Applies the default
    /// budget of [`DEFAULT_MAX_RETRIES`] claims unless
    /// [`max_retries`](Self::max_retries) is also set.
    pub fn dead_queue(mut self, queue: Arc<Queue>) -> Self {
        self.retry = match self.retry {
            RetryPolicy::Limited { max_retries, .. } => RetryPolicy::Limited {
                max_retries,
                dead_queue: Some(queue),
            },
            RetryPolicy::Unbounded => RetryPolicy::Limited {
                max_retries: DEFAULT_MAX_RETRIES,
                dead_queue: Some(queue),
            },
        };
        self
    }

    /// Retention window in seconds for acked messages.
    pub fn clean_after(mut self, seconds: u32) -> Self {
        self.clean_after = Some(seconds);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = QueueOptions::new();
        assert_eq!(options.visibility, 30);
        assert_eq!(options.delay, 0);
        assert!(options.clean_after.is_none());
        assert!(matches!(options.retry, RetryPolicy::Unbounded));
    }

    #[test]
    fn max_retries_without_dead_queue_drops() {
        let options = QueueOptions::new().max_retries(3);
        match options.retry {
            RetryPolicy::Limited {
                max_retries,
                dead_queue,
            } => {
                assert_eq!(max_retries, 3);
                assert!(dead_queue.is_none());
            }
            RetryPolicy::Unbounded => panic!("expected a limited policy"),
        }
    }

    #[test]
    fn setter_order_does_not_matter() {
        let a = QueueOptions::new().max_retries(2).visibility(5);
        let b = QueueOptions::new().visibility(5).max_retries(2);
        match (&a.retry, &b.retry) {
            (
                RetryPolicy::Limited { max_retries: m1, .. },
                RetryPolicy::Limited { max_retries: m2, .. },
            ) => assert_eq!(m1, m2),
            _ => panic!("expected limited policies"),
        }
        assert_eq!(a.visibility, b.visibility);
    }
}

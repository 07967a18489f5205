//! Core types for leaseq: claimed messages, stored records, and per-call
//! options.
//!
//! [`Message`] is the external representation handed to consumers by `get`;
//! [`MessageRecord`] is the row as stored. Payloads are opaque
//! [`serde_json::Value`]s and round-trip through the store unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self};

/// A claimed message, as returned by `Queue::get`.
///
/// `id` is the stringified row id; `ack` is the lease token required by
/// `ping` and `ack`. `tries` counts how many times the message has been
/// claimed, this claim included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID, stringified
    pub id: String,
    /// Lease token for this claim
    pub ack: String,
    /// The actual message payload (JSON)
    pub payload: serde_json::Value,
    /// Number of times this message has been claimed
    pub tries: i32,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message {{ id: {}, ack: {}, tries: {}, payload: {} }}",
            self.id, self.ack, self.tries, self.payload
        )
    }
}

/// A message row as stored in the queue table.
///
/// Exactly one of four states holds at any moment, derivable from
/// `{visible_at, ack, deleted_at}`: pending (`deleted_at` absent, `ack`
/// absent or lease expired, `visible_at <= now`), delayed (`visible_at >
/// now`, never claimed), leased (`ack` present, `visible_at > now`), or done
/// (`deleted_at` present).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRecord {
    /// Unique message ID
    pub id: i64,
    /// The actual message payload (JSON)
    pub payload: serde_json::Value,
    /// Earliest moment the message may be claimed (again)
    pub visible_at: DateTime<Utc>,
    /// Lease token minted by the most recent claim (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<String>,
    /// Number of times this message has been claimed
    pub tries: i32,
    /// Timestamp when the message was acked (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Coalescing key for pending messages (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce: Option<String>,
}

impl fmt::Display for MessageRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MessageRecord {{ id: {}, tries: {}, visible_at: {}, payload: {} }}",
            self.id, self.tries, self.visible_at, self.payload
        )
    }
}

impl MessageRecord {
    /// External representation of a claimed record.
    ///
    /// `None` for a record that carries no lease token.
    pub fn to_message(&self) -> Option<Message> {
        self.ack.as_ref().map(|ack| Message {
            id: self.id.to_string(),
            ack: ack.clone(),
            payload: self.payload.clone(),
            tries: self.tries,
        })
    }
}

/// Per-call options for `Queue::add_with` and `Queue::add_many_with`.
///
/// `delay` overrides the queue default when present, including an explicit
/// zero. `debounce` turns the add into a coalescing upsert on the given key.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Seconds before the message becomes claimable; queue default if `None`
    pub delay: Option<u32>,
    /// Coalescing key for pending messages
    pub debounce: Option<String>,
}

impl AddOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay delivery by `seconds` (an explicit 0 overrides a queue-level
    /// default delay).
    pub fn delay(mut self, seconds: u32) -> Self {
        self.delay = Some(seconds);
        self
    }

    /// Coalesce with any pending message carrying the same key.
    pub fn debounce(mut self, key: impl Into<String>) -> Self {
        self.debounce = Some(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_serializes_external_representation() {
        let message = Message {
            id: "42".to_string(),
            ack: "c3a2f1e4b5d6978812345678deadbeef".to_string(),
            payload: json!({"user": 7}),
            tries: 3,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["id"], "42");
        assert_eq!(value["tries"], 3);
        assert_eq!(value["payload"]["user"], 7);
        assert_eq!(value.as_object().unwrap().len(), 4);
    }

    #[test]
    fn unleased_record_has_no_external_representation() {
        let record = MessageRecord {
            id: 1,
            payload: json!("x"),
            visible_at: Utc::now(),
            ack: None,
            tries: 0,
            deleted_at: None,
            debounce: None,
        };
        assert!(record.to_message().is_none());
    }

    #[test]
    fn leased_record_converts_with_stringified_id() {
        let record = MessageRecord {
            id: 99,
            payload: json!({"k": "v"}),
            visible_at: Utc::now(),
            ack: Some("token".to_string()),
            tries: 2,
            deleted_at: None,
            debounce: None,
        };
        let message = record.to_message().unwrap();
        assert_eq!(message.id, "99");
        assert_eq!(message.ack, "token");
        assert_eq!(message.tries, 2);
    }
}

//! Error types and result handling for leaseq.
//!
//! This module defines the core error type [`Error`] used throughout the
//! crate, as well as the [`Result`] alias for fallible operations.
//!
//! Store failures are surfaced unchanged (wrapped, never retried); the
//! caller decides whether to retry. The only stale-lease condition is
//! [`Error::UnidentifiedAck`], returned by `ping` and `ack` when the token
//! does not match a live lease.
use thiserror::Error;

/// Result type for leaseq operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type for heterogeneous error sources
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error types for leaseq operations.
///
/// This enum covers all error cases that can occur when using leaseq,
/// including database connectivity, configuration, serialization, and
/// queue-specific operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (SQLx errors)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQL query failed
    #[error("Database query failed: {query}. Context: {context}. Source: {source}")]
    QueryFailed {
        source: BoxError,
        query: String,
        context: String,
    },

    /// Database transaction operation failed
    #[error("Database transaction failed: {source}. Context: {context}")]
    TransactionFailed { source: BoxError, context: String },

    /// JSON serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration field has an invalid value
    #[error("Invalid configuration value for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Payload validation failed
    #[error("Validation failed: {reason}")]
    ValidationFailed { reason: String },

    /// `ping` or `ack` against a token that does not match a live lease
    /// (unknown, expired, or already acked)
    #[error("Unidentified ack: {ack}")]
    UnidentifiedAck { ack: String },

    /// Unexpected internal error occurred
    #[error("Internal error: {message}")]
    Internal { message: String },
}

//! Queue name validation.
//!
//! Queue names double as table names, so they must satisfy PostgreSQL
//! identifier rules before they are interpolated into DDL and queries.

use crate::error::Result;

/// Longest accepted queue name, in bytes. Index names are derived by
/// appending a suffix (`_claim_idx` etc.), and the combined identifier must
/// stay under PostgreSQL's 63-byte NAMEDATALEN limit.
const MAX_QUEUE_NAME_BYTES: usize = 48;

/// Validates a queue name according to SQL identifier rules.
///
/// Rules from the PostgreSQL documentation:
/// - Must begin with a letter (a-z, A-Z) or underscore (_)
/// - Subsequent characters can be letters, underscores, digits (0-9), or
///   dollar signs ($)
/// - Maximum length is [`MAX_QUEUE_NAME_BYTES`] so derived index names fit
///
/// # Returns
/// * `Ok(())` if the queue name is valid
/// * `Err(crate::error::Error::InvalidConfig)` otherwise
pub fn validate_queue_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(crate::error::Error::InvalidConfig {
            field: "name".to_string(),
            message: "Queue name is required and cannot be empty".to_string(),
        });
    }

    if name.len() > MAX_QUEUE_NAME_BYTES {
        return Err(crate::error::Error::InvalidConfig {
            field: "name".to_string(),
            message: format!(
                "Queue name '{}' exceeds maximum length of {} bytes",
                name, MAX_QUEUE_NAME_BYTES
            ),
        });
    }

    let first_char = name.chars().next().unwrap_or('\0');
    if !first_char.is_ascii_alphabetic() && first_char != '_' {
        return Err(crate::error::Error::InvalidConfig {
            field: "name".to_string(),
            message: format!(
                "Queue name '{}' must start with a letter or underscore",
                name
            ),
        });
    }

    for c in name.chars() {
        if !c.is_ascii_alphanumeric() && c != '_' && c != '$' {
            return Err(crate::error::Error::InvalidConfig {
                field: "name".to_string(),
                message: format!(
                    "Queue name '{}' contains invalid character '{}'. Only letters, digits, underscores, and dollar signs are allowed",
                    name, c
                ),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(validate_queue_name("jobs").is_ok());
        assert!(validate_queue_name("_private").is_ok());
        assert!(validate_queue_name("emails_v2").is_ok());
        assert!(validate_queue_name("q$special").is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let err = validate_queue_name("").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(validate_queue_name("1jobs").is_err());
    }

    #[test]
    fn rejects_punctuation_and_quotes() {
        assert!(validate_queue_name("jobs;drop").is_err());
        assert!(validate_queue_name("jobs\"x").is_err());
        assert!(validate_queue_name("jobs queue").is_err());
    }

    #[test]
    fn rejects_overlong_name() {
        let name = "q".repeat(MAX_QUEUE_NAME_BYTES + 1);
        assert!(validate_queue_name(&name).is_err());
        let name = "q".repeat(MAX_QUEUE_NAME_BYTES);
        assert!(validate_queue_name(&name).is_ok());
    }
}

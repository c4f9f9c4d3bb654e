//! Structural validation of session configuration.
//!
//! A destination is deliverable only when its account id, credential, and
//! the shared URL template are all non-empty.

use thiserror::Error;

use crate::schema::{Destination, SessionConfig};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::ParseError(_) => 11,
            ValidationError::MissingField(_) => 12,
        }
    }
}

/// Validate one destination against the shared URL template.
pub fn validate_destination(
    destination: &Destination,
    server_url_format: &str,
) -> ValidationResult<()> {
    require("account_id", &destination.account_id)?;
    require("beacon_key", &destination.beacon_key)?;
    require("server_url_format", server_url_format)?;
    Ok(())
}

/// Validate the primary destination and every fan-out destination.
pub fn validate_session_config(config: &SessionConfig) -> ValidationResult<()> {
    validate_destination(&config.primary(), &config.server_url_format)?;
    for (idx, destination) in config.additional_destinations.iter().enumerate() {
        validate_destination(destination, &config.server_url_format).map_err(|e| match e {
            ValidationError::MissingField(field) => {
                ValidationError::MissingField(format!("additional_destinations[{idx}].{field}"))
            }
            other => other,
        })?;
    }
    Ok(())
}

fn require(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_destination_is_valid() {
        let dest = Destination::new("acct", "key");
        assert!(validate_destination(&dest, "https://example.test/%s").is_ok());
    }

    #[test]
    fn test_missing_fields_reported_in_order() {
        let url = "https://example.test/%s";
        assert_eq!(
            validate_destination(&Destination::new("", "key"), url),
            Err(ValidationError::MissingField("account_id".into()))
        );
        assert_eq!(
            validate_destination(&Destination::new("acct", " "), url),
            Err(ValidationError::MissingField("beacon_key".into()))
        );
        assert_eq!(
            validate_destination(&Destination::new("acct", "key"), ""),
            Err(ValidationError::MissingField("server_url_format".into()))
        );
    }

    #[test]
    fn test_default_config_is_incomplete() {
        let err = validate_session_config(&SessionConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("account_id".into()));
        assert_eq!(err.code(), 12);
    }

    #[test]
    fn test_fanout_destination_path_in_error() {
        let config =
            SessionConfig::new("acct", "key").with_destination(Destination::new("acct2", ""));
        assert_eq!(
            validate_session_config(&config),
            Err(ValidationError::MissingField(
                "additional_destinations[0].beacon_key".into()
            ))
        );
    }
}

//! Sift session configuration.
//!
//! This crate provides:
//! - The [`SessionConfig`] / [`Destination`] schema with legacy key aliases
//! - Structural validation of destinations
//! - Precedence resolution (live → pending → persisted → defaults)

pub mod resolve;
pub mod schema;
pub mod validate;

pub use resolve::{
    resolve_config, resolve_user_id, ConfigSource, PendingSettings, PendingValue, Resolved,
};
pub use schema::{Destination, SessionConfig, DEFAULT_SERVER_URL_FORMAT};
pub use validate::{
    validate_destination, validate_session_config, ValidationError, ValidationResult,
};

//! Sift common types, clock, and errors.
//!
//! This crate provides foundational types shared across the sift crates:
//! - The telemetry [`Event`] and its dedup identity
//! - An injectable [`Clock`] for deterministic time in tests
//! - The caller-visible error type

pub mod clock;
pub mod error;
pub mod event;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, ErrorCategory, Result};
pub use event::{Event, Payload};

//! Sift event queues.
//!
//! This crate provides:
//! - [`EventBuffer`]: per-stream buffering with dedup and size/age triggers
//! - [`QueueConfig`]: the batching policy of one stream
//! - A versioned, legacy-tolerant archive format for durable snapshots
//! - The [`UserIdProvider`] / [`UploadRequester`] capabilities a buffer is
//!   wired to

pub mod archive;
pub mod buffer;
pub mod config;

pub use archive::{ArchiveError, QueueArchive, QueueState, ARCHIVE_VERSION};
pub use buffer::{AppendOutcome, EventBuffer, UploadRequester, UserIdProvider};
pub use config::QueueConfig;

//! Versioned archive format for an event buffer.
//!
//! ```json
//! {
//!   "version": 1,
//!   "config": {"accept_same_event_after": 0, "upload_when_more_than": 8, "upload_when_older_than": 60000},
//!   "queue": [ ...events... ],
//!   "last_event": { ... },
//!   "last_upload_timestamp": 1700000000000
//! }
//! ```
//!
//! Archives written before versioning carry no `version` field and use
//! camelCase names; both are accepted on read.

use serde::{Deserialize, Serialize};
use sift_common::Event;
use thiserror::Error;

use crate::config::QueueConfig;

/// Current archive format version.
pub const ARCHIVE_VERSION: u32 = 1;

/// Errors from reading an archive.
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("malformed archive: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported archive version {found} (newest supported {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Mutable state of one buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueState {
    /// Pending events in insertion order.
    pub queue: Vec<Event>,
    /// Most recently accepted event, used only for dedup.
    pub last_event: Option<Event>,
    /// Epoch ms of the last triggered upload. Starts at 0 so the first
    /// append into a buffer with an age trigger always flushes.
    pub last_upload_timestamp: u64,
}

/// Serialized form of a buffer: its policy plus its state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueArchive {
    #[serde(default = "legacy_version")]
    pub version: u32,

    #[serde(default)]
    pub config: QueueConfig,

    #[serde(default, alias = "events")]
    pub queue: Vec<Event>,

    #[serde(default, alias = "lastEvent")]
    pub last_event: Option<Event>,

    #[serde(default, alias = "lastUploadTimestamp")]
    pub last_upload_timestamp: u64,
}

fn legacy_version() -> u32 {
    1
}

impl QueueArchive {
    pub fn new(config: QueueConfig, state: QueueState) -> Self {
        Self {
            version: ARCHIVE_VERSION,
            config,
            queue: state.queue,
            last_event: state.last_event,
            last_upload_timestamp: state.last_upload_timestamp,
        }
    }

    /// Parse and version-check an archive.
    pub fn parse(json: &str) -> Result<Self, ArchiveError> {
        let archive: QueueArchive = serde_json::from_str(json)?;
        if archive.version > ARCHIVE_VERSION {
            return Err(ArchiveError::UnsupportedVersion {
                found: archive.version,
                supported: ARCHIVE_VERSION,
            });
        }
        Ok(archive)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Split into policy and state.
    pub fn into_parts(self) -> (QueueConfig, QueueState) {
        (
            self.config,
            QueueState {
                queue: self.queue,
                last_event: self.last_event,
                last_upload_timestamp: self.last_upload_timestamp,
            },
        )
    }
}

//! Sift telemetry core.
//!
//! Buffers telemetry events per stream, persists them across restarts, and
//! delivers batches to one or more collector accounts with bounded retries.
//!
//! - [`sequencer`]: the single worker thread that owns all session state
//! - [`session`]: the open session handle and its state
//! - [`upload`]: request encoding, HTTP transport, retry policy
//! - [`store`]: durable key-value snapshots
//! - [`client`]: host entry point with pre-open settings
//! - [`logging`]: tracing setup for the CLI

pub mod client;
pub mod logging;
pub mod sequencer;
pub mod session;
pub mod store;
pub mod upload;

pub use client::Sift;
pub use sequencer::{SequencerHandle, TaskSequencer};
pub use session::{Session, SessionOptions, SessionState, APP_STATE_STREAM, DEVICE_PROPERTIES_STREAM};
pub use store::{FileStore, KeyValueStore, MemoryStore, StoreEdit};
pub use upload::{
    HttpTransport, TransportError, UploadOutcome, UploadRequest, UploaderConfig, UreqTransport,
};

pub use sift_common::{Clock, Error, Event, ManualClock, Result, SystemClock};
pub use sift_config::{Destination, SessionConfig};
pub use sift_queue::QueueConfig;

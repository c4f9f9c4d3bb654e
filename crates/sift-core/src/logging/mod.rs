//! Structured logging for sift.
//!
//! - Human-readable console output for interactive use
//! - JSON lines for machine consumption
//!
//! All log output goes to stderr; stdout is reserved for command payloads.
//! Lifecycle records carry a stable `event` field from [`event_names`].

pub mod config;

pub use config::{LogConfig, LogFormat, LogLevel};

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Stable names for the `event` field of lifecycle records.
pub mod event_names {
    // Session lifecycle
    pub const SESSION_OPENED: &str = "session.opened";
    pub const SESSION_RESTORED: &str = "session.restored";
    pub const SESSION_SAVED: &str = "session.saved";
    pub const SESSION_SAVE_FAILED: &str = "session.save_failed";
    pub const SESSION_CLOSED: &str = "session.closed";

    // Queues
    pub const QUEUE_CREATED: &str = "queue.created";
    pub const QUEUE_FLUSHED: &str = "queue.flushed";
    pub const QUEUE_UNKNOWN: &str = "queue.unknown";
    pub const QUEUE_DISCARDED: &str = "queue.discarded";

    // Upload
    pub const UPLOAD_SUCCEEDED: &str = "upload.succeeded";
    pub const UPLOAD_REJECTED: &str = "upload.rejected";
    pub const UPLOAD_RETRY_SCHEDULED: &str = "upload.retry_scheduled";
    pub const UPLOAD_DROPPED: &str = "upload.dropped";
    pub const UPLOAD_ABANDONED: &str = "upload.abandoned";

    // Sequencer
    pub const TASK_PANICKED: &str = "task.panicked";
    pub const TASK_DROPPED: &str = "task.dropped";
    pub const SEQUENCER_ABORTED: &str = "sequencer.aborted";
}

/// Initialize the logging subsystem.
///
/// Must be called once at startup. The filter comes from `config` alone;
/// `RUST_LOG` is already folded into it at the lowest precedence.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::new(config.filter_directive());

    match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .init();
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .init();
            }
        }
        LogFormat::Jsonl => {
            let json_layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(json_layer)
                .init();
        }
    }
}

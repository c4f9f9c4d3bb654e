//! The open session: a handle over worker-owned [`SessionState`].
//!
//! Every operation on [`Session`] becomes a task on the session's
//! sequencer. Fire-and-forget operations return immediately; the few that
//! must answer (`create_queue`, the accessors) block until their task has
//! run, which also means they observe every operation submitted before
//! them.

pub mod state;

pub use state::{keys, SessionState};

use std::sync::Arc;

use sift_common::{Clock, Error, Event, Result, SystemClock};
use sift_config::{PendingSettings, SessionConfig};
use sift_queue::QueueConfig;

use crate::logging::event_names;
use crate::sequencer::TaskSequencer;
use crate::store::KeyValueStore;
use crate::upload::{HttpTransport, Uploader, UploaderConfig, UreqTransport};

/// Stream of device property snapshots.
pub const DEVICE_PROPERTIES_STREAM: &str = "device-properties";
/// Stream of application state snapshots.
pub const APP_STATE_STREAM: &str = "app-state";

const HOUR_MILLIS: u64 = 60 * 60 * 1000;
const MINUTE_MILLIS: i64 = 60 * 1000;

/// Streams every session has, with their fixed policies.
pub fn well_known_streams() -> [(&'static str, QueueConfig); 2] {
    [
        (
            DEVICE_PROPERTIES_STREAM,
            QueueConfig::new()
                .with_accept_same_event_after(HOUR_MILLIS)
                .with_upload_when_more_than(8)
                .with_upload_when_older_than(MINUTE_MILLIS),
        ),
        (
            APP_STATE_STREAM,
            QueueConfig::new()
                .with_upload_when_more_than(8)
                .with_upload_when_older_than(MINUTE_MILLIS),
        ),
    ]
}

/// Everything a session needs from its host.
pub struct SessionOptions {
    pub store: Arc<dyn KeyValueStore>,
    pub transport: Arc<dyn HttpTransport>,
    pub clock: Arc<dyn Clock>,
    pub uploader: UploaderConfig,
    /// Overrides the persisted or generated installation id.
    pub installation_id: Option<String>,
    /// Values recorded before the session opened.
    pub pending: PendingSettings,
}

impl SessionOptions {
    /// Options with the system clock, default retry policy, and the ureq
    /// transport.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let uploader = UploaderConfig::default();
        Self {
            store,
            transport: Arc::new(UreqTransport::new(uploader.request_timeout)),
            clock: Arc::new(SystemClock),
            uploader,
            installation_id: None,
            pending: PendingSettings::default(),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_uploader_config(mut self, config: UploaderConfig) -> Self {
        self.uploader = config;
        self
    }

    pub fn with_installation_id(mut self, installation_id: impl Into<String>) -> Self {
        self.installation_id = Some(installation_id.into());
        self
    }

    pub fn with_pending(mut self, pending: PendingSettings) -> Self {
        self.pending = pending;
        self
    }
}

/// Handle to an open session.
pub struct Session {
    sequencer: TaskSequencer<SessionState>,
    closed: bool,
}

impl Session {
    /// Start the worker and queue the restore of persisted state.
    ///
    /// Returns before the restore has run; later operations queue behind it.
    pub fn open(options: SessionOptions) -> Result<Self> {
        let SessionOptions {
            store,
            transport,
            clock,
            uploader,
            installation_id,
            pending,
        } = options;

        let sequencer = TaskSequencer::start_with("sift-session", move |handle| {
            SessionState::new(store, clock, Uploader::new(uploader, transport, handle))
        })?;
        sequencer.submit(move |state: &mut SessionState| state.restore(pending, installation_id));

        tracing::info!(event = event_names::SESSION_OPENED, "session opened");
        Ok(Self {
            sequencer,
            closed: false,
        })
    }

    /// Buffer an event on `stream`. Unknown streams are logged and dropped.
    pub fn append(&self, stream: &str, event: Event) {
        let stream = stream.to_string();
        self.sequencer.submit(move |state: &mut SessionState| {
            state.append(&stream, event);
        });
    }

    pub fn set_config(&self, config: SessionConfig) {
        self.sequencer
            .submit(move |state: &mut SessionState| state.set_config(config));
    }

    pub fn set_user_id(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        self.sequencer
            .submit(move |state: &mut SessionState| state.set_user_id(Some(user_id)));
    }

    pub fn unset_user_id(&self) {
        self.sequencer
            .submit(|state: &mut SessionState| state.set_user_id(None));
    }

    /// Persist the current snapshot. Failures are logged.
    pub fn save(&self) {
        self.sequencer.submit(save_logged);
    }

    /// Flush `stream` and upload its contents regardless of triggers.
    pub fn upload(&self, stream: &str) {
        let stream = stream.to_string();
        self.sequencer.submit(move |state: &mut SessionState| {
            if let Err(e) = state.upload_now(&stream) {
                tracing::warn!(
                    event = event_names::QUEUE_UNKNOWN,
                    stream = %stream,
                    error = %e,
                    "cannot upload stream"
                );
            }
        });
    }

    /// Register a caller-defined stream.
    ///
    /// Fails with [`Error::QueueExists`] if `identifier` is taken.
    pub fn create_queue(&self, identifier: &str, config: QueueConfig) -> Result<()> {
        let identifier = identifier.to_string();
        self.sequencer
            .call(move |state| state.create_queue(&identifier, config))
            .unwrap_or(Err(Error::SessionClosed))
    }

    pub fn has_queue(&self, identifier: &str) -> bool {
        let identifier = identifier.to_string();
        self.sequencer
            .call(move |state| state.queue(&identifier).is_some())
            .unwrap_or(false)
    }

    pub fn config(&self) -> Option<SessionConfig> {
        self.sequencer
            .call(|state| state.config().cloned())
            .flatten()
    }

    pub fn user_id(&self) -> Option<String> {
        self.sequencer
            .call(|state| state.user_id())
            .flatten()
    }

    /// Run a read-only closure against the state once every previously
    /// submitted operation has run.
    pub fn inspect<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&SessionState) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.sequencer.call(move |state| f(state))
    }

    /// Save, then stop the worker. Delivery retries still pending are
    /// discarded.
    pub fn close(mut self) -> bool {
        self.teardown()
    }

    fn teardown(&mut self) -> bool {
        if self.closed {
            return true;
        }
        self.closed = true;
        self.sequencer.submit(save_logged);
        let clean = self.sequencer.shutdown();
        tracing::info!(event = event_names::SESSION_CLOSED, clean, "session closed");
        clean
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn save_logged(state: &mut SessionState) {
    if let Err(e) = state.save() {
        tracing::warn!(
            event = event_names::SESSION_SAVE_FAILED,
            error = %e,
            "failed to save session"
        );
    }
}

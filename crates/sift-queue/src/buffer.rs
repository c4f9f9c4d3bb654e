//! Event buffer for a single named stream.
//!
//! Appends are deduplicated against the last accepted event and then checked
//! against the size and age triggers. When a trigger fires the whole buffer
//! is handed to the [`UploadRequester`] as one batch and the buffer starts
//! over empty.
//!
//! The buffer has no interior synchronization: the owner is expected to
//! mutate it from one thread at a time.

use std::fmt;
use std::sync::Arc;

use sift_common::{Clock, Event};

use crate::archive::{ArchiveError, QueueArchive, QueueState};
use crate::config::QueueConfig;

/// Supplies the current user id when an appended event lacks one.
pub trait UserIdProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

impl<F> UserIdProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn user_id(&self) -> Option<String> {
        self()
    }
}

/// Receives batches flushed by a trigger.
pub trait UploadRequester: Send + Sync {
    fn request_upload(&self, batch: Vec<Event>);
}

impl<F> UploadRequester for F
where
    F: Fn(Vec<Event>) + Send + Sync,
{
    fn request_upload(&self, batch: Vec<Event>) {
        self(batch)
    }
}

/// What happened to an appended event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Suppressed as a duplicate of the last event.
    Duplicate,
    /// Buffered; no trigger fired.
    Buffered,
    /// Buffered, then a trigger flushed `batch_size` events to the requester.
    Flushed { batch_size: usize },
}

/// Buffered events for one stream plus the policy that drains them.
pub struct EventBuffer {
    config: QueueConfig,
    state: QueueState,
    clock: Arc<dyn Clock>,
    uploader: Arc<dyn UploadRequester>,
    user_ids: Option<Arc<dyn UserIdProvider>>,
}

impl EventBuffer {
    /// Create an empty buffer.
    pub fn new(
        config: QueueConfig,
        clock: Arc<dyn Clock>,
        uploader: Arc<dyn UploadRequester>,
    ) -> Self {
        Self::with_state(config, QueueState::default(), clock, uploader)
    }

    fn with_state(
        config: QueueConfig,
        state: QueueState,
        clock: Arc<dyn Clock>,
        uploader: Arc<dyn UploadRequester>,
    ) -> Self {
        EventBuffer {
            config,
            state,
            clock,
            uploader,
            user_ids: None,
        }
    }

    /// Fill missing user ids from `provider`, read at append time.
    pub fn with_user_id_provider(mut self, provider: Arc<dyn UserIdProvider>) -> Self {
        self.user_ids = Some(provider);
        self
    }

    /// Rebuild a buffer from a parsed archive.
    pub fn from_archive(
        archive: QueueArchive,
        clock: Arc<dyn Clock>,
        uploader: Arc<dyn UploadRequester>,
    ) -> Self {
        let (config, state) = archive.into_parts();
        Self::with_state(config, state, clock, uploader)
    }

    /// Parse an archive, reporting why it could not be used.
    pub fn try_unarchive(
        json: &str,
        clock: Arc<dyn Clock>,
        uploader: Arc<dyn UploadRequester>,
    ) -> Result<Self, ArchiveError> {
        let archive = QueueArchive::parse(json)?;
        Ok(Self::from_archive(archive, clock, uploader))
    }

    /// Restore from an archive, or start fresh with `fallback` when the
    /// archive is absent or unreadable.
    pub fn unarchive(
        json: Option<&str>,
        fallback: QueueConfig,
        clock: Arc<dyn Clock>,
        uploader: Arc<dyn UploadRequester>,
    ) -> Self {
        let Some(json) = json else {
            return Self::new(fallback, clock, uploader);
        };
        match QueueArchive::parse(json) {
            Ok(archive) => Self::from_archive(archive, clock, uploader),
            Err(e) => {
                tracing::warn!(error = %e, "discarding unreadable queue archive");
                Self::new(fallback, clock, uploader)
            }
        }
    }

    /// Serialize policy and state.
    pub fn archive(&self) -> serde_json::Result<String> {
        QueueArchive::new(self.config, self.state.clone()).to_json()
    }

    /// Append an event, applying dedup and the upload triggers.
    pub fn append(&mut self, mut event: Event) -> AppendOutcome {
        if event.user_id.is_none() {
            if let Some(provider) = &self.user_ids {
                event.user_id = provider.user_id();
            }
        }

        let now = self.clock.now_millis();

        if self.is_duplicate(&event, now) {
            tracing::debug!(time = event.time, "dropping duplicate event");
            return AppendOutcome::Duplicate;
        }

        self.state.last_event = Some(event.clone());
        self.state.queue.push(event);

        if !self.should_upload(now) {
            return AppendOutcome::Buffered;
        }

        let batch = std::mem::take(&mut self.state.queue);
        self.state.last_upload_timestamp = now;
        let batch_size = batch.len();
        tracing::debug!(batch_size, "queue trigger fired");
        self.uploader.request_upload(batch);
        AppendOutcome::Flushed { batch_size }
    }

    /// Drain the buffer regardless of triggers.
    pub fn flush(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.state.queue)
    }

    fn is_duplicate(&self, event: &Event, now: u64) -> bool {
        if !self.config.dedup_enabled() {
            return false;
        }
        match &self.state.last_event {
            Some(last) => {
                now < last.time.saturating_add(self.config.accept_same_event_after)
                    && event.basically_equals(last)
            }
            None => false,
        }
    }

    fn should_upload(&self, now: u64) -> bool {
        let size = self.state.queue.len() as i64;
        if self.config.size_trigger_enabled() && size > self.config.upload_when_more_than {
            return true;
        }

        self.config.age_trigger_enabled()
            && !self.state.queue.is_empty()
            && now
                > self
                    .state
                    .last_upload_timestamp
                    .saturating_add(self.config.upload_when_older_than as u64)
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.state.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.queue.is_empty()
    }

    pub fn last_event(&self) -> Option<&Event> {
        self.state.last_event.as_ref()
    }

    pub fn last_upload_timestamp(&self) -> u64 {
        self.state.last_upload_timestamp
    }

    /// Read-only copy of the pending events, oldest first.
    ///
    /// Inspection accessor for tests and diagnostics; it does not drain.
    pub fn pending_events(&self) -> Vec<Event> {
        self.state.queue.clone()
    }
}

impl fmt::Debug for EventBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBuffer")
            .field("config", &self.config)
            .field("pending", &self.state.queue.len())
            .field("last_upload_timestamp", &self.state.last_upload_timestamp)
            .finish()
    }
}

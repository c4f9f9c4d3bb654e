//! Session state owned by the sequencer worker.
//!
//! Every method here runs inside a sequencer task. Nothing in this module
//! locks; exclusivity comes from there being one worker.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use sift_common::{Clock, Error, Event, Result};
use sift_config::{
    resolve_config, resolve_user_id, ConfigSource, PendingSettings, SessionConfig,
};
use sift_queue::{AppendOutcome, EventBuffer, QueueConfig, UploadRequester, UserIdProvider};

use crate::logging::event_names;
use crate::store::{KeyValueStore, StoreEdit};
use crate::upload::{ConfigProvider, Uploader};

use super::well_known_streams;

/// Store key layout.
pub mod keys {
    pub const CONFIG: &str = "config";
    pub const USER_ID: &str = "user_id";
    pub const INSTALLATION_ID: &str = "installation_id";
    pub const QUEUE_PREFIX: &str = "queue/";

    pub fn queue(identifier: &str) -> String {
        format!("{QUEUE_PREFIX}{identifier}")
    }
}

/// Configuration, identity, and queues of one session.
pub struct SessionState {
    config: Option<SessionConfig>,
    config_source: ConfigSource,
    /// Shared with every buffer as its user-id provider.
    user_id: Arc<RwLock<Option<String>>>,
    installation_id: Option<String>,
    queues: BTreeMap<String, EventBuffer>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    uploader: Uploader<SessionState>,
}

impl ConfigProvider for SessionState {
    fn session_config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }
}

impl SessionState {
    /// Empty state; call [`restore`](Self::restore) before anything else.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        uploader: Uploader<SessionState>,
    ) -> Self {
        Self {
            config: None,
            config_source: ConfigSource::BuiltinDefault,
            user_id: Arc::new(RwLock::new(None)),
            installation_id: None,
            queues: BTreeMap::new(),
            store,
            clock,
            uploader,
        }
    }

    /// Load the snapshot, merging pending values over persisted ones.
    ///
    /// Every persisted `queue/*` entry is restored; unreadable ones are
    /// removed from the store. The well-known streams always exist
    /// afterwards, fresh if their archive was missing or unreadable.
    pub fn restore(&mut self, pending: PendingSettings, installation_id: Option<String>) {
        let config = resolve_config(pending.config, self.store.get(keys::CONFIG).as_deref());
        self.config = Some(config.value);
        self.config_source = config.source;

        let user_id = resolve_user_id(pending.user_id, self.store.get(keys::USER_ID).as_deref());
        self.set_user_id(user_id.value.clone());

        self.installation_id = Some(
            installation_id
                .filter(|id| !id.is_empty())
                .or_else(|| self.store.get(keys::INSTALLATION_ID).filter(|id| !id.is_empty()))
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        );

        for key in self.store.keys() {
            let Some(identifier) = key.strip_prefix(keys::QUEUE_PREFIX) else {
                continue;
            };
            let Some(json) = self.store.get(&key) else {
                continue;
            };
            match EventBuffer::try_unarchive(&json, Arc::clone(&self.clock), self.requester()) {
                Ok(buffer) => {
                    let buffer = buffer.with_user_id_provider(self.user_id_provider());
                    self.queues.insert(identifier.to_string(), buffer);
                }
                Err(e) => {
                    tracing::warn!(
                        event = event_names::QUEUE_DISCARDED,
                        stream = identifier,
                        error = %e,
                        "discarding unreadable queue archive"
                    );
                    if let Err(e) = self.store.remove(&key) {
                        tracing::warn!(stream = identifier, error = %e, "failed to remove queue archive");
                    }
                }
            }
        }

        for (identifier, config) in well_known_streams() {
            if !self.queues.contains_key(identifier) {
                let buffer = self.new_buffer(config);
                self.queues.insert(identifier.to_string(), buffer);
            }
        }

        tracing::info!(
            event = event_names::SESSION_RESTORED,
            config_source = %self.config_source,
            user_id_source = %user_id.source,
            queues = self.queues.len(),
            "session state restored"
        );
    }

    /// Buffer an event on `stream`. The installation id is filled here; the
    /// buffer fills the user id from its provider.
    pub fn append(&mut self, stream: &str, mut event: Event) -> Option<AppendOutcome> {
        if event.installation_id.is_none() {
            event.installation_id = self.installation_id.clone();
        }

        let Some(queue) = self.queues.get_mut(stream) else {
            tracing::warn!(
                event = event_names::QUEUE_UNKNOWN,
                stream,
                "append to unknown stream; dropping event"
            );
            return None;
        };
        let outcome = queue.append(event);
        if let AppendOutcome::Flushed { batch_size } = outcome {
            tracing::debug!(
                event = event_names::QUEUE_FLUSHED,
                stream,
                batch_size,
                "queue flushed by trigger"
            );
        }
        Some(outcome)
    }

    pub fn set_config(&mut self, config: SessionConfig) {
        self.config = Some(config);
        self.config_source = ConfigSource::Live;
    }

    pub fn set_user_id(&mut self, user_id: Option<String>) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) =
            user_id.filter(|id| !id.is_empty());
    }

    /// Register a caller-defined stream.
    pub fn create_queue(&mut self, identifier: &str, config: QueueConfig) -> Result<()> {
        if self.queues.contains_key(identifier) {
            return Err(Error::QueueExists {
                identifier: identifier.to_string(),
            });
        }
        let buffer = self.new_buffer(config);
        self.queues.insert(identifier.to_string(), buffer);
        tracing::debug!(
            event = event_names::QUEUE_CREATED,
            stream = identifier,
            "queue created"
        );
        Ok(())
    }

    /// Drain `stream` and hand the batch to the uploader, ignoring
    /// triggers. Returns the number of events flushed.
    pub fn upload_now(&mut self, stream: &str) -> Result<usize> {
        let queue = self
            .queues
            .get_mut(stream)
            .ok_or_else(|| Error::QueueNotFound {
                identifier: stream.to_string(),
            })?;
        let batch = queue.flush();
        if batch.is_empty() {
            return Ok(0);
        }
        tracing::debug!(
            event = event_names::QUEUE_FLUSHED,
            stream,
            batch_size = batch.len(),
            "queue flushed on request"
        );
        self.uploader.upload(&batch, self.config.as_ref());
        Ok(batch.len())
    }

    /// Write the whole snapshot in one commit.
    pub fn save(&self) -> Result<()> {
        let mut edits = Vec::with_capacity(self.queues.len() + 3);

        if let Some(config) = &self.config {
            edits.push(StoreEdit::put(keys::CONFIG, config.to_json()?));
        }
        edits.push(match self.user_id() {
            Some(user_id) => StoreEdit::put(keys::USER_ID, user_id),
            None => StoreEdit::remove(keys::USER_ID),
        });
        if let Some(installation_id) = &self.installation_id {
            edits.push(StoreEdit::put(keys::INSTALLATION_ID, installation_id.as_str()));
        }
        for (identifier, queue) in &self.queues {
            edits.push(StoreEdit::put(keys::queue(identifier), queue.archive()?));
        }

        self.store.commit(edits)?;
        tracing::debug!(
            event = event_names::SESSION_SAVED,
            queues = self.queues.len(),
            "session saved"
        );
        Ok(())
    }

    pub fn config(&self) -> Option<&SessionConfig> {
        self.config.as_ref()
    }

    pub fn config_source(&self) -> ConfigSource {
        self.config_source
    }

    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn installation_id(&self) -> Option<&str> {
        self.installation_id.as_deref()
    }

    pub fn queue(&self, identifier: &str) -> Option<&EventBuffer> {
        self.queues.get(identifier)
    }

    pub fn queue_identifiers(&self) -> Vec<String> {
        self.queues.keys().cloned().collect()
    }

    fn requester(&self) -> Arc<dyn UploadRequester> {
        let uploader = self.uploader.clone();
        Arc::new(move |batch: Vec<Event>| uploader.request(batch))
    }

    fn user_id_provider(&self) -> Arc<dyn UserIdProvider> {
        let user_id = Arc::clone(&self.user_id);
        Arc::new(move || user_id.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn new_buffer(&self, config: QueueConfig) -> EventBuffer {
        EventBuffer::new(config, Arc::clone(&self.clock), self.requester())
            .with_user_id_provider(self.user_id_provider())
    }
}

impl std::fmt::Debug for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionState")
            .field("config_source", &self.config_source)
            .field("user_id", &self.user_id())
            .field("installation_id", &self.installation_id)
            .field("queues", &self.queues)
            .finish_non_exhaustive()
    }
}

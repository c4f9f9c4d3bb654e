//! Batch delivery with fan-out and bounded retries.
//!
//! Each flushed batch becomes one request per destination (primary plus
//! additional destinations). Every attempt runs as a task on the session
//! sequencer, and a retry is a delayed task on the same sequencer, so an
//! upload never touches session state from another thread.
//!
//! Response handling per attempt:
//! - 2xx: delivered
//! - 400: rejected, never retried
//! - anything else, or no response: retried while attempts remain, with
//!   the delay after failed attempt `n` being `multiplier × n^exponent`

pub mod request;
pub mod transport;

pub use request::{build_request, BuildError, UploadRequest};
pub use transport::{HttpTransport, TransportError, UreqTransport};

use std::sync::Arc;
use std::time::Duration;

use sift_common::Event;
use sift_config::SessionConfig;

use crate::logging::event_names;
use crate::sequencer::SequencerHandle;

/// Retry and timeout tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploaderConfig {
    /// Total attempts per request, counting the first.
    pub max_attempts: u32,
    pub backoff_multiplier: Duration,
    pub backoff_exponent: u32,
    /// Per-request HTTP timeout for the default transport.
    pub request_timeout: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_multiplier: Duration::from_secs(3),
            backoff_exponent: 2,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl UploaderConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_backoff_multiplier(mut self, multiplier: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Delay before the attempt that follows failed attempt `failed_attempt`.
    pub fn backoff_delay(&self, failed_attempt: u32) -> Duration {
        self.backoff_multiplier
            .saturating_mul(failed_attempt.saturating_pow(self.backoff_exponent))
    }

    /// Decide what follows attempt number `attempt` given its result.
    pub fn outcome_for(
        &self,
        response: &Result<u16, TransportError>,
        attempt: u32,
    ) -> UploadOutcome {
        match response {
            Ok(status) if (200..300).contains(status) => UploadOutcome::Delivered,
            Ok(400) => UploadOutcome::Rejected,
            _ if attempt < self.max_attempts => UploadOutcome::Retrying {
                next_attempt: attempt + 1,
                delay: self.backoff_delay(attempt),
            },
            _ => UploadOutcome::Dropped,
        }
    }
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered,
    /// The server rejected the batch as malformed.
    Rejected,
    Retrying {
        next_attempt: u32,
        delay: Duration,
    },
    /// Attempts exhausted; the batch is lost for this destination.
    Dropped,
}

/// Read access to the session configuration at dispatch time.
pub trait ConfigProvider {
    fn session_config(&self) -> Option<&SessionConfig>;
}

/// Dispatches batches and drives retries on a sequencer.
pub struct Uploader<S> {
    config: UploaderConfig,
    transport: Arc<dyn HttpTransport>,
    sequencer: SequencerHandle<S>,
}

impl<S> Clone for Uploader<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
            sequencer: self.sequencer.clone(),
        }
    }
}

impl<S: ConfigProvider + Send + 'static> Uploader<S> {
    pub fn new(
        config: UploaderConfig,
        transport: Arc<dyn HttpTransport>,
        sequencer: SequencerHandle<S>,
    ) -> Self {
        Self {
            config,
            transport,
            sequencer,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Queue delivery of `batch`; destinations are read when the dispatch
    /// task runs.
    pub fn request(&self, batch: Vec<Event>) {
        if batch.is_empty() {
            return;
        }
        let uploader = self.clone();
        self.sequencer.submit(move |state: &mut S| {
            uploader.upload(&batch, state.session_config());
        });
    }

    /// Build one request per destination and queue each first attempt.
    ///
    /// Returns the number of requests queued. Destinations whose request
    /// cannot be built are abandoned independently of the others.
    pub fn upload(&self, batch: &[Event], config: Option<&SessionConfig>) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let Some(config) = config else {
            tracing::warn!(
                event = event_names::UPLOAD_ABANDONED,
                batch_size = batch.len(),
                "no session config; abandoning batch"
            );
            return 0;
        };

        let mut queued = 0;
        for destination in config.destinations() {
            match build_request(batch, &destination, &config.server_url_format) {
                Ok(request) => {
                    let request = Arc::new(request);
                    let uploader = self.clone();
                    if self.sequencer.submit(move |_: &mut S| {
                        uploader.attempt(request, 1);
                    }) {
                        queued += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        event = event_names::UPLOAD_ABANDONED,
                        account_id = %destination.account_id,
                        batch_size = batch.len(),
                        error = %e,
                        "cannot build upload request"
                    );
                }
            }
        }
        queued
    }

    /// Perform attempt number `attempt` and schedule the next one if the
    /// response calls for it.
    pub fn attempt(&self, request: Arc<UploadRequest>, attempt: u32) -> UploadOutcome {
        let response = self.transport.send(&request);
        let outcome = self.config.outcome_for(&response, attempt);
        let account_id = request.account_id.as_str();

        match &outcome {
            UploadOutcome::Delivered => {
                tracing::debug!(
                    event = event_names::UPLOAD_SUCCEEDED,
                    account_id,
                    attempt,
                    "batch delivered"
                );
            }
            UploadOutcome::Rejected => {
                tracing::warn!(
                    event = event_names::UPLOAD_REJECTED,
                    account_id,
                    attempt,
                    status = 400u16,
                    "server rejected batch; not retrying"
                );
            }
            UploadOutcome::Retrying {
                next_attempt,
                delay,
            } => {
                tracing::info!(
                    event = event_names::UPLOAD_RETRY_SCHEDULED,
                    account_id,
                    attempt,
                    response = ?response,
                    delay_ms = delay.as_millis() as u64,
                    "upload failed; retrying"
                );
                let uploader = self.clone();
                let next_attempt = *next_attempt;
                let retry = Arc::clone(&request);
                self.sequencer.schedule(*delay, move |_: &mut S| {
                    uploader.attempt(retry, next_attempt);
                });
            }
            UploadOutcome::Dropped => {
                tracing::warn!(
                    event = event_names::UPLOAD_DROPPED,
                    account_id,
                    attempt,
                    response = ?response,
                    "upload attempts exhausted; dropping batch"
                );
            }
        }

        outcome
    }
}

//! Shared helpers for sift-core integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use sift_common::Event;
use sift_core::{HttpTransport, TransportError, UploadRequest};

/// One request as seen by [`RecordingTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub account_id: String,
    pub url: String,
    pub at: Instant,
    pub events: Vec<Event>,
    pub authorization: Option<String>,
}

/// In-process transport that records every request and answers from a
/// per-account script (default 200 once the script runs out).
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<RecordedCall>>,
    scripts: Mutex<HashMap<String, VecDeque<Result<u16, TransportError>>>>,
    fallback: Mutex<HashMap<String, Result<u16, TransportError>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next requests for `account_id` with `responses`, in order.
    pub fn script(&self, account_id: &str, responses: Vec<Result<u16, TransportError>>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(account_id.to_string(), responses.into());
    }

    /// Answer every request for `account_id` with `response`.
    pub fn always(&self, account_id: &str, response: Result<u16, TransportError>) {
        self.fallback
            .lock()
            .unwrap()
            .insert(account_id.to_string(), response);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, account_id: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.account_id == account_id)
            .collect()
    }

    /// Poll until at least `count` calls were recorded or `timeout` passes.
    pub fn wait_for_calls(&self, count: usize, timeout: Duration) -> Vec<RecordedCall> {
        let deadline = Instant::now() + timeout;
        loop {
            let calls = self.calls();
            if calls.len() >= count || Instant::now() >= deadline {
                return calls;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

impl HttpTransport for RecordingTransport {
    fn send(&self, request: &UploadRequest) -> Result<u16, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            account_id: request.account_id.clone(),
            url: request.url.clone(),
            at: Instant::now(),
            events: request.decode_events().unwrap(),
            authorization: request.header("Authorization").map(str::to_string),
        });

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.account_id)
            .and_then(|responses| responses.pop_front());
        scripted.unwrap_or_else(|| {
            self.fallback
                .lock()
                .unwrap()
                .get(&request.account_id)
                .cloned()
                .unwrap_or(Ok(200))
        })
    }
}

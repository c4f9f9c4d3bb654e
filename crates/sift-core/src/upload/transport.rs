//! HTTP transport seam.

use std::time::Duration;

use thiserror::Error;

use super::request::UploadRequest;

/// Failure to obtain any HTTP status. Always retryable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(String),
}

/// Sends a built request and reports the HTTP status.
///
/// Non-2xx statuses are `Ok(status)`; `Err` means no status was received.
pub trait HttpTransport: Send + Sync {
    fn send(&self, request: &UploadRequest) -> Result<u16, TransportError>;
}

/// Blocking transport backed by a `ureq` agent.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &UploadRequest) -> Result<u16, TransportError> {
        let mut call = self.agent.request(request.method, &request.url);
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        match call.send_bytes(&request.body) {
            Ok(response) => Ok(response.status()),
            Err(ureq::Error::Status(status, _)) => Ok(status),
            Err(ureq::Error::Transport(transport)) => Err(classify(&transport)),
        }
    }
}

fn classify(transport: &ureq::Transport) -> TransportError {
    let message = transport.to_string();
    match transport.kind() {
        ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
            TransportError::Connect(message)
        }
        ureq::ErrorKind::Io if message.contains("timed out") => TransportError::Timeout,
        _ => TransportError::Io(message),
    }
}

//! Host-facing entry point.
//!
//! [`Sift`] may be configured before a session exists. Settings made while
//! detached are recorded as pending and merged when the session opens,
//! taking precedence over what the store holds. Settings made while a
//! session is open go straight to it.

use sift_common::{Error, Event, Result};
use sift_config::{PendingSettings, PendingValue, SessionConfig};
use sift_queue::QueueConfig;

use crate::session::{Session, SessionOptions};

/// Owner of the pending settings and, while attached, the open session.
#[derive(Default)]
pub struct Sift {
    pending: PendingSettings,
    session: Option<Session>,
}

impl Sift {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session, handing it the pending settings.
    ///
    /// Pending settings replace any already present in `options`.
    pub fn open(&mut self, options: SessionOptions) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::SessionAlreadyOpen);
        }
        let pending = std::mem::take(&mut self.pending);
        self.session = Some(Session::open(options.with_pending(pending))?);
        Ok(())
    }

    /// Save and tear down the session.
    pub fn close(&mut self) -> Result<()> {
        let session = self.session.take().ok_or(Error::SessionNotOpen)?;
        session.close();
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Settings recorded while detached, not yet handed to a session.
    pub fn pending(&self) -> &PendingSettings {
        &self.pending
    }

    pub fn set_config(&mut self, config: SessionConfig) {
        match &self.session {
            Some(session) => session.set_config(config),
            None => self.pending.config = PendingValue::Set(config),
        }
    }

    pub fn set_user_id(&mut self, user_id: impl Into<String>) {
        match &self.session {
            Some(session) => session.set_user_id(user_id),
            None => self.pending.user_id = PendingValue::Set(user_id.into()),
        }
    }

    pub fn unset_user_id(&mut self) {
        match &self.session {
            Some(session) => session.unset_user_id(),
            None => self.pending.user_id = PendingValue::Cleared,
        }
    }

    pub fn append(&self, stream: &str, event: Event) -> Result<()> {
        self.open_session()?.append(stream, event);
        Ok(())
    }

    pub fn upload(&self, stream: &str) -> Result<()> {
        self.open_session()?.upload(stream);
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.open_session()?.save();
        Ok(())
    }

    pub fn create_queue(&self, identifier: &str, config: QueueConfig) -> Result<()> {
        self.open_session()?.create_queue(identifier, config)
    }

    fn open_session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(Error::SessionNotOpen)
    }
}

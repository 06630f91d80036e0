//! Shared recording state
//!
//! The controller writes it from `start_recording`/`stop_recording`; the
//! Process Stage and the Event Logger read it. Readers only ever see a whole
//! [`Session`] or none, and compare session ids to notice a change.

use crate::config::LoggingConfig;
use crate::error::{CollectError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::types::{Session, SessionState};

#[derive(Debug, Default)]
struct Inner {
    current: Option<Arc<Session>>,
    state: SessionState,
}

/// The active recording session, shared between threads
#[derive(Debug, Default)]
pub struct RecordingState {
    inner: RwLock<Inner>,
    next_id: AtomicU64,
}

impl RecordingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a session named `name`; returns it and the session it replaced
    pub fn start(
        &self,
        name: &str,
        logging: &LoggingConfig,
    ) -> Result<(Arc<Session>, Option<Arc<Session>>)> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CollectError::Config(
                "recording name must not be empty".to_string(),
            ));
        }
        if name.contains(['/', '\\']) {
            return Err(CollectError::Config(format!(
                "recording name '{}' must not contain path separators",
                name
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let session = Arc::new(Session::new(id, name, logging));

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = inner.current.replace(Arc::clone(&session));
        inner.state = SessionState::Recording;
        Ok((session, previous))
    }

    /// End the active session, if any
    pub fn stop(&self) -> Option<Arc<Session>> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let previous = inner.current.take();
        if previous.is_some() {
            inner.state = SessionState::Stopped;
        }
        previous
    }

    /// The active session
    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner
            .read()
            .map(|inner| inner.current.clone())
            .unwrap_or_else(|e| e.into_inner().current.clone())
    }

    /// Id of the active session, without cloning it
    pub fn current_id(&self) -> Option<u64> {
        self.inner
            .read()
            .map(|inner| inner.current.as_ref().map(|s| s.id))
            .unwrap_or_else(|e| e.into_inner().current.as_ref().map(|s| s.id))
    }

    pub fn state(&self) -> SessionState {
        self.inner
            .read()
            .map(|inner| inner.state)
            .unwrap_or_else(|e| e.into_inner().state)
    }

    pub fn is_recording(&self) -> bool {
        self.state().is_recording()
    }
}

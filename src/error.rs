//! Error handling for collect-rs
//!
//! This module defines the error type shared by the device boundary, the
//! pipeline stages and the storage layer, together with a Result alias.
//!
//! Errors fall into four groups:
//!
//! - **Device errors** - open/start/read/stop failures of the source adapter.
//!   These are fatal to the stage that hit them and are surfaced to the caller.
//! - **Storage errors** - write or sync failures while flushing a chunk.
//! - **Lifecycle errors** - calling an operation in the wrong connection state.
//! - **Stage errors** - faults escalated from a worker thread.

use crate::types::StageKind;
use thiserror::Error;

/// Main error type for collect-rs operations
#[derive(Error, Debug)]
pub enum CollectError {
    /// Errors reported by the acquisition device or its adapter
    #[error("Device error: {0}")]
    Device(String),

    /// Errors writing or syncing persisted output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors related to configuration loading/saving/validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation requires an active connection
    #[error("Not connected to a device")]
    NotConnected,

    /// `connect` called while a connection is already open
    #[error("Already connected to '{0}'")]
    AlreadyConnected(String),

    /// A pipeline stage aborted its loop
    #[error("Stage '{stage}' failed: {message}")]
    Stage {
        /// Stage that raised the fault
        stage: StageKind,
        /// Rendered cause
        message: String,
    },

    /// A stage thread panicked
    #[error("Stage '{0}' panicked")]
    StagePanicked(StageKind),

    /// A stage did not finish within the shutdown budget
    #[error("Timed out waiting for stage '{0}' to shut down")]
    ShutdownTimeout(StageKind),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CollectError>,
    },
}

impl CollectError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CollectError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a device error from any displayable cause
    pub fn device(message: impl std::fmt::Display) -> Self {
        CollectError::Device(message.to_string())
    }

    /// Whether this error (or the error it wraps) came from the device
    pub fn is_device_error(&self) -> bool {
        match self {
            CollectError::Device(_) => true,
            CollectError::WithContext { source, .. } => source.is_device_error(),
            _ => false,
        }
    }
}

/// Result type alias for collect-rs operations
pub type Result<T> = std::result::Result<T, CollectError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CollectError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CollectError::Io(e).with_context(f()))
    }
}

//! Session data types

use crate::config::LoggingConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Timestamp format used in file headers, e.g. `2020-01-09T14:03:11.123456`
pub const HEADER_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// State of the recording controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionState {
    /// No session has been started
    #[default]
    Idle,
    /// A session is active
    Recording,
    /// The last session was stopped
    Stopped,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }

    /// Display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Stopped => "Stopped",
        }
    }
}

/// One recording session: a name, a start time and its two output files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Monotonic id, unique within a process
    pub id: u64,
    /// Caller-supplied name, used for the file names and headers
    pub name: String,
    /// When `start_recording` was called
    pub started_at: DateTime<Local>,
    /// Destination of sample rows
    pub sample_path: PathBuf,
    /// Destination of event rows
    pub event_path: PathBuf,
}

impl Session {
    /// Create a session starting now
    pub fn new(id: u64, name: impl Into<String>, logging: &LoggingConfig) -> Self {
        Self::with_start_time(id, name, Local::now(), logging)
    }

    /// Create a session with an explicit start time
    pub fn with_start_time(
        id: u64,
        name: impl Into<String>,
        started_at: DateTime<Local>,
        logging: &LoggingConfig,
    ) -> Self {
        let name = name.into();
        let sample_path = logging
            .output_dir
            .join(format!("{}.{}", name, logging.sample_extension));
        let event_path = logging
            .output_dir
            .join(format!("{}.{}", name, logging.event_extension));
        Self {
            id,
            name,
            started_at,
            sample_path,
            event_path,
        }
    }

    /// Start time as written to the `date` header line
    pub fn date_string(&self) -> String {
        self.started_at.format(HEADER_DATE_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_paths_use_output_dir_and_extensions() {
        let logging = LoggingConfig {
            output_dir: PathBuf::from("/data/eeg"),
            ..LoggingConfig::default()
        };
        let session = Session::new(3, "subject07", &logging);
        assert_eq!(session.sample_path, PathBuf::from("/data/eeg/subject07.csv"));
        assert_eq!(session.event_path, PathBuf::from("/data/eeg/subject07.csve"));
    }

    #[test]
    fn test_date_string_has_microseconds() {
        let started_at = Local
            .with_ymd_and_hms(2021, 3, 4, 5, 6, 7)
            .single()
            .unwrap()
            + chrono::Duration::microseconds(42);
        let session = Session::with_start_time(1, "x", started_at, &LoggingConfig::default());
        assert_eq!(session.date_string(), "2021-03-04T05:06:07.000042");
    }

    #[test]
    fn test_state_names() {
        assert!(SessionState::Recording.is_recording());
        assert!(!SessionState::Stopped.is_recording());
        assert_eq!(SessionState::default().display_name(), "Idle");
    }
}

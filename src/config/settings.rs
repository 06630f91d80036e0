//! Configuration sections
//!
//! Each section deserializes with defaults for every missing field, so a
//! config file only needs to name what it overrides.
//!
//! - [`DeviceConfig`] - Which device to open
//! - [`AcquisitionConfig`] - Sample rate, rolling window and frame layout
//! - [`LoggingConfig`] - Output location, chunking and header metadata
//! - [`QueueConfig`] - Hand-off queue capacities and overflow policy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Channel labels written to the sample header by default
pub const DEFAULT_CHANNEL_LABELS: [&str; 16] = [
    "FZ", "C3", "CZ", "C4", "PZ", "O1", "OZ", "O2", "AccelX", "AccelY", "AccelZ", "GyroX",
    "GyroY", "GyroZ", "Battery", "Sample",
];

/// Device selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device to open; the selector is asked when unset
    pub device_id: Option<String>,
}

/// Acquisition parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Nominal device sample rate in Hz
    pub sample_rate_hz: f64,
    /// Seconds of history kept in the rolling buffer
    pub rolling_span_secs: f64,
    /// Index of the frame slot holding the sample counter
    pub counter_channel: usize,
    /// Labels written to the sample header
    pub channel_labels: Vec<String>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 250.0,
            rolling_span_secs: 15.0,
            counter_channel: 15,
            channel_labels: DEFAULT_CHANNEL_LABELS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Persisted output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory that receives the sample and event files
    pub output_dir: PathBuf,
    /// Seconds of samples accumulated before a chunk is flushed
    pub chunk_secs: f64,
    /// Event rows per chunk (defaults to the sample chunk size)
    pub event_chunk_rows: Option<usize>,
    /// Name part of the `collect` header tag
    pub collect_name: String,
    /// Version part of the `collect` header tag
    pub collect_version: String,
    /// Extension of the sample file
    pub sample_extension: String,
    /// Extension of the event file
    pub event_extension: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            chunk_secs: 5.0,
            event_chunk_rows: None,
            collect_name: "UnicornPy".to_string(),
            collect_version: "2020.01.09.2".to_string(),
            sample_extension: "csv".to_string(),
            event_extension: "csve".to_string(),
        }
    }
}

impl LoggingConfig {
    /// The `collect.....=` header value, e.g. `UnicornPy_2020.01.09.2`
    pub fn collect_tag(&self) -> String {
        format!("{}_{}", self.collect_name, self.collect_version)
    }
}

/// What a bounded sample queue does when it is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item and count it as dropped
    #[default]
    DropOldest,
    /// Reject the new item and count it as dropped
    DropNewest,
    /// Block the producer until space frees up
    Block,
}

/// Hand-off queue sizing
///
/// `None` capacities give unbounded queues. Only the sample queue honors
/// `sample_overflow`; the log queue always blocks when full and the event
/// queue always rejects new marks when full.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the stream -> process queue
    pub sample_capacity: Option<usize>,
    /// Overflow policy of the stream -> process queue
    pub sample_overflow: OverflowPolicy,
    /// Capacity of the process -> sample logger queue
    pub log_capacity: Option<usize>,
    /// Capacity of the caller -> event logger queue
    pub event_capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_labels_end_with_counter() {
        let acq = AcquisitionConfig::default();
        assert_eq!(acq.channel_labels.len(), 16);
        assert_eq!(acq.channel_labels[acq.counter_channel], "Sample");
    }

    #[test]
    fn test_collect_tag() {
        assert_eq!(LoggingConfig::default().collect_tag(), "UnicornPy_2020.01.09.2");
    }

    #[test]
    fn test_overflow_policy_serde_names() {
        let json = serde_json::to_string(&OverflowPolicy::DropNewest).unwrap();
        assert_eq!(json, "\"drop_newest\"");
        let policy: OverflowPolicy = serde_json::from_str("\"block\"").unwrap();
        assert_eq!(policy, OverflowPolicy::Block);
    }
}

//! Core data types for collect-rs
//!
//! This module contains the data structures that travel through the
//! acquisition pipeline and the values reported back to the caller.
//!
//! # Main Types
//!
//! - [`Sample`] - One acquired frame plus its extracted sample counter
//! - [`EventRecord`] - A caller-marked event correlated to a sample counter
//! - [`StageKind`] - Identifies the four pipeline stages
//! - [`ConnectionStatus`] - Lifecycle state of the collector
//! - [`CollectionStats`] - Snapshot of the pipeline counters
//!
//! # Sample Counter
//!
//! Every frame carries a device-maintained counter in one designated slot
//! (`counter_channel`). It is non-decreasing; two consecutive frames with the
//! same counter are the same reading returned twice.

use crate::error::{CollectError, Result};
use serde::{Deserialize, Serialize};

/// A processed frame: fixed-width channel readings with the counter extracted
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    counter: u64,
    values: Box<[f32]>,
}

impl Sample {
    /// Build a sample from a raw frame, reading the counter from `counter_channel`
    pub fn from_frame(frame: Vec<f32>, counter_channel: usize) -> Result<Self> {
        let raw = *frame.get(counter_channel).ok_or_else(|| {
            CollectError::device(format!(
                "frame has {} channels, counter channel is {}",
                frame.len(),
                counter_channel
            ))
        })?;

        if !raw.is_finite() || raw < 0.0 {
            return Err(CollectError::device(format!(
                "invalid sample counter value {}",
                raw
            )));
        }

        Ok(Self {
            counter: raw as u64,
            values: frame.into_boxed_slice(),
        })
    }

    /// A zero-valued sample used to pre-fill the rolling buffer
    pub fn zeroed(width: usize) -> Self {
        Self {
            counter: 0,
            values: vec![0.0; width].into_boxed_slice(),
        }
    }

    /// The sample counter
    pub fn counter(&self) -> u64 {
        self.counter
    }

    /// All channel readings, counter slot included
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of channels in the frame
    pub fn width(&self) -> usize {
        self.values.len()
    }

    /// Channel data with the counter slot stripped
    pub fn channel_data(&self, counter_channel: usize) -> Vec<f32> {
        self.values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != counter_channel)
            .map(|(_, v)| *v)
            .collect()
    }

    /// True for the zero-valued placeholder entries of a fresh rolling buffer
    pub fn is_zero_fill(&self) -> bool {
        self.counter == 0 && self.values.iter().all(|v| *v == 0.0)
    }
}

/// An event marked by the caller, correlated to the latest observed counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Sample counter observed when the event was marked
    pub counter: u64,
    /// Caller-supplied label
    pub label: String,
}

impl EventRecord {
    /// Create a new event record
    pub fn new(counter: u64, label: impl Into<String>) -> Self {
        Self {
            counter,
            label: label.into(),
        }
    }
}

/// The four concurrently running pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    /// Polls the source adapter
    Stream,
    /// Deduplicates and maintains the rolling buffer
    Process,
    /// Persists sample rows
    SampleLogger,
    /// Persists event rows
    EventLogger,
}

impl StageKind {
    /// All stages, in pipeline order
    pub const ALL: [StageKind; 4] = [
        StageKind::Stream,
        StageKind::Process,
        StageKind::SampleLogger,
        StageKind::EventLogger,
    ];

    /// Name given to the stage's worker thread
    pub fn thread_name(&self) -> &'static str {
        match self {
            StageKind::Stream => "samplestreamer",
            StageKind::Process => "dataprocessor",
            StageKind::SampleLogger => "datarecorder",
            StageKind::EventLogger => "eventrecorder",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.thread_name())
    }
}

/// Represents the connection status of the collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    /// Not connected to any device
    #[default]
    Disconnected,
    /// Connected and streaming
    Connected,
    /// The last connect or disconnect failed
    Error,
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "Disconnected"),
            ConnectionStatus::Connected => write!(f, "Connected"),
            ConnectionStatus::Error => write!(f, "Error"),
        }
    }
}

/// Statistics about the data collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Frames read from the source adapter
    pub frames_read: u64,
    /// Frames discarded because their counter repeated the previous one
    pub duplicates_discarded: u64,
    /// Distinct samples accepted into the rolling buffer
    pub samples_accepted: u64,
    /// Samples dropped by the sample queue's overflow policy
    pub samples_overflowed: u64,
    /// Sample rows persisted
    pub rows_logged: u64,
    /// Sample chunks flushed (including final partial flushes)
    pub sample_chunks_flushed: u64,
    /// Events accepted by `mark_event`
    pub events_marked: u64,
    /// Events rejected because the event queue was full
    pub events_rejected: u64,
    /// Events dequeued while no recording session was active
    pub events_discarded: u64,
    /// Event rows persisted
    pub events_logged: u64,
    /// Event chunks flushed (including final partial flushes)
    pub event_chunks_flushed: u64,
}

impl CollectionStats {
    /// Percentage of read frames that were duplicates
    pub fn duplicate_rate(&self) -> f64 {
        if self.frames_read == 0 {
            0.0
        } else {
            (self.duplicates_discarded as f64 / self.frames_read as f64) * 100.0
        }
    }
}

//! Dropped-sample check over a window of samples
//!
//! The device counter increments by one per sample, so gaps in the counters
//! of the retained window are samples that never reached the pipeline (or
//! were evicted by a full sample queue).

use crate::types::Sample;
use serde::{Deserialize, Serialize};

/// Summary of counter gaps in a sample window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropReport {
    /// Lowest counter seen
    pub first_counter: u64,
    /// Highest counter seen
    pub last_counter: u64,
    /// Counters the range should contain: last - first + 1
    pub expected: u64,
    /// Distinct counters actually present
    pub received: u64,
    /// `expected - received`
    pub dropped: u64,
}

impl DropReport {
    /// Build a report from a window, ignoring zero-filled placeholder entries
    ///
    /// Returns `None` when fewer than two real samples are present.
    pub fn from_samples(samples: &[Sample]) -> Option<Self> {
        Self::from_counters(
            samples
                .iter()
                .filter(|s| !s.is_zero_fill())
                .map(Sample::counter),
        )
    }

    /// Build a report from raw counters
    pub fn from_counters(counters: impl IntoIterator<Item = u64>) -> Option<Self> {
        let mut counters: Vec<u64> = counters.into_iter().collect();
        counters.sort_unstable();
        counters.dedup();
        if counters.len() < 2 {
            return None;
        }

        let first_counter = counters[0];
        let last_counter = counters[counters.len() - 1];
        let expected = last_counter - first_counter + 1;
        let received = counters.len() as u64;
        Some(Self {
            first_counter,
            last_counter,
            expected,
            received,
            dropped: expected - received,
        })
    }

    /// Dropped samples as a percentage of the expected count
    pub fn dropped_percent(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.expected as f64 * 100.0
    }

    /// Time covered by the window at the given sample rate
    pub fn span_secs(&self, sample_rate_hz: f64) -> f64 {
        self.expected as f64 / sample_rate_hz
    }
}

impl std::fmt::Display for DropReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "The recording had a total of {} dropped samples ({:.1}%).",
            self.dropped,
            self.dropped_percent()
        )
    }
}

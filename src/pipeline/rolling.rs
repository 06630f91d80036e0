//! Fixed-length history of recent samples

use crate::types::Sample;
use std::collections::VecDeque;

/// Fixed-capacity FIFO window of the most recent samples
///
/// Created full of zero-valued samples; every push evicts exactly the oldest
/// entry, so `len()` never changes.
#[derive(Debug, Clone)]
pub struct RollingBuffer {
    samples: VecDeque<Sample>,
}

impl RollingBuffer {
    /// Create a buffer of `capacity` zero-filled samples of `width` channels
    pub fn new(capacity: usize, width: usize) -> Self {
        let mut samples = VecDeque::with_capacity(capacity);
        samples.extend(std::iter::repeat_with(|| Sample::zeroed(width)).take(capacity));
        Self { samples }
    }

    /// Append a sample, returning the evicted oldest one
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        if self.samples.is_empty() {
            return None;
        }
        let evicted = self.samples.pop_front();
        self.samples.push_back(sample);
        evicted
    }

    /// Most recently pushed sample (a zero fill before the first push)
    pub fn newest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    /// Number of entries; constant for the buffer's lifetime
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Entries from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Owned copy of the entries, oldest first
    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().cloned().collect()
    }

    /// Consume the buffer into its entries, oldest first
    pub fn into_vec(self) -> Vec<Sample> {
        self.samples.into()
    }
}

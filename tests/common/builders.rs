//! Test data builders for creating test objects

use collect_rs::config::{AppConfig, OverflowPolicy};
use std::path::Path;

/// Sample rate used by test configs; keeps sample intervals at 1 ms
pub const TEST_RATE_HZ: f64 = 1000.0;

/// Builder for small, fast collector configs writing into a temp dir
///
/// Frames have two channels: a value and the counter in slot 1.
pub struct ConfigBuilder {
    config: AppConfig,
}

impl ConfigBuilder {
    pub fn new(output_dir: &Path) -> Self {
        let mut config = AppConfig::default();
        config.acquisition.sample_rate_hz = TEST_RATE_HZ;
        config.acquisition.rolling_span_secs = 0.1;
        config.acquisition.counter_channel = 1;
        config.acquisition.channel_labels = vec!["Value".to_string(), "Sample".to_string()];
        config.logging.output_dir = output_dir.to_path_buf();
        Self { config }
    }

    /// Rows per sample chunk
    pub fn chunk_rows(mut self, rows: usize) -> Self {
        self.config.logging.chunk_secs = rows as f64 / TEST_RATE_HZ;
        self
    }

    pub fn event_chunk_rows(mut self, rows: usize) -> Self {
        self.config.logging.event_chunk_rows = Some(rows);
        self
    }

    pub fn shutdown_timeout_ms(mut self, ms: u64) -> Self {
        self.config.shutdown_timeout_ms = Some(ms);
        self
    }

    pub fn sample_queue(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.config.queues.sample_capacity = Some(capacity);
        self.config.queues.sample_overflow = policy;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

/// Two-channel frame carrying `counter`; the value channel is `counter / 10`
pub fn frame(counter: u64) -> Vec<f32> {
    vec![counter as f32 / 10.0, counter as f32]
}

/// Frames for a sequence of counters
pub fn frames(counters: &[u64]) -> Vec<Vec<f32>> {
    counters.iter().copied().map(frame).collect()
}

/// Counters 1..=n
pub fn sequential(n: u64) -> Vec<u64> {
    (1..=n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let dir = std::env::temp_dir();
        let config = ConfigBuilder::new(&dir).chunk_rows(5).build();
        assert_eq!(config.chunk_rows(), 5);
        assert_eq!(config.rolling_capacity(), 100);
        assert!(config.validate().is_ok());
    }
}

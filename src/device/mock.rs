//! Mock Device Implementation
//!
//! This module provides a simulated acquisition device for running the
//! collector without hardware. It mimics a 16-channel EEG headset: eight EEG
//! channels, three accelerometer axes, three gyroscope axes, a battery level
//! and the sample counter in the last slot.
//!
//! # Timing
//!
//! The counter advances with wall-clock time since `start_acquisition`, at
//! the configured sample rate. A reader polling faster than that rate gets
//! the same frame (same counter, same values) back, which is what the
//! pipeline's deduplication exists to absorb.
//!
//! # Data Patterns
//!
//! Each channel follows a [`MockDataPattern`]. Values are a pure function of
//! the sample index, so duplicate reads are bit-identical.
//!
//! # Example
//!
//! ```ignore
//! use collect_rs::device::{DeviceDriver, MockDriver};
//!
//! let driver = MockDriver::new().with_sample_rate(250.0);
//! let mut device = driver.open("UN-MOCK.00.01")?;
//! device.start_acquisition()?;
//! let frame = device.read_frame()?;
//! ```

use crate::error::{CollectError, Result};
use std::time::Instant;

use super::{DeviceDriver, SourceAdapter};

/// Device id exposed by the default mock driver
pub const MOCK_DEVICE_ID: &str = "UN-MOCK.00.01";

/// Number of channels in a mock frame
pub const MOCK_CHANNEL_COUNT: usize = 16;

/// Pattern for generating mock channel data
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockDataPattern {
    /// Constant value
    Constant(f64),
    /// Sine wave with frequency and amplitude
    Sine {
        frequency: f64,
        amplitude: f64,
        offset: f64,
    },
    /// Uniform noise within range
    Noise { min: f64, max: f64 },
    /// Square wave
    Square { period: f64, amplitude: f64 },
}

impl Default for MockDataPattern {
    fn default() -> Self {
        MockDataPattern::Sine {
            frequency: 10.0,
            amplitude: 20.0,
            offset: 0.0,
        }
    }
}

impl MockDataPattern {
    /// Value of the pattern at `t` seconds; `seed` drives the noise pattern
    pub fn generate(&self, t: f64, seed: u64) -> f64 {
        match *self {
            MockDataPattern::Constant(v) => v,
            MockDataPattern::Sine {
                frequency,
                amplitude,
                offset,
            } => offset + amplitude * (2.0 * std::f64::consts::PI * frequency * t).sin(),
            MockDataPattern::Noise { min, max } => min + unit_noise(seed) * (max - min),
            MockDataPattern::Square { period, amplitude } => {
                if t % period < period / 2.0 {
                    amplitude
                } else {
                    -amplitude
                }
            }
        }
    }
}

/// Deterministic value in [0, 1) derived from `seed` (xorshift mix)
fn unit_noise(seed: u64) -> f64 {
    let mut s = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    s ^= s << 13;
    s ^= s >> 7;
    s ^= s << 17;
    (s >> 11) as f64 / (1u64 << 53) as f64
}

/// Default per-channel patterns, counter slot excluded
fn default_patterns() -> Vec<MockDataPattern> {
    let mut patterns = Vec::with_capacity(MOCK_CHANNEL_COUNT - 1);
    // EEG: alpha-band sines at slightly different frequencies
    for ch in 0..8 {
        patterns.push(MockDataPattern::Sine {
            frequency: 9.0 + ch as f64 * 0.5,
            amplitude: 20.0,
            offset: 0.0,
        });
    }
    // Accelerometer: gravity on Z
    patterns.push(MockDataPattern::Noise { min: -0.01, max: 0.01 });
    patterns.push(MockDataPattern::Noise { min: -0.01, max: 0.01 });
    patterns.push(MockDataPattern::Constant(1.0));
    // Gyroscope
    for _ in 0..3 {
        patterns.push(MockDataPattern::Noise { min: -0.5, max: 0.5 });
    }
    // Battery
    patterns.push(MockDataPattern::Constant(100.0));
    patterns
}

/// List the device ids the default mock driver exposes
pub fn list_mock_devices() -> Vec<String> {
    vec![MOCK_DEVICE_ID.to_string()]
}

/// Driver that opens [`MockDevice`]s
#[derive(Debug, Clone)]
pub struct MockDriver {
    devices: Vec<String>,
    sample_rate_hz: f64,
    fail_reads_after: Option<u64>,
    fail_start: bool,
    patterns: Vec<(usize, MockDataPattern)>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a driver exposing [`MOCK_DEVICE_ID`] at 250 Hz
    pub fn new() -> Self {
        Self {
            devices: list_mock_devices(),
            sample_rate_hz: 250.0,
            fail_reads_after: None,
            fail_start: false,
            patterns: Vec::new(),
        }
    }

    /// Replace the list of devices the driver reports and accepts
    pub fn with_devices(mut self, devices: Vec<String>) -> Self {
        self.devices = devices;
        self
    }

    /// Set the simulated device rate
    pub fn with_sample_rate(mut self, sample_rate_hz: f64) -> Self {
        self.sample_rate_hz = sample_rate_hz;
        self
    }

    /// Make opened devices fail every read after `reads` successful ones
    pub fn with_read_failure_after(mut self, reads: u64) -> Self {
        self.fail_reads_after = Some(reads);
        self
    }

    /// Make `start_acquisition` fail on opened devices
    pub fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Override one data channel's pattern on every opened device
    pub fn with_pattern(mut self, channel: usize, pattern: MockDataPattern) -> Self {
        self.patterns.push((channel, pattern));
        self
    }
}

impl DeviceDriver for MockDriver {
    fn available_devices(&self) -> Result<Vec<String>> {
        Ok(self.devices.clone())
    }

    fn open(&self, device_id: &str) -> Result<Box<dyn SourceAdapter>> {
        if !self.devices.iter().any(|d| d == device_id) {
            return Err(CollectError::device(format!(
                "Unable to connect to '{}'",
                device_id
            )));
        }

        let mut device = MockDevice::new(device_id, self.sample_rate_hz);
        device.fail_reads_after = self.fail_reads_after;
        device.fail_start = self.fail_start;
        for (channel, pattern) in &self.patterns {
            device.set_pattern(*channel, *pattern);
        }
        tracing::info!("Opened mock device '{}'", device_id);
        Ok(Box::new(device))
    }
}

/// A simulated acquisition device
#[derive(Debug)]
pub struct MockDevice {
    id: String,
    sample_rate_hz: f64,
    patterns: Vec<MockDataPattern>,
    started_at: Option<Instant>,
    reads: u64,
    fail_reads_after: Option<u64>,
    fail_start: bool,
    closed: bool,
}

impl MockDevice {
    /// Create a mock device with the default channel layout
    pub fn new(id: impl Into<String>, sample_rate_hz: f64) -> Self {
        Self {
            id: id.into(),
            sample_rate_hz,
            patterns: default_patterns(),
            started_at: None,
            reads: 0,
            fail_reads_after: None,
            fail_start: false,
            closed: false,
        }
    }

    /// Override the pattern of one data channel
    pub fn set_pattern(&mut self, channel: usize, pattern: MockDataPattern) {
        if let Some(slot) = self.patterns.get_mut(channel) {
            *slot = pattern;
        }
    }

    /// Whether acquisition is running
    pub fn is_acquiring(&self) -> bool {
        self.started_at.is_some()
    }

    /// Frame for a given zero-based sample index
    fn frame_at(&self, index: u64) -> Vec<f32> {
        let t = index as f64 / self.sample_rate_hz;
        let mut frame: Vec<f32> = self
            .patterns
            .iter()
            .enumerate()
            .map(|(ch, pattern)| pattern.generate(t, index * 64 + ch as u64) as f32)
            .collect();
        // Device counters start at 1
        frame.push((index + 1) as f32);
        frame
    }
}

impl SourceAdapter for MockDevice {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn channel_count(&self) -> usize {
        MOCK_CHANNEL_COUNT
    }

    fn start_acquisition(&mut self) -> Result<()> {
        if self.closed {
            return Err(CollectError::device("device is closed"));
        }
        if self.fail_start {
            return Err(CollectError::device("Error starting acquisition"));
        }
        self.started_at = Some(Instant::now());
        self.reads = 0;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<f32>> {
        let Some(started_at) = self.started_at else {
            return Err(CollectError::device("acquisition not started"));
        };

        if let Some(limit) = self.fail_reads_after {
            if self.reads >= limit {
                return Err(CollectError::device(format!(
                    "simulated read failure after {} frames",
                    limit
                )));
            }
        }
        self.reads += 1;

        let index = (started_at.elapsed().as_secs_f64() * self.sample_rate_hz).floor() as u64;
        Ok(self.frame_at(index))
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        self.started_at = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.started_at = None;
        self.closed = true;
        tracing::debug!("Closed mock device '{}'", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_unknown_device_fails() {
        let driver = MockDriver::new();
        let err = driver.open("UN-0000").err().unwrap();
        assert!(err.to_string().contains("Unable to connect"));
    }

    #[test]
    fn test_read_requires_start() {
        let mut device = MockDevice::new("dev", 250.0);
        assert!(device.read_frame().is_err());
        device.start_acquisition().unwrap();
        assert!(device.read_frame().is_ok());
    }

    #[test]
    fn test_frame_layout() {
        let device = MockDevice::new("dev", 250.0);
        let frame = device.frame_at(0);
        assert_eq!(frame.len(), MOCK_CHANNEL_COUNT);
        assert_eq!(frame[15], 1.0);
        assert_eq!(frame[14], 100.0);
        assert_eq!(device.frame_at(41)[15], 42.0);
    }

    #[test]
    fn test_acquiring_follows_start_and_stop() {
        let mut device = MockDevice::new("dev", 250.0);
        assert!(!device.is_acquiring());
        device.start_acquisition().unwrap();
        assert!(device.is_acquiring());
        device.stop_acquisition().unwrap();
        assert!(!device.is_acquiring());
        device.start_acquisition().unwrap();
        device.close().unwrap();
        assert!(!device.is_acquiring());
    }

    #[test]
    fn test_pattern_override() {
        let mut device = MockDevice::new("dev", 250.0);
        device.set_pattern(0, MockDataPattern::Constant(5.0));
        // Out of range channels are ignored, the counter slot included
        device.set_pattern(MOCK_CHANNEL_COUNT - 1, MockDataPattern::Constant(-1.0));
        device.set_pattern(99, MockDataPattern::Constant(-1.0));

        let frame = device.frame_at(7);
        assert_eq!(frame.len(), MOCK_CHANNEL_COUNT);
        assert_eq!(frame[0], 5.0);
        assert_eq!(frame[MOCK_CHANNEL_COUNT - 1], 8.0);
    }

    #[test]
    fn test_driver_applies_pattern_overrides() {
        let driver = MockDriver::new().with_pattern(2, MockDataPattern::Constant(-7.5));
        let mut device = driver.open(MOCK_DEVICE_ID).unwrap();
        device.start_acquisition().unwrap();
        let frame = device.read_frame().unwrap();
        assert_eq!(frame[2], -7.5);
        assert_eq!(frame.len(), MOCK_CHANNEL_COUNT);
    }

    #[test]
    fn test_fast_polling_repeats_frames() {
        let mut device = MockDevice::new("dev", 1.0);
        device.start_acquisition().unwrap();
        let a = device.read_frame().unwrap();
        let b = device.read_frame().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_read_failure_injection() {
        let driver = MockDriver::new().with_read_failure_after(2);
        let mut device = driver.open(MOCK_DEVICE_ID).unwrap();
        device.start_acquisition().unwrap();
        assert!(device.read_frame().is_ok());
        assert!(device.read_frame().is_ok());
        assert!(device.read_frame().unwrap_err().is_device_error());
    }

    #[test]
    fn test_start_failure_injection() {
        let driver = MockDriver::new().with_start_failure();
        let mut device = driver.open(MOCK_DEVICE_ID).unwrap();
        assert!(device.start_acquisition().is_err());
    }

    #[test]
    fn test_closed_device_cannot_restart() {
        let mut device = MockDevice::new("dev", 250.0);
        device.close().unwrap();
        assert!(device.start_acquisition().is_err());
    }

    #[test]
    fn test_patterns() {
        assert_eq!(MockDataPattern::Constant(3.0).generate(1.0, 0), 3.0);
        let square = MockDataPattern::Square {
            period: 1.0,
            amplitude: 2.0,
        };
        assert_eq!(square.generate(0.25, 0), 2.0);
        assert_eq!(square.generate(0.75, 0), -2.0);

        let noise = MockDataPattern::Noise { min: -1.0, max: 1.0 };
        for seed in 0..100 {
            let v = noise.generate(0.0, seed);
            assert!((-1.0..1.0).contains(&v));
            assert_eq!(v, noise.generate(5.0, seed));
        }
    }
}

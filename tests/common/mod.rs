//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use std::path::Path;
use std::time::{Duration, Instant};

/// Upper bound for waiting on pipeline progress
pub fn test_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Poll `condition` until it holds or `timeout` passes; returns whether it held
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Header lines of a sample file
pub const SAMPLE_HEADER_LINES: usize = 7;

/// Header lines of an event file
pub const EVENT_HEADER_LINES: usize = 4;

/// Lines of a file after its header block
pub fn data_lines(path: &Path, header_lines: usize) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("reading {:?}: {}", path, e))
        .lines()
        .skip(header_lines)
        .map(str::to_string)
        .collect()
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

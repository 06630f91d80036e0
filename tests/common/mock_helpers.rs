//! Mock construction helpers
//!
//! [`MockHardware`] is a mockall mock of the fallible device calls;
//! [`MockedAdapter`] wraps it as a [`SourceAdapter`] and [`HandOffDriver`]
//! hands a prepared adapter to the collector on `open`.

use collect_rs::device::{DeviceDriver, SourceAdapter};
use collect_rs::{CollectError, Result};
use mockall::automock;
use std::sync::Mutex;

/// The calls a test wants to script or assert on
#[automock]
pub trait Hardware: Send {
    fn start(&mut self) -> Result<()>;
    fn read(&mut self) -> Result<Vec<f32>>;
    fn stop(&mut self) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Source adapter delegating to a [`MockHardware`]
pub struct MockedAdapter {
    id: String,
    channels: usize,
    hardware: MockHardware,
}

impl MockedAdapter {
    pub fn new(id: &str, channels: usize, hardware: MockHardware) -> Self {
        Self {
            id: id.to_string(),
            channels,
            hardware,
        }
    }
}

impl SourceAdapter for MockedAdapter {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn channel_count(&self) -> usize {
        self.channels
    }

    fn start_acquisition(&mut self) -> Result<()> {
        self.hardware.start()
    }

    fn read_frame(&mut self) -> Result<Vec<f32>> {
        self.hardware.read()
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        self.hardware.stop()
    }

    fn close(&mut self) -> Result<()> {
        self.hardware.close()
    }
}

/// Driver that hands out one prepared adapter
pub struct HandOffDriver {
    id: String,
    device: Mutex<Option<Box<dyn SourceAdapter>>>,
}

impl HandOffDriver {
    pub fn new(adapter: MockedAdapter) -> Self {
        Self {
            id: adapter.id.clone(),
            device: Mutex::new(Some(Box::new(adapter))),
        }
    }
}

impl DeviceDriver for HandOffDriver {
    fn available_devices(&self) -> Result<Vec<String>> {
        Ok(vec![self.id.clone()])
    }

    fn open(&self, device_id: &str) -> Result<Box<dyn SourceAdapter>> {
        if device_id != self.id {
            return Err(CollectError::device(format!(
                "Unable to connect to '{}'",
                device_id
            )));
        }
        self.device
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| CollectError::device("device already opened"))
    }
}

/// Hardware that starts, stops and closes cleanly; reads are left to the test
pub fn well_behaved_hardware() -> MockHardware {
    let mut hardware = MockHardware::new();
    hardware.expect_start().returning(|| Ok(()));
    hardware.expect_stop().returning(|| Ok(()));
    hardware.expect_close().returning(|| Ok(()));
    hardware
}

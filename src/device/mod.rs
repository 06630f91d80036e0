//! Source adapter boundary
//!
//! The acquisition hardware and its driver live outside this crate. This
//! module defines the interface the pipeline consumes:
//!
//! - [`DeviceDriver`] - Enumerates devices and opens one by id
//! - [`SourceAdapter`] - An opened device: start/stop acquisition, read frames
//! - [`DeviceSelector`] - Picks a device when the caller did not name one
//!
//! Two in-tree implementations are provided for running without hardware:
//!
//! - [`mock::MockDriver`] - Simulated device with a time-driven sample counter
//! - [`scripted::ScriptedDriver`] - Replays a fixed list of frames
//!
//! # Frame Contract
//!
//! `read_frame` returns exactly `channel_count()` readings. The device is the
//! rate authority: reading faster than its native rate returns the latest
//! reading again, recognizable by its unchanged sample counter.

pub mod mock;
pub mod scripted;

use crate::error::{CollectError, Result};

pub use mock::{list_mock_devices, MockDataPattern, MockDevice, MockDriver};
pub use scripted::{ScriptProgress, ScriptedDevice, ScriptedDriver};

/// An opened acquisition device
///
/// Implementations must be `Send`: the adapter is moved into the stream
/// stage's thread for the lifetime of the connection.
pub trait SourceAdapter: Send {
    /// Identifier the device was opened with
    fn device_id(&self) -> &str;

    /// Number of readings in each frame
    fn channel_count(&self) -> usize;

    /// Begin acquisition
    fn start_acquisition(&mut self) -> Result<()>;

    /// Read one frame of `channel_count()` readings
    fn read_frame(&mut self) -> Result<Vec<f32>>;

    /// End acquisition
    fn stop_acquisition(&mut self) -> Result<()>;

    /// Release the device
    fn close(&mut self) -> Result<()>;
}

/// Enumerates and opens devices
pub trait DeviceDriver: Send + Sync {
    /// Ids of devices that can be opened
    fn available_devices(&self) -> Result<Vec<String>>;

    /// Open a device by id
    fn open(&self, device_id: &str) -> Result<Box<dyn SourceAdapter>>;
}

/// Chooses a device from the available list
pub trait DeviceSelector: Send + Sync {
    /// Return one of `available`
    fn select(&self, available: &[String]) -> Result<String>;
}

/// Selects the first available device
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstAvailable;

impl DeviceSelector for FirstAvailable {
    fn select(&self, available: &[String]) -> Result<String> {
        available
            .first()
            .cloned()
            .ok_or_else(|| CollectError::device("No device available"))
    }
}

/// Use `requested` if given, otherwise ask `selector` to pick from the driver's list
pub fn resolve_device_id(
    driver: &dyn DeviceDriver,
    requested: Option<&str>,
    selector: &dyn DeviceSelector,
) -> Result<String> {
    if let Some(id) = requested {
        return Ok(id.to_string());
    }

    let available = driver.available_devices()?;
    if available.is_empty() {
        return Err(CollectError::device(
            "No device available. Pair a device first.",
        ));
    }
    let selected = selector.select(&available)?;
    if !available.contains(&selected) {
        return Err(CollectError::device(format!(
            "Selected device '{}' is not available",
            selected
        )));
    }
    Ok(selected)
}

//! Scripted device that replays a fixed sequence of frames
//!
//! Once the script is exhausted the device behaves like a stalled source and
//! keeps returning the last frame, so every further read is a duplicate.
//! [`ScriptProgress`] lets a caller observe how far the replay has got.

use crate::error::{CollectError, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{DeviceDriver, SourceAdapter};

/// Shared view of how many scripted frames have been read
#[derive(Debug, Clone, Default)]
pub struct ScriptProgress {
    consumed: Arc<AtomicUsize>,
    total: usize,
}

impl ScriptProgress {
    /// Frames handed out so far (repeats of the last frame not counted)
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }

    /// Number of frames in the script
    pub fn total(&self) -> usize {
        self.total
    }

    /// True once every scripted frame has been read
    pub fn is_exhausted(&self) -> bool {
        self.consumed() >= self.total
    }
}

/// Driver that opens a single [`ScriptedDevice`]
#[derive(Debug, Clone)]
pub struct ScriptedDriver {
    id: String,
    frames: Arc<Vec<Vec<f32>>>,
    fail_at: Option<usize>,
    progress: ScriptProgress,
}

impl ScriptedDriver {
    /// Create a driver whose device replays `frames`
    pub fn new(id: impl Into<String>, frames: Vec<Vec<f32>>) -> Self {
        let total = frames.len();
        Self {
            id: id.into(),
            frames: Arc::new(frames),
            fail_at: None,
            progress: ScriptProgress {
                consumed: Arc::new(AtomicUsize::new(0)),
                total,
            },
        }
    }

    /// Fail the read that would return frame index `index`
    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Progress handle shared with every device this driver opens
    pub fn progress(&self) -> ScriptProgress {
        self.progress.clone()
    }
}

impl DeviceDriver for ScriptedDriver {
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
        if self.frames.is_empty() {
            return Err(CollectError::device("script has no frames"));
        }
        self.progress.consumed.store(0, Ordering::SeqCst);
        Ok(Box::new(ScriptedDevice {
            id: self.id.clone(),
            frames: Arc::clone(&self.frames),
            fail_at: self.fail_at,
            progress: self.progress.clone(),
            acquiring: false,
        }))
    }
}

/// Device replaying a fixed frame sequence
#[derive(Debug)]
pub struct ScriptedDevice {
    id: String,
    frames: Arc<Vec<Vec<f32>>>,
    fail_at: Option<usize>,
    progress: ScriptProgress,
    acquiring: bool,
}

impl SourceAdapter for ScriptedDevice {
    fn device_id(&self) -> &str {
        &self.id
    }

    fn channel_count(&self) -> usize {
        self.frames.first().map(Vec::len).unwrap_or(0)
    }

    fn start_acquisition(&mut self) -> Result<()> {
        self.acquiring = true;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Vec<f32>> {
        if !self.acquiring {
            return Err(CollectError::device("acquisition not started"));
        }

        let next = self.progress.consumed();
        if self.fail_at == Some(next) {
            return Err(CollectError::device(format!(
                "scripted read failure at frame {}",
                next
            )));
        }

        let last = self.frames.len() - 1;
        let frame = self.frames[next.min(last)].clone();
        if next <= last {
            self.progress.consumed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(frame)
    }

    fn stop_acquisition(&mut self) -> Result<()> {
        self.acquiring = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.acquiring = false;
        Ok(())
    }
}

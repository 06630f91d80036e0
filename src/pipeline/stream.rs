//! Stream stage: polls the source adapter
//!
//! One frame per iteration, then a sleep of one nominal sample interval.
//! The device decides the actual cadence; polling faster than it produces
//! new readings yields duplicates that the process stage drops.

use crate::device::SourceAdapter;
use crate::error::{CollectError, Result};
use crate::types::Sample;
use std::sync::Arc;
use std::time::Duration;

use super::queue::{PushOutcome, QueueSender};
use super::{bump, PipelineShared, StageExit};

/// Overflow drops are logged on the first occurrence and then every this many
const OVERFLOW_LOG_EVERY: u64 = 1000;

pub struct StreamStage {
    /// Taken by `run`; still present on drop only if the stage never ran
    device: Option<Box<dyn SourceAdapter>>,
    tx: QueueSender<Sample>,
    shared: Arc<PipelineShared>,
    channel_count: usize,
    counter_channel: usize,
    interval: Duration,
}

impl StreamStage {
    /// `device` must already be acquiring; every frame must hold `channel_count` readings
    pub fn new(
        device: Box<dyn SourceAdapter>,
        tx: QueueSender<Sample>,
        shared: Arc<PipelineShared>,
        channel_count: usize,
        counter_channel: usize,
        interval: Duration,
    ) -> Self {
        Self {
            device: Some(device),
            tx,
            shared,
            channel_count,
            counter_channel,
            interval,
        }
    }

    /// Run until shutdown or a device error; hands the device back
    ///
    /// Dropping the queue sender on return is the end-of-stream marker for
    /// the process stage.
    pub fn run(mut self) -> StageExit<Option<Box<dyn SourceAdapter>>> {
        let Some(mut device) = self.device.take() else {
            return StageExit::new(None, Err(CollectError::device("stream stage has no device")));
        };
        let result = self.poll_loop(device.as_mut());
        // Drops the queue sender
        drop(self);
        StageExit::new(Some(device), result)
    }

    fn poll_loop(&mut self, device: &mut dyn SourceAdapter) -> Result<()> {
        tracing::info!(
            "Streaming from '{}' every {:?}",
            device.device_id(),
            self.interval
        );
        let counters = &self.shared.counters;

        while !self.shared.shutdown.is_triggered() {
            let frame = device.read_frame()?;
            if frame.len() != self.channel_count {
                return Err(CollectError::device(format!(
                    "'{}' returned a frame of {} readings, expected {}",
                    device.device_id(),
                    frame.len(),
                    self.channel_count
                )));
            }
            bump(&counters.frames_read, 1);

            let sample = Sample::from_frame(frame, self.counter_channel)?;
            self.shared.latest.store(sample.counter());

            match self.tx.push(sample)? {
                PushOutcome::Queued => {}
                PushOutcome::Evicted | PushOutcome::Rejected => {
                    let dropped = bump(&counters.samples_overflowed, 1);
                    if dropped == 1 || dropped % OVERFLOW_LOG_EVERY == 0 {
                        tracing::warn!(
                            "Sample queue full, {} samples dropped so far",
                            dropped
                        );
                    }
                }
            }

            if self.shared.shutdown.wait_timeout(self.interval) {
                break;
            }
        }
        Ok(())
    }
}

impl Drop for StreamStage {
    fn drop(&mut self) {
        let Some(mut device) = self.device.take() else {
            return;
        };
        tracing::warn!(
            "Stream stage for '{}' dropped before running, releasing the device",
            device.device_id()
        );
        if let Err(e) = device.stop_acquisition() {
            tracing::warn!("Stopping '{}' failed: {}", device.device_id(), e);
        }
        if let Err(e) = device.close() {
            tracing::warn!("Closing '{}' failed: {}", device.device_id(), e);
        }
    }
}

impl std::fmt::Debug for StreamStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamStage")
            .field("device", &self.device.as_ref().map(|d| d.device_id()))
            .field("channel_count", &self.channel_count)
            .field("counter_channel", &self.counter_channel)
            .field("interval", &self.interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverflowPolicy;
    use crate::device::{DeviceDriver, ScriptedDriver};
    use crate::pipeline::channel;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Adapter that records whether it was stopped and closed
    struct Tracked {
        stopped: Arc<AtomicBool>,
        closed: Arc<AtomicBool>,
    }

    impl SourceAdapter for Tracked {
        fn device_id(&self) -> &str {
            "tracked"
        }

        fn channel_count(&self) -> usize {
            2
        }

        fn start_acquisition(&mut self) -> Result<()> {
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }

        fn stop_acquisition(&mut self) -> Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scripted(counters: &[u64]) -> Box<dyn SourceAdapter> {
        let frames = counters.iter().map(|c| vec![1.0, *c as f32]).collect();
        let mut device = ScriptedDriver::new("s", frames).open("s").unwrap();
        device.start_acquisition().unwrap();
        device
    }

    #[test]
    fn test_streams_until_shutdown() {
        let shared = Arc::new(PipelineShared::new());
        let (tx, rx) = channel(None, OverflowPolicy::Block);
        let stage = StreamStage::new(
            scripted(&[1, 2, 3]),
            tx,
            Arc::clone(&shared),
            2,
            1,
            Duration::from_millis(1),
        );

        let handle = std::thread::spawn(move || stage.run());
        let first: Vec<u64> = rx.iter().take(3).map(|s| s.counter()).collect();
        shared.shutdown.trigger();
        let exit = handle.join().unwrap();

        assert!(exit.result.is_ok());
        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(exit.output.as_ref().map(|d| d.device_id()), Some("s"));
        assert_eq!(shared.latest.load().map(|c| c >= 3), Some(true));
        // Sender dropped: the queue drains and then disconnects
        assert!(rx.iter().all(|s| s.counter() == 3));
    }

    #[test]
    fn test_read_failure_ends_stage() {
        let shared = Arc::new(PipelineShared::new());
        let frames = vec![vec![1.0, 1.0], vec![1.0, 2.0]];
        let mut device = ScriptedDriver::new("s", frames).fail_at(1).open("s").unwrap();
        device.start_acquisition().unwrap();

        let (tx, rx) = channel(None, OverflowPolicy::Block);
        let stage = StreamStage::new(device, tx, shared, 2, 1, Duration::ZERO);
        let exit = stage.run();

        assert!(exit.result.unwrap_err().is_device_error());
        assert_eq!(rx.iter().count(), 1);
    }

    #[test]
    fn test_overflow_is_counted() {
        let shared = Arc::new(PipelineShared::new());
        let (tx, rx) = channel(Some(2), OverflowPolicy::DropNewest);
        let stage = StreamStage::new(
            scripted(&[1, 2, 3, 4, 5]),
            tx,
            Arc::clone(&shared),
            2,
            1,
            Duration::ZERO,
        );

        let handle = std::thread::spawn(move || stage.run());
        while shared.counters.snapshot().samples_overflowed < 3 {
            std::thread::yield_now();
        }
        shared.shutdown.trigger();
        handle.join().unwrap().result.unwrap();

        let kept: Vec<u64> = rx.iter().map(|s| s.counter()).collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_ragged_frame_ends_stage() {
        let shared = Arc::new(PipelineShared::new());
        let frames = vec![vec![0.1, 1.0], vec![0.2, 9.9, 2.0, 7.0], vec![0.3, 3.0]];
        let mut device = ScriptedDriver::new("s", frames).open("s").unwrap();
        device.start_acquisition().unwrap();

        let (tx, rx) = channel(None, OverflowPolicy::Block);
        let stage = StreamStage::new(device, tx, Arc::clone(&shared), 2, 1, Duration::ZERO);
        let exit = stage.run();

        let err = exit.result.unwrap_err();
        assert!(err.is_device_error());
        assert!(err.to_string().contains("4 readings, expected 2"));
        // The wide frame never reaches the queue or the latest counter
        let queued: Vec<u64> = rx.iter().map(|s| s.counter()).collect();
        assert_eq!(queued, vec![1]);
        assert_eq!(shared.latest.load(), Some(1));
        assert_eq!(shared.counters.snapshot().frames_read, 1);
        assert!(exit.output.is_some());
    }

    #[test]
    fn test_unrun_stage_releases_device() {
        let stopped = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let device = Box::new(Tracked {
            stopped: Arc::clone(&stopped),
            closed: Arc::clone(&closed),
        });
        let (tx, _rx) = channel(None, OverflowPolicy::Block);
        let stage = StreamStage::new(
            device,
            tx,
            Arc::new(PipelineShared::new()),
            2,
            1,
            Duration::ZERO,
        );

        drop(stage);
        assert!(stopped.load(Ordering::SeqCst));
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn test_run_hands_device_back_unreleased() {
        let stopped = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let device = Box::new(Tracked {
            stopped: Arc::clone(&stopped),
            closed: Arc::clone(&closed),
        });
        let shared = Arc::new(PipelineShared::new());
        shared.shutdown.trigger();
        let (tx, _rx) = channel(None, OverflowPolicy::Block);
        let stage = StreamStage::new(device, tx, shared, 2, 1, Duration::ZERO);

        let exit = stage.run();
        assert!(exit.result.is_ok());
        assert!(exit.output.is_some());
        assert!(!stopped.load(Ordering::SeqCst));
        assert!(!closed.load(Ordering::SeqCst));
    }
}

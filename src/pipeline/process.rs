//! Process stage: deduplication and the rolling window
//!
//! Samples arrive in queue order. A sample whose counter equals the last
//! accepted one is the device returning the same reading twice and is
//! dropped. Accepted samples go into the [`RollingBuffer`] and, while a
//! recording session is active, onto the Log Queue with the counter slot
//! stripped.

use crate::error::Result;
use crate::session::RecordingState;
use crate::types::Sample;
use crossbeam_channel::Receiver;
use std::sync::Arc;

use super::queue::QueueSender;
use super::rolling::RollingBuffer;
use super::{bump, LogMessage, PipelineShared, StageExit};

#[derive(Debug)]
pub struct ProcessStage {
    rx: Receiver<Sample>,
    log_tx: QueueSender<LogMessage>,
    buffer: RollingBuffer,
    recording: Arc<RecordingState>,
    shared: Arc<PipelineShared>,
    counter_channel: usize,
    last_accepted: Option<u64>,
    open_session: Option<u64>,
}

impl ProcessStage {
    pub fn new(
        rx: Receiver<Sample>,
        log_tx: QueueSender<LogMessage>,
        buffer: RollingBuffer,
        recording: Arc<RecordingState>,
        shared: Arc<PipelineShared>,
        counter_channel: usize,
    ) -> Self {
        Self {
            rx,
            log_tx,
            buffer,
            recording,
            shared,
            counter_channel,
            last_accepted: None,
            open_session: None,
        }
    }

    /// Drain the sample queue until it disconnects; hands the rolling buffer back
    pub fn run(mut self) -> StageExit<RollingBuffer> {
        let result = self.drain();
        let ProcessStage { buffer, log_tx, .. } = self;
        // End of stream for the sample logger
        drop(log_tx);
        StageExit::new(buffer, result)
    }

    fn drain(&mut self) -> Result<()> {
        while let Ok(sample) = self.rx.recv() {
            self.accept(sample)?;
        }
        if self.open_session.take().is_some() {
            self.log_tx.send_blocking(LogMessage::Close)?;
        }
        Ok(())
    }

    /// Handle one sample; returns whether it was accepted
    pub fn accept(&mut self, sample: Sample) -> Result<bool> {
        let counter = sample.counter();
        if self.last_accepted == Some(counter) {
            bump(&self.shared.counters.duplicates_discarded, 1);
            return Ok(false);
        }
        self.last_accepted = Some(counter);
        bump(&self.shared.counters.samples_accepted, 1);

        self.sync_session()?;
        if self.open_session.is_some() {
            let row = sample.channel_data(self.counter_channel);
            self.log_tx.send_blocking(LogMessage::Row(row))?;
        }
        self.buffer.push(sample);
        Ok(true)
    }

    /// Emit session boundaries when the recording state has changed
    fn sync_session(&mut self) -> Result<()> {
        let current = self.recording.current_id();
        if current == self.open_session {
            return Ok(());
        }

        if self.open_session.take().is_some() {
            self.log_tx.send_blocking(LogMessage::Close)?;
        }
        // Re-read: the session may have changed again since the id check
        if let Some(session) = self.recording.current() {
            self.open_session = Some(session.id);
            self.log_tx.send_blocking(LogMessage::Open(session))?;
        }
        Ok(())
    }

    pub fn buffer(&self) -> &RollingBuffer {
        &self.buffer
    }
}

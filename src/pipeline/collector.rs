//! Lifecycle controller
//!
//! [`Collector`] owns the device driver, the recording state and, while
//! connected, the four stage threads. It is the only type callers need:
//!
//! ```ignore
//! use collect_rs::config::AppConfig;
//! use collect_rs::device::{FirstAvailable, MockDriver};
//! use collect_rs::pipeline::Collector;
//! use std::sync::Arc;
//!
//! let mut collector = Collector::new(
//!     AppConfig::default(),
//!     Arc::new(MockDriver::new()),
//!     Box::new(FirstAvailable),
//! );
//! collector.connect(None)?;
//! collector.start_recording("subject01")?;
//! collector.mark_event("11");
//! let stats = collector.disconnect()?;
//! ```

use crate::config::{AppConfig, OverflowPolicy};
use crate::device::{resolve_device_id, DeviceDriver, DeviceSelector, SourceAdapter};
use crate::error::{CollectError, Result, ResultExt};
use crate::session::{RecordingState, Session};
use crate::types::{CollectionStats, ConnectionStatus, EventRecord, Sample, StageKind};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::event_logger::EventLoggerStage;
use super::process::ProcessStage;
use super::queue::channel;
use super::rolling::RollingBuffer;
use super::sample_logger::{SampleFileLayout, SampleLoggerStage};
use super::stream::StreamStage;
use super::{spawn_stage, EventMarker, EventMessage, PipelineShared, StageExit};

/// Join handles of the running stages
#[derive(Default)]
struct StageHandles {
    stream: Option<JoinHandle<StageExit<Option<Box<dyn SourceAdapter>>>>>,
    process: Option<JoinHandle<StageExit<RollingBuffer>>>,
    sample_logger: Option<JoinHandle<StageExit<()>>>,
    event_logger: Option<JoinHandle<StageExit<()>>>,
}

/// Everything that exists only while connected
struct Connection {
    device_id: String,
    shared: Arc<PipelineShared>,
    marker: EventMarker,
    handles: StageHandles,
    done_rx: Receiver<StageKind>,
}

/// Outputs collected while tearing a connection down
#[derive(Default)]
struct Teardown {
    device: Option<Box<dyn SourceAdapter>>,
    buffer: Option<RollingBuffer>,
    errors: Vec<CollectError>,
}

impl Teardown {
    fn take_result<T>(&mut self, stage: StageKind, joined: std::thread::Result<StageExit<T>>) -> Option<T> {
        match joined {
            Ok(exit) => {
                if let Err(e) = exit.result {
                    self.errors.push(e.with_context(format!("stage '{}'", stage)));
                }
                Some(exit.output)
            }
            Err(_) => {
                self.errors.push(CollectError::StagePanicked(stage));
                None
            }
        }
    }
}

/// Acquisition engine: connect, record, mark events, disconnect
pub struct Collector {
    config: AppConfig,
    driver: Arc<dyn DeviceDriver>,
    selector: Box<dyn DeviceSelector>,
    recording: Arc<RecordingState>,
    status: ConnectionStatus,
    connection: Option<Connection>,
    last_stats: CollectionStats,
    recent: Vec<Sample>,
}

impl Collector {
    pub fn new(
        config: AppConfig,
        driver: Arc<dyn DeviceDriver>,
        selector: Box<dyn DeviceSelector>,
    ) -> Self {
        Self {
            config,
            driver,
            selector,
            recording: Arc::new(RecordingState::new()),
            status: ConnectionStatus::Disconnected,
            connection: None,
            last_stats: CollectionStats::default(),
            recent: Vec::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Open a device and start the pipeline
    ///
    /// `device_id` falls back to the configured device, then to the selector.
    pub fn connect(&mut self, device_id: Option<&str>) -> Result<()> {
        if let Some(conn) = &self.connection {
            return Err(CollectError::AlreadyConnected(conn.device_id.clone()));
        }

        match self.open_pipeline(device_id) {
            Ok(conn) => {
                tracing::info!("Connected to '{}'", conn.device_id);
                self.connection = Some(conn);
                self.status = ConnectionStatus::Connected;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Connect failed: {}", e);
                self.status = ConnectionStatus::Error;
                Err(e)
            }
        }
    }

    fn open_pipeline(&self, device_id: Option<&str>) -> Result<Connection> {
        self.config.validate()?;

        let requested = device_id.or(self.config.device.device_id.as_deref());
        let id = resolve_device_id(self.driver.as_ref(), requested, self.selector.as_ref())?;
        let mut device = self
            .driver
            .open(&id)
            .context("opening device")?;

        let acq = &self.config.acquisition;
        let channel_count = device.channel_count();
        if acq.counter_channel >= channel_count {
            if let Err(close_err) = device.close() {
                tracing::warn!("Closing '{}' after rejected config: {}", id, close_err);
            }
            return Err(CollectError::Config(format!(
                "counter channel {} is outside the {} channels of '{}'",
                acq.counter_channel, channel_count, id
            )));
        }
        if acq.channel_labels.len() != channel_count {
            tracing::warn!(
                "{} channel labels configured for {} channels",
                acq.channel_labels.len(),
                channel_count
            );
        }

        if let Err(e) = device.start_acquisition() {
            if let Err(close_err) = device.close() {
                tracing::warn!("Closing '{}' after failed start: {}", id, close_err);
            }
            return Err(e.with_context(format!("starting acquisition on '{}'", id)));
        }

        let shared = Arc::new(PipelineShared::new());
        let queues = &self.config.queues;
        let (sample_tx, sample_rx) = channel(queues.sample_capacity, queues.sample_overflow);
        let (log_tx, log_rx) = channel(queues.log_capacity, OverflowPolicy::Block);
        let (event_tx, event_rx) = channel(queues.event_capacity, OverflowPolicy::DropNewest);
        let (done_tx, done_rx) = crossbeam_channel::unbounded();

        let marker = EventMarker::new(Arc::clone(&shared), event_tx);
        let mut conn = Connection {
            device_id: id.clone(),
            shared: Arc::clone(&shared),
            marker,
            handles: StageHandles::default(),
            done_rx,
        };

        let layout = SampleFileLayout {
            device_id: id.clone(),
            sample_rate_hz: acq.sample_rate_hz,
            channel_count,
            labels: acq.channel_labels.clone(),
            chunk_rows: self.config.chunk_rows(),
        };
        let sample_logger =
            SampleLoggerStage::new(log_rx, Arc::clone(&shared), self.config.logging.clone(), layout);
        let event_logger = EventLoggerStage::new(
            event_rx,
            Arc::clone(&shared),
            self.config.logging.clone(),
            self.config.event_chunk_rows(),
            self.recording.current(),
        );
        let process = ProcessStage::new(
            sample_rx,
            log_tx,
            RollingBuffer::new(self.config.rolling_capacity(), channel_count),
            Arc::clone(&self.recording),
            Arc::clone(&shared),
            acq.counter_channel,
        );
        let stream = StreamStage::new(
            device,
            sample_tx,
            Arc::clone(&shared),
            channel_count,
            acq.counter_channel,
            self.config.sample_interval(),
        );

        // Downstream first, so every consumer exists before its producer.
        // A stream stage that never gets a thread releases the device on drop.
        let spawned = (|| -> Result<()> {
            conn.handles.sample_logger = Some(spawn_stage(
                StageKind::SampleLogger,
                &shared,
                &done_tx,
                move || sample_logger.run(),
            )?);
            conn.handles.event_logger = Some(spawn_stage(
                StageKind::EventLogger,
                &shared,
                &done_tx,
                move || event_logger.run(),
            )?);
            conn.handles.process = Some(spawn_stage(
                StageKind::Process,
                &shared,
                &done_tx,
                move || process.run(),
            )?);
            conn.handles.stream = Some(spawn_stage(
                StageKind::Stream,
                &shared,
                &done_tx,
                move || stream.run(),
            )?);
            Ok(())
        })();

        if let Err(e) = spawned {
            // Whatever did start drains and exits
            shared.shutdown.trigger();
            for stage_err in Self::teardown(conn, None).errors {
                tracing::warn!("Teardown after failed spawn: {}", stage_err);
            }
            return Err(e);
        }
        Ok(conn)
    }

    /// Start a recording session; may be called before `connect`
    ///
    /// A session that is already active is ended first.
    pub fn start_recording(&mut self, name: &str) -> Result<Arc<Session>> {
        let (session, previous) = self.recording.start(name, &self.config.logging)?;
        if let Some(previous) = previous {
            tracing::info!("Recording '{}' replaced by '{}'", previous.name, session.name);
        }
        tracing::info!("Recording started: '{}'", session.name);

        if let Some(conn) = &self.connection {
            if let Err(e) = conn
                .marker
                .send_control(EventMessage::SessionStarted(Arc::clone(&session)))
            {
                tracing::warn!("Event logger did not receive session start: {}", e);
            }
        }
        Ok(session)
    }

    /// End the active recording session; its files are flushed and closed
    pub fn stop_recording(&mut self) -> Option<Arc<Session>> {
        let session = self.recording.stop()?;
        tracing::info!("Recording stopped: '{}'", session.name);

        if let Some(conn) = &self.connection {
            if let Err(e) = conn.marker.send_control(EventMessage::SessionEnded(session.id)) {
                tracing::warn!("Event logger did not receive session end: {}", e);
            }
        }
        Some(session)
    }

    /// The active recording session
    pub fn current_session(&self) -> Option<Arc<Session>> {
        self.recording.current()
    }

    /// Mark an event against the latest sample counter
    ///
    /// Never blocks. Returns `None` when not connected, when no sample has
    /// been observed yet, when the label contains a comma or line break, or
    /// when the event queue is full.
    pub fn mark_event(&self, label: impl Into<String>) -> Option<EventRecord> {
        self.connection.as_ref()?.marker.mark(label)
    }

    /// Handle for marking events from other threads
    pub fn event_marker(&self) -> Option<EventMarker> {
        self.connection.as_ref().map(|conn| conn.marker.clone())
    }

    /// Stop the pipeline, flush all output and release the device
    ///
    /// Returns only after every stage has drained and flushed (or the
    /// configured shutdown budget ran out). The first stage fault, if any,
    /// is returned in place of the stats.
    pub fn disconnect(&mut self) -> Result<CollectionStats> {
        let conn = self.connection.take().ok_or(CollectError::NotConnected)?;
        let device_id = conn.device_id.clone();
        let shared = Arc::clone(&conn.shared);
        tracing::info!("Disconnecting from '{}'", device_id);

        shared.shutdown.trigger();
        let result = Self::teardown(conn, self.config.shutdown_timeout());

        self.last_stats = shared.counters.snapshot();
        if let Some(buffer) = result.buffer {
            self.recent = buffer.into_vec();
        }

        // A recorded fault is the root cause; later errors are usually fallout
        let first = shared
            .faults
            .first()
            .or_else(|| result.errors.into_iter().next());
        match first {
            Some(e) => {
                tracing::error!("Disconnected from '{}' with error: {}", device_id, e);
                self.status = ConnectionStatus::Error;
                Err(e)
            }
            None => {
                tracing::info!("Disconnected from '{}'", device_id);
                self.status = ConnectionStatus::Disconnected;
                Ok(self.last_stats.clone())
            }
        }
    }

    /// Join (or abandon) the stages, then stop and close the device
    fn teardown(mut conn: Connection, timeout: Option<Duration>) -> Teardown {
        let mut out = Teardown::default();
        // Releases the controller's end of the event queue
        drop(conn.marker);

        let started: Vec<StageKind> = StageKind::ALL
            .iter()
            .copied()
            .filter(|stage| conn.handles.is_running(*stage))
            .collect();

        let finished: HashSet<StageKind> = match timeout {
            None => started.iter().copied().collect(),
            Some(budget) => {
                let deadline = Instant::now() + budget;
                let mut done = HashSet::new();
                while done.len() < started.len() {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match conn.done_rx.recv_timeout(remaining) {
                        Ok(stage) => {
                            done.insert(stage);
                        }
                        Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                            break
                        }
                    }
                }
                done
            }
        };

        for stage in &started {
            if !finished.contains(stage) {
                tracing::error!("Stage '{}' did not stop in time, abandoning it", stage);
                out.errors.push(CollectError::ShutdownTimeout(*stage));
            }
        }

        let handles = std::mem::take(&mut conn.handles);
        if finished.contains(&StageKind::Stream) {
            if let Some(handle) = handles.stream {
                out.device = out.take_result(StageKind::Stream, handle.join()).flatten();
            }
        }
        if finished.contains(&StageKind::Process) {
            if let Some(handle) = handles.process {
                out.buffer = out.take_result(StageKind::Process, handle.join());
            }
        }
        if finished.contains(&StageKind::SampleLogger) {
            if let Some(handle) = handles.sample_logger {
                out.take_result(StageKind::SampleLogger, handle.join());
            }
        }
        if finished.contains(&StageKind::EventLogger) {
            if let Some(handle) = handles.event_logger {
                out.take_result(StageKind::EventLogger, handle.join());
            }
        }

        // Release the device only after all flushes
        if let Some(mut device) = out.device.take() {
            if let Err(e) = device.stop_acquisition() {
                out.errors.push(e.with_context("stopping acquisition"));
            }
            if let Err(e) = device.close() {
                out.errors.push(e.with_context("closing device"));
            }
        }
        out
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Id of the connected device
    pub fn device_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|conn| conn.device_id.as_str())
    }

    /// `Err` with the first stage fault while connected
    pub fn health(&self) -> Result<()> {
        match self.connection.as_ref().and_then(|conn| conn.shared.faults.first()) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Live counters while connected, the final ones after `disconnect`
    pub fn stats(&self) -> CollectionStats {
        match &self.connection {
            Some(conn) => conn.shared.counters.snapshot(),
            None => self.last_stats.clone(),
        }
    }

    /// Most recent sample counter observed by the stream stage
    pub fn latest_counter(&self) -> Option<u64> {
        self.connection.as_ref()?.shared.latest.load()
    }

    /// Rolling window retained from the last connection, oldest first
    ///
    /// Empty until the first `disconnect`.
    pub fn recent_samples(&self) -> &[Sample] {
        &self.recent
    }
}

impl StageHandles {
    fn is_running(&self, stage: StageKind) -> bool {
        match stage {
            StageKind::Stream => self.stream.is_some(),
            StageKind::Process => self.process.is_some(),
            StageKind::SampleLogger => self.sample_logger.is_some(),
            StageKind::EventLogger => self.event_logger.is_some(),
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        if self.connection.is_some() {
            if let Err(e) = self.disconnect() {
                tracing::error!("Disconnect on drop failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("status", &self.status)
            .field("device", &self.device_id())
            .field("recording", &self.recording.state())
            .finish()
    }
}

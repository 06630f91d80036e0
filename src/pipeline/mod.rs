//! Acquisition pipeline
//!
//! Four long-lived threads connected by hand-off queues:
//!
//! ```text
//!  SourceAdapter -> [stream] -> Sample Queue -> [process] -> Log Queue -> [sample logger]
//!                                                  |
//!                                                  +-> RollingBuffer
//!  mark_event() ---------------------------------------> Event Queue -> [event logger]
//! ```
//!
//! - [`stream::StreamStage`] - Polls the device, publishes the latest counter
//! - [`process::ProcessStage`] - Drops duplicate frames, keeps the rolling window
//! - [`sample_logger::SampleLoggerStage`] - Chunked, synced sample rows
//! - [`event_logger::EventLoggerStage`] - Chunked, synced event rows
//! - [`collector::Collector`] - Lifecycle controller owning all of the above
//!
//! # Shutdown
//!
//! A shared [`ShutdownSignal`] stops the stream and event logger stages.
//! The stream stage then drops its end of the sample queue, which the
//! process stage observes after draining every queued sample; it does the
//! same to the log queue in turn. Any stage that fails records the fault and
//! raises the signal, so the rest of the pipeline drains and flushes instead
//! of running on without it.

pub mod collector;
pub mod event_logger;
pub mod process;
pub mod queue;
pub mod rolling;
pub mod sample_logger;
pub mod stream;

pub use collector::Collector;
pub use queue::{channel, PushOutcome, QueueSender};
pub use rolling::RollingBuffer;

use crate::error::{CollectError, Result};
use crate::session::Session;
use crate::types::{CollectionStats, EventRecord, StageKind};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Broadcast stop request observed by every stage
///
/// Clones share state. Triggering is idempotent; waiting on
/// [`ShutdownSignal::receiver`] wakes as soon as the signal is raised.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    flag: Arc<AtomicBool>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Raise the signal
    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
        // Dropping the only sender disconnects every receiver clone
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Sleep for `timeout` or until the signal is raised; true if raised
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_triggered(),
        }
    }

    /// Channel that becomes disconnected when the signal is raised, for `select!`
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// Most recent sample counter seen by the stream stage
///
/// Single writer, any number of readers. Readers get the latest value
/// published, which may trail the device by a sample interval.
#[derive(Debug)]
pub struct LatestCounter(AtomicU64);

impl LatestCounter {
    const NONE: u64 = u64::MAX;

    pub fn new() -> Self {
        Self(AtomicU64::new(Self::NONE))
    }

    pub fn store(&self, counter: u64) {
        self.0.store(counter.min(Self::NONE - 1), Ordering::Release);
    }

    /// `None` until the first sample has been observed
    pub fn load(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            Self::NONE => None,
            c => Some(c),
        }
    }
}

impl Default for LatestCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Live pipeline counters, snapshotted as [`CollectionStats`]
#[derive(Debug, Default)]
pub struct PipelineCounters {
    pub frames_read: AtomicU64,
    pub duplicates_discarded: AtomicU64,
    pub samples_accepted: AtomicU64,
    pub samples_overflowed: AtomicU64,
    pub rows_logged: AtomicU64,
    pub sample_chunks_flushed: AtomicU64,
    pub events_marked: AtomicU64,
    pub events_rejected: AtomicU64,
    pub events_discarded: AtomicU64,
    pub events_logged: AtomicU64,
    pub event_chunks_flushed: AtomicU64,
}

/// Increment a counter by `n`, returning the new value
pub(crate) fn bump(counter: &AtomicU64, n: u64) -> u64 {
    counter.fetch_add(n, Ordering::Relaxed) + n
}

impl PipelineCounters {
    pub fn snapshot(&self) -> CollectionStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CollectionStats {
            frames_read: get(&self.frames_read),
            duplicates_discarded: get(&self.duplicates_discarded),
            samples_accepted: get(&self.samples_accepted),
            samples_overflowed: get(&self.samples_overflowed),
            rows_logged: get(&self.rows_logged),
            sample_chunks_flushed: get(&self.sample_chunks_flushed),
            events_marked: get(&self.events_marked),
            events_rejected: get(&self.events_rejected),
            events_discarded: get(&self.events_discarded),
            events_logged: get(&self.events_logged),
            event_chunks_flushed: get(&self.event_chunks_flushed),
        }
    }
}

/// The first fault raised by any stage
#[derive(Debug, Default)]
pub struct FaultSlot {
    first: Mutex<Option<(StageKind, String)>>,
}

impl FaultSlot {
    /// Record a fault; returns false if an earlier fault is already recorded
    pub fn record(&self, stage: StageKind, error: &CollectError) -> bool {
        let mut first = self.first.lock().unwrap_or_else(PoisonError::into_inner);
        if first.is_some() {
            return false;
        }
        *first = Some((stage, error.to_string()));
        true
    }

    /// The first recorded fault as a stage error
    pub fn first(&self) -> Option<CollectError> {
        self.first
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(stage, message)| CollectError::Stage {
                stage: *stage,
                message: message.clone(),
            })
    }
}

/// State shared by every stage of one connection
#[derive(Debug, Default)]
pub struct PipelineShared {
    pub shutdown: ShutdownSignal,
    pub latest: LatestCounter,
    pub counters: PipelineCounters,
    pub faults: FaultSlot,
}

impl PipelineShared {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a stage error, record it and stop the pipeline
    pub fn fail(&self, stage: StageKind, error: &CollectError) {
        tracing::error!("Stage '{}' failed: {}", stage, error);
        self.faults.record(stage, error);
        self.shutdown.trigger();
    }
}

/// Items on the Log Queue
///
/// Session boundaries travel in-band so rows always land in the file of the
/// session that was active when they were accepted.
#[derive(Debug, Clone)]
pub enum LogMessage {
    /// Subsequent rows belong to this session
    Open(Arc<Session>),
    /// One accepted sample, counter slot stripped
    Row(Vec<f32>),
    /// The current session ended
    Close,
}

/// Items on the Event Queue
#[derive(Debug, Clone)]
pub enum EventMessage {
    /// A marked event
    Mark(EventRecord),
    /// A session was started; it replaces any active one
    SessionStarted(Arc<Session>),
    /// The session with this id was stopped
    SessionEnded(u64),
}

/// Characters that would split an event row into extra fields or rows
const LABEL_SEPARATORS: [char; 3] = [',', '\r', '\n'];

/// Cloneable handle for marking events from any thread
#[derive(Debug, Clone)]
pub struct EventMarker {
    shared: Arc<PipelineShared>,
    tx: QueueSender<EventMessage>,
}

impl EventMarker {
    pub(crate) fn new(shared: Arc<PipelineShared>, tx: QueueSender<EventMessage>) -> Self {
        Self { shared, tx }
    }

    /// Queue `label` against the latest sample counter without blocking
    ///
    /// Returns `None` when no sample has been observed yet, when the label
    /// would not fit in a single `counter,label` row, when the event queue
    /// is full, or when the event logger has stopped.
    pub fn mark(&self, label: impl Into<String>) -> Option<EventRecord> {
        let counter = self.shared.latest.load()?;
        let record = EventRecord::new(counter, label);

        if record.label.contains(LABEL_SEPARATORS) {
            let rejected = bump(&self.shared.counters.events_rejected, 1);
            tracing::warn!(
                "Rejected event label {:?}: it may not contain a comma or line break ({} rejected so far)",
                record.label,
                rejected
            );
            return None;
        }

        match self.tx.try_push(EventMessage::Mark(record.clone())) {
            Ok(PushOutcome::Queued) | Ok(PushOutcome::Evicted) => {
                bump(&self.shared.counters.events_marked, 1);
                Some(record)
            }
            Ok(PushOutcome::Rejected) => {
                let rejected = bump(&self.shared.counters.events_rejected, 1);
                tracing::warn!(
                    "Event queue full, rejected event '{}' ({} rejected so far)",
                    record.label,
                    rejected
                );
                None
            }
            Err(e) => {
                tracing::debug!("Event '{}' not queued: {}", record.label, e);
                None
            }
        }
    }

    /// Blocking push for session control messages
    pub(crate) fn send_control(&self, message: EventMessage) -> Result<()> {
        self.tx.send_blocking(message)
    }
}

/// What a stage thread hands back when it exits
#[derive(Debug)]
pub struct StageExit<T> {
    pub output: T,
    pub result: Result<()>,
}

impl<T> StageExit<T> {
    pub fn new(output: T, result: Result<()>) -> Self {
        Self { output, result }
    }
}

/// Notifies the controller when a stage thread ends, panics included
struct DoneGuard {
    stage: StageKind,
    shared: Arc<PipelineShared>,
    done: Sender<StageKind>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.shared
                .fail(self.stage, &CollectError::StagePanicked(self.stage));
        }
        let _ = self.done.send(self.stage);
    }
}

/// Spawn a named stage thread
///
/// An error returned by `body` is logged, recorded as a fault and raises the
/// shutdown signal before the thread exits.
pub(crate) fn spawn_stage<T, F>(
    stage: StageKind,
    shared: &Arc<PipelineShared>,
    done: &Sender<StageKind>,
    body: F,
) -> Result<JoinHandle<StageExit<T>>>
where
    T: Send + 'static,
    F: FnOnce() -> StageExit<T> + Send + 'static,
{
    let guard = DoneGuard {
        stage,
        shared: Arc::clone(shared),
        done: done.clone(),
    };
    std::thread::Builder::new()
        .name(stage.thread_name().to_string())
        .spawn(move || {
            let guard = guard;
            tracing::debug!("Stage '{}' started", stage);
            let exit = body();
            if let Err(e) = &exit.result {
                guard.shared.fail(stage, e);
            }
            tracing::debug!("Stage '{}' stopped", stage);
            exit
        })
        .map_err(|e| CollectError::Io(e).with_context(format!("spawning stage '{}'", stage)))
}

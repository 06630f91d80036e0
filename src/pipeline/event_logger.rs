//! Event logger stage
//!
//! Consumes the Event Queue, which any caller thread feeds through
//! [`EventMarker`](super::EventMarker). Unlike the sample path this stage is
//! not stopped by queue disconnection (markers may outlive the connection);
//! it selects on the shutdown signal, drains whatever is already queued and
//! then flushes its final partial chunk.

use crate::config::LoggingConfig;
use crate::error::{Result, ResultExt};
use crate::session::Session;
use crate::storage::{ChunkWriter, EventHeader, FileSink};
use crate::types::EventRecord;
use crossbeam_channel::{select, Receiver};
use std::sync::Arc;

use super::{bump, EventMessage, PipelineShared, StageExit};

pub struct EventLoggerStage {
    rx: Receiver<EventMessage>,
    shared: Arc<PipelineShared>,
    logging: LoggingConfig,
    chunk_rows: usize,
    session: Option<Arc<Session>>,
    writer: Option<ChunkWriter<FileSink>>,
}

impl EventLoggerStage {
    /// `session` is the session active when the stage is created
    pub fn new(
        rx: Receiver<EventMessage>,
        shared: Arc<PipelineShared>,
        logging: LoggingConfig,
        chunk_rows: usize,
        session: Option<Arc<Session>>,
    ) -> Self {
        Self {
            rx,
            shared,
            logging,
            chunk_rows,
            session,
            writer: None,
        }
    }

    pub fn run(mut self) -> StageExit<()> {
        let result = self.consume();
        let closed = self.end_session();
        StageExit::new((), result.and(closed))
    }

    fn consume(&mut self) -> Result<()> {
        let shutdown = self.shared.shutdown.clone();
        let rx = self.rx.clone();
        loop {
            select! {
                recv(rx) -> message => match message {
                    Ok(message) => self.handle(message)?,
                    Err(_) => break,
                },
                recv(shutdown.receiver()) -> _ => break,
            }
        }
        // Whatever was queued before shutdown still gets written
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message)?;
        }
        Ok(())
    }

    fn handle(&mut self, message: EventMessage) -> Result<()> {
        match message {
            EventMessage::Mark(record) => self.write_event(&record),
            EventMessage::SessionStarted(session) => {
                if self.session.as_ref().map(|s| s.id) != Some(session.id) {
                    self.end_session()?;
                    tracing::info!("Event logging armed for session '{}'", session.name);
                    self.session = Some(session);
                }
                Ok(())
            }
            EventMessage::SessionEnded(id) => {
                if self.session.as_ref().map(|s| s.id) == Some(id) {
                    self.end_session()?;
                }
                Ok(())
            }
        }
    }

    fn write_event(&mut self, record: &EventRecord) -> Result<()> {
        let Some(session) = self.session.as_ref() else {
            let discarded = bump(&self.shared.counters.events_discarded, 1);
            tracing::debug!(
                "Discarding event '{}' outside a session ({} discarded)",
                record.label,
                discarded
            );
            return Ok(());
        };

        if self.writer.is_none() {
            self.writer = Some(open_file(session, &self.logging, self.chunk_rows)?);
        }
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };

        if let Some(flushed) = writer.push(record)? {
            self.record_flush(flushed);
        }
        Ok(())
    }

    fn record_flush(&self, rows: usize) {
        let counters = &self.shared.counters;
        let total = bump(&counters.events_logged, rows as u64);
        bump(&counters.event_chunks_flushed, 1);
        tracing::debug!("Flushed {} event rows ({} total)", rows, total);
    }

    /// Final partial flush and close of the active session's file
    fn end_session(&mut self) -> Result<()> {
        let session = self.session.take();
        let Some(writer) = self.writer.take() else {
            return Ok(());
        };
        let (_, flushed) = writer.finish()?;
        if flushed > 0 {
            self.record_flush(flushed);
        }
        if let Some(session) = session {
            tracing::info!("Closed event file {:?}", session.event_path);
        }
        Ok(())
    }
}

fn open_file(
    session: &Session,
    logging: &LoggingConfig,
    chunk_rows: usize,
) -> Result<ChunkWriter<FileSink>> {
    let sink = FileSink::create(&session.event_path)?;
    let mut writer = ChunkWriter::new(sink, chunk_rows);
    writer
        .write_header(&EventHeader::new(session, logging).render())
        .with_context(|| format!("writing event header of '{}'", session.name))?;
    tracing::info!("Created event file {:?}", session.event_path);
    Ok(writer)
}

impl std::fmt::Debug for EventLoggerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoggerStage")
            .field("chunk_rows", &self.chunk_rows)
            .field("session", &self.session.as_ref().map(|s| s.name.as_str()))
            .field("file_open", &self.writer.is_some())
            .finish()
    }
}

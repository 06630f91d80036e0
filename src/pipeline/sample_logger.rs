//! Sample logger stage
//!
//! Consumes the Log Queue. The file of a session is created, and its header
//! written and synced, on the first row of that session; a session that sees
//! no rows leaves no file behind. Rows are flushed in chunks with a
//! durability barrier after each, and the partial chunk is flushed when the
//! session closes or the queue disconnects.

use crate::config::LoggingConfig;
use crate::error::{Result, ResultExt};
use crate::session::Session;
use crate::storage::{ChunkWriter, FileSink, SampleHeader};
use crossbeam_channel::Receiver;
use std::sync::Arc;

use super::{bump, LogMessage, PipelineShared, StageExit};

/// Device and layout details written to the sample header
#[derive(Debug, Clone)]
pub struct SampleFileLayout {
    pub device_id: String,
    pub sample_rate_hz: f64,
    pub channel_count: usize,
    pub labels: Vec<String>,
    pub chunk_rows: usize,
}

struct OpenFile {
    session: Arc<Session>,
    writer: Option<ChunkWriter<FileSink>>,
}

pub struct SampleLoggerStage {
    rx: Receiver<LogMessage>,
    shared: Arc<PipelineShared>,
    logging: LoggingConfig,
    layout: SampleFileLayout,
    current: Option<OpenFile>,
}

impl SampleLoggerStage {
    pub fn new(
        rx: Receiver<LogMessage>,
        shared: Arc<PipelineShared>,
        logging: LoggingConfig,
        layout: SampleFileLayout,
    ) -> Self {
        Self {
            rx,
            shared,
            logging,
            layout,
            current: None,
        }
    }

    /// Drain the Log Queue until it disconnects
    pub fn run(mut self) -> StageExit<()> {
        let mut result = Ok(());
        while let Ok(message) = self.rx.recv() {
            if let Err(e) = self.handle(message) {
                result = Err(e);
                break;
            }
        }
        // Keep what was accepted even when the loop stopped on an error
        let closed = self.close_session();
        StageExit::new((), result.and(closed))
    }

    fn handle(&mut self, message: LogMessage) -> Result<()> {
        match message {
            LogMessage::Open(session) => {
                self.close_session()?;
                tracing::info!("Sample logging armed for session '{}'", session.name);
                self.current = Some(OpenFile {
                    session,
                    writer: None,
                });
            }
            LogMessage::Row(row) => self.write_row(&row)?,
            LogMessage::Close => self.close_session()?,
        }
        Ok(())
    }

    fn write_row(&mut self, row: &[f32]) -> Result<()> {
        let Some(open) = self.current.as_mut() else {
            tracing::warn!("Dropping sample row received outside a session");
            return Ok(());
        };

        if open.writer.is_none() {
            open.writer = Some(open_file(&open.session, &self.logging, &self.layout)?);
        }
        let Some(writer) = open.writer.as_mut() else {
            return Ok(());
        };

        if let Some(flushed) = writer.push(row)? {
            self.record_flush(flushed);
        }
        Ok(())
    }

    fn record_flush(&self, rows: usize) {
        let counters = &self.shared.counters;
        let total = bump(&counters.rows_logged, rows as u64);
        bump(&counters.sample_chunks_flushed, 1);
        tracing::debug!("Flushed {} sample rows ({} total)", rows, total);
    }

    /// Final partial flush of the active session's file
    fn close_session(&mut self) -> Result<()> {
        let Some(open) = self.current.take() else {
            return Ok(());
        };
        let Some(writer) = open.writer else {
            return Ok(());
        };
        let (_, flushed) = writer.finish()?;
        if flushed > 0 {
            self.record_flush(flushed);
        }
        tracing::info!("Closed sample file {:?}", open.session.sample_path);
        Ok(())
    }
}

/// Create the session's sample file and make its header durable
fn open_file(
    session: &Session,
    logging: &LoggingConfig,
    layout: &SampleFileLayout,
) -> Result<ChunkWriter<FileSink>> {
    let sink = FileSink::create(&session.sample_path)?;
    let mut writer = ChunkWriter::new(sink, layout.chunk_rows);
    let header = SampleHeader::new(
        session,
        logging,
        &layout.device_id,
        layout.sample_rate_hz,
        layout.channel_count,
        &layout.labels,
    );
    writer
        .write_header(&header.render())
        .with_context(|| format!("writing header of '{}'", session.name))?;
    tracing::info!("Created sample file {:?}", session.sample_path);
    Ok(writer)
}

impl std::fmt::Debug for SampleLoggerStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleLoggerStage")
            .field("layout", &self.layout)
            .field(
                "session",
                &self.current.as_ref().map(|open| open.session.name.as_str()),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(chunk_rows: usize) -> SampleFileLayout {
        SampleFileLayout {
            device_id: "UN-TEST".to_string(),
            sample_rate_hz: 250.0,
            channel_count: 3,
            labels: vec!["A".into(), "B".into(), "Sample".into()],
            chunk_rows,
        }
    }

    fn logging(dir: &std::path::Path) -> LoggingConfig {
        LoggingConfig {
            output_dir: dir.to_path_buf(),
            ..LoggingConfig::default()
        }
    }

    fn data_lines(text: &str) -> Vec<String> {
        text.lines().skip(7).map(str::to_string).collect()
    }

    #[test]
    fn test_partial_chunk_flushed_on_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let logging = logging(dir.path());
        let session = Arc::new(Session::new(1, "partial", &logging));
        let shared = Arc::new(PipelineShared::new());
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage = SampleLoggerStage::new(rx, Arc::clone(&shared), logging, layout(5));

        tx.send(LogMessage::Open(Arc::clone(&session))).unwrap();
        tx.send(LogMessage::Row(vec![1.0, 2.0])).unwrap();
        tx.send(LogMessage::Row(vec![3.0, 4.0])).unwrap();
        drop(tx);
        stage.run().result.unwrap();

        let text = std::fs::read_to_string(&session.sample_path).unwrap();
        assert_eq!(data_lines(&text), vec!["1.000,2.000", "3.000,4.000"]);
        let stats = shared.counters.snapshot();
        assert_eq!(stats.rows_logged, 2);
        assert_eq!(stats.sample_chunks_flushed, 1);
    }

    #[test]
    fn test_header_written_once_before_rows() {
        let dir = tempfile::tempdir().unwrap();
        let logging = logging(dir.path());
        let session = Arc::new(Session::new(1, "hdr", &logging));
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage = SampleLoggerStage::new(
            rx,
            Arc::new(PipelineShared::new()),
            logging,
            layout(2),
        );

        tx.send(LogMessage::Open(Arc::clone(&session))).unwrap();
        for i in 0..5 {
            tx.send(LogMessage::Row(vec![i as f32, 0.0])).unwrap();
        }
        tx.send(LogMessage::Close).unwrap();
        drop(tx);
        stage.run().result.unwrap();

        let text = std::fs::read_to_string(&session.sample_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.iter().filter(|l| l.starts_with("collect")).count(), 1);
        assert_eq!(lines[0], "collect.....= UnicornPy_2020.01.09.2");
        assert_eq!(lines[1], "device......= UN-TEST");
        assert_eq!(lines[3], "channels....= 2");
        assert_eq!(lines[6], "A, B, Sample");
        assert_eq!(data_lines(&text).len(), 5);
    }

    #[test]
    fn test_session_without_rows_creates_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let logging = logging(dir.path());
        let session = Arc::new(Session::new(1, "empty", &logging));
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage =
            SampleLoggerStage::new(rx, Arc::new(PipelineShared::new()), logging, layout(5));

        tx.send(LogMessage::Open(Arc::clone(&session))).unwrap();
        tx.send(LogMessage::Close).unwrap();
        drop(tx);
        stage.run().result.unwrap();
        assert!(!session.sample_path.exists());
    }

    #[test]
    fn test_rows_follow_their_session() {
        let dir = tempfile::tempdir().unwrap();
        let logging = logging(dir.path());
        let a = Arc::new(Session::new(1, "a", &logging));
        let b = Arc::new(Session::new(2, "b", &logging));
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage =
            SampleLoggerStage::new(rx, Arc::new(PipelineShared::new()), logging, layout(10));

        tx.send(LogMessage::Open(Arc::clone(&a))).unwrap();
        tx.send(LogMessage::Row(vec![1.0, 1.0])).unwrap();
        tx.send(LogMessage::Open(Arc::clone(&b))).unwrap();
        tx.send(LogMessage::Row(vec![2.0, 2.0])).unwrap();
        tx.send(LogMessage::Row(vec![3.0, 3.0])).unwrap();
        drop(tx);
        stage.run().result.unwrap();

        let text_a = std::fs::read_to_string(&a.sample_path).unwrap();
        let text_b = std::fs::read_to_string(&b.sample_path).unwrap();
        assert_eq!(data_lines(&text_a), vec!["1.000,1.000"]);
        assert_eq!(data_lines(&text_b), vec!["2.000,2.000", "3.000,3.000"]);
    }

    #[test]
    fn test_unwritable_destination_is_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the output directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "").unwrap();
        let logging = logging(&blocker);
        let session = Arc::new(Session::new(1, "x", &logging));
        let (tx, rx) = crossbeam_channel::unbounded();
        let stage =
            SampleLoggerStage::new(rx, Arc::new(PipelineShared::new()), logging, layout(5));

        tx.send(LogMessage::Open(session)).unwrap();
        tx.send(LogMessage::Row(vec![1.0, 1.0])).unwrap();
        drop(tx);
        assert!(stage.run().result.is_err());
    }
}

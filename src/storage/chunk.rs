//! Chunked writer with a durability barrier per chunk
//!
//! Rows are rendered into a pending buffer. When the buffer holds
//! `threshold` rows it is written to the sink in one call and followed by
//! [`LogSink::sync`]. [`ChunkWriter::finish`] writes whatever is left, so a
//! partially filled chunk is never lost on shutdown.

use crate::error::Result;
use crate::types::EventRecord;
use std::fmt::Write as _;

use super::sink::LogSink;

/// A value that renders as one line of a log file
pub trait LogRow {
    /// Append the row, without its trailing newline, to `out`
    fn render_into(&self, out: &mut String);
}

/// Sample rows: channel values with three decimals, comma-separated
impl LogRow for [f32] {
    fn render_into(&self, out: &mut String) {
        for (i, value) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let _ = write!(out, "{:.3}", value);
        }
    }
}

impl LogRow for Vec<f32> {
    fn render_into(&self, out: &mut String) {
        self.as_slice().render_into(out);
    }
}

/// Event rows: `counter,label`
impl LogRow for EventRecord {
    fn render_into(&self, out: &mut String) {
        let _ = write!(out, "{},{}", self.counter, self.label);
    }
}

/// Accumulates rows and flushes them to a [`LogSink`] in chunks
#[derive(Debug)]
pub struct ChunkWriter<S: LogSink> {
    sink: S,
    threshold: usize,
    pending: String,
    pending_rows: usize,
    rows_written: u64,
    chunks_flushed: u64,
}

impl<S: LogSink> ChunkWriter<S> {
    /// Create a writer flushing every `threshold` rows (at least one)
    pub fn new(sink: S, threshold: usize) -> Self {
        Self {
            sink,
            threshold: threshold.max(1),
            pending: String::new(),
            pending_rows: 0,
            rows_written: 0,
            chunks_flushed: 0,
        }
    }

    /// Write a header block and make it durable before any row
    pub fn write_header(&mut self, header: &str) -> Result<()> {
        self.sink.write_all(header.as_bytes())?;
        self.sink.sync()
    }

    /// Append a row; returns the number of rows flushed if this filled a chunk
    pub fn push<R: LogRow + ?Sized>(&mut self, row: &R) -> Result<Option<usize>> {
        row.render_into(&mut self.pending);
        self.pending.push('\n');
        self.pending_rows += 1;

        if self.pending_rows >= self.threshold {
            return self.flush().map(Some);
        }
        Ok(None)
    }

    /// Write all pending rows in one call and sync; returns how many were written
    pub fn flush(&mut self) -> Result<usize> {
        if self.pending_rows == 0 {
            return Ok(0);
        }
        self.sink.write_all(self.pending.as_bytes())?;
        self.sink.sync()?;

        let flushed = self.pending_rows;
        self.pending.clear();
        self.pending_rows = 0;
        self.rows_written += flushed as u64;
        self.chunks_flushed += 1;
        Ok(flushed)
    }

    /// Flush the final partial chunk and hand back the sink
    pub fn finish(mut self) -> Result<(S, usize)> {
        let flushed = self.flush()?;
        Ok((self.sink, flushed))
    }

    /// Rows waiting for the next flush
    pub fn pending_rows(&self) -> usize {
        self.pending_rows
    }

    /// Rows made durable so far
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    pub fn chunks_flushed(&self) -> u64 {
        self.chunks_flushed
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sink::MemorySink;

    #[test]
    fn test_sample_row_format() {
        let mut out = String::new();
        vec![1.0f32, -2.5, 0.12345].render_into(&mut out);
        assert_eq!(out, "1.000,-2.500,0.123");
    }

    #[test]
    fn test_event_row_format() {
        let mut out = String::new();
        EventRecord::new(1234, "17").render_into(&mut out);
        assert_eq!(out, "1234,17");
    }

    #[test]
    fn test_chunk_of_three_with_seven_rows() {
        let sink = MemorySink::new();
        let mut writer = ChunkWriter::new(sink.clone(), 3);

        let mut flushes = Vec::new();
        for i in 0..7 {
            if let Some(n) = writer.push(&vec![i as f32]).unwrap() {
                flushes.push(n);
            }
        }
        assert_eq!(writer.pending_rows(), 1);
        let (_, last) = writer.finish().unwrap();
        flushes.push(last);

        assert_eq!(flushes, vec![3, 3, 1]);
        let batches: Vec<usize> = sink.batches().iter().map(|b| b.lines().count()).collect();
        assert_eq!(batches, vec![3, 3, 1]);
        assert_eq!(sink.batches()[2], "6.000\n");
    }

    #[test]
    fn test_header_precedes_rows() {
        let sink = MemorySink::new();
        let mut writer = ChunkWriter::new(sink.clone(), 2);
        writer.write_header("h1\nh2\n").unwrap();
        writer.push(&vec![1.0f32]).unwrap();
        writer.finish().unwrap();
        assert_eq!(sink.contents(), "h1\nh2\n1.000\n");
        assert_eq!(sink.batches().len(), 2);
    }

    #[test]
    fn test_finish_with_nothing_pending_does_not_sync() {
        let sink = MemorySink::new();
        let writer: ChunkWriter<MemorySink> = ChunkWriter::new(sink.clone(), 5);
        let (_, flushed) = writer.finish().unwrap();
        assert_eq!(flushed, 0);
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn test_counters() {
        let mut writer = ChunkWriter::new(MemorySink::new(), 2);
        for _ in 0..5 {
            writer.push(&EventRecord::new(1, "a")).unwrap();
        }
        assert_eq!(writer.rows_written(), 4);
        assert_eq!(writer.chunks_flushed(), 2);
        assert_eq!(writer.threshold(), 2);
    }

    #[test]
    fn test_write_failure_propagates() {
        let mut writer = ChunkWriter::new(MemorySink::failing(), 1);
        assert!(writer.push(&vec![1.0f32]).is_err());
    }
}

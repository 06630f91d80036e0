//! Destinations for persisted rows
//!
//! A [`LogSink`] takes whole chunks of bytes and a separate durability
//! barrier. [`FileSink`] is the production sink; [`MemorySink`] keeps the
//! output in memory and remembers where each barrier fell.

use crate::error::{CollectError, Result, ResultExt};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Output stream for a chunk writer
pub trait LogSink: Send {
    /// Append bytes to the sink's in-process buffer
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Push buffered bytes to the OS and force them onto storage
    fn sync(&mut self) -> Result<()>;
}

/// Buffered file output with an explicit durability barrier
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) `path`, creating its parent directory if needed
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating output directory {:?}", parent))?;
            }
        }
        let file = File::create(&path).with_context(|| format!("creating {:?}", path))?;
        Ok(Self {
            path,
            writer: BufWriter::with_capacity(64 * 1024, file),
        })
    }

    /// Path of the file being written
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileSink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer
            .write_all(bytes)
            .with_context(|| format!("writing {:?}", self.path))
    }

    fn sync(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {:?}", self.path))?;
        self.writer
            .get_ref()
            .sync_data()
            .with_context(|| format!("syncing {:?}", self.path))
    }
}

#[derive(Debug, Default)]
struct MemoryLog {
    synced: Vec<String>,
    pending: Vec<u8>,
}

/// In-memory sink; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
    fail_writes: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose writes always fail, for exercising storage errors
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Text of each synced batch, in order
    pub fn batches(&self) -> Vec<String> {
        self.lock().synced.clone()
    }

    /// Everything written so far, synced or not
    pub fn contents(&self) -> String {
        let log = self.lock();
        let mut out: String = log.synced.concat();
        out.push_str(&String::from_utf8_lossy(&log.pending));
        out
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LogSink for MemorySink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            return Err(CollectError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        self.lock().pending.extend_from_slice(bytes);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        let mut log = self.lock();
        let batch = String::from_utf8_lossy(&log.pending).into_owned();
        log.pending.clear();
        log.synced.push(batch);
        Ok(())
    }
}

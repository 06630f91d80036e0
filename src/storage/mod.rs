//! Persisted output
//!
//! Each recording session produces two independent text files:
//!
//! - **Sample file** (`{name}.csv`): a [`SampleHeader`] followed by one row
//!   per accepted sample, channel values with three decimals, counter slot
//!   stripped.
//! - **Event file** (`{name}.csve`): an [`EventHeader`] followed by one
//!   `counter,label` row per marked event.
//!
//! Both are written through a [`ChunkWriter`], which batches rows and puts
//! a durability barrier after every batch.

pub mod chunk;
pub mod header;
pub mod sink;

pub use chunk::{ChunkWriter, LogRow};
pub use header::{EventHeader, SampleHeader, EVENT_COLUMNS};
pub use sink::{FileSink, LogSink, MemorySink};

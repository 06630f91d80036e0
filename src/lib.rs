//! # collect-rs: multi-channel acquisition engine
//!
//! Continuously acquires fixed-rate frames from a streaming device, drops
//! duplicate readings, keeps a bounded window of recent samples, and durably
//! persists the sample series plus caller-marked events.
//!
//! ## Architecture
//!
//! - **Device**: [`device::SourceAdapter`] is the boundary to the hardware driver
//! - **Pipeline**: four threads (stream, process, sample logger, event logger)
//!   joined by crossbeam hand-off queues
//! - **Storage**: chunked writes with a sync after every chunk
//! - **Collector**: [`pipeline::Collector`] ties the lifecycle together
//!
//! ## Configuration
//!
//! [`config::AppConfig`] is read from `collect.toml` in the platform config
//! directory (or any TOML/JSON file given explicitly):
//!
//! - **Linux**: `~/.config/collect-rs/`
//! - **macOS**: `~/Library/Application Support/collect-rs/`
//! - **Windows**: `%APPDATA%\collect-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use collect_rs::{
//!     config::AppConfig,
//!     device::{FirstAvailable, MockDriver},
//!     pipeline::Collector,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> collect_rs::Result<()> {
//!     let mut collector = Collector::new(
//!         AppConfig::default(),
//!         Arc::new(MockDriver::new()),
//!         Box::new(FirstAvailable),
//!     );
//!
//!     collector.connect(None)?;
//!     collector.start_recording("subject01")?;
//!     collector.mark_event("11");
//!
//!     let stats = collector.disconnect()?;
//!     println!("{} rows logged", stats.rows_logged);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`analysis`] - Dropped-sample report over the retained window
//! - [`config`] - Configuration loading and validation
//! - [`device`] - Source adapter traits plus mock and scripted devices
//! - [`error`] - Error types
//! - [`pipeline`] - Stages, queues and the lifecycle controller
//! - [`session`] - Recording sessions
//! - [`storage`] - Headers, chunked writer and sinks
//! - [`types`] - Core data types

pub mod analysis;
pub mod config;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod storage;
pub mod types;

pub use error::{CollectError, Result};
pub use pipeline::{Collector, EventMarker};
pub use types::{CollectionStats, ConnectionStatus, EventRecord, Sample, StageKind};

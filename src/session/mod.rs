//! Recording sessions
//!
//! A session starts with `start_recording(name)` and names the pair of
//! files samples and events are written to. Sessions may be started before
//! or after the device is connected; the loggers open their files lazily,
//! on the first row that belongs to the session.

pub mod recorder;
pub mod types;

pub use recorder::RecordingState;
pub use types::{Session, SessionState, HEADER_DATE_FORMAT};

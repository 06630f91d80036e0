//! Header blocks of the sample and event files
//!
//! Downstream tooling parses these line by line, so key padding and field
//! order are fixed:
//!
//! ```text
//! collect.....= UnicornPy_2020.01.09.2
//! device......= UN-2019.05.51
//! samplerate..= 250.000
//! channels....= 15
//! date........= 2020-01-09T14:03:11.123456
//! filename....= run01
//! FZ, C3, CZ, C4, PZ, O1, OZ, O2, AccelX, AccelY, AccelZ, GyroX, GyroY, GyroZ, Battery, Sample
//! ```
//!
//! The event header carries the `collect`, `date` and `filename` lines
//! followed by the column line `Latency, Event`.

use crate::config::LoggingConfig;
use crate::session::Session;

/// Column line of the event file
pub const EVENT_COLUMNS: &str = "Latency, Event";

/// Header of a sample file
#[derive(Debug, Clone, PartialEq)]
pub struct SampleHeader {
    pub collect: String,
    pub device_id: String,
    pub sample_rate_hz: f64,
    /// Data channels, i.e. the frame width without the counter slot
    pub channels: usize,
    pub date: String,
    pub filename: String,
    pub labels: Vec<String>,
}

impl SampleHeader {
    /// Header for `session` recorded from a device with `channel_count` slots
    pub fn new(
        session: &Session,
        logging: &LoggingConfig,
        device_id: &str,
        sample_rate_hz: f64,
        channel_count: usize,
        labels: &[String],
    ) -> Self {
        Self {
            collect: logging.collect_tag(),
            device_id: device_id.to_string(),
            sample_rate_hz,
            channels: channel_count.saturating_sub(1),
            date: session.date_string(),
            filename: session.name.clone(),
            labels: labels.to_vec(),
        }
    }

    /// Render the header block, newline-terminated
    pub fn render(&self) -> String {
        format!(
            "collect.....= {}\n\
             device......= {}\n\
             samplerate..= {:.3}\n\
             channels....= {}\n\
             date........= {}\n\
             filename....= {}\n\
             {}\n",
            self.collect,
            self.device_id,
            self.sample_rate_hz,
            self.channels,
            self.date,
            self.filename,
            self.labels.join(", ")
        )
    }
}

/// Header of an event file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub collect: String,
    pub date: String,
    pub filename: String,
}

impl EventHeader {
    pub fn new(session: &Session, logging: &LoggingConfig) -> Self {
        Self {
            collect: logging.collect_tag(),
            date: session.date_string(),
            filename: session.name.clone(),
        }
    }

    /// Render the header block, newline-terminated
    pub fn render(&self) -> String {
        format!(
            "collect.....= {}\ndate........= {}\nfilename....= {}\n{}\n",
            self.collect, self.date, self.filename, EVENT_COLUMNS
        )
    }
}

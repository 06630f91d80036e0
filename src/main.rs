//! collect-rs - Main Entry Point
//!
//! Debug harness for the acquisition engine: connects to a simulated device,
//! records for a fixed time while marking an incrementing event code at a
//! fixed interval, then disconnects and reports the collection statistics
//! and the dropped-sample check over the retained window.
//!
//! # Usage
//!
//! ```bash
//! collect-rs --name recordeddata --seconds 10 --event-interval-ms 1000
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use collect_rs::{
    analysis::DropReport,
    config::{default_config_path, AppConfig},
    device::{DeviceSelector, MockDriver},
    pipeline::Collector,
    CollectError,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "collect-rs")]
#[command(about = "Record multi-channel samples and event markers", long_about = None)]
struct Cli {
    /// Config file (TOML, or JSON by extension); defaults to the platform config dir
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device to open; prompts for one when omitted
    #[arg(long)]
    device: Option<String>,

    /// Recording name, used for the output file names
    #[arg(long, default_value = "recordeddata")]
    name: String,

    /// How long to record
    #[arg(long, default_value_t = 10)]
    seconds: u64,

    /// Interval between marked events
    #[arg(long, default_value_t = 1000)]
    event_interval_ms: u64,

    /// Directory for the output files (overrides the config)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

/// Lists devices on stdout and reads an index from stdin
struct ConsoleSelector;

impl DeviceSelector for ConsoleSelector {
    fn select(&self, available: &[String]) -> collect_rs::Result<String> {
        println!("Available devices:");
        for (i, device) in available.iter().enumerate() {
            println!("#{} {}", i, device);
        }
        print!("Select device by ID #");
        std::io::stdout().flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        let index: usize = line
            .trim()
            .parse()
            .map_err(|_| CollectError::device(format!("'{}' is not a device number", line.trim())))?;
        available
            .get(index)
            .cloned()
            .ok_or_else(|| CollectError::device("The selected device ID is not valid."))
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,collect_rs=debug"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer());

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("log file {:?} has no file name", path))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return AppConfig::load(path).with_context(|| format!("loading config {:?}", path));
    }
    match default_config_path() {
        Some(path) if path.exists() => {
            tracing::info!("Using config {:?}", path);
            Ok(AppConfig::load_or_default(path))
        }
        _ => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    tracing::info!("Starting collect-rs");
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(dir) = &cli.output_dir {
        config.logging.output_dir = dir.clone();
    }
    let sample_rate_hz = config.acquisition.sample_rate_hz;

    let driver = Arc::new(MockDriver::new().with_sample_rate(sample_rate_hz));
    let mut collector = Collector::new(config, driver, Box::new(ConsoleSelector));

    let started = Instant::now();
    collector
        .connect(cli.device.as_deref())
        .context("connecting to device")?;
    collector.start_recording(&cli.name)?;

    let interval = Duration::from_millis(cli.event_interval_ms.max(1));
    let deadline = started + Duration::from_secs(cli.seconds);
    let mut code: u64 = 0;
    while Instant::now() + interval <= deadline {
        std::thread::sleep(interval);
        if let Err(e) = collector.health() {
            tracing::error!("Pipeline fault: {}", e);
            break;
        }
        match collector.mark_event(code.to_string()) {
            Some(event) => tracing::debug!("Marked event {} at sample {}", event.label, event.counter),
            None => tracing::warn!("Event {} was not recorded", code),
        }
        code += 1;
        println!("Time Lapsed: {:.1} second", started.elapsed().as_secs_f64());
    }

    collector.stop_recording();
    let stats = collector.disconnect().context("disconnecting")?;
    println!("Elapsed time: {:.6}", started.elapsed().as_secs_f64());
    println!("{}", serde_json::to_string_pretty(&stats)?);

    match DropReport::from_samples(collector.recent_samples()) {
        Some(report) => {
            println!("{}", report);
            tracing::info!(
                "Window covers counters {}..={} ({:.2} s)",
                report.first_counter,
                report.last_counter,
                report.span_secs(sample_rate_hz)
            );
        }
        None => println!("Not enough samples in the window to check for drops."),
    }

    tracing::info!("Shutting down...");
    Ok(())
}

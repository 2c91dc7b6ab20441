//! Stdout + file logging for scraper runs.
//!
//! Every process start writes a fresh `catalog_scraper_<timestamp>.log`. The
//! log directory is emptied first whenever its total size exceeds the
//! configured limit.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, time::FormatTime};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

use crate::config::LoggingConfig;

struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

pub fn log_file_name(at: DateTime<Local>) -> String {
    format!("catalog_scraper_{}.log", at.format("%Y%m%d_%H%M%S"))
}

/// Delete every file in `dir` if their combined size exceeds `max_size_mb`.
/// Returns whether anything was removed.
pub fn clean_logs_if_needed(dir: &Path, max_size_mb: f64) -> Result<bool> {
    let files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();

    let total: u64 = files
        .iter()
        .filter_map(|entry| entry.metadata().ok())
        .map(|meta| meta.len())
        .sum();

    if (total as f64) <= max_size_mb * 1024.0 * 1024.0 {
        return Ok(false);
    }

    for entry in files {
        std::fs::remove_file(entry.path())
            .with_context(|| format!("Failed to remove log file: {}", entry.path().display()))?;
    }
    Ok(true)
}

/// Install the global subscriber. Keep the returned guard alive for the
/// whole process or buffered file lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.dir)
        .with_context(|| format!("Failed to create log directory: {}", config.dir.display()))?;
    let cleaned = clean_logs_if_needed(&config.dir, config.max_size_mb)?;

    let level = LevelFilter::from_str(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let file_appender = rolling::never(&config.dir, log_file_name(Local::now()));
    let (file_writer, guard) = non_blocking(file_appender);

    let file_layer = fmt::Layer::new()
        .with_writer(file_writer)
        .with_timer(LocalTimeFormatter)
        .with_target(false)
        .with_ansi(false);
    let console_layer = fmt::Layer::new()
        .with_writer(std::io::stdout)
        .with_timer(LocalTimeFormatter)
        .with_target(false);

    Registry::default()
        .with(level)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install log subscriber: {}", e))?;

    if cleaned {
        tracing::info!("Log directory exceeded {} MB and was cleared", config.max_size_mb);
    }
    Ok(guard)
}

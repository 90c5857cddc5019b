//! Logging and monitoring utilities for the unique-storage proof system:
//! transform progression, challenge outcomes, and performance tracking.

use chrono::{DateTime, Utc};
use colored::*;
use log::{debug, error, info, warn};

use crate::core::types::ChallengeStatus;

/// Log levels for different components
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub level: LogLevel,
    pub show_timestamps: bool,
    pub show_colors: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            show_timestamps: true,
            show_colors: true,
        }
    }
}

/// Initialize the logging system
pub fn init_logger(config: Option<LoggerConfig>) -> Result<(), Box<dyn std::error::Error>> {
    let config = config.unwrap_or_default();

    let log_level = match config.level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    std::env::set_var("RUST_LOG", log_level);

    // Try to init, but ignore error if already initialized
    match env_logger::try_init() {
        Ok(_) => {
            info!("🚀 Proof-of-Unique-Storage logger initialized");
            info!("📊 Log level: {}", log_level.to_uppercase());
        }
        Err(_) => {
            debug!("Logger already initialized, skipping...");
        }
    }

    Ok(())
}

/// Format a timestamp for logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Log with appropriate color and formatting
pub fn log_with_color(level: LogLevel, emoji: &str, category: &str, message: &str) {
    let timestamp = format_timestamp();
    let formatted_message = format!("{} [{}] {}: {}", emoji, timestamp, category, message);

    match level {
        LogLevel::Error => error!("{}", formatted_message.red()),
        LogLevel::Warn => warn!("{}", formatted_message.yellow()),
        LogLevel::Info => info!("{}", formatted_message.green()),
        LogLevel::Debug => debug!("{}", formatted_message.blue()),
        LogLevel::Trace => debug!("{}", formatted_message.white()),
    }
}

/// Report completion of one copy's transform
pub fn report_transform_summary(copy_index: u32, chunk_count: u32, iterations: u64, elapsed_ms: u32) {
    log_with_color(
        LogLevel::Info,
        "⛓️",
        "transform",
        &format!(
            "copy {} complete: {} chunks, {} iterations in {}ms",
            copy_index, chunk_count, iterations, elapsed_ms
        ),
    );
}

/// Report a resolved challenge with status-appropriate severity
pub fn report_challenge_outcome(node: &str, status: ChallengeStatus, response_ms: Option<u32>) {
    let timing = match response_ms {
        Some(ms) => format!("{}ms", ms),
        None => "-".to_string(),
    };

    match status {
        ChallengeStatus::Verified => log_with_color(
            LogLevel::Info,
            "✅",
            "challenge",
            &format!("node {} verified in {}", node, timing),
        ),
        ChallengeStatus::TimedOut => log_with_color(
            LogLevel::Warn,
            "⏱️",
            "challenge",
            &format!("node {} timed out", node),
        ),
        ChallengeStatus::Failed => log_with_color(
            LogLevel::Warn,
            "❌",
            "challenge",
            &format!("node {} failed verification in {}", node, timing),
        ),
        ChallengeStatus::Issued | ChallengeStatus::AwaitingResponse => log_with_color(
            LogLevel::Debug,
            "📨",
            "challenge",
            &format!("node {} pending", node),
        ),
    }
}

//! Logging initialization and startup diagnostics
//!
//! This module provides:
//! - Logger initialization (console + file)
//! - A startup banner describing the delivery mode and permission chain

use anyhow::Result;
use simplelog::{ColorChoice, CombinedLogger, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use std::fs::File;

use crate::core::config::Settings;

/// Initialize logger for both console and file output
///
/// # Arguments
/// * `log_file_path` - Path to the log file
/// * `level` - Maximum level written to both sinks
///
/// # Returns
/// * `Ok(())` - Logger initialized successfully
/// * `Err(anyhow::Error)` - Failed to create the file or a logger was already installed
pub fn init_logger(log_file_path: &str, level: LevelFilter) -> Result<()> {
    let log_file = File::create(log_file_path).map_err(|e| anyhow::anyhow!("Failed to create log file: {}", e))?;

    CombinedLogger::init(vec![
        TermLogger::new(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, Config::default(), log_file),
    ])
    .map_err(|e| anyhow::anyhow!("Failed to initialize logger: {}", e))?;

    Ok(())
}

/// Logs the effective delivery configuration at application startup
pub fn log_startup_configuration(name: &str, settings: &Settings) {
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    log::info!("Starting application '{}'", name);
    if settings.use_webhook {
        log::info!(
            "Delivery: webhook on {}:{}{} (public URL: {})",
            settings.webhook_listen,
            settings.webhook_port,
            settings.webhook_url_path,
            settings
                .webhook_url
                .as_ref()
                .map(|u| u.as_str())
                .unwrap_or("<not set>")
        );
    } else {
        log::info!("Delivery: long polling");
    }

    if settings.permissions.is_empty() {
        log::info!("Permission chain: none");
    } else {
        log::info!("Permission chain: {}", settings.permissions.join(" -> "));
    }

    if settings.maintenance_mode {
        log::warn!("Maintenance mode is ON, only {} admin(s) will be served", settings.admin_ids.len());
    }
    log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

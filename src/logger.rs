use anyhow::{Context, Result};
use log::LevelFilter;
use std::fs::OpenOptions;
use std::io::Write;

use crate::config::ConfigManager;

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Initialize console logging and note the start of the run in the log file.
///
/// The console level comes from `RUST_LOG` (default `info`), raised to
/// `debug` when `verbose` is set:
///
/// ```bash
/// RUST_LOG=debug malexport update history -u someone
/// RUST_LOG=warn malexport update all -u someone
/// ```
///
/// The file is `malexport.log` in the config directory (`$MALEXPORT_CFG`,
/// or `~/.config/malexport` on Linux).
pub fn init_logger(verbose: bool) -> Result<()> {
    ConfigManager::ensure_config_dir()?;

    let mut level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info);
    if verbose && level < LevelFilter::Debug {
        level = LevelFilter::Debug;
    }

    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{:5}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok(); // already initialized

    rotate_log_if_needed()?;
    log_to_file(&format!("malexport started, console level {level:?}"))?;
    Ok(())
}

/// Append a timestamped line to the log file only
pub fn log_to_file(message: &str) -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        message
    )?;
    Ok(())
}

/// Move the log file to `malexport.log.old` once it passes 10MB
pub fn rotate_log_if_needed() -> Result<()> {
    let log_path = ConfigManager::log_file_path()?;
    let Ok(metadata) = std::fs::metadata(&log_path) else {
        return Ok(());
    };
    if metadata.len() <= MAX_LOG_SIZE {
        return Ok(());
    }

    let old_log_path = log_path.with_extension("log.old");
    if old_log_path.exists() {
        std::fs::remove_file(&old_log_path)?;
    }
    std::fs::rename(&log_path, &old_log_path)?;
    log::info!("Log file rotated to {}", old_log_path.display());
    Ok(())
}

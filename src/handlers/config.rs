//! Configuration command handlers

use anyhow::{Context, Result};
use colored::Colorize;
use inquire::{Confirm, MultiSelect, Select, Text};

use crate::config::{show_config, SyncConfig};
use crate::transport::DriverType;

const OPTIONS: [&str; 7] = [
    "Request wait (seconds)",
    "History till-same limit",
    "Thread till-same limit",
    "Forum till-same limit",
    "Merged file flush cadence",
    "WebDriver URL",
    "Browser",
];

pub fn handle_config_show() -> Result<()> {
    show_config()
}

fn prompt_number<T>(label: &str, current: &str, help: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let input = Text::new(label)
        .with_default(current)
        .with_help_message(help)
        .prompt()?;
    if input.trim().is_empty() {
        return Ok(None);
    }
    input
        .trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Invalid value '{}': {}", input.trim(), e))
}

/// Pick settings from a menu, edit them, then confirm before saving
pub fn handle_config_interactive() -> Result<()> {
    println!("{}", "Interactive Configuration".cyan().bold());
    println!("{}", "=".repeat(80).cyan());
    println!();

    let mut config = SyncConfig::load().context("Failed to load current configuration")?;
    show_config()?;
    println!();

    let selections = MultiSelect::new("Select settings to modify:", OPTIONS.to_vec())
        .with_help_message("Space to select, Enter to confirm")
        .prompt()
        .context("Failed to get user selections")?;

    if selections.is_empty() {
        println!("{}", "No settings selected. Configuration unchanged.".yellow());
        return Ok(());
    }

    for selection in selections {
        match selection {
            "Request wait (seconds)" => {
                if let Some(v) = prompt_number::<f64>(
                    "Request wait (seconds):",
                    &config.request_wait_secs.to_string(),
                    "Delay before every request; also the base browser wait",
                )? {
                    config.request_wait_secs = v;
                    config.browser_wait_secs = v;
                }
            }
            "History till-same limit" => {
                if let Some(v) = prompt_number::<usize>(
                    "History till-same limit:",
                    &config.history_till_same_limit.to_string(),
                    "Stop a history scan after this many unchanged entries in a row",
                )? {
                    config.history_till_same_limit = v;
                }
            }
            "Thread till-same limit" => {
                if let Some(v) = prompt_number::<usize>(
                    "Thread till-same limit:",
                    &config.thread_till_same_limit.to_string(),
                    "Stop a message scan after this many already-seen threads",
                )? {
                    config.thread_till_same_limit = v;
                }
            }
            "Forum till-same limit" => {
                let current = config
                    .forum_till_same_limit
                    .map(|n| n.to_string())
                    .unwrap_or_default();
                config.forum_till_same_limit = prompt_number::<usize>(
                    "Forum till-same limit:",
                    &current,
                    "Leave empty to always walk the whole forum index",
                )?;
            }
            "Merged file flush cadence" => {
                if let Some(v) = prompt_number::<usize>(
                    "Write merged history every N saves:",
                    &config.merged_flush_every.to_string(),
                    "Only used with --use-merged-file",
                )? {
                    config.merged_flush_every = v.max(1);
                }
            }
            "WebDriver URL" => {
                config.webdriver_url = Text::new("WebDriver URL:")
                    .with_default(&config.webdriver_url)
                    .prompt()?;
            }
            "Browser" => {
                config.driver_type = Select::new("Browser:", vec![DriverType::Chrome, DriverType::Firefox])
                    .prompt()?;
                config.headless = Confirm::new("Run the browser headless?")
                    .with_default(config.headless)
                    .prompt()?;
            }
            _ => {}
        }
    }

    if Confirm::new("Save this configuration?").with_default(true).prompt()? {
        config.save().context("Failed to save configuration")?;
        println!("\n{} Configuration saved", "✓".green().bold());
    } else {
        println!("\n{}", "Configuration not saved.".yellow());
    }
    Ok(())
}

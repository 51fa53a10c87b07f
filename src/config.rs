use anyhow::{Context, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::transport::DriverType;

const APP_NAME: &str = "malexport";

/// Cross-platform configuration and data directory manager
pub struct ConfigManager;

impl ConfigManager {
    /// Get the configuration directory path:
    /// - `$MALEXPORT_CFG` if set
    /// - Linux: $XDG_CONFIG_HOME/malexport or ~/.config/malexport
    /// - macOS: ~/Library/Application Support/malexport
    /// - Windows: %APPDATA%\malexport
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MALEXPORT_CFG") {
            return Ok(PathBuf::from(dir));
        }

        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
                Ok(PathBuf::from(xdg_config).join(APP_NAME))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".config").join(APP_NAME))
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let base = dirs::config_dir().context("Failed to get config directory")?;
            Ok(base.join(APP_NAME))
        }
    }

    /// Get the data directory, where each account gets its own subdirectory:
    /// - `$MALEXPORT_DIR` if set
    /// - Linux: $XDG_DATA_HOME/malexport or ~/.local/share/malexport
    /// - elsewhere: the platform data directory
    pub fn data_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("MALEXPORT_DIR") {
            return Ok(PathBuf::from(dir));
        }

        #[cfg(target_os = "linux")]
        {
            if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
                Ok(PathBuf::from(xdg_data).join(APP_NAME))
            } else {
                let home = dirs::home_dir().context("Failed to get home directory")?;
                Ok(home.join(".local").join("share").join(APP_NAME))
            }
        }

        #[cfg(not(target_os = "linux"))]
        {
            let base = dirs::data_dir().context("Failed to get data directory")?;
            Ok(base.join(APP_NAME))
        }
    }

    /// Get the sync settings file path (config.toml)
    pub fn sync_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Get the log file path
    pub fn log_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("malexport.log"))
    }

    /// Where the approved id reference repository is cloned
    pub fn id_cache_dir() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join("mal-id-cache"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_config_dir() -> Result<PathBuf> {
        let config_dir = Self::config_dir()?;
        fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;
        Ok(config_dir)
    }
}

/// Tuning for the sync engine, stored in `config.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds to wait before each plain HTTP request
    pub request_wait_secs: f64,

    /// Base seconds to wait after each browser navigation (jittered)
    pub browser_wait_secs: f64,

    /// Consecutive unchanged history entries before a scan stops
    pub history_till_same_limit: usize,

    /// Consecutive unchanged message threads before a scan stops
    pub thread_till_same_limit: usize,

    /// Optional limit for forum topics; unset scans the whole index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forum_till_same_limit: Option<usize>,

    /// Merged history files are written every N saves
    pub merged_flush_every: usize,

    /// Attempts per request before a transient failure is given up on
    pub retry_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub retry_max_delay_secs: u64,

    /// WebDriver server (chromedriver / geckodriver) to drive the browser with
    pub webdriver_url: String,
    pub driver_type: DriverType,
    pub headless: bool,

    /// User agent for the unauthenticated list endpoint
    pub list_user_agent: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            request_wait_secs: 8.0,
            browser_wait_secs: 8.0,
            history_till_same_limit: 5,
            thread_till_same_limit: 10,
            forum_till_same_limit: None,
            merged_flush_every: 10,
            retry_attempts: 3,
            retry_base_delay_secs: 13,
            retry_max_delay_secs: 120,
            webdriver_url: "http://localhost:9515".to_string(),
            driver_type: DriverType::Chrome,
            headless: false,
            list_user_agent:
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:88.0) Gecko/20100101 Firefox/88.0"
                    .to_string(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from file, then apply environment overrides
    pub fn load() -> Result<Self> {
        let config_path = ConfigManager::sync_config_path()?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        let config_path = ConfigManager::sync_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<f64>("MALEXPORT_REQUEST_WAIT_TIME")? {
            self.request_wait_secs = v;
            self.browser_wait_secs = v;
        }
        if let Some(v) = env_parse::<usize>("MALEXPORT_EPISODE_LIMIT")? {
            self.history_till_same_limit = v;
        }
        if let Some(v) = env_parse::<usize>("MALEXPORT_THREAD_LIMIT")? {
            self.thread_till_same_limit = v;
        }
        if let Ok(url) = std::env::var("MALEXPORT_WEBDRIVER_URL") {
            self.webdriver_url = url;
        }
        if let Some(v) = env_parse::<u8>("MALEXPORT_CHROMEDRIVER_HIDDEN")? {
            self.headless = v != 0;
        }
        if let Ok(ua) = std::env::var("MALEXPORT_LIST_USER_AGENT") {
            self.list_user_agent = ua;
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value '{}' for {}: {}", raw, key, e)),
        Err(_) => Ok(None),
    }
}

/// Show the current sync configuration
pub fn show_config() -> Result<()> {
    let config = SyncConfig::load()?;

    println!("{}", "Current Sync Configuration:".bold());
    println!("  {}: {}", "Config file".cyan(), ConfigManager::sync_config_path()?.display());
    println!("  {}: {}", "Data directory".cyan(), ConfigManager::data_dir()?.display());
    println!("  {}: {}s", "Request wait".cyan(), config.request_wait_secs);
    println!("  {}: {}s", "Browser wait".cyan(), config.browser_wait_secs);
    println!("  {}: {}", "History till-same limit".cyan(), config.history_till_same_limit);
    println!("  {}: {}", "Thread till-same limit".cyan(), config.thread_till_same_limit);
    println!(
        "  {}: {}",
        "Forum till-same limit".cyan(),
        config
            .forum_till_same_limit
            .map(|n| n.to_string())
            .unwrap_or_else(|| "Not set (whole index)".to_string())
    );
    println!("  {}: every {} saves", "Merged file flush".cyan(), config.merged_flush_every);
    println!("  {}: {} ({})", "WebDriver".cyan(), config.webdriver_url, config.driver_type);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_config_paths() {
        std::env::remove_var("MALEXPORT_CFG");
        let config_dir = ConfigManager::config_dir().unwrap();
        assert!(config_dir.to_string_lossy().contains("malexport"));

        let path = ConfigManager::sync_config_path().unwrap();
        assert!(path.to_string_lossy().ends_with("config.toml"));

        let log = ConfigManager::log_file_path().unwrap();
        assert!(log.to_string_lossy().contains("malexport.log"));
    }

    #[test]
    #[serial]
    fn test_env_dirs_respected() {
        std::env::set_var("MALEXPORT_CFG", "/tmp/test-malexport-cfg");
        std::env::set_var("MALEXPORT_DIR", "/tmp/test-malexport-data");
        assert_eq!(ConfigManager::config_dir().unwrap(), PathBuf::from("/tmp/test-malexport-cfg"));
        assert_eq!(ConfigManager::data_dir().unwrap(), PathBuf::from("/tmp/test-malexport-data"));
        std::env::remove_var("MALEXPORT_CFG");
        std::env::remove_var("MALEXPORT_DIR");
    }

    #[test]
    fn test_sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.history_till_same_limit, 5);
        assert_eq!(config.thread_till_same_limit, 10);
        assert_eq!(config.merged_flush_every, 10);
        assert!(config.forum_till_same_limit.is_none());
    }

    #[test]
    fn test_sync_config_partial_toml() {
        let config: SyncConfig = toml::from_str("history_till_same_limit = 20\nheadless = true\n").unwrap();
        assert_eq!(config.history_till_same_limit, 20);
        assert!(config.headless);
        assert_eq!(config.thread_till_same_limit, 10);

        let serialized = toml::to_string(&config).unwrap();
        let back: SyncConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(back.history_till_same_limit, 20);
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        std::env::set_var("MALEXPORT_EPISODE_LIMIT", "7");
        std::env::set_var("MALEXPORT_THREAD_LIMIT", "3");
        let mut config = SyncConfig::default();
        config.apply_env_overrides().unwrap();
        assert_eq!(config.history_till_same_limit, 7);
        assert_eq!(config.thread_till_same_limit, 3);

        std::env::set_var("MALEXPORT_EPISODE_LIMIT", "many");
        assert!(config.apply_env_overrides().is_err());

        std::env::remove_var("MALEXPORT_EPISODE_LIMIT");
        std::env::remove_var("MALEXPORT_THREAD_LIMIT");
    }
}

//! Loading, or prompting for, the secrets an account needs.
//!
//! Secrets are prompted for once and stored in the config directory; the
//! sync engine itself never writes them anywhere else.

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use inquire::{Password, Text};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::localdir::LocalDir;

/// Site username/password used to log the browser in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Client id of a registered API application (no secret is used)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub client_id: String,
}

pub fn is_interactive() -> bool {
    atty::is(atty::Stream::Stdin) && atty::is(atty::Stream::Stdout)
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value = toml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    Ok(Some(value))
}

fn save_toml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(value).context("Failed to serialize credentials")?;
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Load stored credentials, prompting for them if none exist yet
pub fn get_or_prompt_credentials(localdir: &LocalDir) -> Result<Credentials> {
    let path = localdir.credential_path();
    if let Some(creds) = load_toml(&path)? {
        return Ok(creds);
    }
    if !is_interactive() {
        return Err(anyhow!(
            "No credentials found at {} and no terminal to prompt on",
            path.display()
        ));
    }

    println!(
        "{}",
        "No credentials found. Enter your MAL username/password; they are stored locally and only used to log in."
            .yellow()
    );
    let username = Text::new("MAL Username:")
        .with_default(&localdir.username)
        .prompt()
        .context("Failed to read username")?;
    let password = Password::new("MAL Password:")
        .without_confirmation()
        .prompt()
        .context("Failed to read password")?;

    let creds = Credentials { username, password };
    save_toml(&path, &creds)?;
    println!("{} Saved to {}", "✓".green(), path.display());
    Ok(creds)
}

/// Load the API client id, prompting for it if none exists yet
pub fn get_or_prompt_client_id(localdir: &LocalDir) -> Result<ClientInfo> {
    let path = localdir.client_info_path();
    if let Some(info) = load_toml(&path)? {
        return Ok(info);
    }
    if !is_interactive() {
        return Err(anyhow!(
            "No API client id found at {} and no terminal to prompt on",
            path.display()
        ));
    }

    println!(
        "{}",
        "Create an API client at https://myanimelist.net/apiconfig (any App Type other than Web)."
            .yellow()
    );
    let client_id = Text::new("Client ID:")
        .prompt()
        .context("Failed to read client id")?;

    let info = ClientInfo {
        client_id: client_id.trim().to_string(),
    };
    save_toml(&path, &info)?;
    Ok(info)
}

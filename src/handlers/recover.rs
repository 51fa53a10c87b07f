//! `malexport recover` handler

use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};

use crate::config::ConfigManager;
use crate::list_type::ListType;
use crate::recover::{discover_backups, load_approved, recover, Backup, StoreCombiner};

/// Recover deleted entries from the backups under each root and write them
/// as JSON to `output` (stdout when unset).
pub fn handle_recover(
    username: &str,
    backup_roots: &[PathBuf],
    only_with_history: bool,
    output: Option<&Path>,
) -> Result<()> {
    let mut backups: Vec<Backup> = Vec::new();
    for root in backup_roots {
        backups.extend(
            discover_backups(root).with_context(|| format!("Failed to list backups in {}", root.display()))?,
        );
    }
    backups.sort_by(|a, b| a.name.cmp(&b.name));
    if backups.is_empty() {
        return Err(anyhow!("no backups found"));
    }
    eprintln!("{} {} backups", "Found".cyan(), backups.len());

    let approved = load_approved(&ConfigManager::id_cache_dir()?)?;
    let recovered = recover(&StoreCombiner, &approved, &backups, username, only_with_history);

    for list_type in ListType::ALL {
        eprintln!(
            "{} {} deleted {} entries",
            "✓".green(),
            recovered.entries(list_type).len(),
            list_type
        );
    }

    let json = serde_json::to_string_pretty(&recovered)?;
    match output {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

/// Pull the id cache and print how many ids it approves
pub fn handle_approved_ids_stats() -> Result<()> {
    let approved = load_approved(&ConfigManager::id_cache_dir()?)?;
    println!("Approved Anime: {}", approved.anime.len());
    println!("Approved Manga: {}", approved.manga.len());
    Ok(())
}

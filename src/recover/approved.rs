//! The approved id set: every anime/manga id the site still serves, from a
//! clone of the `mal-id-cache` repository.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::list_type::ListType;

pub const ID_CACHE_REPO_URL: &str = "https://github.com/seanbreckenridge/mal-id-cache";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ApprovedIds {
    pub anime: HashSet<u64>,
    pub manga: HashSet<u64>,
}

#[derive(Deserialize)]
struct CacheFile {
    #[serde(default)]
    sfw: Vec<u64>,
    #[serde(default)]
    nsfw: Vec<u64>,
}

impl ApprovedIds {
    pub fn ids(&self, list_type: ListType) -> &HashSet<u64> {
        match list_type {
            ListType::Anime => &self.anime,
            ListType::Manga => &self.manga,
        }
    }

    pub fn contains(&self, list_type: ListType, id: u64) -> bool {
        self.ids(list_type).contains(&id)
    }

    /// Read `cache/{anime,manga}_cache.json` from a checkout
    pub fn from_cache_dir(repo_dir: &Path) -> Result<Self> {
        let read = |list_type: ListType| -> Result<HashSet<u64>> {
            let path = repo_dir.join("cache").join(format!("{list_type}_cache.json"));
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let cache: CacheFile = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?;
            Ok(cache.sfw.into_iter().chain(cache.nsfw).collect())
        };
        Ok(Self {
            anime: read(ListType::Anime)?,
            manga: read(ListType::Manga)?,
        })
    }
}

/// A local checkout of the id cache repository, driven through the git CLI
pub struct IdCacheRepo {
    workdir: PathBuf,
}

impl IdCacheRepo {
    /// Clone into `dir` unless a checkout is already there
    pub fn clone_or_open(url: &str, dir: &Path) -> Result<Self> {
        if dir.exists() {
            if !dir.join(".git").exists() {
                return Err(anyhow!("{} exists but {}/.git does not", dir.display(), dir.display()));
            }
            return Ok(Self {
                workdir: dir.to_path_buf(),
            });
        }
        if let Some(parent) = dir.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create parent directory for '{}'", dir.display()))?;
        }
        log::info!("Cloning {} into {}", url, dir.display());
        let output = Command::new("git")
            .args(["clone", url, &dir.to_string_lossy()])
            .output()
            .context("Failed to run 'git clone'")?;
        if !output.status.success() {
            return Err(anyhow!("git clone failed: {}", String::from_utf8_lossy(&output.stderr)));
        }
        Ok(Self {
            workdir: dir.to_path_buf(),
        })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Fetch the latest ids. Returns the checked-out commit.
    pub fn pull(&self) -> Result<String> {
        self.run_git(&["pull"])?;
        let commit = self.run_git(&["rev-parse", "HEAD"])?;
        log::debug!("mal-id-cache commit: {}", commit);
        Ok(commit)
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("Failed to run 'git {}'", args.join(" ")))?;

        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

/// Update the checkout at `dir` (cloning it the first time) and load the
/// approved ids from it. A failed pull falls back to the ids already on disk.
pub fn load_approved(dir: &Path) -> Result<ApprovedIds> {
    let repo = IdCacheRepo::clone_or_open(ID_CACHE_REPO_URL, dir)?;
    if let Err(e) = repo.pull() {
        log::warn!("Could not update {}, using the ids already there: {}", dir.display(), e);
    }
    ApprovedIds::from_cache_dir(repo.workdir())
}

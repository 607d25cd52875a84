//! Cover cache, history and config commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use crate::config::{self, Config, ConfigError};
use crate::cover::CachedCoverFetcher;
use crate::error::{Error, Result};
use crate::http::ReqwestClient;
use crate::player::HistoryLog;

/// Print the cover cache size, or clear it.
pub fn cmd_cache(config: &Config, clear: bool) -> anyhow::Result<()> {
    let dir = config
        .cache_dir()
        .context("Could not determine the cache directory")?;
    let cache = CachedCoverFetcher::new(&dir, Arc::new(ReqwestClient::new()?), config.covers.size)
        .map_err(|e| Error::cover_cache(&dir, e))?;

    if clear {
        let removed = cache
            .clear()
            .map_err(|e| Error::cover_cache(cache.cover_dir(), e))?;
        println!("Removed {} cached covers from {}", removed, cache.cover_dir().display());
    } else {
        println!(
            "Cover cache: {} ({:.1} KiB)",
            cache.cover_dir().display(),
            cache.size_bytes() as f64 / 1024.0
        );
    }
    Ok(())
}

/// Print the last `count` history entries.
pub fn cmd_history(config: &Config, count: usize) -> anyhow::Result<()> {
    let dir = config
        .data_dir()
        .context("Could not determine the data directory")?;
    let history = HistoryLog::open(&dir)
        .with_context(|| format!("Failed to open history in {}", dir.display()))?;

    let lines = history.read_last(count)?;
    if lines.is_empty() {
        println!("No history yet ({})", history.path().display());
    }
    for line in lines {
        println!("{line}");
    }
    Ok(())
}

/// Print the effective configuration, optionally writing it first.
pub fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if init {
        match init_config(config, path.as_deref())? {
            Some(written) => println!("Wrote {}", written.display()),
            None => println!("Config file already exists"),
        }
    }

    match &path {
        Some(path) => println!("# {}", path.display()),
        None => println!("# (no config directory)"),
    }
    print!("{}", config::to_toml(config)?);
    Ok(())
}

/// Write `config` to `path` unless a file is already there.
fn init_config(config: &Config, path: Option<&Path>) -> Result<Option<PathBuf>> {
    let path = path.ok_or(ConfigError::NoConfigDir)?;
    if path.exists() {
        return Ok(None);
    }
    Ok(Some(config::save_to(config, path)?))
}

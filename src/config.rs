//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Linux: ~/.config/rp/config.toml
//! - macOS: ~/Library/Application Support/rp/config.toml
//! - Windows: %APPDATA%\rp\config.toml
//!
//! Every setting is optional. Command-line flags override the file.
//!
//! Cache and history data live under `RP/` in the XDG cache and data
//! roots (`$XDG_CACHE_HOME`, `$XDG_DATA_HOME`, falling back to
//! `~/.cache` and `~/.local/share`) unless `[paths]` overrides them.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::backend::{AudioOutput, BackendPreference, DecoderCommand};
use crate::cover::SizePreference;

/// Radio Paradise 128k AAC playlist.
pub const DEFAULT_PLAYLIST_URL: &str = "http://www.radioparadise.com/musiclinks/rp_128aac.m3u";

/// Directory name under the cache and data roots.
pub const APP_DIR: &str = "RP";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub playback: PlaybackConfig,
    pub covers: CoversConfig,
    pub paths: PathsConfig,
}

/// Stream and backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Playlist to play when none is given on the command line
    pub playlist_url: String,

    /// "auto", "native" or "external"
    pub backend: BackendPreference,

    /// Where the native pipeline sends audio: "device", "null" or "stdout"
    pub audio_output: AudioOutput,

    /// External decoder command
    pub decoder: DecoderCommand,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            playlist_url: DEFAULT_PLAYLIST_URL.to_string(),
            backend: BackendPreference::default(),
            audio_output: AudioOutput::default(),
            decoder: DecoderCommand::default(),
        }
    }
}

/// Cover art settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoversConfig {
    /// "none", "small" or "large"
    pub size: SizePreference,

    /// Keep covers across runs (otherwise a temporary file is used)
    pub cache: bool,
}

impl Default for CoversConfig {
    fn default() -> Self {
        Self {
            size: SizePreference::None,
            cache: true,
        }
    }
}

/// Directory overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Replaces the XDG cache root
    pub cache_root: Option<PathBuf>,

    /// Replaces the XDG data root
    pub data_root: Option<PathBuf>,
}

impl Config {
    /// `<cache root>/RP`, home of the cover cache.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        let home = dirs::home_dir();
        resolve_root(
            self.paths.cache_root.as_deref(),
            std::env::var_os("XDG_CACHE_HOME"),
            home.as_deref(),
            ".cache",
        )
        .map(|root| root.join(APP_DIR))
    }

    /// `<data root>/RP`, home of the history log.
    pub fn data_dir(&self) -> Option<PathBuf> {
        let home = dirs::home_dir();
        resolve_root(
            self.paths.data_root.as_deref(),
            std::env::var_os("XDG_DATA_HOME"),
            home.as_deref(),
            ".local/share",
        )
        .map(|root| root.join(APP_DIR))
    }
}

/// Pick a data root: config override, then the XDG variable, then
/// `home/fallback`. Empty variables count as unset; `~` is expanded.
pub fn resolve_root(
    configured: Option<&Path>,
    env_value: Option<OsString>,
    home: Option<&Path>,
    fallback: &str,
) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(expand_home(path, home));
    }
    match env_value.filter(|v| !v.is_empty()) {
        Some(value) => Some(expand_home(Path::new(&value), home)),
        None => home.map(|h| h.join(fallback)),
    }
}

fn expand_home(path: &Path, home: Option<&Path>) -> PathBuf {
    match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("rp"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::debug!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match load_from(&path) {
        Ok(config) => {
            tracing::debug!("Loaded config from {:?}", path);
            config
        }
        Err(e) => {
            tracing::warn!("{}; using default configuration", e);
            Config::default()
        }
    }
}

/// Read and parse one config file.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    let contents =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))
}

/// Write `config` to `path` atomically (temp file, then rename).
pub fn save_to(config: &Config, path: &Path) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    let contents = to_toml(config)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(path.to_path_buf())
}

/// Pretty TOML rendering of `config`.
pub fn to_toml(config: &Config) -> Result<String, ConfigError> {
    toml::to_string_pretty(config).map_err(ConfigError::Serialize)
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {0}: {1}")]
    Read(PathBuf, std::io::Error),

    #[error("Failed to parse config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_serializes() {
        let toml = to_toml(&Config::default()).unwrap();
        assert!(toml.contains("[playback]"));
        assert!(toml.contains("[covers]"));
        assert!(toml.contains(DEFAULT_PLAYLIST_URL));
        assert!(toml.contains("program = \"mplayer\""));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rp").join("config.toml");

        let mut config = Config::default();
        config.playback.backend = BackendPreference::External;
        config.playback.decoder.program = "mpv".to_string();
        config.covers.size = SizePreference::Large;
        config.paths.cache_root = Some(PathBuf::from("/var/cache"));

        assert_eq!(save_to(&config, &path).unwrap(), path);
        assert_eq!(load_from(&path).unwrap(), config);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let toml = r#"
[covers]
size = "small"
cache = false
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.covers.size, SizePreference::Small);
        assert!(!config.covers.cache);
        assert_eq!(config.playback.playlist_url, DEFAULT_PLAYLIST_URL);
        assert_eq!(config.playback.backend, BackendPreference::Auto);
        assert_eq!(config.playback.decoder.args, vec!["-vo", "null", "-quiet", "-softvol"]);
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[covers]\nsize = \"huge\"\n").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse(..))));

        let missing = temp.path().join("missing.toml");
        assert!(matches!(load_from(&missing), Err(ConfigError::Read(..))));
    }

    #[test]
    fn test_resolve_root_precedence() {
        let home = Path::new("/home/u");

        // Config override wins.
        assert_eq!(
            resolve_root(Some(Path::new("/srv/rp")), Some("/xdg".into()), Some(home), ".cache"),
            Some(PathBuf::from("/srv/rp"))
        );
        // Then the XDG variable.
        assert_eq!(
            resolve_root(None, Some("/xdg/cache".into()), Some(home), ".cache"),
            Some(PathBuf::from("/xdg/cache"))
        );
        // Empty variable falls back to the home default.
        assert_eq!(
            resolve_root(None, Some("".into()), Some(home), ".local/share"),
            Some(PathBuf::from("/home/u/.local/share"))
        );
        assert_eq!(resolve_root(None, None, None, ".cache"), None);
    }

    #[test]
    fn test_resolve_root_expands_tilde() {
        let home = Path::new("/home/u");
        assert_eq!(
            resolve_root(None, Some("~/xdg".into()), Some(home), ".cache"),
            Some(PathBuf::from("/home/u/xdg"))
        );
        assert_eq!(
            resolve_root(Some(Path::new("~")), None, Some(home), ".cache"),
            Some(PathBuf::from("/home/u"))
        );
    }

    #[test]
    fn test_dirs_end_in_app_dir() {
        let mut config = Config::default();
        config.paths.cache_root = Some(PathBuf::from("/c"));
        config.paths.data_root = Some(PathBuf::from("/d"));
        assert_eq!(config.cache_dir(), Some(PathBuf::from("/c/RP")));
        assert_eq!(config.data_dir(), Some(PathBuf::from("/d/RP")));
    }
}

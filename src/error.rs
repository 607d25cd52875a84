//! Application-wide error types.
//!
//! This module provides a unified error hierarchy for the application.
//! Library modules use specific error types via `thiserror`, while
//! CLI/main uses `anyhow` for convenient error propagation.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`FetchError`], [`BackendError`]) for
//!   detailed handling close to where they happen
//! - All errors implement `std::error::Error` for compatibility
//!
//! # Example
//!
//! ```ignore
//! use rp::error::{Error, Result};
//!
//! fn start(url: &str) -> Result<()> {
//!     let playlist = Playlist::load(&client, url)?; // Playlist errors auto-convert
//!     let backend = select_backend(...)?;          // Backend errors auto-convert
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;

pub use crate::backend::BackendError;
pub use crate::config::ConfigError;
pub use crate::http::FetchError;
pub use crate::playlist::PlaylistError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network fetch error
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Playlist could not be loaded
    #[error("Playlist error: {0}")]
    Playlist(#[from] PlaylistError),

    /// Playback backend error
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Every event source went away while a track was still playing
    #[error("Event channel closed while playing {uri}")]
    EventsClosed { uri: String },

    /// Cover cache directory could not be prepared
    #[error("Cover cache unavailable at {path}: {source}")]
    CoverCache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create a cover cache error.
    pub fn cover_cache(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::CoverCache {
            path: path.into(),
            source,
        }
    }

    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Io(e).context(ctx))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, BackendError> {
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Backend(e).context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::cover_cache(
            "/cache/RP/covers",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/cache/RP/covers"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::EventsClosed {
            uri: "http://stream".to_string(),
        }
        .context("while playing track 2");
        let msg = err.to_string();
        assert!(msg.contains("while playing track 2"));
        assert!(msg.contains("http://stream"));
    }

    #[test]
    fn test_playlist_error_converts() {
        let err: Error = PlaylistError::Empty {
            url: "http://example/list.m3u".to_string(),
        }
        .into();
        assert!(err.to_string().contains("list.m3u"));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), BackendError> = Err(BackendError::PipelineTooOld {
            found: "1.0.0".to_string(),
            required: "1.1.0".to_string(),
        });
        let with_ctx = result.with_context("constructing native backend");
        assert!(with_ctx.unwrap_err().to_string().contains("constructing native backend"));
    }
}

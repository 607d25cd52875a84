//! Playlist loading.
//!
//! A playlist document is plain text, one stream URI per line. Blank
//! lines and `#` comment lines (including M3U `#EXTINF` headers) are
//! skipped. The result is immutable once built.

use std::ops::Index;

use crate::http::{FetchError, HttpClient};

/// Errors that prevent a playlist from being built.
#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("Failed to fetch playlist: {0}")]
    Fetch(#[from] FetchError),

    #[error("Playlist at {url} contains no playable entries")]
    Empty { url: String },
}

/// Ordered, non-empty sequence of track URIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Playlist {
    tracks: Vec<String>,
}

impl Playlist {
    /// Fetch and parse the playlist at `url`.
    pub fn load(client: &dyn HttpClient, url: &str) -> Result<Self, PlaylistError> {
        let body = client.get(url)?;
        let text = String::from_utf8_lossy(&body);
        let playlist = Self::parse(&text).ok_or_else(|| PlaylistError::Empty {
            url: url.to_string(),
        })?;
        tracing::info!(url, tracks = playlist.len(), "Loaded playlist");
        Ok(playlist)
    }

    /// Parse a playlist document. Returns `None` when nothing playable
    /// remains after filtering.
    pub fn parse(text: &str) -> Option<Self> {
        let tracks: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        if tracks.is_empty() {
            None
        } else {
            Some(Self { tracks })
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Always false for a constructed playlist; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.tracks.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tracks.iter().map(String::as_str)
    }
}

impl Index<usize> for Playlist {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.tracks[index]
    }
}

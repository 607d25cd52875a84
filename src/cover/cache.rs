//! Cover art disk cache.
//!
//! Caches fetched cover art to avoid repeated network requests.
//! Uses the basename of the cover URL as the cache key, so the same
//! cover announced twice is only downloaded once, across runs.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{CoverFetcher, SizePreference, resolve_to};
use crate::http::HttpClient;

/// Cover fetcher backed by `<cache_dir>/covers/`.
pub struct CachedCoverFetcher {
    cover_dir: PathBuf,
    http: Arc<dyn HttpClient>,
    size: SizePreference,
}

impl CachedCoverFetcher {
    /// Create the fetcher, creating `<cache_dir>/covers` eagerly.
    ///
    /// Directory creation errors are returned so the caller can fall back
    /// to a temporary fetcher.
    pub fn new(
        cache_dir: impl AsRef<Path>,
        http: Arc<dyn HttpClient>,
        size: SizePreference,
    ) -> std::io::Result<Self> {
        let cover_dir = cache_dir.as_ref().join("covers");
        fs::create_dir_all(&cover_dir)?;
        Ok(Self {
            cover_dir,
            http,
            size,
        })
    }

    /// Directory the covers are stored in.
    pub fn cover_dir(&self) -> &Path {
        &self.cover_dir
    }

    /// Cache path for a cover URL.
    fn cache_path(&self, img_url: &str) -> Option<PathBuf> {
        url_basename(img_url).map(|name| self.cover_dir.join(name))
    }

    /// Clear all cached covers.
    pub fn clear(&self) -> Result<usize, std::io::Error> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cover_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Get the total size of the cache in bytes.
    pub fn size_bytes(&self) -> u64 {
        fs::read_dir(&self.cover_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .filter(|m| m.is_file())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }
}

impl CoverFetcher for CachedCoverFetcher {
    fn get_image(&self, img_url: &str) -> Option<PathBuf> {
        let Some(path) = self.cache_path(img_url) else {
            tracing::debug!(target: "rp::cover", url = img_url, "Cover URL has no file name, not cacheable");
            return None;
        };

        if path.is_file() {
            tracing::debug!(target: "rp::cover", path = %path.display(), "Cover cache hit");
            return Some(path);
        }

        resolve_to(self.http.as_ref(), self.size, img_url, &path)
    }
}

/// Last path segment of a URL (`.../covers/m/B000002OOG.jpg` -> `B000002OOG.jpg`).
///
/// Query strings and fragments are not part of the name.
fn url_basename(url: &str) -> Option<String> {
    let name = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url.rsplit('/').next().map(str::to_string),
    };
    name.filter(|n| !n.is_empty() && n != "." && n != "..")
}

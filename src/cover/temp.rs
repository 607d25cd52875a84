//! Scratch-file cover fetcher, used when no cache directory is available.

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempPath;

use super::{CoverFetcher, SizePreference, resolve_to};
use crate::http::HttpClient;

/// Writes every cover to the same uniquely named scratch file.
///
/// The file is removed when the fetcher is dropped (if it still exists).
pub struct TemporaryCoverFetcher {
    path: TempPath,
    http: Arc<dyn HttpClient>,
    size: SizePreference,
}

impl TemporaryCoverFetcher {
    pub fn new(http: Arc<dyn HttpClient>, size: SizePreference) -> std::io::Result<Self> {
        let path = tempfile::Builder::new()
            .prefix("rp-cover-")
            .suffix(".jpg")
            .tempfile()?
            .into_temp_path();
        tracing::debug!(target: "rp::cover", path = %path.display(), "Using temporary cover file");
        Ok(Self { path, http, size })
    }
}

impl CoverFetcher for TemporaryCoverFetcher {
    fn get_image(&self, img_url: &str) -> Option<PathBuf> {
        resolve_to(self.http.as_ref(), self.size, img_url, &self.path)
    }
}

//! Cover art resolution and caching.
//!
//! Now-playing updates carry a cover-art URL. This module turns that URL
//! into a local image file the render sink can display:
//!
//! 1. **Candidates** - a preferred-size variant of the URL (when the URL
//!    uses the medium-size path marker), then the original URL
//! 2. **Fetch** - the first candidate that downloads and is larger than a
//!    placeholder wins
//! 3. **Persist** - the payload is written to the fetcher's target path
//!
//! Two fetchers implement [`CoverFetcher`]:
//!
//! - [`CachedCoverFetcher`] keeps covers under `<cache>/covers/` across runs
//! - [`TemporaryCoverFetcher`] reuses one scratch file removed on drop
//!
//! # Design Principles
//!
//! - **Graceful degradation**: Missing art is fine, just returns None
//! - **Blocking**: Fetching runs on the caller's thread with no timeout

mod cache;
mod temp;

pub use cache::CachedCoverFetcher;
pub use temp::TemporaryCoverFetcher;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::http::HttpClient;

/// Payloads at or below this size are 1x1 placeholder GIFs, not covers.
pub const PLACEHOLDER_MAX_BYTES: usize = 807;

/// Path marker of the medium-size cover variant.
pub const MEDIUM_MARKER: &str = "graphics/covers/m";

/// Preferred cover size, fixed at startup.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SizePreference {
    /// Use the URL as announced
    #[default]
    None,
    /// Try the small variant first
    #[value(alias = "s")]
    Small,
    /// Try the large variant first
    #[value(alias = "l")]
    Large,
}

impl SizePreference {
    /// Path marker replacing [`MEDIUM_MARKER`], if any.
    pub fn marker(self) -> Option<&'static str> {
        match self {
            SizePreference::None => None,
            SizePreference::Small => Some("graphics/covers/s"),
            SizePreference::Large => Some("graphics/covers/l"),
        }
    }
}

/// Resolves a cover-art URL to a local file.
pub trait CoverFetcher: Send {
    /// Local path of the image, or `None` if no candidate produced one.
    fn get_image(&self, img_url: &str) -> Option<PathBuf>;
}

/// Ordered candidate URLs for `img_url`.
///
/// Substitution only happens for URLs containing [`MEDIUM_MARKER`]; the
/// original URL is always the last resort.
pub fn candidate_urls(img_url: &str, size: SizePreference) -> Vec<String> {
    match size.marker() {
        Some(marker) if img_url.contains(MEDIUM_MARKER) => {
            vec![img_url.replace(MEDIUM_MARKER, marker), img_url.to_string()]
        }
        _ => vec![img_url.to_string()],
    }
}

/// Download the first candidate that is a real image.
///
/// Network errors and placeholder-sized payloads move on to the next
/// candidate; nothing here is reported upwards.
fn fetch_first_real(http: &dyn HttpClient, candidates: &[String]) -> Option<Vec<u8>> {
    for url in candidates {
        match http.get(url) {
            Ok(data) if data.len() <= PLACEHOLDER_MAX_BYTES => {
                tracing::debug!(target: "rp::cover", url = %url, bytes = data.len(), "Skipping placeholder image");
            }
            Ok(data) => return Some(data),
            Err(e) => {
                tracing::debug!(target: "rp::cover", url = %url, error = %e, "Cover candidate failed");
            }
        }
    }
    None
}

/// Shared fetch-then-persist algorithm used by both fetchers.
fn resolve_to(
    http: &dyn HttpClient,
    size: SizePreference,
    img_url: &str,
    target: &Path,
) -> Option<PathBuf> {
    let candidates = candidate_urls(img_url, size);
    let data = fetch_first_real(http, &candidates)?;

    if let Err(e) = write_atomic(target, &data) {
        tracing::warn!(target: "rp::cover", path = %target.display(), error = %e, "Failed to write cover");
        return None;
    }

    tracing::debug!(target: "rp::cover", path = %target.display(), bytes = data.len(), "Stored cover");
    Some(target.to_path_buf())
}

/// Write `data` next to `target`, then rename it into place.
///
/// A failed write never leaves a partial file at `target`; the scratch
/// file is removed when it is dropped.
fn write_atomic(target: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match target.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::Builder::new()
        .prefix(".rp-cover-")
        .tempfile_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

/// Open the cover cache under `cache_dir`, or fall back to a scratch file.
///
/// `cache_dir = None` means caching is disabled.
pub fn open_fetcher(
    cache_dir: Option<&Path>,
    http: Arc<dyn HttpClient>,
    size: SizePreference,
) -> std::io::Result<Box<dyn CoverFetcher>> {
    if let Some(dir) = cache_dir {
        match CachedCoverFetcher::new(dir, Arc::clone(&http), size) {
            Ok(fetcher) => return Ok(Box::new(fetcher)),
            Err(e) => {
                tracing::warn!(
                    target: "rp::cover",
                    error = %e,
                    "Cover cache unavailable, using a temporary file"
                );
            }
        }
    }
    Ok(Box::new(TemporaryCoverFetcher::new(http, size)?))
}

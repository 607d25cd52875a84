//! Test utilities and fixtures for rp tests.
//!
//! This module provides in-memory stand-ins for the external
//! collaborators (HTTP, render sinks, playback backends) so the
//! orchestration logic can be tested without a network or a decoder.
//!
//! # Example
//!
//! ```ignore
//! use crate::test_utils::{MockHttp, jpeg_of_size};
//!
//! let http = MockHttp::new().with_body("http://host/a.jpg", jpeg_of_size(900));
//! let fetcher = TemporaryCoverFetcher::new(Arc::new(http), SizePreference::None)?;
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use crate::backend::{BackendError, BackendEvent, BackendKind, PlaybackBackend};
use crate::cover::CoverFetcher;
use crate::http::{FetchError, HttpClient};
use crate::player::NowPlayingSink;

/// In-memory HTTP client that records every request.
///
/// URLs without a configured response answer `404`.
#[derive(Default)]
pub struct MockHttp {
    responses: HashMap<String, Result<Vec<u8>, FetchError>>,
    requests: Mutex<Vec<String>>,
}

impl MockHttp {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    pub fn with_body(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(url.to_string(), Ok(body));
        self
    }

    /// Fail `url` with a network error.
    pub fn with_network_error(mut self, url: &str) -> Self {
        self.responses
            .insert(url.to_string(), Err(FetchError::network(url, "connection reset")));
        self
    }

    /// All URLs requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    /// How many times `url` was requested.
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.lock().iter().filter(|u| *u == url).count()
    }
}

impl HttpClient for MockHttp {
    fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.requests.lock().push(url.to_string());
        self.responses.get(url).cloned().unwrap_or_else(|| {
            Err(FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        })
    }
}

/// A JPEG-looking payload of exactly `len` bytes.
pub fn jpeg_of_size(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    if len >= 2 {
        data[0] = 0xFF;
        data[1] = 0xD8;
    }
    data
}

/// What a [`RecordingSink`] was asked to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Preview { artist: String, song: String },
    Show { artist: String, song: String, image: Option<PathBuf> },
    Diagnostic(String),
}

/// Render sink that remembers every call.
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<Rendered>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Rendered> {
        self.calls.lock().clone()
    }
}

impl NowPlayingSink for RecordingSink {
    fn preview(&mut self, artist: &str, song: &str) {
        self.calls.lock().push(Rendered::Preview {
            artist: artist.to_string(),
            song: song.to_string(),
        });
    }

    fn show(&mut self, artist: &str, song: &str, image: Option<&Path>) {
        self.calls.lock().push(Rendered::Show {
            artist: artist.to_string(),
            song: song.to_string(),
            image: image.map(Path::to_path_buf),
        });
    }

    fn diagnostic(&mut self, message: &str) {
        self.calls.lock().push(Rendered::Diagnostic(message.to_string()));
    }
}

/// Backend that records `play`/`stop` calls instead of playing.
///
/// Events are injected by the test through the sender it was built with.
#[derive(Clone)]
pub struct ScriptedBackend {
    kind: BackendKind,
    played: Arc<Mutex<Vec<String>>>,
    stops: Arc<Mutex<usize>>,
    fail_play: bool,
    _events: Sender<BackendEvent>,
}

impl ScriptedBackend {
    pub fn new(kind: BackendKind, events: Sender<BackendEvent>) -> Self {
        Self {
            kind,
            played: Arc::new(Mutex::new(Vec::new())),
            stops: Arc::new(Mutex::new(0)),
            fail_play: false,
            _events: events,
        }
    }

    /// Every `play` call fails like a missing decoder binary.
    pub fn failing(mut self) -> Self {
        self.fail_play = true;
        self
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().clone()
    }

    pub fn stop_count(&self) -> usize {
        *self.stops.lock()
    }
}

impl PlaybackBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn play(&mut self, uri: &str) -> Result<(), BackendError> {
        if self.fail_play {
            return Err(BackendError::Spawn {
                program: "mplayer".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            });
        }
        self.played.lock().push(uri.to_string());
        Ok(())
    }

    fn stop(&mut self) {
        *self.stops.lock() += 1;
    }
}

/// Cover fetcher that returns a fixed answer and counts lookups.
#[derive(Clone, Default)]
pub struct FixedCoverFetcher {
    answer: Option<PathBuf>,
    lookups: Arc<Mutex<Vec<String>>>,
}

impl FixedCoverFetcher {
    pub fn answering(answer: Option<PathBuf>) -> Self {
        Self {
            answer,
            lookups: Arc::default(),
        }
    }

    pub fn lookups(&self) -> Vec<String> {
        self.lookups.lock().clone()
    }
}

impl CoverFetcher for FixedCoverFetcher {
    fn get_image(&self, img_url: &str) -> Option<PathBuf> {
        self.lookups.lock().push(img_url.to_string());
        self.answer.clone()
    }
}

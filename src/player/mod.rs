//! Playlist orchestration.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Player (orchestrator thread)                   │
//! │   owns Playlist, backend, cover fetcher, history log, sink      │
//! └───────────────┬─────────────────────────────────┬───────────────┘
//!                 │ play(uri) / stop()              ▲ BackendEvent
//!                 ▼                                 │ (crossbeam)
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              PlaybackBackend (native or external)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! For every now-playing update the player logs history (when a cover URL
//! is known), renders a preview, resolves the cover (blocking), then
//! renders the final update. End of stream advances to the next playlist
//! entry until the playlist is exhausted.

mod history;
mod sink;
mod state;

pub use history::{HistoryLog, LogEntry};
pub use sink::ConsoleSink;
pub use state::{Control, Outcome, PlayerState};

use std::path::Path;

use crossbeam_channel::{Receiver, select};

use crate::backend::{BackendEvent, BackendKind, PlaybackBackend};
use crate::cover::CoverFetcher;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::NowPlaying;
use crate::playlist::Playlist;

/// Receives now-playing updates for display.
pub trait NowPlayingSink {
    /// Quick update before the cover is fetched.
    fn preview(&mut self, artist: &str, song: &str);

    /// Final update, with the cover image if one was resolved.
    fn show(&mut self, artist: &str, song: &str, image: Option<&Path>);

    /// A non-fatal playback problem.
    fn diagnostic(&mut self, message: &str) {
        let _ = message;
    }
}

/// Plays a playlist from start to end through one backend.
pub struct Player {
    playlist: Playlist,
    backend: Box<dyn PlaybackBackend>,
    fetcher: Box<dyn CoverFetcher>,
    history: Option<HistoryLog>,
    sink: Box<dyn NowPlayingSink>,
    state: PlayerState,
}

impl Player {
    pub fn new(
        playlist: Playlist,
        backend: Box<dyn PlaybackBackend>,
        fetcher: Box<dyn CoverFetcher>,
        sink: Box<dyn NowPlayingSink>,
    ) -> Self {
        Self {
            playlist,
            backend,
            fetcher,
            history: None,
            sink,
            state: PlayerState::Idle,
        }
    }

    /// Log played tracks to `history`.
    pub fn with_history(mut self, history: Option<HistoryLog>) -> Self {
        self.history = history;
        self
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Start with the first playlist entry.
    pub fn play(&mut self) -> Result<()> {
        self.play_index(0)
    }

    fn play_index(&mut self, index: usize) -> Result<()> {
        let Some(uri) = self.playlist.get(index) else {
            self.state = PlayerState::Terminated;
            return Ok(());
        };

        tracing::info!(
            track = index + 1,
            total = self.playlist.len(),
            uri,
            "Playing"
        );
        self.backend
            .play(uri)
            .with_context(format!("Failed to play {uri}"))?;
        self.state = PlayerState::Playing(index);
        Ok(())
    }

    /// React to one backend event.
    pub fn handle_event(&mut self, event: BackendEvent) -> Result<Control> {
        if self.state.is_terminated() {
            tracing::debug!(?event, "Ignoring event after termination");
            return Ok(Control::Finished);
        }

        match event {
            BackendEvent::NowPlaying(now_playing) => {
                self.now_playing(&now_playing);
                Ok(Control::Continue)
            }
            BackendEvent::EndOfStream => self.end_of_stream(),
            BackendEvent::Error(message) => {
                tracing::warn!(error = %message, "Playback error, track stopped");
                self.sink.diagnostic(&message);
                Ok(Control::Continue)
            }
        }
    }

    fn now_playing(&mut self, now_playing: &NowPlaying) {
        let NowPlaying {
            artist,
            song,
            cover_url,
        } = now_playing;
        tracing::info!(%artist, %song, cover = cover_url.as_deref().unwrap_or(""), "Now playing");

        if let (Some(url), Some(history)) = (cover_url, &self.history) {
            if let Err(e) = history.append(&LogEntry::now(url, artist, song)) {
                tracing::warn!(path = %history.path().display(), error = %e, "Failed to write history");
            }
        }

        self.sink.preview(artist, song);
        let image = cover_url.as_deref().and_then(|url| self.fetcher.get_image(url));
        self.sink.show(artist, song, image.as_deref());
    }

    fn end_of_stream(&mut self) -> Result<Control> {
        let next = match self.state {
            PlayerState::Playing(index) => index + 1,
            PlayerState::Idle => 0,
            PlayerState::Terminated => return Ok(Control::Finished),
        };

        if next >= self.playlist.len() {
            tracing::info!("Playlist finished");
            self.state = PlayerState::Terminated;
            return Ok(Control::Finished);
        }

        self.play_index(next)?;
        Ok(Control::Continue)
    }

    /// Stop playback for good.
    pub fn stop(&mut self) {
        self.backend.stop();
        self.state = PlayerState::Terminated;
    }

    /// Handle backend events until the playlist ends or `interrupt` fires.
    ///
    /// A disconnected interrupt channel only disables interruption.
    pub fn run(
        &mut self,
        events: &Receiver<BackendEvent>,
        interrupt: &Receiver<()>,
    ) -> Result<Outcome> {
        let mut interrupt = interrupt.clone();

        loop {
            let mut listener_gone = false;
            select! {
                recv(events) -> event => match event {
                    Ok(event) => {
                        if self.handle_event(event)? == Control::Finished {
                            return Ok(Outcome::Finished);
                        }
                    }
                    Err(_) => {
                        let uri = self
                            .state
                            .index()
                            .and_then(|i| self.playlist.get(i))
                            .unwrap_or_default()
                            .to_string();
                        return Err(Error::EventsClosed { uri });
                    }
                },
                recv(interrupt) -> signal => match signal {
                    Ok(()) => {
                        tracing::info!("Interrupted, stopping playback");
                        self.stop();
                        return Ok(Outcome::Interrupted);
                    }
                    Err(_) => {
                        tracing::warn!("Interrupt listener gone, signals will not stop playback cleanly");
                        listener_gone = true;
                    }
                },
            }
            if listener_gone {
                interrupt = crossbeam_channel::never();
            }
        }
    }
}

//! In-process pipeline backend.
//!
//! The pipeline reports what happens on its stream as [`BusMessage`]s. A
//! bus-watch thread translates them into [`BackendEvent`]s:
//!
//! - `Tag` with `title` and/or `homepage` -> `NowPlaying`
//! - `Eos` -> `EndOfStream`
//! - `Error` -> pipeline stopped, then `Error`

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use super::{BackendError, BackendEvent, BackendKind, PlaybackBackend};
use crate::metadata::{TagList, now_playing_from_tags};

/// Oldest demuxer that exposes the stream URL as the `homepage` tag.
pub const MIN_DEMUXER_VERSION: Version = Version::new(0, 10, 27);

/// `major.minor.patch` component version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = String;

    /// Missing trailing components count as zero (`"1.2"` is `1.2.0`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = [0u32; 3];
        let mut count = 0;
        for (slot, piece) in parts.iter_mut().zip(s.trim().split('.')) {
            *slot = piece
                .parse()
                .map_err(|_| format!("invalid version component '{piece}' in '{s}'"))?;
            count += 1;
        }
        if count == 0 || s.trim().split('.').count() > 3 {
            return Err(format!("invalid version '{s}'"));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

/// Pipeline run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Stopped, resources released
    Null,
    Playing,
}

/// Message posted on a pipeline's bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    Tag(TagList),
    Eos,
    Error(String),
}

/// A streaming pipeline that reports through a message bus.
///
/// Methods take `&self`: the bus-watch thread stops the pipeline while
/// the backend owns it.
pub trait Pipeline: Send + Sync {
    /// Version of the stream-demuxing component.
    fn demuxer_version(&self) -> Version;

    fn set_uri(&self, uri: &str);

    fn set_state(&self, state: PipelineState) -> Result<(), BackendError>;

    /// Receiving end of the pipeline's bus.
    fn bus(&self) -> Receiver<BusMessage>;
}

/// Backend driving a [`Pipeline`].
pub struct NativePipelineBackend {
    pipeline: Arc<dyn Pipeline>,
    _watch: JoinHandle<()>,
}

impl NativePipelineBackend {
    /// Wrap `pipeline`, checking its demuxer first.
    ///
    /// Fails with [`BackendError::PipelineTooOld`] when the demuxer cannot
    /// report cover-art URLs.
    pub fn new(
        pipeline: Arc<dyn Pipeline>,
        events: Sender<BackendEvent>,
    ) -> Result<Self, BackendError> {
        let found = pipeline.demuxer_version();
        if found < MIN_DEMUXER_VERSION {
            return Err(BackendError::PipelineTooOld {
                found: found.to_string(),
                required: MIN_DEMUXER_VERSION.to_string(),
            });
        }
        tracing::debug!(target: "rp::backend", version = %found, "Stream demuxer accepted");

        let bus = pipeline.bus();
        // Weak: the watcher must not keep the pipeline (and its bus) alive.
        let weak = Arc::downgrade(&pipeline);
        let watch = thread::Builder::new()
            .name("pipeline-bus".to_string())
            .spawn(move || watch_bus(bus, weak, events))
            .map_err(BackendError::Thread)?;

        Ok(Self {
            pipeline,
            _watch: watch,
        })
    }
}

impl PlaybackBackend for NativePipelineBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NativePipeline
    }

    fn play(&mut self, uri: &str) -> Result<(), BackendError> {
        self.pipeline.set_state(PipelineState::Null)?;
        self.pipeline.set_uri(uri);
        self.pipeline.set_state(PipelineState::Playing)?;
        tracing::info!(target: "rp::backend", uri, "Pipeline playing");
        Ok(())
    }

    fn stop(&mut self) {
        if let Err(e) = self.pipeline.set_state(PipelineState::Null) {
            tracing::warn!(target: "rp::backend", error = %e, "Failed to stop pipeline");
        }
    }
}

impl Drop for NativePipelineBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bus-watch loop. Ends when the bus closes or the player stops listening.
fn watch_bus(bus: Receiver<BusMessage>, pipeline: Weak<dyn Pipeline>, events: Sender<BackendEvent>) {
    for message in bus.iter() {
        let event = match message {
            BusMessage::Tag(tags) => match now_playing_from_tags(&tags) {
                Some(now_playing) => BackendEvent::NowPlaying(now_playing),
                None => {
                    tracing::debug!(target: "rp::backend", ?tags, "Tag message without usable metadata");
                    continue;
                }
            },
            BusMessage::Eos => BackendEvent::EndOfStream,
            BusMessage::Error(message) => {
                tracing::error!(target: "rp::backend", error = %message, "Pipeline error");
                if let Some(pipeline) = pipeline.upgrade() {
                    if let Err(e) = pipeline.set_state(PipelineState::Null) {
                        tracing::warn!(target: "rp::backend", error = %e, "Failed to stop pipeline after error");
                    }
                }
                BackendEvent::Error(message)
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }
    tracing::debug!(target: "rp::backend", "Pipeline bus closed");
}

//! Playback backends.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────┐
//! │  NativePipelineBackend   │        │   ExternalProcessBackend     │
//! │  Pipeline bus messages   │        │   decoder stdout lines       │
//! │  (Tag / Eos / Error)     │        │   ("ICY Info: ...")          │
//! └────────────┬─────────────┘        └──────────────┬───────────────┘
//!              │ bus-watch thread                    │ reader thread
//!              ▼                                     ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │        BackendEvent channel (crossbeam, unbounded)              │
//! │     NowPlaying(NowPlaying) | EndOfStream | Error(String)        │
//! └────────────────────────────────┬────────────────────────────────┘
//!                                  ▼
//!                        Player (orchestrator thread)
//! ```
//!
//! Each backend plays at most one track at a time. `play` switches
//! tracks, `stop` halts the current one without raising `EndOfStream`.

mod audio;
mod external;
mod icy;
mod native;

pub use external::{DecoderCommand, ExternalProcessBackend};
pub use icy::{AudioOutput, IcyPipeline};
pub use native::{BusMessage, NativePipelineBackend, Pipeline, PipelineState, Version};

use serde::{Deserialize, Serialize};

use crate::metadata::NowPlaying;

/// Normalized event raised by any backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// Metadata changed for the current track
    NowPlaying(NowPlaying),
    /// The current track finished
    EndOfStream,
    /// The current track failed; playback of it has stopped
    Error(String),
}

/// Which backend variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NativePipeline,
    ExternalProcess,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::NativePipeline => write!(f, "native pipeline"),
            BackendKind::ExternalProcess => write!(f, "external process"),
        }
    }
}

/// Backend choice from config or command line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Native pipeline, falling back to the external decoder when it
    /// cannot be built (no sound device, demuxer too old)
    #[default]
    Auto,
    /// Native pipeline only
    Native,
    /// External decoder only
    External,
}

/// Backend errors.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Stream demuxer version {found} is too old to get cover art (need {required})")]
    PipelineTooOld { found: String, required: String },

    #[error("Native pipeline unavailable: {0}")]
    PipelineUnavailable(String),

    #[error("Unable to run {program}. Do you have it installed on your system? ({source})")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No stream URI set on the pipeline")]
    NoUri,

    #[error("Failed to start backend thread: {0}")]
    Thread(#[source] std::io::Error),
}

/// A playback engine for one track at a time.
pub trait PlaybackBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Begin playing `uri`, replacing whatever was playing.
    fn play(&mut self, uri: &str) -> Result<(), BackendError>;

    /// Halt playback without raising `EndOfStream`.
    fn stop(&mut self);
}

/// Pick a backend according to `preference`.
///
/// With [`BackendPreference::Auto`] the native pipeline is tried once; any
/// construction failure falls back to the external decoder. The choice is
/// not revisited per track.
pub fn select_backend<N, E>(
    preference: BackendPreference,
    native: N,
    external: E,
) -> Result<Box<dyn PlaybackBackend>, BackendError>
where
    N: FnOnce() -> Result<Box<dyn PlaybackBackend>, BackendError>,
    E: FnOnce() -> Result<Box<dyn PlaybackBackend>, BackendError>,
{
    let backend = match preference {
        BackendPreference::Native => native()?,
        BackendPreference::External => external()?,
        BackendPreference::Auto => match native() {
            Ok(backend) => backend,
            Err(e) => {
                tracing::warn!(error = %e, "Native pipeline unavailable, falling back to external decoder");
                external()?
            }
        },
    };
    tracing::info!(backend = %backend.kind(), "Selected playback backend");
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedBackend;

    fn too_old() -> BackendError {
        BackendError::PipelineTooOld {
            found: "0.9.0".to_string(),
            required: "1.1.0".to_string(),
        }
    }

    #[test]
    fn test_auto_prefers_native() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let native = ScriptedBackend::new(BackendKind::NativePipeline, tx.clone());
        let external = ScriptedBackend::new(BackendKind::ExternalProcess, tx);
        let backend = select_backend(
            BackendPreference::Auto,
            || Ok(Box::new(native) as Box<dyn PlaybackBackend>),
            || Ok(Box::new(external) as Box<dyn PlaybackBackend>),
        )
        .unwrap();
        assert_eq!(backend.kind(), BackendKind::NativePipeline);
    }

    #[test]
    fn test_auto_falls_back_to_external() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let external = ScriptedBackend::new(BackendKind::ExternalProcess, tx);
        let backend = select_backend(
            BackendPreference::Auto,
            || Err(too_old()),
            || Ok(Box::new(external) as Box<dyn PlaybackBackend>),
        )
        .unwrap();
        assert_eq!(backend.kind(), BackendKind::ExternalProcess);
    }

    #[test]
    fn test_forced_native_failure_is_fatal() {
        let result = select_backend(
            BackendPreference::Native,
            || Err(too_old()),
            || panic!("external must not be constructed"),
        );
        assert!(matches!(result, Err(BackendError::PipelineTooOld { .. })));
    }

    #[test]
    fn test_forced_external_skips_native() {
        let (tx, _rx) = crossbeam_channel::unbounded();
        let external = ScriptedBackend::new(BackendKind::ExternalProcess, tx);
        let backend = select_backend(
            BackendPreference::External,
            || panic!("native must not be constructed"),
            || Ok(Box::new(external) as Box<dyn PlaybackBackend>),
        )
        .unwrap();
        assert_eq!(backend.kind(), BackendKind::ExternalProcess);
    }

    #[test]
    fn test_spawn_error_message() {
        let err = BackendError::Spawn {
            program: "mplayer".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
        };
        assert!(err.to_string().starts_with("Unable to run mplayer."));
    }
}

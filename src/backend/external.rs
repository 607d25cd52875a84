//! External decoder backend.
//!
//! Runs one decoder process per track (`mplayer` by default) and scrapes
//! its stdout for `ICY Info:` lines. The process exiting is the end of
//! the track.

use std::io::{BufRead, BufReader, ErrorKind};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{BackendError, BackendEvent, BackendKind, PlaybackBackend};
use crate::metadata::parse_icy_line;

/// How often a decoder that closed stdout is checked for exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Decoder program and the arguments placed before the stream URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for DecoderCommand {
    fn default() -> Self {
        Self {
            program: "mplayer".to_string(),
            args: ["-vo", "null", "-quiet", "-softvol"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// One running decoder process.
struct Session {
    child: Arc<Mutex<Child>>,
    /// Set by `stop`; a stopped session never reports end of stream
    stopped: Arc<AtomicBool>,
}

/// Backend spawning a decoder subprocess per track.
pub struct ExternalProcessBackend {
    command: DecoderCommand,
    events: Sender<BackendEvent>,
    session: Option<Session>,
}

impl ExternalProcessBackend {
    pub fn new(command: DecoderCommand, events: Sender<BackendEvent>) -> Self {
        Self {
            command,
            events,
            session: None,
        }
    }
}

impl PlaybackBackend for ExternalProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalProcess
    }

    fn play(&mut self, uri: &str) -> Result<(), BackendError> {
        self.stop();

        let program = &self.command.program;
        let mut command = Command::new(program);
        command
            .args(&self.command.args)
            .arg(uri)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        // Own process group: Ctrl+C reaches rp only, which then stops the decoder.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: program.clone(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            kill_and_reap(&mut child);
            return Err(BackendError::Spawn {
                program: program.clone(),
                source: std::io::Error::other("decoder stdout was not captured"),
            });
        };

        let child = Arc::new(Mutex::new(child));
        let stopped = Arc::new(AtomicBool::new(false));

        let reader_child = Arc::clone(&child);
        let reader_stopped = Arc::clone(&stopped);
        let events = self.events.clone();
        let spawned = thread::Builder::new()
            .name("decoder-stdout".to_string())
            .spawn(move || read_output(stdout, &reader_child, &reader_stopped, &events));

        if let Err(e) = spawned {
            kill_and_reap(&mut child.lock());
            return Err(BackendError::Thread(e));
        }

        tracing::info!(target: "rp::backend", program = %program, uri, "Decoder started");
        self.session = Some(Session { child, stopped });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stopped.store(true, Ordering::SeqCst);
            kill_and_reap(&mut session.child.lock());
            tracing::debug!(target: "rp::backend", "Decoder stopped");
        }
    }
}

impl Drop for ExternalProcessBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

fn kill_and_reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        if e.kind() != ErrorKind::InvalidInput {
            tracing::warn!(target: "rp::backend", error = %e, "Failed to kill decoder");
        }
    }
    if let Err(e) = child.wait() {
        tracing::debug!(target: "rp::backend", error = %e, "Failed to reap decoder");
    }
}

/// Reader thread: forward metadata lines, then report the end of the track.
fn read_output(
    stdout: ChildStdout,
    child: &Mutex<Child>,
    stopped: &AtomicBool,
    events: &Sender<BackendEvent>,
) {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(target: "rp::backend", error = %e, "Decoder stdout read failed");
                break;
            }
        }

        let text = String::from_utf8_lossy(&line);
        if let Some(info) = parse_icy_line(text.trim_end()) {
            let now_playing = info.into_now_playing();
            tracing::debug!(target: "rp::backend", line = %now_playing.display_line(), "Decoder metadata");
            if events.send(BackendEvent::NowPlaying(now_playing)).is_err() {
                return;
            }
        }
    }

    // stdout closed; the process may still be shutting down.
    loop {
        if stopped.load(Ordering::SeqCst) {
            return;
        }
        match child.lock().try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(target: "rp::backend", %status, "Decoder exited");
                break;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(target: "rp::backend", error = %e, "Failed to poll decoder");
                break;
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }

    if !stopped.load(Ordering::SeqCst) {
        let _ = events.send(BackendEvent::EndOfStream);
    }
}

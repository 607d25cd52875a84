//! Playback command.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::backend::{
    self, AudioOutput, ExternalProcessBackend, IcyPipeline, NativePipelineBackend,
    PlaybackBackend,
};
use crate::config::Config;
use crate::cover::{self, CoverFetcher};
use crate::error::{Result, ResultExt};
use crate::http::{HttpClient, ReqwestClient};
use crate::player::{ConsoleSink, HistoryLog, NowPlayingSink, Outcome, Player};
use crate::playlist::Playlist;

/// Play the configured playlist until it ends or rp is interrupted.
pub fn cmd_play(config: &Config) -> anyhow::Result<()> {
    match start(config)? {
        Outcome::Finished => info!("Playlist finished"),
        Outcome::Interrupted => info!("Stopped"),
    }
    Ok(())
}

fn start(config: &Config) -> Result<Outcome> {
    let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new()?);
    let stores = prepare(config, http)?;

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let backend = backend::select_backend(
        config.playback.backend,
        || {
            let pipeline = Arc::new(IcyPipeline::new(config.playback.audio_output)?);
            let backend = NativePipelineBackend::new(pipeline, events_tx.clone())?;
            Ok(Box::new(backend) as Box<dyn PlaybackBackend>)
        },
        || {
            let backend =
                ExternalProcessBackend::new(config.playback.decoder.clone(), events_tx.clone());
            Ok(Box::new(backend) as Box<dyn PlaybackBackend>)
        },
    )?;
    // Only the backend may keep the channel open.
    drop(events_tx);

    // Keep stdout clean when it carries audio.
    let sink: Box<dyn NowPlayingSink> = match config.playback.audio_output {
        AudioOutput::Stdout => Box::new(ConsoleSink::stderr()),
        AudioOutput::Device | AudioOutput::Null => Box::new(ConsoleSink::stdout()),
    };

    let interrupt = spawn_interrupt_listener();
    let mut player =
        Player::new(stores.playlist, backend, stores.covers, sink).with_history(stores.history);
    player.play()?;
    player.run(&events_rx, &interrupt)
}

/// Everything a run needs besides the backend.
struct Prepared {
    playlist: Playlist,
    covers: Box<dyn CoverFetcher>,
    history: Option<HistoryLog>,
}

/// Load the playlist and open the cover and history stores.
///
/// Only the playlist is mandatory: an unusable cache directory degrades
/// to a scratch cover file and an unusable data directory to no history.
fn prepare(config: &Config, http: Arc<dyn HttpClient>) -> Result<Prepared> {
    let url = &config.playback.playlist_url;
    info!(url = %url, "Fetching playlist");
    let playlist = Playlist::load(http.as_ref(), url)?;

    let cache_dir = if config.covers.cache {
        config.cache_dir()
    } else {
        None
    };
    let covers = cover::open_fetcher(cache_dir.as_deref(), http, config.covers.size)
        .with_context("Failed to create a cover file")?;

    Ok(Prepared {
        playlist,
        covers,
        history: open_history(config.data_dir()),
    })
}

fn open_history(data_dir: Option<PathBuf>) -> Option<HistoryLog> {
    let Some(dir) = data_dir else {
        warn!("No data directory, history log disabled");
        return None;
    };
    match HistoryLog::open(&dir) {
        Ok(history) => Some(history),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "History log disabled");
            None
        }
    }
}

/// Fires once on Ctrl+C, a terminal hangup or a termination request.
///
/// Returns once the handlers are installed. If they cannot be, the
/// channel disconnects instead and the default signal behavior stays.
fn spawn_interrupt_listener() -> Receiver<()> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

    let spawned = thread::Builder::new()
        .name("signal".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!(error = %e, "Failed to start signal runtime");
                    return;
                }
            };

            runtime.block_on(async move {
                let mut signals = match Signals::install() {
                    Ok(signals) => signals,
                    Err(e) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };
                let _ = ready_tx.send(());

                let name = signals.recv().await;
                info!(signal = name, "Received signal");
                let _ = tx.send(());
            });
        });

    match spawned {
        // A dropped sender means the thread already logged why.
        Ok(_) => {
            let _ = ready_rx.recv();
        }
        Err(e) => warn!(error = %e, "Failed to spawn signal thread"),
    }
    rx
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.hangup.recv() => "SIGHUP",
        }
    }
}

#[cfg(windows)]
struct Signals {
    ctrl_c: tokio::signal::windows::CtrlC,
    close: tokio::signal::windows::CtrlClose,
}

#[cfg(windows)]
impl Signals {
    fn install() -> std::io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
            close: tokio::signal::windows::ctrl_close()?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.ctrl_c.recv() => "Ctrl+C",
            _ = self.close.recv() => "console close",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::test_utils::{MockHttp, jpeg_of_size};
    use std::fs;
    use tempfile::TempDir;

    const PLAYLIST: &str = "http://rp/list.m3u";
    const COVER: &str = "http://host/graphics/covers/m/X.jpg";

    fn http() -> Arc<dyn HttpClient> {
        Arc::new(
            MockHttp::new()
                .with_body(PLAYLIST, b"#EXTM3U\nhttp://stream/1\nhttp://stream/2\n".to_vec())
                .with_body(COVER, jpeg_of_size(900)),
        )
    }

    fn config_in(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.playback.playlist_url = PLAYLIST.to_string();
        config.paths.cache_root = Some(temp.path().join("cache"));
        config.paths.data_root = Some(temp.path().join("data"));
        config
    }

    #[test]
    fn test_prepare_opens_both_stores() {
        let temp = TempDir::new().unwrap();
        let prepared = prepare(&config_in(&temp), http()).unwrap();

        assert_eq!(prepared.playlist.len(), 2);
        let history = prepared.history.expect("history log");
        assert!(history.path().starts_with(temp.path().join("data").join("RP")));
        let image = prepared.covers.get_image(COVER).unwrap();
        assert!(image.starts_with(temp.path().join("cache").join("RP").join("covers")));
    }

    #[test]
    fn test_blocked_data_dir_disables_history() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        config.paths.data_root = Some(blocker);

        let prepared = prepare(&config, http()).unwrap();
        assert!(prepared.history.is_none());
        assert_eq!(prepared.playlist.len(), 2);
    }

    #[test]
    fn test_no_data_dir_disables_history() {
        assert!(open_history(None).is_none());
    }

    #[test]
    fn test_blocked_cache_dir_uses_scratch_file() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        let blocker = temp.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        config.paths.cache_root = Some(blocker.clone());

        let prepared = prepare(&config, http()).unwrap();
        let image = prepared.covers.get_image(COVER).unwrap();
        assert!(!image.starts_with(&blocker));
        assert_eq!(fs::read(&image).unwrap(), jpeg_of_size(900));
    }

    #[test]
    fn test_disabled_cache_writes_nothing_to_cache_root() {
        let temp = TempDir::new().unwrap();
        let mut config = config_in(&temp);
        config.covers.cache = false;

        let prepared = prepare(&config, http()).unwrap();
        let image = prepared.covers.get_image(COVER).unwrap();
        assert!(!image.starts_with(temp.path().join("cache")));
        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn test_empty_playlist_is_a_playlist_error() {
        let temp = TempDir::new().unwrap();
        let http: Arc<dyn HttpClient> =
            Arc::new(MockHttp::new().with_body(PLAYLIST, b"#EXTM3U\n".to_vec()));

        match prepare(&config_in(&temp), http) {
            Err(Error::Playlist(_)) => {}
            Err(other) => panic!("expected a playlist error, got {other}"),
            Ok(_) => panic!("expected a playlist error"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_hangup_fires_interrupt() {
        use std::time::Duration;

        let interrupt = spawn_interrupt_listener();
        let status = std::process::Command::new("kill")
            .args(["-HUP", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
        assert_eq!(interrupt.recv_timeout(Duration::from_secs(5)), Ok(()));
    }
}

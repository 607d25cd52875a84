//! ICY stream demuxing pipeline.
//!
//! Requests the stream with `Icy-MetaData: 1`. The server then interleaves
//! a metadata block after every `icy-metaint` bytes of audio:
//!
//! ```text
//! [metaint audio bytes][len byte][len*16 bytes "StreamTitle='..';StreamUrl='..';\0\0"]...
//! ```
//!
//! Metadata blocks become `Tag` messages on the bus. Audio bytes go to the
//! configured [`AudioOutput`]: the sound device (see [`super::audio`]), or
//! undecoded to stdout or nowhere.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::BackendError;
use super::audio::{self, AudioError};
use super::native::{BusMessage, Pipeline, PipelineState, Version};
use crate::metadata::{TagList, icy_block_to_tags};

/// Version reported by this demuxer; it maps `StreamUrl` to `homepage`.
pub const DEMUXER_VERSION: Version = Version::new(1, 0, 0);

const CHUNK_SIZE: usize = 8192;

/// Stream chunks buffered between the demuxer and the audio decoder.
const PIPE_CHUNKS: usize = 16;

/// Where demuxed audio bytes go.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioOutput {
    /// Decode and play on the default sound device
    #[default]
    Device,
    /// Discard the audio
    Null,
    /// Raw stream bytes on stdout, for piping into a player
    Stdout,
}

impl AudioOutput {
    /// Raw byte destination; `None` for the sound device.
    fn raw_writer(self) -> Option<Box<dyn Write + Send>> {
        match self {
            AudioOutput::Device => None,
            AudioOutput::Null => Some(Box::new(io::sink())),
            AudioOutput::Stdout => Some(Box::new(io::stdout())),
        }
    }
}

/// [`Pipeline`] reading an ICY HTTP stream on a worker thread.
pub struct IcyPipeline {
    client: reqwest::blocking::Client,
    output: AudioOutput,
    uri: Mutex<Option<String>>,
    /// Stop flag of the running session, if any
    session: Mutex<Option<Arc<AtomicBool>>>,
    bus_tx: Sender<BusMessage>,
    bus_rx: Receiver<BusMessage>,
}

impl IcyPipeline {
    /// Fails with [`BackendError::PipelineUnavailable`] when `output` is the
    /// sound device and nothing can play through it.
    pub fn new(output: AudioOutput) -> Result<Self, BackendError> {
        if output == AudioOutput::Device {
            audio::check_output()?;
        }

        // Streams never end on their own schedule: no overall timeout.
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("rp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(None)
            .build()
            .map_err(|e| BackendError::PipelineUnavailable(e.to_string()))?;

        let (bus_tx, bus_rx) = crossbeam_channel::unbounded();
        Ok(Self {
            client,
            output,
            uri: Mutex::new(None),
            session: Mutex::new(None),
            bus_tx,
            bus_rx,
        })
    }

    fn stop_session(&self) {
        if let Some(stop) = self.session.lock().take() {
            stop.store(true, Ordering::SeqCst);
        }
    }

    fn start_session(&self) -> Result<(), BackendError> {
        self.stop_session();
        let uri = self.uri.lock().clone().ok_or(BackendError::NoUri)?;

        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = Arc::clone(&stop);
        let client = self.client.clone();
        let output = self.output;
        let bus = self.bus_tx.clone();

        thread::Builder::new()
            .name("icy-demux".to_string())
            .spawn(move || run_session(&client, &uri, output, worker_stop, &bus))
            .map_err(BackendError::Thread)?;

        *self.session.lock() = Some(stop);
        Ok(())
    }
}

impl Pipeline for IcyPipeline {
    fn demuxer_version(&self) -> Version {
        DEMUXER_VERSION
    }

    fn set_uri(&self, uri: &str) {
        *self.uri.lock() = Some(uri.to_string());
    }

    fn set_state(&self, state: PipelineState) -> Result<(), BackendError> {
        match state {
            PipelineState::Null => {
                self.stop_session();
                Ok(())
            }
            PipelineState::Playing => self.start_session(),
        }
    }

    fn bus(&self) -> Receiver<BusMessage> {
        self.bus_rx.clone()
    }
}

impl Drop for IcyPipeline {
    fn drop(&mut self) {
        self.stop_session();
    }
}

/// Worker body: connect, demux until the stream ends or the session stops.
///
/// A stopped session posts nothing, so no stale `Eos` reaches the bus.
fn run_session(
    client: &reqwest::blocking::Client,
    uri: &str,
    output: AudioOutput,
    stop: Arc<AtomicBool>,
    bus: &Sender<BusMessage>,
) {
    let post = |message: BusMessage| {
        if !stop.load(Ordering::SeqCst) {
            let _ = bus.send(message);
        }
    };

    let response = match client.get(uri).header("Icy-MetaData", "1").send() {
        Ok(response) => response,
        Err(e) => {
            post(BusMessage::Error(format!("Could not open {uri}: {e}")));
            return;
        }
    };

    if !response.status().is_success() {
        post(BusMessage::Error(format!("HTTP {} for {uri}", response.status())));
        return;
    }

    let metaint = response
        .headers()
        .get("icy-metaint")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    tracing::debug!(
        target: "rp::backend",
        uri,
        metaint,
        content_type = content_type.as_deref().unwrap_or("unknown"),
        "ICY stream connected"
    );

    let mut demuxer = IcyDemuxer::new(metaint);
    let mut on_tags = |tags| post(BusMessage::Tag(tags));

    let Some(mut sink) = output.raw_writer() else {
        let result = play_on_device(&mut demuxer, response, content_type.as_deref(), &stop, &mut on_tags);
        match result {
            Ok(()) => post(BusMessage::Eos),
            Err(message) => post(BusMessage::Error(format!("Playing {uri} failed: {message}"))),
        }
        return;
    };

    match demuxer.run(response, sink.as_mut(), &stop, &mut on_tags) {
        Ok(()) => post(BusMessage::Eos),
        Err(e) => post(BusMessage::Error(format!("Stream {uri} failed: {e}"))),
    }
}

/// Demux into the audio decoder and wait until it has played everything.
fn play_on_device<R: Read>(
    demuxer: &mut IcyDemuxer,
    response: R,
    content_type: Option<&str>,
    stop: &Arc<AtomicBool>,
    on_tags: &mut dyn FnMut(TagList),
) -> Result<(), String> {
    let (mut writer, reader) = audio::pipe(PIPE_CHUNKS);
    let hint = audio::hint_for(content_type);
    let player_stop = Arc::clone(stop);
    let player = thread::Builder::new()
        .name("audio-out".to_string())
        .spawn(move || audio::play(reader, hint, player_stop))
        .map_err(|e| format!("failed to start audio output: {e}"))?;

    let demuxed = demuxer.run(response, &mut writer, stop, on_tags);
    // End of input for the decoder; it plays out what is buffered.
    drop(writer);
    let played = player
        .join()
        .unwrap_or_else(|_| Err(AudioError::Device("audio thread panicked".to_string())));

    // A decoder failure also breaks the pipe, so it is the cause to report.
    played.map_err(|e| e.to_string())?;
    demuxed.map_err(|e| format!("stream failed: {e}"))
}

/// Splits an ICY byte stream into audio and tag lists.
struct IcyDemuxer {
    metaint: usize,
    last_block: String,
}

impl IcyDemuxer {
    /// `metaint == 0` means the stream carries no metadata.
    fn new(metaint: usize) -> Self {
        Self {
            metaint,
            last_block: String::new(),
        }
    }

    /// Demux until end of stream (`Ok`) or a transport error.
    ///
    /// A stream truncated inside a metadata block counts as ended.
    fn run<R: Read>(
        &mut self,
        mut reader: R,
        sink: &mut dyn Write,
        stop: &AtomicBool,
        on_tags: &mut dyn FnMut(TagList),
    ) -> io::Result<()> {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut until_meta = self.metaint;

        loop {
            if stop.load(Ordering::SeqCst) {
                return Ok(());
            }

            let want = if self.metaint == 0 {
                buf.len()
            } else {
                buf.len().min(until_meta)
            };

            if want > 0 {
                let n = match reader.read(&mut buf[..want]) {
                    Ok(0) => return Ok(()),
                    Ok(n) => n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                };
                sink.write_all(&buf[..n])?;
                if self.metaint > 0 {
                    until_meta -= n;
                }
            }

            if self.metaint > 0 && until_meta == 0 {
                match self.read_block(&mut reader) {
                    Ok(Some(tags)) => on_tags(tags),
                    Ok(None) => {}
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(()),
                    Err(e) => return Err(e),
                }
                until_meta = self.metaint;
            }
        }
    }

    /// Read one metadata block. Empty and repeated blocks yield `None`.
    fn read_block<R: Read>(&mut self, reader: &mut R) -> io::Result<Option<TagList>> {
        let mut len = [0u8; 1];
        reader.read_exact(&mut len)?;
        let size = usize::from(len[0]) * 16;
        if size == 0 {
            return Ok(None);
        }

        let mut block = vec![0u8; size];
        reader.read_exact(&mut block)?;
        let text = String::from_utf8_lossy(&block).into_owned();
        if text == self.last_block {
            return Ok(None);
        }

        let tags = icy_block_to_tags(&text);
        self.last_block = text;
        Ok((!tags.is_empty()).then_some(tags))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{TAG_HOMEPAGE, TAG_TITLE};
    use std::io::Cursor;

    /// A metadata block as a server sends it: length byte then NUL padding.
    fn meta_block(text: &str) -> Vec<u8> {
        let blocks = text.len().div_ceil(16);
        let mut out = vec![blocks as u8];
        out.extend_from_slice(text.as_bytes());
        out.resize(1 + blocks * 16, 0);
        out
    }

    fn demux(metaint: usize, stream: Vec<u8>) -> (io::Result<()>, Vec<u8>, Vec<TagList>) {
        let mut demuxer = IcyDemuxer::new(metaint);
        let mut audio = Vec::new();
        let mut seen = Vec::new();
        let stop = AtomicBool::new(false);
        let result = demuxer.run(Cursor::new(stream), &mut audio, &stop, &mut |tags| seen.push(tags));
        (result, audio, seen)
    }

    #[test]
    fn test_audio_and_tags_are_separated() {
        let mut stream = b"abcd".to_vec();
        stream.extend(meta_block(
            "StreamTitle='Jimi Hendrix - The Wind Cries Mary';StreamUrl='http://host/graphics/covers/m/X.jpg';",
        ));
        stream.extend_from_slice(b"efgh");
        stream.push(0);
        stream.extend_from_slice(b"ij");

        let (result, audio, seen) = demux(4, stream);
        assert!(result.is_ok());
        assert_eq!(audio, b"abcdefghij");
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0][TAG_TITLE], "Jimi Hendrix - The Wind Cries Mary");
        assert_eq!(seen[0][TAG_HOMEPAGE], "http://host/graphics/covers/m/X.jpg");
    }

    #[test]
    fn test_repeated_block_is_reported_once() {
        let block = meta_block("StreamTitle='A - B';");
        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(b"xy");
            stream.extend(block.iter().copied());
        }
        stream.extend_from_slice(b"xy");
        stream.extend(meta_block("StreamTitle='C - D';"));

        let (result, audio, seen) = demux(2, stream);
        assert!(result.is_ok());
        assert_eq!(audio, b"xyxyxyxy");
        let titles: Vec<_> = seen.iter().map(|t| t[TAG_TITLE].as_str()).collect();
        assert_eq!(titles, vec!["A - B", "C - D"]);
    }

    #[test]
    fn test_no_metaint_passes_everything_through() {
        let stream = b"StreamTitle='not metadata';".to_vec();
        let (result, audio, seen) = demux(0, stream.clone());
        assert!(result.is_ok());
        assert_eq!(audio, stream);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_truncated_block_ends_stream() {
        let mut stream = b"abcd".to_vec();
        stream.push(2); // promises 32 bytes
        stream.extend_from_slice(b"StreamTitle=");

        let (result, audio, seen) = demux(4, stream);
        assert!(result.is_ok());
        assert_eq!(audio, b"abcd");
        assert!(seen.is_empty());
    }

    #[test]
    fn test_stopped_demuxer_reads_nothing() {
        let mut demuxer = IcyDemuxer::new(0);
        let mut audio = Vec::new();
        let stop = AtomicBool::new(true);
        demuxer
            .run(Cursor::new(b"data".to_vec()), &mut audio, &stop, &mut |_| {})
            .unwrap();
        assert!(audio.is_empty());
    }

    #[test]
    fn test_playing_without_uri_fails() {
        let pipeline = IcyPipeline::new(AudioOutput::Null).unwrap();
        assert!(matches!(
            pipeline.set_state(PipelineState::Playing),
            Err(BackendError::NoUri)
        ));
        assert!(pipeline.set_state(PipelineState::Null).is_ok());
        assert_eq!(pipeline.demuxer_version(), DEMUXER_VERSION);
    }

    #[test]
    fn test_device_output_needs_a_playable_device() {
        assert_eq!(AudioOutput::default(), AudioOutput::Device);
        match IcyPipeline::new(AudioOutput::Device) {
            Ok(_) => assert!(audio::check_output().is_ok()),
            Err(e) => assert!(matches!(e, BackendError::PipelineUnavailable(_)), "got {e:?}"),
        }
    }

    #[test]
    fn test_undecodable_audio_is_reported() {
        let mut demuxer = IcyDemuxer::new(0);
        let stop = Arc::new(AtomicBool::new(false));
        let err = play_on_device(
            &mut demuxer,
            Cursor::new(vec![0x42u8; 3 * CHUNK_SIZE]),
            Some("text/html"),
            &stop,
            &mut |_| {},
        )
        .unwrap_err();
        assert!(err.contains("Unsupported"), "{err}");
    }

    #[test]
    fn test_unreachable_stream_posts_error() {
        let pipeline = IcyPipeline::new(AudioOutput::Null).unwrap();
        let bus = pipeline.bus();
        // Port 9 (discard) on localhost is closed on test machines.
        pipeline.set_uri("http://127.0.0.1:9/stream");
        pipeline.set_state(PipelineState::Playing).unwrap();

        let message = bus.recv_timeout(Duration::from_secs(15)).unwrap();
        assert!(matches!(message, BusMessage::Error(_)), "got {message:?}");
    }
}

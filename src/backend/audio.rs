//! Audio output for the ICY pipeline.
//!
//! The demuxer writes the stream's audio bytes into a [`pipe`]. An
//! `audio-out` thread decodes them with symphonia, resamples to the
//! device rate and feeds a cpal output stream:
//!
//! ```text
//! icy-demux ──bytes──▶ PipeReader ──▶ StreamDecoder ──▶ Resampler ──▶ cpal callback
//! ```
//!
//! The cpal stream lives on the `audio-out` thread; it is not `Send`.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, SendTimeoutError, Sender, bounded};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_AAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, ReadOnlySource};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::BackendError;

/// Decoded chunks queued ahead of the output callback.
const AUDIO_QUEUE: usize = 8;

/// How often a blocked producer re-checks the stop flag.
const STOP_POLL: Duration = Duration::from_millis(50);

/// Audio errors inside one playback session.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("Unsupported stream format: {0}")]
    Unsupported(String),

    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("Audio device error: {0}")]
    Device(String),
}

// ============================================================================
// Capability check
// ============================================================================

/// Check that streams can be decoded and that a device can play them.
///
/// Runs once when the pipeline is built, so a machine without sound
/// falls back to the external decoder.
pub fn check_output() -> Result<(), BackendError> {
    check_codecs()?;
    let device = default_device().map_err(|e| BackendError::PipelineUnavailable(e.to_string()))?;
    let config = device
        .default_output_config()
        .map_err(|e| BackendError::PipelineUnavailable(format!("audio device unusable: {e}")))?;
    tracing::debug!(
        target: "rp::backend",
        device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
        rate = config.sample_rate().0,
        channels = config.channels(),
        "Audio device available"
    );
    Ok(())
}

/// Radio Paradise streams AAC and MP3.
pub fn check_codecs() -> Result<(), BackendError> {
    let codecs = symphonia::default::get_codecs();
    for (name, codec) in [("AAC", CODEC_TYPE_AAC), ("MP3", CODEC_TYPE_MP3)] {
        if codecs.get_codec(codec).is_none() {
            return Err(BackendError::PipelineUnavailable(format!("no {name} decoder")));
        }
    }
    Ok(())
}

fn default_device() -> Result<Device, AudioError> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::Device("no audio output device".to_string()))
}

// ============================================================================
// Byte pipe
// ============================================================================

/// Bounded in-memory pipe from the demuxer to the decoder.
///
/// Writes block while `capacity` chunks are queued. Dropping the writer
/// is end of stream for the reader; dropping the reader makes writes
/// fail with `BrokenPipe`.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = bounded(capacity);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            chunk: Vec::new(),
            pos: 0,
        },
    )
}

pub struct PipeWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "audio decoder stopped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct PipeReader {
    rx: Receiver<Vec<u8>>,
    chunk: Vec<u8>,
    pos: usize,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.chunk.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.chunk = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.chunk.len() - self.pos);
        buf[..n].copy_from_slice(&self.chunk[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// File extension symphonia should expect for a stream `Content-Type`.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    match mime.to_ascii_lowercase().as_str() {
        "audio/aac" | "audio/aacp" | "audio/x-aac" => Some("aac"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        _ => None,
    }
}

/// Format hint for a stream with the given `Content-Type`.
pub fn hint_for(content_type: Option<&str>) -> Hint {
    let mut hint = Hint::new();
    if let Some(extension) = content_type.and_then(extension_for) {
        hint.with_extension(extension);
    }
    hint
}

/// Interleaved samples from one decoded packet.
#[derive(Debug, Clone)]
pub struct Frames {
    pub samples: Vec<f32>,
    pub channels: usize,
    pub rate: u32,
}

/// Symphonia decoder over a non-seekable byte stream.
pub struct StreamDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
}

impl StreamDecoder {
    /// Detect the stream format. Blocks until enough bytes have arrived.
    pub fn open<R>(source: R, hint: &Hint) -> Result<Self, AudioError>
    where
        R: Read + Send + Sync + 'static,
    {
        let mss = MediaSourceStream::new(Box::new(ReadOnlySource::new(source)), Default::default());

        let detected = symphonia::default::get_probe()
            .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| AudioError::Unsupported(e.to_string()))?;
        let reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::Unsupported("no audio track".to_string()))?;
        let track_id = track.id;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Unsupported(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
        })
    }

    /// Decode the next packet. `Ok(None)` at end of stream.
    pub fn next_frames(&mut self) -> Result<Option<Frames>, AudioError> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // A corrupt frame in a live stream: skip it
                Err(SymphoniaError::DecodeError(e)) => {
                    tracing::debug!(target: "rp::backend", error = e, "Skipping bad audio frame");
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            let signal = *decoded.spec();
            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, signal);
            buffer.copy_interleaved_ref(decoded);

            return Ok(Some(Frames {
                samples: buffer.samples().to_vec(),
                channels: signal.channels.count(),
                rate: signal.rate,
            }));
        }
    }
}

// ============================================================================
// Sample conversion
// ============================================================================

/// Sample rate conversion to the device rate.
pub struct Resampler {
    resampler: Option<FftFixedIn<f32>>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Per-channel input waiting for a full chunk
    input_buffer: Vec<Vec<f32>>,
    chunk_size: usize,
}

impl Resampler {
    const CHUNK_SIZE: usize = 1024;

    /// Pass-through when the rates match.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self, AudioError> {
        let channels = channels.max(1);
        let resampler = if input_rate == output_rate {
            None
        } else {
            tracing::debug!(target: "rp::backend", input_rate, output_rate, channels, "Resampling");
            Some(
                FftFixedIn::<f32>::new(
                    input_rate as usize,
                    output_rate as usize,
                    Self::CHUNK_SIZE,
                    2,
                    channels,
                )
                .map_err(|e| AudioError::Decode(format!("resampler: {e}")))?,
            )
        };

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
            chunk_size: Self::CHUNK_SIZE,
        })
    }

    /// Whether this converts `rate` with `channels` channels.
    pub fn accepts(&self, rate: u32, channels: usize) -> bool {
        self.input_rate == rate && self.channels == channels
    }

    pub fn needs_resampling(&self) -> bool {
        self.resampler.is_some()
    }

    /// Resample interleaved input; output lags by up to one chunk.
    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return input.to_vec();
        };

        for (i, sample) in input.iter().enumerate() {
            self.input_buffer[i % self.channels].push(*sample);
        }

        let mut output = Vec::new();
        while self.input_buffer[0].len() >= self.chunk_size {
            let chunk: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|buf| buf.drain(..self.chunk_size).collect())
                .collect();

            match resampler.process(&chunk, None) {
                Ok(resampled) => interleave_into(&resampled, usize::MAX, &mut output),
                Err(e) => tracing::warn!(target: "rp::backend", error = %e, "Resampling failed"),
            }
        }
        output
    }

    /// Resample what is left at end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };
        let remaining = self.input_buffer[0].len();
        if remaining == 0 {
            return Vec::new();
        }

        let chunk: Vec<Vec<f32>> = self
            .input_buffer
            .iter_mut()
            .map(|buf| {
                let mut padded = std::mem::take(buf);
                padded.resize(self.chunk_size, 0.0);
                padded
            })
            .collect();

        let expected = (remaining as f64 * self.output_rate as f64 / self.input_rate as f64).ceil() as usize;
        let mut output = Vec::new();
        match resampler.process(&chunk, None) {
            Ok(resampled) => interleave_into(&resampled, expected, &mut output),
            Err(e) => tracing::warn!(target: "rp::backend", error = %e, "Resampling flush failed"),
        }
        output
    }
}

fn interleave_into(planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
    let Some(first) = planes.first() else {
        return;
    };
    for frame in 0..first.len().min(max_frames) {
        for plane in planes {
            output.push(plane[frame]);
        }
    }
}

/// Map interleaved `from`-channel audio onto `to` device channels.
///
/// Downmixing to mono averages; otherwise output channel `n` takes input
/// channel `n`, repeating the last input channel when there are fewer.
pub fn remix(samples: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return samples.to_vec();
    }

    let mut output = Vec::with_capacity(samples.len() / from * to);
    for frame in samples.chunks_exact(from) {
        if to == 1 {
            output.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            output.extend((0..to).map(|ch| frame[ch.min(from - 1)]));
        }
    }
    output
}

// ============================================================================
// Device output
// ============================================================================

/// Decode `source` and play it on the default device until it ends.
///
/// Returns early and silently once `stop` is set.
pub fn play(source: PipeReader, hint: Hint, stop: Arc<AtomicBool>) -> Result<(), AudioError> {
    let mut decoder = StreamDecoder::open(source, &hint)?;

    let device = default_device()?;
    let supported = device
        .default_output_config()
        .map_err(|e| AudioError::Device(e.to_string()))?;
    let out_rate = supported.sample_rate().0;
    let out_channels = usize::from(supported.channels());
    let config = supported.config();

    let (audio_tx, audio_rx) = bounded::<Vec<f32>>(AUDIO_QUEUE);
    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, audio_rx, Arc::clone(&stop)),
        SampleFormat::I16 => build_stream::<i16>(&device, &config, audio_rx, Arc::clone(&stop)),
        SampleFormat::U16 => build_stream::<u16>(&device, &config, audio_rx, Arc::clone(&stop)),
        format => return Err(AudioError::Device(format!("unsupported sample format {format:?}"))),
    }?;
    stream.play().map_err(|e| AudioError::Device(e.to_string()))?;
    tracing::debug!(target: "rp::backend", rate = out_rate, channels = out_channels, "Audio output started");

    let mut resampler: Option<Resampler> = None;
    let mut channels = 0;
    while let Some(frames) = decoder.next_frames()? {
        if stop.load(Ordering::SeqCst) {
            return Ok(());
        }
        let converter = match resampler.take() {
            Some(r) if r.accepts(frames.rate, frames.channels) => r,
            _ => Resampler::new(frames.rate, out_rate, frames.channels)?,
        };
        let converter = resampler.insert(converter);
        channels = frames.channels;

        let out = remix(&converter.process(&frames.samples), channels, out_channels);
        if !send_until_stopped(&audio_tx, out, &stop) {
            return Ok(());
        }
    }

    if let Some(converter) = resampler.as_mut() {
        let tail = remix(&converter.flush(), channels, out_channels);
        send_until_stopped(&audio_tx, tail, &stop);
    }

    // Let the device play out what is queued.
    while !audio_tx.is_empty() && !stop.load(Ordering::SeqCst) {
        thread::sleep(STOP_POLL);
    }
    drop(stream);
    Ok(())
}

/// Queue `chunk` for the device. `false` once stopped or the stream is gone.
fn send_until_stopped(tx: &Sender<Vec<f32>>, mut chunk: Vec<f32>, stop: &AtomicBool) -> bool {
    if chunk.is_empty() {
        return true;
    }
    loop {
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        match tx.send_timeout(chunk, STOP_POLL) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => chunk = back,
            Err(SendTimeoutError::Disconnected(_)) => return false,
        }
    }
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    audio_rx: Receiver<Vec<f32>>,
    stop: Arc<AtomicBool>,
) -> Result<Stream, AudioError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut pending: Option<(Vec<f32>, usize)> = None;

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if stop.load(Ordering::Relaxed) {
                    data.fill(T::from_sample(0.0f32));
                    return;
                }

                let mut written = 0;
                while written < data.len() {
                    if pending.is_none() {
                        match audio_rx.try_recv() {
                            Ok(chunk) => pending = Some((chunk, 0)),
                            Err(_) => {
                                // Underrun
                                data[written..].fill(T::from_sample(0.0f32));
                                return;
                            }
                        }
                    }

                    if let Some((chunk, pos)) = pending.as_mut() {
                        let n = (chunk.len() - *pos).min(data.len() - written);
                        for (out, sample) in data[written..written + n].iter_mut().zip(&chunk[*pos..]) {
                            *out = T::from_sample(*sample);
                        }
                        *pos += n;
                        written += n;
                        if *pos >= chunk.len() {
                            pending = None;
                        }
                    }
                }
            },
            |err| tracing::error!(target: "rp::backend", error = %err, "Audio stream error"),
            None,
        )
        .map_err(|e| AudioError::Device(e.to_string()))
}

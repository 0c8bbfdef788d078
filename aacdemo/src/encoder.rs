// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Encode loop: PCM chunks in, ADTS framed AAC out.
//!
//! The caller pushes PCM as it arrives (from a capture source or a file) and
//! decides when to stop. After every submission the codec output is drained
//! without blocking, and each access unit is written to the sink as
//! `[ADTS header][payload]`.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    AacProfile, AdtsParams, BufferFlags, CaptureSource, ChannelConfigPolicy, Codec,
    CodecProvider, Error, MIMETYPE_AUDIO_AAC, MediaFormat, OutputEvent, PcmFileSource, Result,
};

/// Output polls granted to the codec to deliver end-of-stream on `finish`.
const END_OF_STREAM_POLLS: u32 = 100;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Target bit rate in bits per second.
    pub bit_rate: u32,
    pub profile: AacProfile,
    /// Largest PCM chunk handed to the codec in one input buffer.
    pub max_input_size: usize,
    pub channel_config: ChannelConfigPolicy,
    /// How long to wait for a free input buffer. `None` waits forever; when a
    /// wait expires the chunk is dropped.
    pub input_timeout_ms: Option<u64>,
    /// Submit end-of-stream and drain the codec before tearing it down, so the
    /// last partial frame reaches the file.
    pub flush_on_stop: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 1,
            bit_rate: 128 * 1024,
            profile: AacProfile::LowComplexity,
            max_input_size: 10 * 1024,
            channel_config: ChannelConfigPolicy::FromChannelCount,
            input_timeout_ms: None,
            flush_on_stop: false,
        }
    }
}

impl EncoderConfig {
    /// Format the encoder session is configured with.
    pub fn media_format(&self) -> MediaFormat {
        MediaFormat::audio(MIMETYPE_AUDIO_AAC, self.sample_rate, self.channel_count)
            .with_bit_rate(self.bit_rate)
            .with_aac_profile(self.profile)
            .with_max_input_size(self.max_input_size)
    }

    fn input_timeout(&self) -> Option<Duration> {
        self.input_timeout_ms.map(Duration::from_millis)
    }
}

/// Counters of one encode run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    /// PCM bytes accepted by the codec.
    pub pcm_bytes_submitted: u64,
    /// PCM bytes dropped because no input buffer became free in time.
    pub pcm_bytes_dropped: u64,
    /// Access units written to the sink.
    pub frames_written: u64,
    /// Bytes written to the sink, headers included.
    pub bytes_written: u64,
    /// Access units lost to sink write failures.
    pub write_failures: u64,
    /// Access units skipped because they do not fit an ADTS frame.
    pub oversized_frames: u64,
}

/// Feeds PCM to an AAC encoder session and writes ADTS frames to a sink.
///
/// # Examples
///
/// ```
/// use aacdemo::{AacEncoder, EncoderConfig, LoopbackProvider};
///
/// # fn main() -> Result<(), aacdemo::Error> {
/// let mut aac = Vec::new();
/// let mut encoder = AacEncoder::new(&LoopbackProvider::default(), EncoderConfig::default(), &mut aac)?;
/// encoder.encode(&[0; 4096])?;
/// let stats = encoder.finish()?;
/// assert_eq!(stats.frames_written, 2);
/// assert_eq!(&aac[..2], &[0xFF, 0xF9]);
/// # Ok(())
/// # }
/// ```
pub struct AacEncoder<W: Write> {
    codec: Codec,
    sink: W,
    adts: AdtsParams,
    config: EncoderConfig,
    pcm_frame_bytes: u64,
    stats: EncodeStats,
}

impl<W: Write> AacEncoder<W> {
    /// Creates and starts an encoder session writing to `sink`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] if the sample rate or channel configuration cannot
    /// be expressed in an ADTS header, [`Error::CodecUnavailable`] if the
    /// provider has no AAC encoder.
    pub fn new(provider: &dyn CodecProvider, config: EncoderConfig, sink: W) -> Result<Self> {
        let format = config.media_format();
        let adts = AdtsParams::from_format(&format, config.channel_config)?;
        let codec = Codec::create_encoder(provider, &format)?;
        info!(
            "Encoder ready: {} Hz, {} channel(s), {} bit/s",
            config.sample_rate, config.channel_count, config.bit_rate
        );
        Ok(Self {
            codec,
            sink,
            adts,
            pcm_frame_bytes: format.pcm_frame_bytes() as u64,
            config,
            stats: EncodeStats::default(),
        })
    }

    pub fn stats(&self) -> &EncodeStats {
        &self.stats
    }

    /// Submits one PCM chunk and writes every access unit that became ready.
    ///
    /// A chunk larger than the codec's input buffers is spread over several
    /// buffers.
    ///
    /// # Errors
    ///
    /// Codec failures are returned. Sink write failures are not: they are
    /// logged and counted in [`EncodeStats::write_failures`].
    pub fn encode(&mut self, pcm: &[u8]) -> Result<()> {
        let mut remaining = pcm;
        while !remaining.is_empty() {
            let Some(index) = self.codec.dequeue_input_buffer(self.config.input_timeout())? else {
                warn!(
                    "No encoder input buffer within {:?}, dropping {} bytes",
                    self.config.input_timeout(),
                    remaining.len()
                );
                self.stats.pcm_bytes_dropped += remaining.len() as u64;
                return self.drain().map(|_| ());
            };
            let input = self.codec.input_buffer(index)?;
            if input.is_empty() {
                return Err(Error::codec("encoder offered an empty input buffer"));
            }
            let size = remaining.len().min(input.len());
            input[..size].copy_from_slice(&remaining[..size]);
            let presentation_time_us = self.presentation_time_us();
            self.codec
                .queue_input_buffer(index, size, presentation_time_us, BufferFlags::NONE)?;
            self.stats.pcm_bytes_submitted += size as u64;
            remaining = &remaining[size..];
            self.drain()?;
        }
        Ok(())
    }

    /// Stops the encoder, releases the session and flushes the sink.
    ///
    /// Unless [`EncoderConfig::flush_on_stop`] is set, PCM still buffered in the
    /// codec is discarded.
    pub fn finish(mut self) -> Result<EncodeStats> {
        if self.config.flush_on_stop {
            self.flush_codec()?;
        }
        let Self {
            codec,
            mut sink,
            stats,
            ..
        } = self;
        let released = codec.stop_and_release();
        let flushed = sink.flush();
        released?;
        flushed?;
        info!(
            "Encoder finished: {} frames, {} bytes written",
            stats.frames_written, stats.bytes_written
        );
        Ok(stats)
    }

    fn presentation_time_us(&self) -> i64 {
        let frames = self.stats.pcm_bytes_submitted / self.pcm_frame_bytes.max(1);
        (frames * 1_000_000 / u64::from(self.config.sample_rate.max(1))) as i64
    }

    fn flush_codec(&mut self) -> Result<()> {
        let mut index = None;
        for _ in 0..END_OF_STREAM_POLLS {
            index = self.codec.dequeue_input_buffer(self.config.input_timeout())?;
            if index.is_some() {
                break;
            }
            self.drain()?;
        }
        let Some(index) = index else {
            warn!("No encoder input buffer for end of stream, trailing audio is lost");
            return Ok(());
        };
        let presentation_time_us = self.presentation_time_us();
        self.codec
            .queue_input_buffer(index, 0, presentation_time_us, BufferFlags::END_OF_STREAM)?;
        for _ in 0..END_OF_STREAM_POLLS {
            if self.drain()? {
                debug!("Encoder reached end of stream");
                return Ok(());
            }
        }
        warn!("Encoder did not signal end of stream, trailing audio may be lost");
        Ok(())
    }

    /// Writes every ready access unit. Returns `true` once end-of-stream is seen.
    fn drain(&mut self) -> Result<bool> {
        loop {
            match self.codec.dequeue_output_buffer(Some(Duration::ZERO))? {
                OutputEvent::Buffer { index, info } => {
                    if info.flags.is_codec_config() {
                        debug!("Skipping {} bytes of codec config", info.size);
                    } else if info.size > 0 {
                        let payload = self
                            .codec
                            .output_buffer(index)?
                            .get(info.range())
                            .ok_or_else(|| Error::codec("output range outside its buffer"))?;
                        write_frame(&mut self.sink, &self.adts, payload, &mut self.stats);
                    }
                    self.codec.release_output_buffer(index)?;
                    if info.flags.is_end_of_stream() {
                        return Ok(true);
                    }
                }
                OutputEvent::FormatChanged(format) => {
                    info!(
                        "Encoder output format: {} Hz, {} channel(s)",
                        format.sample_rate, format.channel_count
                    );
                }
                OutputEvent::TryAgainLater => return Ok(false),
            }
        }
    }
}

fn write_frame<W: Write>(sink: &mut W, adts: &AdtsParams, payload: &[u8], stats: &mut EncodeStats) {
    let header = match adts.checked_header(payload.len()) {
        Ok(header) => header,
        Err(err) => {
            warn!("Skipping access unit: {}", err);
            stats.oversized_frames += 1;
            return;
        }
    };
    let mut frame = Vec::with_capacity(header.len() + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    match sink.write_all(&frame) {
        Ok(()) => {
            stats.frames_written += 1;
            stats.bytes_written += frame.len() as u64;
        }
        Err(err) => {
            warn!("Failed to write encoded frame: {}", err);
            stats.write_failures += 1;
        }
    }
}

/// Encodes the raw PCM file `input` into the ADTS file `output`.
///
/// Only `output` is written; the directory of `output` is created when
/// missing. The input is read in chunks of [`EncoderConfig::max_input_size`].
///
/// # Errors
///
/// [`Error::SourceMissing`] if `input` does not exist, [`Error::InvalidArg`]
/// if `input` and `output` are the same file, otherwise as [`AacEncoder`].
pub fn encode_file(
    provider: &dyn CodecProvider,
    config: &EncoderConfig,
    input: &Path,
    output: &Path,
) -> Result<EncodeStats> {
    let mut source = PcmFileSource::open(input, config.max_input_size)?;
    if output.exists() && input.canonicalize()? == output.canonicalize()? {
        return Err(Error::invalid_arg(format!(
            "{} is both the input and the output",
            input.display()
        )));
    }
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let sink = BufWriter::new(File::create(output)?);
    info!("Encoding {} into {}", input.display(), output.display());

    let mut encoder = AacEncoder::new(provider, config.clone(), sink)?;
    let mut buf = vec![0; source.chunk_size().max(2)];
    source.start()?;
    let fed = loop {
        match source.read(&mut buf) {
            Ok(0) => break Ok(()),
            Ok(read) => {
                if let Err(err) = encoder.encode(&buf[..read]) {
                    break Err(err);
                }
            }
            Err(err) => break Err(err),
        }
    };
    let stopped = source.stop();
    let finished = encoder.finish();
    fed?;
    stopped?;
    finished
}

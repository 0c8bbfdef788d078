// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Decode loop: demultiplexed AAC in, PCM out.
//!
//! The loop alternates between feeding one sample to the codec and polling
//! for one decoded buffer, both with a bounded wait. Input and output reach
//! end-of-stream separately:
//!
//! ```text
//!  extractor exhausted ──► queue END_OF_STREAM ──► input done
//!                                                    │
//!  output buffer flagged END_OF_STREAM ◄─────────────┘ ──► loop exits
//! ```
//!
//! Timeouts on either side are retried, never reported, unless the
//! [`PollPolicy`] caps the number of consecutive idle polls.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::{
    AdtsExtractor, BufferFlags, Codec, CodecProvider, Error, Extractor, OutputEvent, Result,
    select_audio_track,
};

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Bounded wait for an input slot and for a decoded buffer.
    pub poll_timeout_ms: u64,
    /// Consecutive polls without progress before giving up. `None` retries forever.
    pub max_idle_polls: Option<u32>,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 5000,
            max_idle_polls: None,
        }
    }
}

impl DecoderConfig {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            timeout: Duration::from_millis(self.poll_timeout_ms),
            max_idle_polls: self.max_idle_polls,
        }
    }
}

/// Retry policy of the decode loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Bounded wait of every dequeue call.
    pub timeout: Duration,
    /// Consecutive iterations without progress tolerated before
    /// [`Error::Timeout`]. `None` never gives up.
    pub max_idle_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        DecoderConfig::default().poll_policy()
    }
}

/// Outcome of a decode run.
///
/// A run that returns a report always has `finished == true`; failures are
/// returned as errors instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub finished: bool,
    /// Samples taken from the extractor.
    pub samples_read: u64,
    /// Decoded buffers written to the sink.
    pub buffers_written: u64,
    /// PCM bytes written to the sink.
    pub bytes_written: u64,
    /// Decoded buffers lost to sink write failures.
    pub write_failures: u64,
    /// Iterations in which neither side made progress.
    pub idle_polls: u64,
}

/// Decodes the first audio track of `extractor` into `sink`.
///
/// Returns once the codec signals end-of-stream on its output. The sink is
/// flushed and dropped before the codec is released; the extractor is
/// released last.
///
/// # Errors
///
/// - [`Error::NoAudioTrack`] if the extractor has no audio track
/// - [`Error::Timeout`] if [`PollPolicy::max_idle_polls`] is exceeded
/// - codec failures, and a failure to flush the sink
///
/// Writing a decoded buffer that fails is logged and counted in
/// [`DecodeReport::write_failures`]; the loop continues.
pub fn decode<E, W>(
    provider: &dyn CodecProvider,
    mut extractor: E,
    mut sink: W,
    policy: &PollPolicy,
) -> Result<DecodeReport>
where
    E: Extractor,
    W: Write,
{
    let (track, format) = select_audio_track(&mut extractor)?;
    let mut codec = Codec::create_decoder(provider, &format)?;
    info!(
        "Decoding track {}: {} Hz, {} channel(s)",
        track, format.sample_rate, format.channel_count
    );

    let timeout = Some(policy.timeout);
    let mut report = DecodeReport::default();
    let mut input_eos = false;
    let mut output_eos = false;
    let mut idle_polls = 0u32;

    while !output_eos {
        let mut progressed = false;

        if !input_eos && let Some(index) = codec.dequeue_input_buffer(timeout)? {
            progressed = true;
            let input = codec.input_buffer(index)?;
            match extractor.read_sample_data(input)? {
                Some(size) if size > 0 => {
                    let presentation_time_us = extractor.sample_time().unwrap_or(0);
                    codec.queue_input_buffer(index, size, presentation_time_us, BufferFlags::NONE)?;
                    trace!("Queued sample {} ({} bytes)", report.samples_read, size);
                    report.samples_read += 1;
                    extractor.advance();
                }
                _ => {
                    codec.queue_input_buffer(index, 0, 0, BufferFlags::END_OF_STREAM)?;
                    debug!("Decoder input reached end of stream");
                    input_eos = true;
                }
            }
        }

        match codec.dequeue_output_buffer(timeout)? {
            OutputEvent::Buffer { index, info } => {
                progressed = true;
                if info.flags.is_codec_config() {
                    debug!("Skipping {} bytes of codec config", info.size);
                } else if info.size > 0 {
                    let pcm = codec
                        .output_buffer(index)?
                        .get(info.range())
                        .ok_or_else(|| Error::codec("output range outside its buffer"))?;
                    match sink.write_all(pcm) {
                        Ok(()) => {
                            report.buffers_written += 1;
                            report.bytes_written += pcm.len() as u64;
                        }
                        Err(err) => {
                            warn!("Failed to write decoded buffer: {}", err);
                            report.write_failures += 1;
                        }
                    }
                }
                codec.release_output_buffer(index)?;
                if info.flags.is_end_of_stream() {
                    debug!("Decoder output reached end of stream");
                    output_eos = true;
                }
            }
            OutputEvent::FormatChanged(format) => {
                progressed = true;
                info!(
                    "Decoder output format: {} Hz, {} channel(s)",
                    format.sample_rate, format.channel_count
                );
            }
            OutputEvent::TryAgainLater => {}
        }

        if progressed {
            idle_polls = 0;
        } else {
            idle_polls += 1;
            report.idle_polls += 1;
            if let Some(max) = policy.max_idle_polls
                && idle_polls >= max
            {
                return Err(Error::Timeout(idle_polls));
            }
        }
    }

    sink.flush()?;
    drop(sink);
    codec.stop_and_release()?;
    drop(extractor);

    report.finished = true;
    info!(
        "Decode finished: {} samples in, {} bytes out",
        report.samples_read, report.bytes_written
    );
    Ok(report)
}

/// Decodes the ADTS file at `source` into the raw PCM file `output`.
///
/// The directory of `output` is created when missing.
///
/// # Errors
///
/// [`Error::SourceMissing`] if `source` does not exist, otherwise as [`decode`].
pub fn decode_file(
    provider: &dyn CodecProvider,
    source: &Path,
    output: &Path,
    policy: &PollPolicy,
) -> Result<DecodeReport> {
    if !source.is_file() {
        return Err(Error::SourceMissing(source.to_path_buf()));
    }
    let extractor = AdtsExtractor::open(source)?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let sink = BufWriter::new(File::create(output)?);
    info!("Decoding {} into {}", source.display(), output.display());
    decode(provider, extractor, sink, policy)
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_test::traced_test;

    use super::*;
    use crate::{AacProfile, AdtsParams, LoopbackProvider};

    fn adts_stream(payloads: &[&[u8]]) -> AdtsExtractor {
        let params = AdtsParams::new(AacProfile::LowComplexity, 44100, 1).unwrap();
        let mut data = Vec::new();
        for payload in payloads {
            data.extend_from_slice(&params.header(payload.len()));
            data.extend_from_slice(payload);
        }
        AdtsExtractor::from_bytes(data).unwrap()
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn loopback_decode_concatenates_payloads() {
        let mut pcm = Vec::new();
        let report = decode(
            &LoopbackProvider::default(),
            adts_stream(&[&[1, 2], &[3], &[4, 5, 6]]),
            &mut pcm,
            &PollPolicy::default(),
        )
        .unwrap();
        assert!(report.finished);
        assert_eq!(report.samples_read, 3);
        assert_eq!(report.buffers_written, 3);
        assert_eq!(pcm, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    #[traced_test]
    fn write_failures_do_not_stop_the_loop() {
        let report = decode(
            &LoopbackProvider::default(),
            adts_stream(&[&[1], &[2]]),
            BrokenPipe,
            &PollPolicy::default(),
        )
        .unwrap();
        assert!(report.finished);
        assert_eq!(report.write_failures, 2);
        assert!(logs_contain("Failed to write decoded buffer"));
    }

    #[test]
    fn missing_source_is_an_error() {
        let result = decode_file(
            &LoopbackProvider::default(),
            Path::new("/nonexistent/encoder_file.aac"),
            Path::new("/nonexistent/decoder_file.pcm"),
            &PollPolicy::default(),
        );
        assert!(matches!(result, Err(Error::SourceMissing(_))));
    }

    #[test]
    fn config_maps_to_policy() {
        let policy = DecoderConfig {
            poll_timeout_ms: 10,
            max_idle_polls: Some(3),
        }
        .poll_policy();
        assert_eq!(policy.timeout, Duration::from_millis(10));
        assert_eq!(policy.max_idle_polls, Some(3));
        assert_eq!(PollPolicy::default().timeout, Duration::from_secs(5));
    }
}

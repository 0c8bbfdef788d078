// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! AAC-LC encoder session.

use std::time::Duration;

use aacdemo::{
    AacProfile, BufferFlags, BufferQueue, CodecKind, CodecSession, Error, MediaFormat,
    OutputEvent, Result,
};
use fdk_aac::enc::{AudioObjectType, BitRate, ChannelMode, Encoder, EncoderParams, Transport};
use tracing::{debug, trace};

use crate::{FRAME_SAMPLES, State, pcm_to_samples};

/// Largest access unit the encoder can produce, per channel (6144 bits).
const MAX_UNIT_BYTES_PER_CHANNEL: usize = 768;

const DEFAULT_BIT_RATE: u32 = 128 * 1024;

const DEFAULT_INPUT_CAPACITY: usize = 16 * 1024;

/// Owns the FDK encoder handle.
struct FdkEncoder(Encoder);

// Safety: The FDK encoder handle is only used from the thread that currently
// owns the session; it is moved between threads, never shared.
unsafe impl Send for FdkEncoder {}

/// Encodes interleaved 16-bit PCM into raw AAC-LC access units.
pub struct FdkEncoderSession {
    state: State,
    encoder: Option<FdkEncoder>,
    format: Option<MediaFormat>,
    asc: Vec<u8>,
    queue: BufferQueue,
    input_slots: usize,
    max_outputs: usize,
    pending: Vec<u8>,
    frame_bytes: usize,
    unit: Vec<u8>,
    frames_in: u64,
    input_eos: bool,
}

impl FdkEncoderSession {
    pub(crate) fn new(input_slots: usize, max_outputs: usize) -> Self {
        Self {
            state: State::Created,
            encoder: None,
            format: None,
            asc: Vec::new(),
            queue: BufferQueue::new(0, 0, max_outputs),
            input_slots,
            max_outputs,
            pending: Vec::new(),
            frame_bytes: 0,
            unit: Vec::new(),
            frames_in: 0,
            input_eos: false,
        }
    }

    fn frame_time_us(&self) -> i64 {
        let rate = self.format.as_ref().map_or(0, |f| f.sample_rate);
        if rate == 0 {
            return 0;
        }
        (self.frames_in * FRAME_SAMPLES as u64 * 1_000_000 / u64::from(rate)) as i64
    }

    /// Encodes one whole frame of PCM bytes and queues the resulting unit, if any.
    fn encode_frame(&mut self, frame: &[u8]) -> Result<()> {
        let samples = pcm_to_samples(frame);
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| Error::invalid_state("encoder is not configured"))?;
        let mut offset = 0;
        while offset < samples.len() {
            let info = encoder
                .0
                .encode(&samples[offset..], &mut self.unit)
                .map_err(|err| Error::codec(format!("AAC encoding failed: {err:?}")))?;
            offset += info.input_consumed;
            if info.output_size > 0 {
                let presentation_time_us = self.frame_time_us();
                self.queue.push_output(
                    self.unit[..info.output_size].to_vec(),
                    presentation_time_us,
                    BufferFlags::KEY_FRAME,
                );
                trace!("Encoded unit of {} bytes", info.output_size);
            }
            if info.input_consumed == 0 {
                break;
            }
        }
        self.frames_in += 1;
        Ok(())
    }
}

impl CodecSession for FdkEncoderSession {
    fn name(&self) -> &str {
        "fdk.aac.encoder"
    }

    fn configure(&mut self, format: &MediaFormat, kind: CodecKind) -> Result<()> {
        self.state.expect(State::Created, self.name(), "configure")?;
        if kind != CodecKind::Encoder {
            return Err(Error::invalid_arg(format!(
                "{} cannot be configured as {kind}",
                self.name()
            )));
        }
        let channels = match format.channel_count {
            1 => ChannelMode::Mono,
            2 => ChannelMode::Stereo,
            other => {
                return Err(Error::invalid_arg(format!(
                    "FDK encoder supports mono or stereo, not {other} channels"
                )));
            }
        };
        if format.aac_profile.unwrap_or_default() != AacProfile::LowComplexity {
            return Err(Error::CodecUnavailable(format!(
                "FDK encoder for {:?}",
                format.aac_profile
            )));
        }
        let params = EncoderParams {
            bit_rate: BitRate::Cbr(format.bit_rate.unwrap_or(DEFAULT_BIT_RATE)),
            sample_rate: format.sample_rate,
            transport: Transport::Raw,
            channels,
            audio_object_type: AudioObjectType::Mpeg4LowComplexity,
        };
        let encoder = Encoder::new(params)
            .map_err(|err| Error::codec(format!("Failed to create AAC encoder: {err:?}")))?;
        let info = encoder
            .info()
            .map_err(|err| Error::codec(format!("Failed to query AAC encoder: {err:?}")))?;
        self.asc = info.confBuf[..info.confSize as usize].to_vec();

        let channel_count = usize::from(format.channel_count);
        self.frame_bytes = FRAME_SAMPLES * channel_count * 2;
        let unit_size =
            (info.maxOutBufBytes as usize).max(MAX_UNIT_BYTES_PER_CHANNEL * channel_count);
        self.unit = vec![0; unit_size];
        self.queue = BufferQueue::new(
            self.input_slots,
            format.max_input_size.unwrap_or(DEFAULT_INPUT_CAPACITY),
            self.max_outputs,
        );
        self.encoder = Some(FdkEncoder(encoder));
        self.format = Some(format.clone());
        self.state = State::Configured;
        debug!(
            "FDK encoder configured: {} Hz, {} channel(s), ASC {:02X?}",
            format.sample_rate, format.channel_count, self.asc
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.state.expect(State::Configured, self.name(), "start")?;
        let format = self
            .format
            .clone()
            .ok_or_else(|| Error::invalid_state("encoder is not configured"))?;
        self.queue
            .push_format_change(format.with_codec_specific_data(self.asc.clone()));
        self.queue
            .push_output(self.asc.clone(), 0, BufferFlags::CODEC_CONFIG);
        self.state = State::Running;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Option<Duration>) -> Result<Option<usize>> {
        self.state.expect(State::Running, self.name(), "dequeue_input_buffer")?;
        if self.input_eos {
            return Ok(None);
        }
        Ok(self.queue.dequeue_input())
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        self.state.expect(State::Running, self.name(), "input_buffer")?;
        self.queue.input_mut(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        _presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.state.expect(State::Running, self.name(), "queue_input_buffer")?;
        if self.input_eos {
            return Err(Error::invalid_state("input queued after end of stream"));
        }
        let data = self.queue.submit_input(index, size)?;
        self.pending.extend_from_slice(&data);
        while self.pending.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            self.encode_frame(&frame)?;
        }
        if flags.is_end_of_stream() {
            self.input_eos = true;
            if !self.pending.is_empty() {
                let mut frame = std::mem::take(&mut self.pending);
                debug!("Padding the last {} bytes to a whole frame", frame.len());
                frame.resize(self.frame_bytes, 0);
                self.encode_frame(&frame)?;
            }
            let presentation_time_us = self.frame_time_us();
            self.queue
                .push_output(Vec::new(), presentation_time_us, BufferFlags::END_OF_STREAM);
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Option<Duration>) -> Result<OutputEvent> {
        self.state.expect(State::Running, self.name(), "dequeue_output_buffer")?;
        Ok(self.queue.next_output())
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.state.expect(State::Running, self.name(), "output_buffer")?;
        self.queue.output(index)
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.state.expect(State::Running, self.name(), "release_output_buffer")?;
        self.queue.release_output(index)
    }

    fn stop(&mut self) -> Result<()> {
        match self.state {
            State::Configured | State::Running => {
                self.queue.clear();
                self.pending.clear();
                self.state = State::Stopped;
                Ok(())
            }
            other => other.expect(State::Running, self.name(), "stop"),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.state == State::Released {
            return Err(Error::invalid_state("fdk.aac.encoder released twice"));
        }
        self.encoder = None;
        self.state = State::Released;
        Ok(())
    }
}

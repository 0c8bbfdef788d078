// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! AAC decoder session.
//!
//! FDK is driven in ADTS mode. Raw access units are re-wrapped with a header
//! built from the configured format before they are filled in, so the decoder
//! accepts both what [`aacdemo::AdtsExtractor`] yields and whole ADTS frames.

use std::time::Duration;

use aacdemo::{
    AdtsHeader, AdtsParams, BufferFlags, BufferQueue, ChannelConfigPolicy, CodecKind,
    CodecSession, Error, MIMETYPE_AUDIO_RAW, MediaFormat, OutputEvent, Result,
};
use fdk_aac::dec::{Decoder, Transport};
use tracing::{debug, trace, warn};

use crate::{State, samples_to_pcm};

/// Room for one frame of up to eight channels at 2048 samples (SBR).
const PCM_SCRATCH_SAMPLES: usize = 8 * 2048;

const DEFAULT_INPUT_CAPACITY: usize = 16 * 1024;

/// Owns the FDK decoder handle.
struct FdkDecoder(Decoder);

// Safety: The FDK decoder handle is only used from the thread that currently
// owns the session; it is moved between threads, never shared.
unsafe impl Send for FdkDecoder {}

/// Decodes AAC access units into interleaved 16-bit PCM.
pub struct FdkDecoderSession {
    state: State,
    decoder: Option<FdkDecoder>,
    params: Option<AdtsParams>,
    format: Option<MediaFormat>,
    queue: BufferQueue,
    input_slots: usize,
    max_outputs: usize,
    pcm: Vec<i16>,
    input_eos: bool,
}

impl FdkDecoderSession {
    pub(crate) fn new(input_slots: usize, max_outputs: usize) -> Self {
        Self {
            state: State::Created,
            decoder: None,
            params: None,
            format: None,
            queue: BufferQueue::new(0, 0, max_outputs),
            input_slots,
            max_outputs,
            pcm: vec![0; PCM_SCRATCH_SAMPLES],
            input_eos: false,
        }
    }

    /// Returns `unit` as a complete ADTS frame.
    fn framed(&self, unit: &[u8]) -> Result<Vec<u8>> {
        if AdtsHeader::parse(unit).is_ok_and(|header| header.frame_length == unit.len()) {
            return Ok(unit.to_vec());
        }
        let params = self
            .params
            .as_ref()
            .ok_or_else(|| Error::invalid_state("decoder is not configured"))?;
        let mut frame = params.checked_header(unit.len())?.to_vec();
        frame.extend_from_slice(unit);
        Ok(frame)
    }

    /// Feeds one ADTS frame and queues every PCM frame it yields.
    fn decode_unit(&mut self, frame: &[u8], presentation_time_us: i64) -> Result<usize> {
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::invalid_state("decoder is not configured"))?;
        let mut decoded = 0;
        let mut offset = 0;
        let mut last_error = None;
        while offset < frame.len() {
            let consumed = decoder
                .0
                .fill(&frame[offset..])
                .map_err(|err| Error::codec(format!("Failed to fill AAC decoder: {err:?}")))?;
            offset += consumed;
            loop {
                match decoder.0.decode_frame(&mut self.pcm) {
                    Ok(()) => {
                        let samples = decoder.0.decoded_frame_size().min(self.pcm.len());
                        self.queue.push_output(
                            samples_to_pcm(&self.pcm[..samples]),
                            presentation_time_us,
                            BufferFlags::NONE,
                        );
                        decoded += 1;
                    }
                    Err(err) => {
                        last_error = Some(err);
                        break;
                    }
                }
            }
            if consumed == 0 {
                break;
            }
        }
        if decoded == 0
            && let Some(err) = last_error
        {
            warn!("Dropping undecodable access unit of {} bytes: {:?}", frame.len(), err);
        }
        Ok(decoded)
    }
}

impl CodecSession for FdkDecoderSession {
    fn name(&self) -> &str {
        "fdk.aac.decoder"
    }

    fn configure(&mut self, format: &MediaFormat, kind: CodecKind) -> Result<()> {
        self.state.expect(State::Created, self.name(), "configure")?;
        if kind != CodecKind::Decoder {
            return Err(Error::invalid_arg(format!(
                "{} cannot be configured as {kind}",
                self.name()
            )));
        }
        let params = AdtsParams::from_format(format, ChannelConfigPolicy::FromChannelCount)?;
        self.queue = BufferQueue::new(
            self.input_slots,
            format.max_input_size.unwrap_or(DEFAULT_INPUT_CAPACITY),
            self.max_outputs,
        );
        self.decoder = Some(FdkDecoder(Decoder::new(Transport::Adts)));
        self.params = Some(params);
        self.format = Some(format.clone());
        self.state = State::Configured;
        debug!(
            "FDK decoder configured: {} Hz, {} channel(s)",
            format.sample_rate, format.channel_count
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.state.expect(State::Configured, self.name(), "start")?;
        let format = self
            .format
            .as_ref()
            .ok_or_else(|| Error::invalid_state("decoder is not configured"))?;
        self.queue.push_format_change(MediaFormat::audio(
            MIMETYPE_AUDIO_RAW,
            format.sample_rate,
            format.channel_count,
        ));
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
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.state.expect(State::Running, self.name(), "queue_input_buffer")?;
        if self.input_eos {
            return Err(Error::invalid_state("input queued after end of stream"));
        }
        let unit = self.queue.submit_input(index, size)?;
        if flags.is_codec_config() {
            trace!("Ignoring {} bytes of codec config", unit.len());
        } else if !unit.is_empty() {
            match self.framed(&unit) {
                Ok(frame) => {
                    self.decode_unit(&frame, presentation_time_us)?;
                }
                Err(err) => warn!("Dropping access unit: {}", err),
            }
        }
        if flags.is_end_of_stream() {
            self.input_eos = true;
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
                self.state = State::Stopped;
                Ok(())
            }
            other => other.expect(State::Running, self.name(), "stop"),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.state == State::Released {
            return Err(Error::invalid_state("fdk.aac.decoder released twice"));
        }
        self.decoder = None;
        self.state = State::Released;
        Ok(())
    }
}

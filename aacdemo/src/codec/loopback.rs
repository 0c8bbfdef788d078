// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Pass-through codec honoring the session buffer contract.
//!
//! The loopback encoder does not compress: it regroups PCM into frames of
//! [`SAMPLES_PER_FRAME`] samples per channel and hands every complete frame
//! out as an access unit. The loopback decoder returns its input unchanged.
//! Both emit the same event sequence a hardware codec would (format change,
//! codec config, access units, end-of-stream) which makes them suitable for
//! dry runs of the pipeline and for tests.

use std::time::Duration;

use tracing::{debug, trace};

use crate::{
    AdtsParams, BufferFlags, BufferQueue, ChannelConfigPolicy, CodecKind, CodecProvider,
    CodecSession, Error, MIMETYPE_AUDIO_AAC, MIMETYPE_AUDIO_RAW, MediaFormat, OutputEvent,
    Result,
};

/// PCM samples per channel in one AAC-LC access unit.
pub const SAMPLES_PER_FRAME: usize = 1024;

/// Creates [`LoopbackSession`]s.
#[derive(Debug, Clone, Copy)]
pub struct LoopbackProvider {
    /// Number of input slots per session.
    pub input_slots: usize,
    /// Input slot capacity used when the format has no `max_input_size`.
    pub input_capacity: usize,
    /// Output buffers that may be pending before input is refused.
    pub max_outputs: usize,
}

impl Default for LoopbackProvider {
    fn default() -> Self {
        Self {
            input_slots: 4,
            input_capacity: 16 * 1024,
            max_outputs: 8,
        }
    }
}

impl LoopbackProvider {
    fn create(&self, mime: &str, kind: CodecKind) -> Result<Box<dyn CodecSession>> {
        if mime != MIMETYPE_AUDIO_AAC {
            return Err(Error::CodecUnavailable(format!("no loopback {kind} for {mime}")));
        }
        Ok(Box::new(LoopbackSession::new(*self, kind)))
    }
}

impl CodecProvider for LoopbackProvider {
    fn create_encoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        self.create(mime, CodecKind::Encoder)
    }

    fn create_decoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        self.create(mime, CodecKind::Decoder)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Configured,
    Running,
    Stopped,
    Released,
}

/// One loopback encoder or decoder.
pub struct LoopbackSession {
    name: String,
    kind: CodecKind,
    settings: LoopbackProvider,
    state: State,
    format: Option<MediaFormat>,
    queue: BufferQueue,
    pending: Vec<u8>,
    frame_bytes: usize,
    frames_out: u64,
    input_eos: bool,
}

impl LoopbackSession {
    fn new(settings: LoopbackProvider, kind: CodecKind) -> Self {
        Self {
            name: format!("loopback.aac.{kind}"),
            kind,
            settings,
            state: State::Created,
            format: None,
            queue: BufferQueue::new(0, 0, settings.max_outputs),
            pending: Vec::new(),
            frame_bytes: 0,
            frames_out: 0,
            input_eos: false,
        }
    }

    fn expect_state(&self, expected: State, operation: &str) -> Result<()> {
        if self.state != expected {
            return Err(Error::invalid_state(format!(
                "{}: {operation} in state {:?}",
                self.name, self.state
            )));
        }
        Ok(())
    }

    fn frame_time_us(&self, frame: u64) -> i64 {
        let rate = self.format.as_ref().map_or(0, |f| f.sample_rate);
        if rate == 0 {
            return 0;
        }
        (frame * SAMPLES_PER_FRAME as u64 * 1_000_000 / u64::from(rate)) as i64
    }

    fn emit_frame(&mut self, frame: Vec<u8>) {
        let pts = self.frame_time_us(self.frames_out);
        trace!("{} emits frame {} ({} bytes)", self.name, self.frames_out, frame.len());
        self.queue.push_output(frame, pts, BufferFlags::KEY_FRAME);
        self.frames_out += 1;
    }

    fn encode(&mut self, data: Vec<u8>, flags: BufferFlags) {
        self.pending.extend_from_slice(&data);
        while self.pending.len() >= self.frame_bytes {
            let frame: Vec<u8> = self.pending.drain(..self.frame_bytes).collect();
            self.emit_frame(frame);
        }
        if flags.is_end_of_stream() {
            if !self.pending.is_empty() {
                let rest = std::mem::take(&mut self.pending);
                self.emit_frame(rest);
            }
            let pts = self.frame_time_us(self.frames_out);
            self.queue.push_output(Vec::new(), pts, BufferFlags::END_OF_STREAM);
        }
    }

    fn decode(&mut self, data: Vec<u8>, presentation_time_us: i64, flags: BufferFlags) {
        if flags.is_codec_config() {
            debug!("{} consumed {} bytes of codec config", self.name, data.len());
        } else if !data.is_empty() {
            self.queue.push_output(data, presentation_time_us, BufferFlags::NONE);
        }
        if flags.is_end_of_stream() {
            self.queue
                .push_output(Vec::new(), presentation_time_us, BufferFlags::END_OF_STREAM);
        }
    }
}

impl CodecSession for LoopbackSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, format: &MediaFormat, kind: CodecKind) -> Result<()> {
        self.expect_state(State::Created, "configure")?;
        if kind != self.kind {
            return Err(Error::invalid_arg(format!(
                "{} cannot be configured as {kind}",
                self.name
            )));
        }
        if format.sample_rate == 0 || format.channel_count == 0 {
            return Err(Error::invalid_arg(format!(
                "{} needs a sample rate and channel count",
                self.name
            )));
        }
        let capacity = format.max_input_size.unwrap_or(self.settings.input_capacity);
        self.queue = BufferQueue::new(self.settings.input_slots, capacity, self.settings.max_outputs);
        self.frame_bytes = SAMPLES_PER_FRAME * format.pcm_frame_bytes();
        self.format = Some(format.clone());
        self.state = State::Configured;
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.expect_state(State::Configured, "start")?;
        let format = self
            .format
            .clone()
            .ok_or_else(|| Error::invalid_state("started without a format"))?;
        match self.kind {
            CodecKind::Encoder => {
                let asc = AdtsParams::from_format(&format, ChannelConfigPolicy::FromChannelCount)?
                    .audio_specific_config()
                    .to_vec();
                self.queue
                    .push_format_change(format.with_codec_specific_data(asc.clone()));
                self.queue.push_output(asc, 0, BufferFlags::CODEC_CONFIG);
            }
            CodecKind::Decoder => {
                self.queue.push_format_change(MediaFormat::audio(
                    MIMETYPE_AUDIO_RAW,
                    format.sample_rate,
                    format.channel_count,
                ));
            }
        }
        self.state = State::Running;
        Ok(())
    }

    fn dequeue_input_buffer(&mut self, _timeout: Option<Duration>) -> Result<Option<usize>> {
        self.expect_state(State::Running, "dequeue_input_buffer")?;
        if self.input_eos {
            return Ok(None);
        }
        Ok(self.queue.dequeue_input())
    }

    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        self.expect_state(State::Running, "input_buffer")?;
        self.queue.input_mut(index)
    }

    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.expect_state(State::Running, "queue_input_buffer")?;
        if self.input_eos {
            return Err(Error::invalid_state(format!(
                "{}: input queued after end of stream",
                self.name
            )));
        }
        let data = self.queue.submit_input(index, size)?;
        self.input_eos = flags.is_end_of_stream();
        match self.kind {
            CodecKind::Encoder => self.encode(data, flags),
            CodecKind::Decoder => self.decode(data, presentation_time_us, flags),
        }
        Ok(())
    }

    fn dequeue_output_buffer(&mut self, _timeout: Option<Duration>) -> Result<OutputEvent> {
        self.expect_state(State::Running, "dequeue_output_buffer")?;
        Ok(self.queue.next_output())
    }

    fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.expect_state(State::Running, "output_buffer")?;
        self.queue.output(index)
    }

    fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.expect_state(State::Running, "release_output_buffer")?;
        self.queue.release_output(index)
    }

    fn stop(&mut self) -> Result<()> {
        match self.state {
            State::Configured | State::Running => {
                self.queue.clear();
                if !self.pending.is_empty() {
                    debug!(
                        "{} dropped {} bytes of an incomplete frame",
                        self.name,
                        self.pending.len()
                    );
                }
                self.pending.clear();
                self.state = State::Stopped;
                Ok(())
            }
            _ => self.expect_state(State::Running, "stop"),
        }
    }

    fn release(&mut self) -> Result<()> {
        if self.state == State::Released {
            return Err(Error::invalid_state(format!("{} released twice", self.name)));
        }
        self.queue = BufferQueue::new(0, 0, 1);
        self.pending = Vec::new();
        self.state = State::Released;
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Microphone capture and speaker playback through `cpal`.
//!
//! A `cpal::Stream` cannot leave the thread that built it, so each device
//! owns a helper thread holding the stream. Samples cross between the audio
//! callback and the loop through channels, converted between `f32` and
//! little-endian 16-bit PCM.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use aacdemo::{CaptureSource, Error, PlaybackSink, Result};
use cpal::{
    SampleRate, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use tracing::{debug, error, info, warn};

/// How long `read` waits for the microphone before giving up.
const CAPTURE_STALL: Duration = Duration::from_secs(2);

/// Callback blocks buffered between the microphone and the loop.
const CAPTURE_BACKLOG: usize = 64;

fn device_error(message: impl std::fmt::Display) -> Error {
    Error::Io(std::io::Error::other(message.to_string()))
}

fn to_pcm(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn from_pcm(sample: i16) -> f32 {
    f32::from(sample) / f32::from(i16::MAX)
}

/// Converts `pcm` to samples, completing a sample split across calls.
fn split_samples(carry: &mut Option<u8>, pcm: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(pcm.len() / 2 + 1);
    let mut rest = pcm;
    if let Some(low) = *carry
        && let Some((&high, tail)) = rest.split_first()
    {
        samples.push(from_pcm(i16::from_le_bytes([low, high])));
        *carry = None;
        rest = tail;
    }
    let mut pairs = rest.chunks_exact(2);
    samples.extend(
        pairs
            .by_ref()
            .map(|pair| from_pcm(i16::from_le_bytes([pair[0], pair[1]]))),
    );
    if let [odd] = pairs.remainder() {
        *carry = Some(*odd);
    }
    samples
}

fn stream_config(sample_rate: u32, channels: u16) -> StreamConfig {
    StreamConfig {
        channels,
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    }
}

/// Keeps a stream alive on its own thread until `shutdown` is dropped or
/// signaled.
struct StreamThread {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamThread {
    /// Runs `build` on a new thread and waits until the stream plays.
    fn spawn<B>(name: &str, build: B) -> Result<Self>
    where
        B: FnOnce() -> std::result::Result<cpal::Stream, String> + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
        let (shutdown, parked) = bounded::<()>(0);
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build().and_then(|stream| {
                    stream.play().map_err(|err| err.to_string())?;
                    Ok(stream)
                }) {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Returns once the sender side is dropped.
                let _ = parked.recv();
                drop(stream);
            })?;
        let mut thread = Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(message)) => {
                thread.close();
                Err(device_error(message))
            }
            Err(_) => {
                thread.close();
                Err(device_error("audio stream thread exited"))
            }
        }
    }

    fn close(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Audio stream thread panicked");
        }
    }
}

impl Drop for StreamThread {
    fn drop(&mut self) {
        self.close();
    }
}

/// Default input device as a [`CaptureSource`].
pub struct DeviceCapture {
    sample_rate: u32,
    channels: u16,
    chunk_size: usize,
    stream: Option<StreamThread>,
    samples: Option<Receiver<Vec<i16>>>,
    pending: VecDeque<u8>,
}

impl DeviceCapture {
    pub fn new(sample_rate: u32, channels: u16, chunk_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            chunk_size,
            stream: None,
            samples: None,
            pending: VecDeque::new(),
        }
    }
}

impl CaptureSource for DeviceCapture {
    fn start(&mut self) -> Result<()> {
        let config = stream_config(self.sample_rate, self.channels);
        let (tx, rx) = bounded::<Vec<i16>>(CAPTURE_BACKLOG);
        let stream = StreamThread::spawn("aacdemo-capture", move || {
            let device = cpal::default_host()
                .default_input_device()
                .ok_or_else(|| "no audio input device found".to_string())?;
            info!("Capturing from {}", device.name().unwrap_or_default());
            device
                .build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let block = data.iter().copied().map(to_pcm).collect();
                        if tx.try_send(block).is_err() {
                            warn!("Capture backlog full, dropping {} samples", data.len());
                        }
                    },
                    |err| error!("Capture stream error: {}", err),
                    None,
                )
                .map_err(|err| err.to_string())
        })?;
        self.stream = Some(stream);
        self.samples = Some(rx);
        self.pending.clear();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let samples = self
            .samples
            .as_ref()
            .ok_or_else(|| Error::invalid_state("capture is not started"))?;
        let wanted = buf.len() - buf.len() % 2;
        let deadline = Instant::now() + CAPTURE_STALL;
        while self.pending.len() < wanted {
            let left = deadline.saturating_duration_since(Instant::now());
            match samples.recv_timeout(left) {
                Ok(block) => self.pending.extend(block.iter().flat_map(|s| s.to_le_bytes())),
                Err(RecvTimeoutError::Timeout) if !self.pending.is_empty() => break,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(device_error(format!(
                        "no audio from the microphone for {CAPTURE_STALL:?}"
                    )));
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        let read = wanted.min(self.pending.len() - self.pending.len() % 2);
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..read)) {
            *dst = src;
        }
        Ok(read)
    }

    fn stop(&mut self) -> Result<()> {
        self.samples = None;
        if let Some(mut stream) = self.stream.take() {
            stream.close();
            debug!("Capture stopped");
        }
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Default output device as a [`PlaybackSink`].
pub struct DevicePlayback {
    sample_rate: u32,
    channels: u16,
    chunk_size: usize,
    stream: Option<StreamThread>,
    queued: Arc<Mutex<VecDeque<f32>>>,
    carry: Option<u8>,
}

impl DevicePlayback {
    pub fn new(sample_rate: u32, channels: u16, chunk_size: usize) -> Self {
        Self {
            sample_rate,
            channels,
            chunk_size,
            stream: None,
            queued: Arc::new(Mutex::new(VecDeque::new())),
            carry: None,
        }
    }

    fn queued_len(&self) -> usize {
        self.queued.lock().map(|queue| queue.len()).unwrap_or(0)
    }

    /// Time the device needs to play `samples` interleaved samples.
    fn play_time(&self, samples: usize) -> Duration {
        let frames = samples / usize::from(self.channels.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate.max(1)))
    }
}

impl PlaybackSink for DevicePlayback {
    fn start(&mut self) -> Result<()> {
        let config = stream_config(self.sample_rate, self.channels);
        let queued = self.queued.clone();
        let stream = StreamThread::spawn("aacdemo-playback", move || {
            let device = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| "no audio output device found".to_string())?;
            info!("Playing on {}", device.name().unwrap_or_default());
            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Ok(mut queue) = queued.lock() else {
                            data.fill(0.0);
                            return;
                        };
                        for sample in data.iter_mut() {
                            *sample = queue.pop_front().unwrap_or(0.0);
                        }
                    },
                    |err| error!("Playback stream error: {}", err),
                    None,
                )
                .map_err(|err| err.to_string())
        })?;
        self.stream = Some(stream);
        Ok(())
    }

    /// Queues `pcm`, blocking while more than two chunks are waiting.
    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::invalid_state("playback is not started"));
        }
        // Two chunks of 16-bit bytes hold `chunk_size` samples.
        let limit = self.chunk_size;
        while self.queued_len() > limit {
            let excess = self.play_time(self.queued_len().saturating_sub(limit));
            std::thread::sleep(excess.clamp(Duration::from_millis(1), Duration::from_millis(20)));
        }
        let samples = split_samples(&mut self.carry, pcm);
        let mut queue = self
            .queued
            .lock()
            .map_err(|_| Error::invalid_state("playback queue poisoned"))?;
        queue.extend(samples);
        Ok(())
    }

    /// Lets the queued audio play out, then closes the device.
    fn stop(&mut self) -> Result<()> {
        let Some(mut stream) = self.stream.take() else {
            return Ok(());
        };
        if self.carry.take().is_some() {
            debug!("Dropping a trailing half sample");
        }
        let drain = self.play_time(self.queued_len()) + Duration::from_millis(100);
        std::thread::sleep(drain);
        stream.close();
        debug!("Playback stopped");
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

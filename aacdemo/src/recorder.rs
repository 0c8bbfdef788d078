// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Capture loop: reads PCM from a source, keeps a raw copy and encodes it.
//!
//! Every captured chunk is appended to the raw PCM sink and handed to the
//! [`AacEncoder`]. The loop checks its [`StopSignal`] once per chunk, so the
//! chunk in flight when a stop is requested is always completed.

use std::{
    f32::consts::TAU,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tracing::{debug, info, warn};

use crate::{AacEncoder, CodecProvider, DemoConfig, EncodeStats, EncoderConfig, Error, Result};

/// A source of interleaved 16-bit little-endian PCM.
pub trait CaptureSource: Send {
    /// Prepares the source. Called once before the first read.
    fn start(&mut self) -> Result<()>;

    /// Fills `buf` with up to `buf.len()` bytes of PCM and returns how many
    /// were written. `Ok(0)` means the source is exhausted.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Releases the source.
    fn stop(&mut self) -> Result<()>;

    /// Preferred read size in bytes.
    fn chunk_size(&self) -> usize;
}

/// Cooperative stop request shared between the capture loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the loop to stop after the current chunk.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Synthetic PCM: a sine tone, or silence.
///
/// Without a limit the source never runs dry and the loop runs until it is
/// stopped. With [`Self::paced`] every read sleeps for the duration of the
/// audio it returns, which makes the source behave like a microphone.
pub struct ToneSource {
    sample_rate: u32,
    channel_count: u16,
    frequency: Option<f32>,
    amplitude: f32,
    remaining_frames: Option<u64>,
    chunk_size: usize,
    paced: bool,
    phase: f32,
}

impl ToneSource {
    /// A sine tone of `frequency` Hz at half scale.
    pub fn sine(sample_rate: u32, channel_count: u16, frequency: f32) -> Self {
        Self {
            sample_rate,
            channel_count: channel_count.max(1),
            frequency: Some(frequency),
            amplitude: 0.5,
            remaining_frames: None,
            chunk_size: 3584,
            paced: false,
            phase: 0.0,
        }
    }

    /// Digital silence.
    pub fn silence(sample_rate: u32, channel_count: u16) -> Self {
        Self {
            frequency: None,
            ..Self::sine(sample_rate, channel_count, 0.0)
        }
    }

    /// Ends the source after `duration` of audio.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        let frames = duration.as_micros() * u128::from(self.sample_rate) / 1_000_000;
        self.remaining_frames = Some(frames as u64);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Delivers audio no faster than real time.
    pub fn paced(mut self) -> Self {
        self.paced = true;
        self
    }

    fn frame_bytes(&self) -> usize {
        usize::from(self.channel_count) * 2
    }
}

impl CaptureSource for ToneSource {
    fn start(&mut self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::invalid_arg("tone source needs a sample rate"));
        }
        // A shorter chunk would read as end of stream.
        if self.chunk_size < self.frame_bytes() {
            return Err(Error::invalid_arg(format!(
                "chunk of {} bytes cannot hold a {}-channel sample",
                self.chunk_size, self.channel_count
            )));
        }
        debug!(
            "Tone source started: {:?} Hz at {} Hz",
            self.frequency, self.sample_rate
        );
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut frames = buf.len() / self.frame_bytes();
        if let Some(remaining) = self.remaining_frames {
            frames = frames.min(remaining as usize);
            self.remaining_frames = Some(remaining - frames as u64);
        }
        let step = self.frequency.unwrap_or(0.0) * TAU / self.sample_rate as f32;
        for frame in buf[..frames * self.frame_bytes()].chunks_exact_mut(self.frame_bytes()) {
            let value = match self.frequency {
                Some(_) => (self.phase.sin() * self.amplitude * f32::from(i16::MAX)) as i16,
                None => 0,
            };
            for sample in frame.chunks_exact_mut(2) {
                sample.copy_from_slice(&value.to_le_bytes());
            }
            self.phase = (self.phase + step) % TAU;
        }
        if self.paced && frames > 0 {
            std::thread::sleep(Duration::from_micros(
                frames as u64 * 1_000_000 / u64::from(self.sample_rate),
            ));
        }
        Ok(frames * self.frame_bytes())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Replays a raw PCM file as if it were captured.
pub struct PcmFileSource {
    reader: Option<BufReader<File>>,
    chunk_size: usize,
}

impl PcmFileSource {
    /// # Errors
    ///
    /// [`Error::SourceMissing`] if the file does not exist.
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::SourceMissing(path.to_path_buf()));
        }
        Ok(Self {
            reader: Some(BufReader::new(File::open(path)?)),
            chunk_size,
        })
    }
}

impl CaptureSource for PcmFileSource {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::invalid_state("PCM file source already stopped"))?;
        // Fill the whole chunk unless the file ends.
        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        Ok(filled)
    }

    fn stop(&mut self) -> Result<()> {
        self.reader = None;
        Ok(())
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Counters of one capture run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordReport {
    /// Chunks read from the source.
    pub chunks: u64,
    /// Raw PCM bytes written to the PCM sink.
    pub pcm_bytes: u64,
    /// Chunks that could not be written to the PCM sink.
    pub pcm_write_failures: u64,
    pub encode: EncodeStats,
}

/// Runs the capture loop until `stop` is raised or `source` is exhausted.
///
/// Each chunk is appended to `pcm_sink` and then encoded into `aac_sink`.
/// Failures to write `pcm_sink` are logged and counted. On exit the source is
/// stopped, the encoder finished and the PCM sink flushed, in that order,
/// whether the loop succeeded or not.
pub fn record<S, P, A>(
    provider: &dyn CodecProvider,
    encoder: EncoderConfig,
    source: &mut S,
    mut pcm_sink: P,
    aac_sink: A,
    stop: &StopSignal,
) -> Result<RecordReport>
where
    S: CaptureSource + ?Sized,
    P: Write,
    A: Write,
{
    let mut encoder = AacEncoder::new(provider, encoder, aac_sink)?;
    source.start()?;
    info!("Recording started");

    let mut report = RecordReport::default();
    let looped = capture(source, &mut pcm_sink, &mut encoder, stop, &mut report);

    let stopped = source.stop();
    let finished = encoder.finish();
    let flushed = pcm_sink.flush();
    looped?;
    stopped?;
    report.encode = finished?;
    flushed?;
    info!(
        "Recording stopped: {} chunks, {} PCM bytes",
        report.chunks, report.pcm_bytes
    );
    Ok(report)
}

fn capture<S, P, A>(
    source: &mut S,
    pcm_sink: &mut P,
    encoder: &mut AacEncoder<A>,
    stop: &StopSignal,
    report: &mut RecordReport,
) -> Result<()>
where
    S: CaptureSource + ?Sized,
    P: Write,
    A: Write,
{
    let mut buf = vec![0; source.chunk_size().max(2)];
    while !stop.is_stopped() {
        let read = source.read(&mut buf)?;
        if read == 0 {
            info!("Capture source exhausted");
            break;
        }
        let chunk = &buf[..read];
        match pcm_sink.write_all(chunk) {
            Ok(()) => report.pcm_bytes += read as u64,
            Err(err) => {
                warn!("Failed to write captured PCM: {}", err);
                report.pcm_write_failures += 1;
            }
        }
        encoder.encode(chunk)?;
        report.chunks += 1;
    }
    Ok(())
}

/// Records into the files named by `config.storage`, creating the folder.
pub fn record_files<S>(
    provider: &dyn CodecProvider,
    config: &DemoConfig,
    source: &mut S,
    stop: &StopSignal,
) -> Result<RecordReport>
where
    S: CaptureSource + ?Sized,
{
    std::fs::create_dir_all(config.storage.folder())?;
    let pcm_path = config.storage.recorded_pcm();
    let aac_path = config.storage.encoded_aac();
    info!("Recording into {} and {}", pcm_path.display(), aac_path.display());
    let pcm_sink = BufWriter::new(File::create(&pcm_path)?);
    let aac_sink = BufWriter::new(File::create(&aac_path)?);
    record(provider, config.encoder.clone(), source, pcm_sink, aac_sink, stop)
}

#[cfg(test)]
mod tests {
    use std::io;

    use tracing_test::traced_test;

    use super::*;
    use crate::LoopbackProvider;

    struct Unwritable;

    impl Write for Unwritable {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("read-only storage"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Raises the stop signal after a number of reads.
    struct StopAfter {
        inner: ToneSource,
        reads: usize,
        signal: StopSignal,
    }

    impl CaptureSource for StopAfter {
        fn start(&mut self) -> Result<()> {
            self.inner.start()
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.reads -= 1;
            if self.reads == 0 {
                self.signal.stop();
            }
            self.inner.read(buf)
        }
        fn stop(&mut self) -> Result<()> {
            self.inner.stop()
        }
        fn chunk_size(&self) -> usize {
            self.inner.chunk_size()
        }
    }

    #[test]
    fn tone_source_is_bounded_and_exact() {
        let mut source = ToneSource::silence(44100, 1).with_duration(Duration::from_secs(1));
        let mut buf = vec![1; 3584];
        let mut total = 0;
        loop {
            let read = source.read(&mut buf).unwrap();
            if read == 0 {
                break;
            }
            assert!(buf[..read].iter().all(|&b| b == 0));
            total += read;
        }
        assert_eq!(total, 88200);
    }

    #[test]
    fn sine_is_not_silent() {
        let mut source = ToneSource::sine(8000, 2, 1000.0);
        let mut buf = vec![0; 64];
        assert_eq!(source.read(&mut buf).unwrap(), 64);
        let samples: Vec<i16> = buf
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        // Interleaved channels carry the same value.
        assert!(samples.chunks_exact(2).all(|pair| pair[0] == pair[1]));
        assert!(samples.iter().any(|&s| s > 8000));
    }

    #[test]
    fn chunk_smaller_than_a_sample_is_rejected() {
        let mut source = ToneSource::sine(44100, 2, 440.0).with_chunk_size(3);
        assert!(matches!(source.start(), Err(Error::InvalidArg(_))));

        let mut pcm = Vec::new();
        let result = record(
            &LoopbackProvider::default(),
            EncoderConfig {
                channel_count: 2,
                ..Default::default()
            },
            &mut ToneSource::sine(44100, 2, 440.0).with_chunk_size(3),
            &mut pcm,
            Vec::new(),
            &StopSignal::new(),
        );
        assert!(matches!(result, Err(Error::InvalidArg(_))));
        assert!(pcm.is_empty());

        let mut source = ToneSource::sine(44100, 2, 440.0).with_chunk_size(4);
        assert!(source.start().is_ok());
        assert_eq!(source.read(&mut [0; 4]).unwrap(), 4);
    }

    #[test]
    fn stop_signal_completes_the_chunk_in_flight() {
        let signal = StopSignal::new();
        let mut source = StopAfter {
            inner: ToneSource::silence(44100, 1).with_chunk_size(2048),
            reads: 3,
            signal: signal.clone(),
        };
        let mut pcm = Vec::new();
        let mut aac = Vec::new();
        let report = record(
            &LoopbackProvider::default(),
            EncoderConfig::default(),
            &mut source,
            &mut pcm,
            &mut aac,
            &signal,
        )
        .unwrap();
        assert_eq!(report.chunks, 3);
        assert_eq!(pcm.len(), 3 * 2048);
        assert_eq!(report.encode.frames_written, 3);
        assert_eq!(aac.len(), 3 * (7 + 2048));
    }

    #[test]
    #[traced_test]
    fn pcm_write_failures_are_tolerated() {
        let mut source = ToneSource::silence(44100, 1)
            .with_chunk_size(2048)
            .with_duration(Duration::from_millis(100));
        let mut aac = Vec::new();
        let report = record(
            &LoopbackProvider::default(),
            EncoderConfig::default(),
            &mut source,
            Unwritable,
            &mut aac,
            &StopSignal::new(),
        )
        .unwrap();
        // 4410 samples are four full chunks and a short one.
        assert_eq!(report.chunks, 5);
        assert_eq!(report.pcm_write_failures, 5);
        assert_eq!(report.encode.frames_written, 4);
        assert!(!aac.is_empty());
        assert!(logs_contain("Failed to write captured PCM"));
    }

    #[test]
    fn missing_pcm_file() {
        assert!(matches!(
            PcmFileSource::open("/nonexistent/recode_file.pcm", 1024),
            Err(Error::SourceMissing(_))
        ));
    }
}

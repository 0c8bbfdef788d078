// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests of the encode, decode, record and play loops.
//!
//! The loops run against the loopback codec and against a scripted codec
//! that times out on a fixed schedule. Files are written to a temporary
//! directory that is removed after each test.

mod common;

use std::{
    collections::VecDeque,
    fs,
    io::{self, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use aacdemo::{
    AacEncoder, AdtsExtractor, AdtsHeader, BufferFlags, BufferInfo, CodecKind, CodecProvider,
    CodecSession, DemoConfig, EncoderConfig, Error, LoopbackProvider, MediaFormat, OutputEvent,
    PlaySource, PollPolicy, Result, StopSignal, ToneSource, WorkerPool, WriterSink, decode,
    decode_file, play, record_files,
};
use common::{TestDirGuard, setup_logging};
use tracing::info;

/// A decoder that echoes its input but misses every `period`-th poll on both
/// queues, as a busy hardware codec does when its bounded wait expires.
struct FlakySession {
    period: usize,
    polls: usize,
    input: Vec<u8>,
    pending: VecDeque<(Vec<u8>, BufferFlags)>,
    current: Option<Vec<u8>>,
    stopped: Arc<AtomicUsize>,
}

impl FlakySession {
    fn timed_out(&mut self) -> bool {
        self.polls += 1;
        self.polls % self.period == 0
    }
}

impl CodecSession for FlakySession {
    fn name(&self) -> &str {
        "flaky"
    }
    fn configure(&mut self, format: &MediaFormat, _: CodecKind) -> Result<()> {
        self.input = vec![0; format.max_input_size.unwrap_or(4096)];
        Ok(())
    }
    fn start(&mut self) -> Result<()> {
        Ok(())
    }
    fn dequeue_input_buffer(&mut self, _: Option<Duration>) -> Result<Option<usize>> {
        Ok((!self.timed_out()).then_some(0))
    }
    fn input_buffer(&mut self, _: usize) -> Result<&mut [u8]> {
        Ok(&mut self.input)
    }
    fn queue_input_buffer(&mut self, _: usize, size: usize, _: i64, flags: BufferFlags) -> Result<()> {
        self.pending.push_back((self.input[..size].to_vec(), flags));
        Ok(())
    }
    fn dequeue_output_buffer(&mut self, _: Option<Duration>) -> Result<OutputEvent> {
        if self.timed_out() || self.current.is_some() {
            return Ok(OutputEvent::TryAgainLater);
        }
        let Some((data, flags)) = self.pending.pop_front() else {
            return Ok(OutputEvent::TryAgainLater);
        };
        let info = BufferInfo {
            offset: 0,
            size: data.len(),
            presentation_time_us: 0,
            flags,
        };
        self.current = Some(data);
        Ok(OutputEvent::Buffer { index: 0, info })
    }
    fn output_buffer(&self, _: usize) -> Result<&[u8]> {
        self.current
            .as_deref()
            .ok_or_else(|| Error::invalid_arg("no output buffer"))
    }
    fn release_output_buffer(&mut self, _: usize) -> Result<()> {
        self.current.take().map(|_| ()).ok_or_else(|| Error::invalid_arg("double release"))
    }
    fn stop(&mut self) -> Result<()> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
    fn release(&mut self) -> Result<()> {
        Ok(())
    }
}

struct FlakyProvider {
    period: usize,
    stopped: Arc<AtomicUsize>,
}

impl CodecProvider for FlakyProvider {
    fn create_encoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        Err(Error::CodecUnavailable(mime.to_string()))
    }
    fn create_decoder_by_type(&self, _: &str) -> Result<Box<dyn CodecSession>> {
        Ok(Box::new(FlakySession {
            period: self.period,
            polls: 0,
            input: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            stopped: self.stopped.clone(),
        }))
    }
}

/// Never produces output.
struct StuckProvider;

impl CodecProvider for StuckProvider {
    fn create_encoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        Err(Error::CodecUnavailable(mime.to_string()))
    }
    fn create_decoder_by_type(&self, _: &str) -> Result<Box<dyn CodecSession>> {
        Ok(Box::new(FlakySession {
            period: 1,
            polls: 0,
            input: Vec::new(),
            pending: VecDeque::new(),
            current: None,
            stopped: Arc::new(AtomicUsize::new(0)),
        }))
    }
}

#[derive(Default)]
struct SinkLog {
    bytes: Mutex<Vec<u8>>,
    flushes: AtomicUsize,
    closes: AtomicUsize,
}

/// Records what the decode loop does to its output.
struct ObservedSink(Arc<SinkLog>);

impl Write for ObservedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.bytes.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ObservedSink {
    fn drop(&mut self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn encode_chunks(chunks: &[Vec<u8>]) -> (Vec<u8>, aacdemo::EncodeStats) {
    let mut aac = Vec::new();
    let mut encoder =
        AacEncoder::new(&LoopbackProvider::default(), EncoderConfig::default(), &mut aac).unwrap();
    for chunk in chunks {
        encoder.encode(chunk).unwrap();
    }
    let stats = encoder.finish().unwrap();
    (aac, stats)
}

#[test]
fn one_second_of_silence_round_trips_through_files() {
    setup_logging();
    let dir = TestDirGuard::new("silence");
    let aac_path = dir.path().join("encoder_file.aac");
    let pcm_path = dir.path().join("out").join("decoder_file.pcm");

    let file = fs::File::create(&aac_path).unwrap();
    let mut encoder =
        AacEncoder::new(&LoopbackProvider::default(), EncoderConfig::default(), file).unwrap();
    encoder.encode(&vec![0; 88200]).unwrap();
    let stats = encoder.finish().unwrap();

    let aac = fs::read(&aac_path).unwrap();
    assert!(!aac.is_empty());
    assert_eq!(&aac[..2], &[0xFF, 0xF9]);
    assert_eq!(stats.frames_written, 43);
    assert_eq!(aac.len(), 43 * (7 + 2048));

    let report = decode_file(
        &LoopbackProvider::default(),
        &aac_path,
        &pcm_path,
        &PollPolicy::default(),
    )
    .unwrap();
    assert!(report.finished);
    assert_eq!(report.samples_read, 43);
    let pcm = fs::read(&pcm_path).unwrap();
    assert_eq!(pcm.len(), 43 * 2048);
    assert!(pcm.iter().all(|&b| b == 0));
    info!("Decoded {} bytes", pcm.len());
}

#[test]
fn encoded_file_is_the_concatenation_of_framed_payloads() {
    setup_logging();
    let chunks: Vec<Vec<u8>> = [700, 3584, 1, 5000, 2048, 10240, 333]
        .iter()
        .enumerate()
        .map(|(i, &len)| vec![i as u8; len])
        .collect();
    let (aac, stats) = encode_chunks(&chunks);

    let mut offset = 0;
    let mut payloads = Vec::new();
    let mut frames = 0;
    while offset < aac.len() {
        let header = AdtsHeader::parse(&aac[offset..]).unwrap();
        payloads.extend_from_slice(&aac[offset + header.header_len()..offset + header.frame_length]);
        offset += header.frame_length;
        frames += 1;
    }
    assert_eq!(offset, aac.len());
    assert_eq!(frames, stats.frames_written);
    assert_eq!(aac.len(), frames as usize * 7 + payloads.len());

    // The loopback payloads are the PCM itself, so the frames hold the whole
    // 2048 byte frames of the input in order.
    let input: Vec<u8> = chunks.concat();
    assert_eq!(payloads.len(), input.len() / 2048 * 2048);
    assert_eq!(&payloads[..], &input[..payloads.len()]);
    assert_eq!(AdtsExtractor::from_bytes(aac).unwrap().frames().len() as u64, frames);
}

#[test]
fn decode_terminates_through_timeouts_and_closes_once() {
    setup_logging();
    let (aac, _) = encode_chunks(&[vec![5; 5 * 2048]]);
    let stopped = Arc::new(AtomicUsize::new(0));
    let provider = FlakyProvider {
        period: 3,
        stopped: stopped.clone(),
    };
    let log = Arc::new(SinkLog::default());

    let report = decode(
        &provider,
        AdtsExtractor::from_bytes(aac).unwrap(),
        ObservedSink(log.clone()),
        &PollPolicy {
            timeout: Duration::from_millis(1),
            max_idle_polls: Some(50),
        },
    )
    .unwrap();

    assert!(report.finished);
    assert_eq!(report.samples_read, 5);
    assert!(report.idle_polls > 0);
    assert_eq!(log.bytes.lock().unwrap().len(), 5 * 2048);
    assert_eq!(log.flushes.load(Ordering::SeqCst), 1);
    assert_eq!(log.closes.load(Ordering::SeqCst), 1);
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
}

#[test]
fn decode_gives_up_after_the_idle_budget() {
    setup_logging();
    let (aac, _) = encode_chunks(&[vec![0; 2048]]);
    let result = decode(
        &StuckProvider,
        AdtsExtractor::from_bytes(aac).unwrap(),
        io::sink(),
        &PollPolicy {
            timeout: Duration::ZERO,
            max_idle_polls: Some(10),
        },
    );
    assert!(matches!(result, Err(Error::Timeout(10))));
}

#[test]
fn recording_plays_back_and_decodes_on_the_pool() {
    setup_logging();
    let dir = TestDirGuard::new("record");
    let mut config = DemoConfig::default();
    config.storage.folder = dir.path().join("AudioDemo");

    let mut source = ToneSource::sine(44100, 1, 440.0).with_duration(Duration::from_millis(500));
    let report = record_files(
        &LoopbackProvider::default(),
        &config,
        &mut source,
        &StopSignal::new(),
    )
    .unwrap();
    assert_eq!(report.pcm_bytes, 44100);
    assert_eq!(report.pcm_write_failures, 0);

    let mut sink = WriterSink::new(Vec::new(), 1000);
    let played = play(&config, PlaySource::Recorded, &mut sink).unwrap();
    assert_eq!(played.bytes_played, 44100);
    assert!(played.chunks >= 45);
    assert_eq!(
        sink.into_inner(),
        fs::read(config.storage.recorded_pcm()).unwrap()
    );

    let pool = WorkerPool::new(config.workers.threads, config.workers.queue_capacity).unwrap();
    let task_config = config.clone();
    let handle = pool
        .submit(move || {
            decode_file(
                &LoopbackProvider::default(),
                &task_config.storage.encoded_aac(),
                &task_config.storage.decoded_pcm(),
                &task_config.decoder.poll_policy(),
            )
        })
        .unwrap();
    let decoded = handle.wait().unwrap().unwrap();
    assert!(decoded.finished);

    // Only whole frames survive the encoder; the decoded file is a prefix of
    // the recording.
    let recorded = fs::read(config.storage.recorded_pcm()).unwrap();
    let decoded = fs::read(config.storage.decoded_pcm()).unwrap();
    assert_eq!(decoded.len(), 44100 / 2048 * 2048);
    assert_eq!(&recorded[..decoded.len()], &decoded[..]);
}

#[test]
fn decode_without_a_recording_reports_the_missing_file() {
    setup_logging();
    let dir = TestDirGuard::new("missing");
    let mut config = DemoConfig::default();
    config.storage.folder = dir.path().to_path_buf();
    let result = decode_file(
        &LoopbackProvider::default(),
        &config.storage.encoded_aac(),
        &config.storage.decoded_pcm(),
        &PollPolicy::default(),
    );
    assert!(matches!(result, Err(Error::SourceMissing(path)) if path.ends_with("encoder_file.aac")));
}

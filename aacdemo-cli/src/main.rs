// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! aacdemo - record, encode, decode and play AAC audio.
//!
//! Every command runs its loop on the worker pool, like the buttons of the
//! demo it is modeled on: `record` captures PCM and encodes it to ADTS,
//! `decode` turns the ADTS file back into PCM and `play` streams either PCM
//! file to a sink.

#[cfg(feature = "device")]
mod device;

use std::{
    io::{BufRead, BufWriter},
    path::{Path, PathBuf},
    time::Duration,
};

use aacdemo::{
    AdtsExtractor, CaptureSource, CodecProvider, DemoConfig, EncodeStats, Error,
    LoopbackProvider, PcmFileSource, PlaySource, PlaybackSink, Result, StopSignal, ToneSource,
    WorkerPool, WriterSink, decode_file, encode_file, play, record_files,
};
use aacdemo_fdk::FdkCodecProvider;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aacdemo")]
#[command(about = "Record, encode, decode and play AAC audio", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(short, long, env = "AACDEMO_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the PCM and AAC files
    #[arg(short, long, env = "AACDEMO_DIR")]
    dir: Option<PathBuf>,

    /// Codec backend
    #[arg(long, value_enum, default_value_t = CodecChoice::Fdk)]
    codec: CodecChoice,

    /// Log at debug level (twice for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum CodecChoice {
    /// Fraunhofer FDK AAC
    Fdk,
    /// Pass-through codec, for testing the loops
    Loopback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceChoice {
    /// Synthetic sine tone
    Tone,
    /// Digital silence
    Silence,
    /// Raw PCM file given with --input
    File,
    /// Default microphone
    Device,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Capture PCM and encode it to ADTS
    Record {
        /// Stop after this many seconds instead of waiting for Enter
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Where the PCM comes from
        #[arg(long, value_enum, default_value_t = SourceChoice::Tone)]
        source: SourceChoice,

        /// Raw PCM file for `--source file`
        #[arg(short, long, required_if_eq("source", "file"))]
        input: Option<PathBuf>,

        /// Tone frequency in Hz
        #[arg(long, default_value_t = 440.0)]
        frequency: f32,

        /// Encode the trailing partial frame instead of dropping it
        #[arg(long)]
        flush_on_stop: bool,
    },

    /// Stream a PCM file to a sink
    Play {
        /// Play the raw recording instead of the decoder output
        #[arg(long)]
        recorded: bool,

        /// Write the PCM to this file, or `-` for stdout
        #[arg(short, long, default_value = "-", conflicts_with = "device")]
        output: PathBuf,

        /// Play on the default speaker
        #[arg(long)]
        device: bool,
    },

    /// Decode the encoded file back to PCM
    Decode,

    /// Run a raw PCM file through the encode loop
    Encode {
        /// Raw 16-bit PCM in the capture format
        #[arg(short, long)]
        input: PathBuf,
    },

    /// List the ADTS frames of an AAC file
    Info {
        /// AAC file; defaults to the encoded file
        path: Option<PathBuf>,
    },
}

fn setup_logging(verbose: u8) {
    let default = match verbose {
        0 => tracing::level_filters::LevelFilter::INFO,
        1 => tracing::level_filters::LevelFilter::DEBUG,
        _ => tracing::level_filters::LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<DemoConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            DemoConfig::load(path)?
        }
        None => DemoConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.storage.folder = dir.clone();
    }
    match cli.command {
        Command::Record { flush_on_stop: true, .. } | Command::Encode { .. } => {
            config.encoder.flush_on_stop = true;
        }
        _ => {}
    }
    Ok(config.normalized())
}

fn provider(choice: CodecChoice) -> Box<dyn CodecProvider> {
    match choice {
        CodecChoice::Fdk => Box::new(FdkCodecProvider::default()),
        CodecChoice::Loopback => Box::new(LoopbackProvider::default()),
    }
}

fn capture_source(
    config: &DemoConfig,
    source: SourceChoice,
    input: Option<PathBuf>,
    frequency: f32,
    seconds: Option<u64>,
) -> Result<Box<dyn CaptureSource>> {
    let capture = &config.capture;
    let bounded = |tone: ToneSource| {
        let tone = tone.with_chunk_size(capture.chunk_size).paced();
        match seconds {
            Some(seconds) => tone.with_duration(Duration::from_secs(seconds)),
            None => tone,
        }
    };
    Ok(match source {
        SourceChoice::Tone => Box::new(bounded(ToneSource::sine(
            capture.sample_rate,
            capture.channel_count,
            frequency,
        ))),
        SourceChoice::Silence => Box::new(bounded(ToneSource::silence(
            capture.sample_rate,
            capture.channel_count,
        ))),
        SourceChoice::File => {
            let path = input.ok_or_else(|| Error::invalid_arg("--source file needs --input"))?;
            Box::new(PcmFileSource::open(path, capture.chunk_size)?)
        }
        #[cfg(feature = "device")]
        SourceChoice::Device => Box::new(device::DeviceCapture::new(
            capture.sample_rate,
            capture.channel_count,
            capture.chunk_size,
        )),
        #[cfg(not(feature = "device"))]
        SourceChoice::Device => {
            return Err(Error::CodecUnavailable(
                "audio devices (rebuild with --features device)".to_string(),
            ));
        }
    })
}

/// Whether `source` ends the recording without a timer or Enter.
fn stops_itself(source: SourceChoice, seconds: Option<u64>) -> bool {
    match source {
        SourceChoice::Tone | SourceChoice::Silence => seconds.is_some(),
        // A file ends on its own; with --seconds the timer may cut it short.
        SourceChoice::File => seconds.is_none(),
        SourceChoice::Device => false,
    }
}

/// Raises `stop` after `seconds`, or when Enter is pressed.
fn arm_stop(stop: &StopSignal, seconds: Option<u64>) {
    let stop = stop.clone();
    let armed = std::thread::Builder::new()
        .name("aacdemo-stop".to_string())
        .spawn(move || {
            match seconds {
                Some(seconds) => std::thread::sleep(Duration::from_secs(seconds)),
                None => {
                    eprintln!("Recording, press Enter to stop");
                    let mut line = String::new();
                    if let Err(err) = std::io::stdin().lock().read_line(&mut line) {
                        warn!("Failed to read stdin: {}", err);
                    }
                }
            }
            stop.stop();
        });
    if let Err(err) = armed {
        warn!("Failed to start the stop timer: {}", err);
    }
}

fn record(
    pool: &WorkerPool,
    config: DemoConfig,
    provider: Box<dyn CodecProvider>,
    mut source: Box<dyn CaptureSource>,
    seconds: Option<u64>,
    stops_itself: bool,
) -> Result<()> {
    let stop = StopSignal::new();
    if !stops_itself {
        arm_stop(&stop, seconds);
    }
    let task_stop = stop.clone();
    let report = pool
        .submit(move || record_files(provider.as_ref(), &config, source.as_mut(), &task_stop))?
        .wait()??;
    stop.stop();
    info!(
        "Recorded {} PCM bytes, wrote {} AAC frames ({} bytes)",
        report.pcm_bytes, report.encode.frames_written, report.encode.bytes_written
    );
    if report.encode.pcm_bytes_dropped > 0 {
        warn!("{} PCM bytes were not encoded", report.encode.pcm_bytes_dropped);
    }
    Ok(())
}

/// Encodes `input` into the encoded file, leaving the recording alone.
fn encode(
    pool: &WorkerPool,
    config: &DemoConfig,
    provider: Box<dyn CodecProvider>,
    input: &Path,
) -> Result<EncodeStats> {
    let encoder = config.encoder.clone();
    let input = input.to_path_buf();
    let output = config.storage.encoded_aac();
    let stats = pool
        .submit(move || encode_file(provider.as_ref(), &encoder, &input, &output))?
        .wait()??;
    info!(
        "Encoded {} PCM bytes into {} AAC frames ({} bytes)",
        stats.pcm_bytes_submitted, stats.frames_written, stats.bytes_written
    );
    Ok(stats)
}

fn playback_sink(config: &DemoConfig, output: PathBuf, device: bool) -> Result<Box<dyn PlaybackSink>> {
    let chunk_size = config.capture.chunk_size;
    if device {
        #[cfg(feature = "device")]
        return Ok(Box::new(device::DevicePlayback::new(
            config.capture.sample_rate,
            config.capture.channel_count,
            chunk_size,
        )));
        #[cfg(not(feature = "device"))]
        return Err(Error::CodecUnavailable(
            "audio devices (rebuild with --features device)".to_string(),
        ));
    }
    if output.as_os_str() == "-" {
        return Ok(Box::new(WriterSink::new(std::io::stdout(), chunk_size)));
    }
    let file = BufWriter::new(std::fs::File::create(&output)?);
    Ok(Box::new(WriterSink::new(file, chunk_size)))
}

fn show_frames(path: PathBuf) -> Result<()> {
    let extractor = AdtsExtractor::open(&path)?;
    let format = extractor.format();
    println!("{}", path.display());
    println!(
        "  {}  {} Hz  {} channel(s)  {:?}  {:.3} s",
        format.mime,
        format.sample_rate,
        format.channel_count,
        format.aac_profile.unwrap_or_default(),
        format.duration_us.unwrap_or(0) as f64 / 1e6
    );
    if let Some(csd) = &format.codec_specific_data {
        println!("  AudioSpecificConfig {csd:02X?}");
    }
    println!("  {:>6}  {:>8}  {:>6}  {:>7}", "frame", "offset", "length", "payload");
    for (n, frame) in extractor.frames().iter().enumerate() {
        println!(
            "  {:>6}  {:>8}  {:>6}  {:>7}",
            n,
            frame.offset,
            frame.header.frame_length,
            frame.header.payload_len()
        );
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let pool = WorkerPool::new(config.workers.threads, config.workers.queue_capacity)?;
    let provider = provider(cli.codec);

    match cli.command {
        Command::Record {
            seconds,
            source,
            input,
            frequency,
            ..
        } => {
            let capture = capture_source(&config, source, input, frequency, seconds)?;
            let bounded = stops_itself(source, seconds);
            record(&pool, config, provider, capture, seconds, bounded)
        }
        Command::Encode { input } => encode(&pool, &config, provider, &input).map(|_| ()),
        Command::Decode => {
            let source = config.storage.encoded_aac();
            let output = config.storage.decoded_pcm();
            let policy = config.decoder.poll_policy();
            let report = pool
                .submit(move || decode_file(provider.as_ref(), &source, &output, &policy))?
                .wait()??;
            info!(
                "Decoded {} frames into {} PCM bytes",
                report.samples_read, report.bytes_written
            );
            Ok(())
        }
        Command::Play {
            recorded,
            output,
            device,
        } => {
            let source = if recorded {
                PlaySource::Recorded
            } else {
                PlaySource::from_config(&config)
            };
            let mut sink = playback_sink(&config, output, device)?;
            let report = pool.submit(move || play(&config, source, sink.as_mut()))?.wait()??;
            info!("Played {} bytes from {}", report.bytes_played, report.path.display());
            Ok(())
        }
        Command::Info { path } => show_frames(path.unwrap_or_else(|| config.storage.encoded_aac())),
    }
}

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    if let Err(err) = run(cli) {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use aacdemo::play_file;
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn record_flags_parse() {
        let cli = Cli::try_parse_from([
            "aacdemo", "--codec", "loopback", "--dir", "/tmp/x", "record", "--seconds", "3",
            "--source", "silence", "--flush-on-stop",
        ])
        .unwrap();
        assert_eq!(cli.codec, CodecChoice::Loopback);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.storage.folder, PathBuf::from("/tmp/x"));
        assert!(config.encoder.flush_on_stop);
        assert!(matches!(
            cli.command,
            Command::Record {
                seconds: Some(3),
                source: SourceChoice::Silence,
                ..
            }
        ));
    }

    #[test]
    fn file_source_requires_input() {
        assert!(Cli::try_parse_from(["aacdemo", "record", "--source", "file"]).is_err());
        assert!(
            Cli::try_parse_from(["aacdemo", "record", "--source", "file", "--input", "a.pcm"])
                .is_ok()
        );
    }

    #[test]
    fn only_open_ended_sources_wait_for_enter() {
        assert!(stops_itself(SourceChoice::File, None));
        assert!(!stops_itself(SourceChoice::File, Some(5)));
        assert!(stops_itself(SourceChoice::Tone, Some(5)));
        assert!(!stops_itself(SourceChoice::Silence, None));
        assert!(!stops_itself(SourceChoice::Device, Some(5)));
    }

    #[test]
    fn encode_after_record_keeps_the_recording() {
        let dir = std::env::temp_dir().join(format!("aacdemo_cli_encode_{}", std::process::id()));
        let cli = Cli::try_parse_from([
            "aacdemo",
            "--codec",
            "loopback",
            "--dir",
            dir.to_str().unwrap(),
            "encode",
            "--input",
            dir.join("recode_file.pcm").to_str().unwrap(),
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        let Command::Encode { input } = &cli.command else {
            panic!("expected the encode command");
        };
        let pool = WorkerPool::new(2, 4).unwrap();

        let tone = ToneSource::sine(44100, 1, 440.0).with_duration(Duration::from_secs(1));
        record(
            &pool,
            config.clone(),
            provider(CodecChoice::Loopback),
            Box::new(tone),
            None,
            true,
        )
        .unwrap();
        let recording = std::fs::read(input).unwrap();
        assert_eq!(recording.len(), 88200);

        let stats = encode(&pool, &config, provider(cli.codec), input).unwrap();
        assert_eq!(std::fs::read(input).unwrap(), recording);
        assert_eq!(stats.pcm_bytes_submitted, 88200);

        let aac = std::fs::read(config.storage.encoded_aac()).unwrap();
        assert!(!aac.is_empty());
        let frames = AdtsExtractor::from_bytes(aac).unwrap().frames().len();
        assert_eq!(frames as u64, stats.frames_written);

        let aac_path = config.storage.encoded_aac();
        assert!(encode(&pool, &config, provider(cli.codec), &aac_path).is_err());
        assert_eq!(std::fs::read(input).unwrap(), recording);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn play_output_and_device_conflict() {
        assert!(Cli::try_parse_from(["aacdemo", "play", "--device", "--output", "a.pcm"]).is_err());
        let cli = Cli::try_parse_from(["aacdemo", "play", "--recorded"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Play { recorded: true, ref output, device: false } if output.as_os_str() == "-"
        ));
    }

    #[test]
    fn play_file_streams_to_a_writer() {
        let path = std::env::temp_dir().join(format!("aacdemo_cli_play_{}.pcm", std::process::id()));
        std::fs::write(&path, vec![7u8; 10_000]).unwrap();
        let mut sink = WriterSink::new(Vec::new(), 3584);
        let report = play_file(&path, &mut sink).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(report.bytes_played, 10_000);
        assert_eq!(sink.into_inner().len(), 10_000);
    }
}

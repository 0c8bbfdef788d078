// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Records a synthetic tone, encodes it to ADTS and decodes it again, all
//! through the loopback codec.
//!
//! ```text
//! cargo run -p aacdemo --example loopback_roundtrip -- --folder /tmp/AudioDemo --seconds 2
//! ```

mod common;

use std::{path::PathBuf, time::Duration};

use aacdemo::{DemoConfig, LoopbackProvider, StopSignal, ToneSource, decode_file, record_files};
use clap::Parser;
use tracing::info;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Folder receiving the PCM and AAC files.
    #[arg(long, default_value = "AudioDemo")]
    folder: PathBuf,

    /// Length of the recording.
    #[arg(long, default_value_t = 1)]
    seconds: u64,

    /// Tone frequency in Hz; 0 records silence.
    #[arg(long, default_value_t = 440.0)]
    frequency: f32,
}

fn main() -> Result<(), aacdemo::Error> {
    common::setup_logging();
    let args = Args::parse();

    let mut config = DemoConfig::default();
    config.storage.folder = args.folder;
    let capture = &config.capture;

    let source = if args.frequency > 0.0 {
        ToneSource::sine(capture.sample_rate, capture.channel_count, args.frequency)
    } else {
        ToneSource::silence(capture.sample_rate, capture.channel_count)
    };
    let mut source = source
        .with_chunk_size(capture.chunk_size)
        .with_duration(Duration::from_secs(args.seconds));

    let provider = LoopbackProvider::default();
    let recorded = record_files(&provider, &config, &mut source, &StopSignal::new())?;
    info!(
        "Recorded {} bytes, wrote {} ADTS frames",
        recorded.pcm_bytes, recorded.encode.frames_written
    );

    let decoded = decode_file(
        &provider,
        &config.storage.encoded_aac(),
        &config.storage.decoded_pcm(),
        &config.decoder.poll_policy(),
    )?;
    info!(
        "Decoded {} samples into {} ({} bytes)",
        decoded.samples_read,
        config.storage.decoded_pcm().display(),
        decoded.bytes_written
    );
    Ok(())
}

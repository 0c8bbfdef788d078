// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::fs::File;

use aacdemo::{
    AacEncoder, AdtsExtractor, EncoderConfig, Extractor, PollPolicy, decode, decode_file,
    select_audio_track,
};
use aacdemo_fdk::FdkCodecProvider;

use crate::common::*;

fn sine_pcm(seconds: f32, frequency: f32, amplitude: f32) -> Vec<u8> {
    let samples = (44100.0 * seconds) as usize;
    (0..samples)
        .flat_map(|n| {
            let phase = 2.0 * std::f32::consts::PI * frequency * n as f32 / 44100.0;
            ((phase.sin() * amplitude) as i16).to_le_bytes()
        })
        .collect()
}

fn encode(pcm: &[u8]) -> Vec<u8> {
    let config = EncoderConfig {
        flush_on_stop: true,
        ..EncoderConfig::default()
    };
    let mut aac = Vec::new();
    let mut encoder = AacEncoder::new(&FdkCodecProvider::default(), config, &mut aac).unwrap();
    encoder.encode(pcm).unwrap();
    let stats = encoder.finish().unwrap();
    assert_eq!(stats.pcm_bytes_dropped, 0);
    assert_eq!(stats.write_failures, 0);
    assert!(stats.frames_written > 0);
    aac
}

fn rms(pcm: &[u8]) -> f64 {
    let samples: Vec<f64> = pcm
        .chunks_exact(2)
        .map(|pair| f64::from(i16::from_le_bytes([pair[0], pair[1]])))
        .collect();
    (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
}

#[test]
fn silence_encodes_to_parseable_adts() {
    setup_logging();
    let aac = encode(&vec![0; 88200]);
    assert_eq!(&aac[..2], &[0xFF, 0xF9]);

    let mut extractor = AdtsExtractor::from_bytes(aac.clone()).unwrap();
    let frames = extractor.frames().to_vec();
    // 44100 samples make 43 whole frames plus one padded frame.
    assert!(frames.len() >= 43, "only {} frames", frames.len());
    let covered: usize = frames.iter().map(|f| f.header.frame_length).sum();
    assert_eq!(covered, aac.len());
    for frame in &frames {
        assert_eq!(frame.header.sample_rate(), 44100);
        assert_eq!(frame.header.channel_count(), 1);
    }

    let (_, format) = select_audio_track(&mut extractor).unwrap();
    assert_eq!(format.codec_specific_data.as_deref(), Some(&[0x12, 0x08][..]));
}

#[test]
fn round_trip_through_files() {
    setup_logging();
    let dir = TestDirGuard::new("round_trip_through_files");
    let source = dir.path().join("encoder_file.aac");
    let output = dir.path().join("out").join("decoder_file.pcm");
    std::fs::write(&source, encode(&vec![0; 88200])).unwrap();

    let report = decode_file(
        &FdkCodecProvider::default(),
        &source,
        &output,
        &PollPolicy::default(),
    )
    .unwrap();
    assert!(report.finished);
    assert_eq!(report.write_failures, 0);

    let pcm = std::fs::read(&output).unwrap();
    assert!(!pcm.is_empty());
    assert_eq!(pcm.len() % 2048, 0);
    assert_eq!(pcm.len() as u64, report.bytes_written);
    assert!(rms(&pcm) < 1.0);
}

#[test]
fn tone_survives_the_round_trip() {
    setup_logging();
    let input = sine_pcm(1.0, 1000.0, 8000.0);
    let aac = encode(&input);
    assert!(aac.len() < input.len() / 4);

    let mut pcm = Vec::new();
    let report = decode(
        &FdkCodecProvider::default(),
        AdtsExtractor::from_bytes(aac).unwrap(),
        &mut pcm,
        &PollPolicy::default(),
    )
    .unwrap();
    assert!(report.finished);

    // Skip the codec delay at the start, then compare loudness.
    let settled = &pcm[pcm.len() / 4..pcm.len() * 3 / 4];
    let expected = rms(&input);
    let actual = rms(settled);
    assert!(
        (actual - expected).abs() < expected * 0.2,
        "expected rms near {expected}, got {actual}"
    );
}

#[test]
fn truncated_file_still_decodes_its_whole_frames() {
    setup_logging();
    let dir = TestDirGuard::new("truncated_file");
    let mut aac = encode(&sine_pcm(0.5, 440.0, 4000.0));
    let whole = AdtsExtractor::from_bytes(aac.clone()).unwrap().frames().len();
    aac.truncate(aac.len() - 5);

    let extractor = AdtsExtractor::from_bytes(aac).unwrap();
    assert_eq!(extractor.frames().len(), whole - 1);
    assert_eq!(extractor.track_count(), 1);

    let output = File::create(dir.path().join("decoder_file.pcm")).unwrap();
    let report = decode(
        &FdkCodecProvider::default(),
        extractor,
        output,
        &PollPolicy::default(),
    )
    .unwrap();
    assert!(report.finished);
    assert_eq!(report.samples_read as usize, whole - 1);
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! # aacdemo - AAC capture, encode and decode pipelines
//!
//! Records 16-bit PCM, encodes it to AAC-LC with one ADTS header per access
//! unit, decodes ADTS files back to PCM and plays PCM files. The codec itself
//! is a pluggable [`CodecSession`]; this crate ships a pass-through
//! [`LoopbackProvider`], and `aacdemo-fdk` provides a real AAC codec.
//!
//! ## Architecture
//!
//! ```text
//!  CaptureSource ──► record ──► recode_file.pcm
//!                      │
//!                      └──► AacEncoder ──► encoder_file.aac ──► AdtsExtractor
//!                              │                                      │
//!                            Codec                                  decode ──► decoder_file.pcm ──► play ──► PlaybackSink
//!                              │                                      │
//!                       CodecSession  ◄──── CodecProvider ────►  CodecSession
//! ```
//!
//! Every loop owns its codec and files for the duration of one call and
//! receives its settings from [`DemoConfig`]. Loops run on a [`WorkerPool`].
//!
//! ## Examples
//!
//! ### Encoding and decoding one second of silence
//!
//! ```
//! use aacdemo::{
//!     AacEncoder, AdtsExtractor, EncoderConfig, LoopbackProvider, PollPolicy, decode,
//! };
//!
//! # fn main() -> Result<(), aacdemo::Error> {
//! let provider = LoopbackProvider::default();
//!
//! let mut aac = Vec::new();
//! let mut encoder = AacEncoder::new(&provider, EncoderConfig::default(), &mut aac)?;
//! encoder.encode(&vec![0; 88200])?;
//! encoder.finish()?;
//! assert_eq!(&aac[..2], &[0xFF, 0xF9]);
//!
//! let mut pcm = Vec::new();
//! let report = decode(&provider, AdtsExtractor::from_bytes(aac)?, &mut pcm, &PollPolicy::default())?;
//! assert!(report.finished);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - Sessions, codecs and loops are `Send` but never shared; each loop runs on
//!   one thread from start to finish
//! - [`CodecProvider`] is `Send + Sync` and can be shared by all workers
//! - The only state shared between threads is a [`StopSignal`]

mod decoder;
mod encoder;
mod error;
mod extractor;
mod player;
mod recorder;
mod worker;

pub mod adts;
pub mod codec;
pub mod config;

pub use adts::{AdtsHeader, AdtsParams, ChannelConfigPolicy};
pub use codec::{
    Codec,
    buffer::{BufferFlags, BufferInfo},
    format::{AacProfile, MIMETYPE_AUDIO_AAC, MIMETYPE_AUDIO_RAW, MediaFormat},
    loopback::{LoopbackProvider, LoopbackSession},
    queue::BufferQueue,
    session::{CodecKind, CodecProvider, CodecSession, OutputEvent},
};
pub use config::{CaptureConfig, DemoConfig, StorageConfig, WorkerConfig};
pub use decoder::{DecodeReport, DecoderConfig, PollPolicy, decode, decode_file};
pub use encoder::{AacEncoder, EncodeStats, EncoderConfig, encode_file};
pub use error::{Error, Result};
pub use extractor::{
    Extractor,
    adts_file::{AdtsExtractor, AdtsFrame},
    select_audio_track,
};
pub use player::{PlayReport, PlaySource, PlaybackSink, WriterSink, play, play_file};
pub use recorder::{
    CaptureSource, PcmFileSource, RecordReport, StopSignal, ToneSource, record, record_files,
};
pub use worker::{TaskHandle, WorkerPool};

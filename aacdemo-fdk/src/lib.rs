// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! # aacdemo-fdk - FDK AAC codec sessions
//!
//! Implements the [`aacdemo::CodecSession`] buffer contract on top of the
//! Fraunhofer FDK AAC library, so the aacdemo loops can produce and consume
//! real AAC-LC.
//!
//! Both sessions are synchronous: work happens inside `queue_input_buffer`,
//! and output polls never wait.
//!
//! - The encoder accepts 16-bit PCM, emits the AudioSpecificConfig as a
//!   codec-config buffer and then one raw access unit per 1024 samples per
//!   channel. On end-of-stream the last partial frame is padded with silence.
//! - The decoder accepts raw access units (as produced by
//!   [`aacdemo::AdtsExtractor`]) or complete ADTS frames, and emits one PCM
//!   buffer per decoded frame.
//!
//! ```no_run
//! use aacdemo::{AacEncoder, EncoderConfig};
//! use aacdemo_fdk::FdkCodecProvider;
//!
//! # fn main() -> Result<(), aacdemo::Error> {
//! let file = std::fs::File::create("encoder_file.aac")?;
//! let mut encoder = AacEncoder::new(&FdkCodecProvider::default(), EncoderConfig::default(), file)?;
//! encoder.encode(&[0; 4096])?;
//! encoder.finish()?;
//! # Ok(())
//! # }
//! ```

mod decoder;
mod encoder;

use aacdemo::{CodecKind, CodecProvider, CodecSession, Error, MIMETYPE_AUDIO_AAC, Result};

pub use decoder::FdkDecoderSession;
pub use encoder::FdkEncoderSession;

/// PCM samples per channel in one AAC-LC frame.
pub const FRAME_SAMPLES: usize = 1024;

/// Creates FDK backed sessions for `audio/mp4a-latm`.
#[derive(Debug, Clone, Copy)]
pub struct FdkCodecProvider {
    /// Input slots per session.
    pub input_slots: usize,
    /// Output buffers that may be pending before input is refused.
    pub max_outputs: usize,
}

impl Default for FdkCodecProvider {
    fn default() -> Self {
        Self {
            input_slots: 4,
            max_outputs: 16,
        }
    }
}

impl FdkCodecProvider {
    fn check_mime(mime: &str, kind: CodecKind) -> Result<()> {
        if mime != MIMETYPE_AUDIO_AAC {
            return Err(Error::CodecUnavailable(format!("no FDK {kind} for {mime}")));
        }
        Ok(())
    }
}

impl CodecProvider for FdkCodecProvider {
    fn create_encoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        Self::check_mime(mime, CodecKind::Encoder)?;
        Ok(Box::new(FdkEncoderSession::new(self.input_slots, self.max_outputs)))
    }

    fn create_decoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>> {
        Self::check_mime(mime, CodecKind::Decoder)?;
        Ok(Box::new(FdkDecoderSession::new(self.input_slots, self.max_outputs)))
    }
}

/// Lifecycle shared by both sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Created,
    Configured,
    Running,
    Stopped,
    Released,
}

impl State {
    pub(crate) fn expect(self, expected: State, session: &str, operation: &str) -> Result<()> {
        if self != expected {
            return Err(Error::invalid_state(format!(
                "{session}: {operation} in state {self:?}"
            )));
        }
        Ok(())
    }
}

/// Reinterprets little-endian 16-bit PCM bytes as samples.
pub(crate) fn pcm_to_samples(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

pub(crate) fn samples_to_pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Media format descriptions handed to codec sessions.

use serde::{Deserialize, Serialize};

/// MIME type of an AAC elementary stream.
pub const MIMETYPE_AUDIO_AAC: &str = "audio/mp4a-latm";

/// MIME type of raw 16-bit PCM.
pub const MIMETYPE_AUDIO_RAW: &str = "audio/raw";

/// AAC audio object type.
///
/// Only the object types an ADTS header can carry (1 to 4) are listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AacProfile {
    /// AAC Main.
    Main,
    /// AAC Low Complexity (the profile this pipeline encodes).
    #[default]
    LowComplexity,
    /// AAC Scalable Sample Rate.
    ScalableSampleRate,
    /// AAC Long Term Prediction.
    LongTermPrediction,
}

impl AacProfile {
    /// Returns the MPEG-4 audio object type number.
    pub fn object_type(self) -> u8 {
        match self {
            AacProfile::Main => 1,
            AacProfile::LowComplexity => 2,
            AacProfile::ScalableSampleRate => 3,
            AacProfile::LongTermPrediction => 4,
        }
    }

    /// Maps an MPEG-4 audio object type number back to a profile.
    pub fn from_object_type(object_type: u8) -> Option<Self> {
        match object_type {
            1 => Some(AacProfile::Main),
            2 => Some(AacProfile::LowComplexity),
            3 => Some(AacProfile::ScalableSampleRate),
            4 => Some(AacProfile::LongTermPrediction),
            _ => None,
        }
    }
}

/// Configuration of one encoder or decoder session.
///
/// The loops build a format once and never reinterpret it; the fields are
/// consumed by whichever [`crate::CodecSession`] receives it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    /// MIME type of the compressed side, e.g. [`MIMETYPE_AUDIO_AAC`].
    pub mime: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channel_count: u16,
    /// Target bit rate in bits per second (encoders only).
    pub bit_rate: Option<u32>,
    /// AAC object type.
    pub aac_profile: Option<AacProfile>,
    /// Largest input buffer the caller will submit, in bytes.
    pub max_input_size: Option<usize>,
    /// Codec specific data (the AudioSpecificConfig for AAC).
    pub codec_specific_data: Option<Vec<u8>>,
    /// Stream duration in microseconds, when known.
    pub duration_us: Option<i64>,
}

impl MediaFormat {
    /// Creates an audio format with only the mandatory fields set.
    pub fn audio(mime: &str, sample_rate: u32, channel_count: u16) -> Self {
        Self {
            mime: mime.to_string(),
            sample_rate,
            channel_count,
            bit_rate: None,
            aac_profile: None,
            max_input_size: None,
            codec_specific_data: None,
            duration_us: None,
        }
    }

    pub fn with_bit_rate(mut self, bit_rate: u32) -> Self {
        self.bit_rate = Some(bit_rate);
        self
    }

    pub fn with_aac_profile(mut self, profile: AacProfile) -> Self {
        self.aac_profile = Some(profile);
        self
    }

    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = Some(size);
        self
    }

    pub fn with_codec_specific_data(mut self, csd: Vec<u8>) -> Self {
        self.codec_specific_data = Some(csd);
        self
    }

    pub fn with_duration_us(mut self, duration_us: i64) -> Self {
        self.duration_us = Some(duration_us);
        self
    }

    /// Returns `true` if the MIME type names an audio track (`audio/...`).
    pub fn is_audio(&self) -> bool {
        self.mime.starts_with("audio/")
    }

    /// Size in bytes of one interleaved 16-bit PCM frame of this format.
    pub fn pcm_frame_bytes(&self) -> usize {
        self.channel_count.max(1) as usize * 2
    }
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! ADTS (Audio Data Transport Stream) framing.
//!
//! Every encoded access unit written by the encode loop is preceded by a
//! 7-byte ADTS header so that the `.aac` file can be played without a
//! container. The header layout (MSB first):
//!
//! ```text
//! byte 0  1111 1111                       sync word (high)
//! byte 1  1111 1001                       sync word (low), MPEG-2, layer 0, no CRC
//! byte 2  PPFF FF0C                       profile, frequency index, channel cfg (bit 2)
//! byte 3  CC00 00LL                       channel cfg (bits 1-0), frame length (12-11)
//! byte 4  LLLL LLLL                       frame length (10-3)
//! byte 5  LLL1 1111                       frame length (2-0), buffer fullness (high)
//! byte 6  1111 1100                       buffer fullness (low), one raw data block
//! ```
//!
//! The frame length counts the header itself, so payloads are limited to
//! [`MAX_PAYLOAD_LEN`] bytes.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{AacProfile, Error, MediaFormat, Result};

/// Length of an ADTS header without CRC.
pub const ADTS_HEADER_LEN: usize = 7;

/// Largest value of the 13-bit frame length field.
pub const MAX_FRAME_LEN: usize = 0x1FFF;

/// Largest payload whose frame length still fits the field.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - ADTS_HEADER_LEN;

/// Sampling frequencies by ADTS/ASC index (ISO/IEC 14496-3, table 1.18).
pub const SAMPLING_FREQUENCIES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Returns the sampling frequency index for `sample_rate`, if it has one.
pub fn sampling_frequency_index(sample_rate: u32) -> Option<u8> {
    SAMPLING_FREQUENCIES
        .iter()
        .position(|&rate| rate == sample_rate)
        .map(|index| index as u8)
}

/// Returns the sample rate for a sampling frequency index.
pub fn sample_rate_for_index(index: u8) -> Option<u32> {
    SAMPLING_FREQUENCIES.get(index as usize).copied()
}

/// How the ADTS channel configuration is chosen.
///
/// The header can either follow the configured channel count, or carry a
/// fixed value regardless of it. The fixed value 2 reproduces the streams
/// written by the first version of the Android demo, which labelled its mono
/// recordings as stereo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelConfigPolicy {
    /// Use the channel count of the configured format (1 for mono).
    #[default]
    FromChannelCount,
    /// Always write this channel configuration.
    Fixed(u8),
}

/// Stream parameters stamped into every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsParams {
    pub profile: AacProfile,
    pub frequency_index: u8,
    pub channel_config: u8,
}

impl AdtsParams {
    /// Builds header parameters for a sample rate and channel configuration.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] if the sample rate has no ADTS index or the
    /// channel configuration does not fit its 3-bit field.
    pub fn new(profile: AacProfile, sample_rate: u32, channel_config: u8) -> Result<Self> {
        let frequency_index = sampling_frequency_index(sample_rate).ok_or_else(|| {
            Error::invalid_arg(format!("no ADTS frequency index for {sample_rate} Hz"))
        })?;
        if channel_config > 7 {
            return Err(Error::invalid_arg(format!(
                "channel configuration {channel_config} does not fit 3 bits"
            )));
        }
        Ok(Self {
            profile,
            frequency_index,
            channel_config,
        })
    }

    /// Derives header parameters from a codec format.
    ///
    /// A fixed channel configuration that disagrees with the format's channel
    /// count is allowed, but logged, since players will then decode with the
    /// wrong channel layout.
    pub fn from_format(format: &MediaFormat, policy: ChannelConfigPolicy) -> Result<Self> {
        let channel_config = match policy {
            ChannelConfigPolicy::FromChannelCount => u8::try_from(format.channel_count)
                .map_err(|_| {
                    Error::invalid_arg(format!("{} channels", format.channel_count))
                })?,
            ChannelConfigPolicy::Fixed(value) => {
                if u16::from(value) != format.channel_count {
                    warn!(
                        "ADTS channel configuration {} does not match the configured channel count {}",
                        value, format.channel_count
                    );
                }
                value
            }
        };
        Self::new(
            format.aac_profile.unwrap_or_default(),
            format.sample_rate,
            channel_config,
        )
    }

    /// Sample rate the frequency index stands for.
    pub fn sample_rate(&self) -> u32 {
        sample_rate_for_index(self.frequency_index).unwrap_or(0)
    }

    /// Synthesizes the header for a payload of `payload_len` bytes.
    ///
    /// The 13-bit frame length field wraps for payloads above
    /// [`MAX_PAYLOAD_LEN`]; use [`Self::checked_header`] to reject those.
    pub fn header(&self, payload_len: usize) -> [u8; ADTS_HEADER_LEN] {
        let packet_len = (payload_len + ADTS_HEADER_LEN) & MAX_FRAME_LEN;
        let profile = (self.profile.object_type() - 1) & 0x03;
        let freq = self.frequency_index & 0x0F;
        let chan = self.channel_config & 0x07;
        [
            0xFF,
            0xF9,
            (profile << 6) | (freq << 2) | (chan >> 2),
            ((chan & 3) << 6) | (packet_len >> 11) as u8,
            ((packet_len & 0x7FF) >> 3) as u8,
            (((packet_len & 7) << 5) as u8) | 0x1F,
            0xFC,
        ]
    }

    /// Like [`Self::header`], but fails instead of wrapping.
    ///
    /// # Errors
    ///
    /// [`Error::FrameTooLarge`] if `payload_len > MAX_PAYLOAD_LEN`.
    pub fn checked_header(&self, payload_len: usize) -> Result<[u8; ADTS_HEADER_LEN]> {
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(Error::FrameTooLarge(payload_len));
        }
        Ok(self.header(payload_len))
    }

    /// Two-byte AudioSpecificConfig describing the same stream.
    pub fn audio_specific_config(&self) -> [u8; 2] {
        audio_specific_config(self.profile, self.frequency_index, self.channel_config)
    }
}

/// Builds the two-byte AudioSpecificConfig (object type, frequency index,
/// channel configuration) used as codec specific data.
pub fn audio_specific_config(profile: AacProfile, frequency_index: u8, channel_config: u8) -> [u8; 2] {
    let value = (u16::from(profile.object_type()) << 11)
        | (u16::from(frequency_index & 0x0F) << 7)
        | (u16::from(channel_config & 0x0F) << 3);
    value.to_be_bytes()
}

/// A parsed ADTS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsHeader {
    /// `true` for MPEG-2 AAC, `false` for MPEG-4.
    pub mpeg2: bool,
    /// `false` when a 16-bit CRC follows the fixed header.
    pub protection_absent: bool,
    pub profile: AacProfile,
    pub frequency_index: u8,
    pub channel_config: u8,
    /// Header plus payload length in bytes.
    pub frame_length: usize,
    pub buffer_fullness: u16,
    /// Number of raw data blocks in the frame.
    pub raw_data_blocks: u8,
}

impl AdtsHeader {
    /// Parses the header at the start of `bytes`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAdts`] if the buffer is too short, the sync word is
    /// missing, or the fields are inconsistent.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ADTS_HEADER_LEN {
            return Err(Error::InvalidAdts(format!(
                "{} bytes is shorter than a header",
                bytes.len()
            )));
        }
        if bytes[0] != 0xFF || bytes[1] & 0xF0 != 0xF0 {
            return Err(Error::InvalidAdts("missing sync word".to_string()));
        }
        if bytes[1] & 0x06 != 0 {
            return Err(Error::InvalidAdts("layer must be 0".to_string()));
        }

        let header = Self {
            mpeg2: bytes[1] & 0x08 != 0,
            protection_absent: bytes[1] & 0x01 != 0,
            profile: AacProfile::from_object_type((bytes[2] >> 6) + 1)
                .ok_or_else(|| Error::InvalidAdts("bad profile".to_string()))?,
            frequency_index: (bytes[2] >> 2) & 0x0F,
            channel_config: ((bytes[2] & 0x01) << 2) | (bytes[3] >> 6),
            frame_length: (usize::from(bytes[3] & 0x03) << 11)
                | (usize::from(bytes[4]) << 3)
                | usize::from(bytes[5] >> 5),
            buffer_fullness: (u16::from(bytes[5] & 0x1F) << 6) | u16::from(bytes[6] >> 2),
            raw_data_blocks: (bytes[6] & 0x03) + 1,
        };

        if sample_rate_for_index(header.frequency_index).is_none() {
            return Err(Error::InvalidAdts(format!(
                "reserved frequency index {}",
                header.frequency_index
            )));
        }
        if header.frame_length < header.header_len() {
            return Err(Error::InvalidAdts(format!(
                "frame length {} shorter than its header",
                header.frame_length
            )));
        }
        Ok(header)
    }

    /// Header length: 7 bytes, or 9 when a CRC is present.
    pub fn header_len(&self) -> usize {
        if self.protection_absent {
            ADTS_HEADER_LEN
        } else {
            ADTS_HEADER_LEN + 2
        }
    }

    /// Length of the raw AAC payload following the header.
    pub fn payload_len(&self) -> usize {
        self.frame_length - self.header_len()
    }

    pub fn sample_rate(&self) -> u32 {
        sample_rate_for_index(self.frequency_index).unwrap_or(0)
    }

    /// Channel count implied by the channel configuration.
    ///
    /// Configuration 0 defers to an in-band program config element; it is
    /// reported as mono. Configuration 7 is 7.1 (8 channels).
    pub fn channel_count(&self) -> u16 {
        match self.channel_config {
            0 => 1,
            7 => 8,
            c => u16::from(c),
        }
    }
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Buffer metadata exchanged with codec sessions.

use std::ops::BitOr;

/// Flags attached to an input or output buffer.
///
/// Values match the platform codec convention so traces line up with
/// the codec's own logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BufferFlags(u32);

impl BufferFlags {
    pub const NONE: Self = Self(0);
    /// The buffer holds a sync frame.
    pub const KEY_FRAME: Self = Self(1);
    /// The buffer holds codec initialization data, not media samples.
    pub const CODEC_CONFIG: Self = Self(2);
    /// No buffer follows this one.
    pub const END_OF_STREAM: Self = Self(4);

    /// Returns the raw bit pattern.
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_codec_config(self) -> bool {
        self.contains(Self::CODEC_CONFIG)
    }

    pub fn is_end_of_stream(self) -> bool {
        self.contains(Self::END_OF_STREAM)
    }
}

impl BitOr for BufferFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Describes the valid region of a dequeued output buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferInfo {
    /// Start of the payload inside the buffer.
    pub offset: usize,
    /// Payload length in bytes. Zero for a bare end-of-stream marker.
    pub size: usize,
    /// Presentation time in microseconds.
    pub presentation_time_us: i64,
    pub flags: BufferFlags,
}

impl BufferInfo {
    /// Returns the payload range within the output buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.size
    }
}

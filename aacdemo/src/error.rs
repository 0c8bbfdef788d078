// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for aacdemo operations.
//!
//! Every failure the pipelines can hit is reported through [`Error`]. Sites
//! that only need to be observed (a sink write failing while streaming) are
//! logged and counted by the loops instead of being returned.

use std::path::PathBuf;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur while recording, encoding, decoding or playing audio.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading or writing a file, pipe or device failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// No codec session could be created for the requested MIME type.
    #[error("No codec available for {0}")]
    CodecUnavailable(String),

    /// The codec session reported a failure while processing buffers.
    #[error("Codec error: {0}")]
    Codec(String),

    /// An operation was attempted in the wrong lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An argument was out of range (unknown buffer index, bad sample rate...).
    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    /// The bytes do not form a valid ADTS frame.
    #[error("Invalid ADTS stream: {0}")]
    InvalidAdts(String),

    /// The payload does not fit the 13-bit ADTS frame length field.
    #[error("Frame too large for ADTS: {0} payload bytes")]
    FrameTooLarge(usize),

    /// The container has no track whose MIME type starts with `audio/`.
    #[error("No audio track found")]
    NoAudioTrack,

    /// The file an operation reads from does not exist.
    #[error("Source file does not exist: {}", .0.display())]
    SourceMissing(PathBuf),

    /// A bounded wait kept returning without progress past the retry budget.
    #[error("Timeout after {0} idle polls")]
    Timeout(u32),

    /// The worker pool has no free thread and its queue is full.
    #[error("Task rejected: worker pool saturated")]
    Rejected,

    /// A submitted task panicked or its worker went away.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl Error {
    /// Creates a codec error.
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        Error::Codec(msg.into())
    }

    /// Creates an invalid state error.
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        Error::InvalidState(msg.into())
    }

    /// Creates an invalid argument error.
    pub fn invalid_arg<S: Into<String>>(msg: S) -> Self {
        Error::InvalidArg(msg.into())
    }
}

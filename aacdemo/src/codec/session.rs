// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! The buffer contract every codec backend implements.
//!
//! A session owns a set of input and output buffers identified by index.
//! Callers dequeue a free input buffer, fill it, queue it back, then
//! dequeue filled output buffers and release them once copied out:
//!
//! ```text
//!  dequeue_input_buffer ──► input_buffer(i) ──► queue_input_buffer(i)
//!                                                     │
//!                                                 (codec)
//!                                                     ▼
//!  release_output_buffer(o) ◄── output_buffer(o) ◄── dequeue_output_buffer
//! ```

use std::time::Duration;

use crate::{BufferFlags, BufferInfo, MediaFormat, Result};

/// Direction a session is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    Encoder,
    Decoder,
}

impl std::fmt::Display for CodecKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecKind::Encoder => f.write_str("encoder"),
            CodecKind::Decoder => f.write_str("decoder"),
        }
    }
}

/// Result of polling a session for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    /// Output buffer `index` is ready; `info` describes its payload.
    Buffer { index: usize, info: BufferInfo },
    /// The output format changed; subsequent buffers follow the new format.
    FormatChanged(MediaFormat),
    /// Nothing became ready within the timeout.
    TryAgainLater,
}

/// One encoder or decoder instance.
///
/// Timeouts follow a single convention: `None` waits until a buffer is
/// available, `Some(Duration::ZERO)` returns immediately, any other value
/// waits at most that long. Sessions are not shared between threads but can
/// be moved to the worker that runs a loop.
pub trait CodecSession: Send {
    /// Name of the underlying implementation, for logs.
    fn name(&self) -> &str;

    /// Applies the format. Must be called once, before [`Self::start`].
    fn configure(&mut self, format: &MediaFormat, kind: CodecKind) -> Result<()>;

    /// Moves the session to the running state.
    fn start(&mut self) -> Result<()>;

    /// Returns the index of a free input buffer, or `None` if none became
    /// free within `timeout`.
    fn dequeue_input_buffer(&mut self, timeout: Option<Duration>) -> Result<Option<usize>>;

    /// Mutable view of a dequeued input buffer. Its length is the buffer capacity.
    fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]>;

    /// Hands the first `size` bytes of input buffer `index` to the codec.
    fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()>;

    /// Polls for the next output event.
    fn dequeue_output_buffer(&mut self, timeout: Option<Duration>) -> Result<OutputEvent>;

    /// Read-only view of a dequeued output buffer. The payload is at
    /// [`BufferInfo::range`].
    fn output_buffer(&self, index: usize) -> Result<&[u8]>;

    /// Returns output buffer `index` to the codec.
    fn release_output_buffer(&mut self, index: usize) -> Result<()>;

    /// Stops processing. Pending buffers are discarded.
    fn stop(&mut self) -> Result<()>;

    /// Frees every resource held by the session.
    fn release(&mut self) -> Result<()>;
}

/// Creates codec sessions by MIME type.
pub trait CodecProvider: Send + Sync {
    /// Creates an unconfigured encoder producing `mime`.
    fn create_encoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>>;

    /// Creates an unconfigured decoder consuming `mime`.
    fn create_decoder_by_type(&self, mime: &str) -> Result<Box<dyn CodecSession>>;
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Codec sessions and their lifecycle.
//!
//! Backends implement [`CodecSession`] and are created through a
//! [`CodecProvider`]. The loops never hold a bare session: they own a
//! [`Codec`], which configures and starts the session on creation and stops
//! and releases it exactly once, either explicitly or on drop.

pub mod buffer;
pub mod format;
pub mod loopback;
pub mod queue;
pub mod session;

use std::time::Duration;

use tracing::{error, info};

use crate::{BufferFlags, CodecKind, CodecProvider, CodecSession, MediaFormat, OutputEvent, Result};

/// A configured and running codec session.
///
/// # Lifecycle
///
/// ```text
/// create_encoder / create_decoder      stop_and_release / drop
///  (create + configure + start) ──► Running ──────────────────► Released
/// ```
///
/// `Codec` is `Send`, so a loop can be moved to a worker thread together with
/// its codec, but it is not shared between threads.
pub struct Codec {
    session: Option<Box<dyn CodecSession>>,
    kind: CodecKind,
}

impl Codec {
    /// Creates, configures and starts an encoder producing `format.mime`.
    ///
    /// # Errors
    ///
    /// [`crate::Error::CodecUnavailable`] if the provider has no encoder for
    /// the MIME type, or the session's error if configuration fails.
    pub fn create_encoder(provider: &dyn CodecProvider, format: &MediaFormat) -> Result<Self> {
        let session = provider.create_encoder_by_type(&format.mime)?;
        Self::start(session, format, CodecKind::Encoder)
    }

    /// Creates, configures and starts a decoder consuming `format.mime`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create_encoder`].
    pub fn create_decoder(provider: &dyn CodecProvider, format: &MediaFormat) -> Result<Self> {
        let session = provider.create_decoder_by_type(&format.mime)?;
        Self::start(session, format, CodecKind::Decoder)
    }

    fn start(mut session: Box<dyn CodecSession>, format: &MediaFormat, kind: CodecKind) -> Result<Self> {
        let started = session
            .configure(format, kind)
            .and_then(|_| session.start());
        if let Err(err) = started {
            if let Err(release_err) = session.release() {
                error!("Failed to release {} after a failed start: {}", session.name(), release_err);
            }
            return Err(err);
        }
        info!(
            "Created {} {} ({} Hz, {} channel(s))",
            kind,
            session.name(),
            format.sample_rate,
            format.channel_count
        );
        Ok(Self {
            session: Some(session),
            kind,
        })
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        self.session.as_deref().map_or("released", |s| s.name())
    }

    fn session(&mut self) -> Result<&mut (dyn CodecSession + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| crate::Error::invalid_state("codec already released"))
    }

    pub fn dequeue_input_buffer(&mut self, timeout: Option<Duration>) -> Result<Option<usize>> {
        self.session()?.dequeue_input_buffer(timeout)
    }

    pub fn input_buffer(&mut self, index: usize) -> Result<&mut [u8]> {
        self.session()?.input_buffer(index)
    }

    pub fn queue_input_buffer(
        &mut self,
        index: usize,
        size: usize,
        presentation_time_us: i64,
        flags: BufferFlags,
    ) -> Result<()> {
        self.session()?
            .queue_input_buffer(index, size, presentation_time_us, flags)
    }

    pub fn dequeue_output_buffer(&mut self, timeout: Option<Duration>) -> Result<OutputEvent> {
        self.session()?.dequeue_output_buffer(timeout)
    }

    pub fn output_buffer(&self, index: usize) -> Result<&[u8]> {
        self.session
            .as_deref()
            .ok_or_else(|| crate::Error::invalid_state("codec already released"))?
            .output_buffer(index)
    }

    pub fn release_output_buffer(&mut self, index: usize) -> Result<()> {
        self.session()?.release_output_buffer(index)
    }

    /// Stops and releases the session now, reporting teardown failures.
    ///
    /// Normally this happens when the codec is dropped; calling it explicitly
    /// surfaces errors to the caller instead of the log.
    pub fn stop_and_release(mut self) -> Result<()> {
        self.stop_and_release_inner()
    }

    fn stop_and_release_inner(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        let stopped = session.stop();
        let released = session.release();
        info!("Released {} {}", self.kind, session.name());
        stopped.and(released)
    }
}

impl Drop for Codec {
    fn drop(&mut self) {
        if let Err(err) = self.stop_and_release_inner() {
            error!("Failed to release {} codec: {}", self.kind, err);
        }
    }
}

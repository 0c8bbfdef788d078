// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Demultiplexers feeding the decode loop.

pub mod adts_file;

use tracing::debug;

use crate::{Error, MediaFormat, Result};

/// Sequential reader of the samples of a media file.
///
/// A sample is one compressed access unit of the selected track. Resources
/// are released when the extractor is dropped.
pub trait Extractor: Send {
    /// Number of tracks in the source.
    fn track_count(&self) -> usize;

    /// Format of track `index`.
    fn track_format(&self, index: usize) -> Result<MediaFormat>;

    /// Restricts [`Self::read_sample_data`] to track `index`.
    fn select_track(&mut self, index: usize) -> Result<()>;

    /// Copies the current sample into `buf`.
    ///
    /// Returns the sample size, or `None` once the selected track is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArg`] if `buf` cannot hold the sample,
    /// [`Error::InvalidState`] if no track is selected.
    fn read_sample_data(&mut self, buf: &mut [u8]) -> Result<Option<usize>>;

    /// Presentation time of the current sample in microseconds.
    fn sample_time(&self) -> Option<i64>;

    /// Moves to the next sample. Returns `false` when there is none.
    fn advance(&mut self) -> bool;
}

/// Selects the first track whose MIME type starts with `audio/`.
///
/// Returns the track index and its format.
///
/// # Errors
///
/// [`Error::NoAudioTrack`] if the source has no audio track.
pub fn select_audio_track(extractor: &mut dyn Extractor) -> Result<(usize, MediaFormat)> {
    for index in 0..extractor.track_count() {
        let format = extractor.track_format(index)?;
        if format.is_audio() {
            extractor.select_track(index)?;
            debug!("Selected track {} ({})", index, format.mime);
            return Ok((index, format));
        }
    }
    Err(Error::NoAudioTrack)
}

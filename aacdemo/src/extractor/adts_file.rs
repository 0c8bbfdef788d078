// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Extractor for raw ADTS streams (`.aac` files).

use std::{ops::Range, path::Path};

use tracing::{debug, warn};

use crate::{
    AdtsHeader, Error, Extractor, MIMETYPE_AUDIO_AAC, MediaFormat, Result,
    adts::{ADTS_HEADER_LEN, audio_specific_config},
    codec::loopback::SAMPLES_PER_FRAME,
};

/// One frame found in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdtsFrame {
    /// Byte offset of the header in the stream.
    pub offset: usize,
    pub header: AdtsHeader,
}

impl AdtsFrame {
    fn payload_range(&self) -> Range<usize> {
        let start = self.offset + self.header.header_len();
        start..self.offset + self.header.frame_length
    }
}

/// Splits an ADTS stream into raw AAC access units.
///
/// The stream exposes a single audio track. Its format is taken from the
/// first header and carries the AudioSpecificConfig as codec specific data,
/// so a decoder can be configured without looking at the stream.
pub struct AdtsExtractor {
    data: Vec<u8>,
    frames: Vec<AdtsFrame>,
    format: MediaFormat,
    selected: bool,
    cursor: usize,
}

impl AdtsExtractor {
    /// Reads and indexes the file at `path`.
    ///
    /// # Errors
    ///
    /// [`Error::SourceMissing`] if the file does not exist, otherwise as
    /// [`Self::from_bytes`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::SourceMissing(path.to_path_buf()));
        }
        let extractor = Self::from_bytes(std::fs::read(path)?)?;
        debug!(
            "Indexed {} ADTS frames in {}",
            extractor.frames.len(),
            path.display()
        );
        Ok(extractor)
    }

    /// Indexes an in-memory ADTS stream.
    ///
    /// Scanning stops at the first invalid or truncated frame; whatever
    /// follows is ignored with a warning.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidAdts`] if the stream does not start with a valid frame.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let mut frames = Vec::new();
        let mut offset = 0;
        while offset < data.len() {
            let header = match AdtsHeader::parse(&data[offset..]) {
                Ok(header) => header,
                Err(err) => {
                    if frames.is_empty() {
                        return Err(err);
                    }
                    warn!(
                        "Ignoring {} trailing bytes at offset {}: {}",
                        data.len() - offset,
                        offset,
                        err
                    );
                    break;
                }
            };
            if offset + header.frame_length > data.len() {
                if frames.is_empty() {
                    return Err(Error::InvalidAdts("first frame is truncated".to_string()));
                }
                warn!("Ignoring truncated frame at offset {}", offset);
                break;
            }
            frames.push(AdtsFrame { offset, header });
            offset += header.frame_length;
        }

        let first = frames
            .first()
            .map(|frame| frame.header)
            .ok_or_else(|| Error::InvalidAdts("stream is empty".to_string()))?;
        let sample_rate = first.sample_rate();
        let duration_us = frames.len() as i64 * SAMPLES_PER_FRAME as i64 * 1_000_000
            / i64::from(sample_rate);
        let max_payload = frames
            .iter()
            .map(|frame| frame.header.payload_len())
            .max()
            .unwrap_or(0);
        let format = MediaFormat::audio(MIMETYPE_AUDIO_AAC, sample_rate, first.channel_count())
            .with_aac_profile(first.profile)
            .with_codec_specific_data(
                audio_specific_config(first.profile, first.frequency_index, first.channel_config)
                    .to_vec(),
            )
            .with_max_input_size(max_payload.max(ADTS_HEADER_LEN))
            .with_duration_us(duration_us);

        Ok(Self {
            data,
            frames,
            format,
            selected: false,
            cursor: 0,
        })
    }

    /// Every frame of the stream, in order.
    pub fn frames(&self) -> &[AdtsFrame] {
        &self.frames
    }

    /// Format of the single audio track.
    pub fn format(&self) -> &MediaFormat {
        &self.format
    }

    fn check_track(&self, index: usize) -> Result<()> {
        if index != 0 {
            return Err(Error::invalid_arg(format!("no track {index}")));
        }
        Ok(())
    }
}

impl Extractor for AdtsExtractor {
    fn track_count(&self) -> usize {
        1
    }

    fn track_format(&self, index: usize) -> Result<MediaFormat> {
        self.check_track(index)?;
        Ok(self.format.clone())
    }

    fn select_track(&mut self, index: usize) -> Result<()> {
        self.check_track(index)?;
        self.selected = true;
        Ok(())
    }

    fn read_sample_data(&mut self, buf: &mut [u8]) -> Result<Option<usize>> {
        if !self.selected {
            return Err(Error::invalid_state("no track selected"));
        }
        let Some(frame) = self.frames.get(self.cursor) else {
            return Ok(None);
        };
        let payload = &self.data[frame.payload_range()];
        if payload.len() > buf.len() {
            return Err(Error::invalid_arg(format!(
                "sample of {} bytes does not fit a {} byte buffer",
                payload.len(),
                buf.len()
            )));
        }
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Some(payload.len()))
    }

    fn sample_time(&self) -> Option<i64> {
        (self.cursor < self.frames.len()).then(|| {
            self.cursor as i64 * SAMPLES_PER_FRAME as i64 * 1_000_000
                / i64::from(self.format.sample_rate)
        })
    }

    fn advance(&mut self) -> bool {
        if self.cursor < self.frames.len() {
            self.cursor += 1;
        }
        self.cursor < self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AacProfile, AdtsParams, select_audio_track};

    fn stream(payloads: &[&[u8]]) -> Vec<u8> {
        let params = AdtsParams::new(AacProfile::LowComplexity, 44100, 1).unwrap();
        let mut out = Vec::new();
        for payload in payloads {
            out.extend_from_slice(&params.header(payload.len()));
            out.extend_from_slice(payload);
        }
        out
    }

    #[test]
    fn splits_frames_and_strips_headers() {
        let mut extractor = AdtsExtractor::from_bytes(stream(&[&[1, 2, 3], &[4; 10]])).unwrap();
        let (track, format) = select_audio_track(&mut extractor).unwrap();
        assert_eq!(track, 0);
        assert_eq!(format.sample_rate, 44100);
        assert_eq!(format.channel_count, 1);
        assert_eq!(format.codec_specific_data.as_deref(), Some(&[0x12, 0x08][..]));

        let mut buf = [0; 64];
        assert_eq!(extractor.read_sample_data(&mut buf).unwrap(), Some(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(extractor.sample_time(), Some(0));
        assert!(extractor.advance());
        assert_eq!(extractor.read_sample_data(&mut buf).unwrap(), Some(10));
        assert_eq!(extractor.sample_time(), Some(23219));
        assert!(!extractor.advance());
        assert_eq!(extractor.read_sample_data(&mut buf).unwrap(), None);
        assert_eq!(extractor.sample_time(), None);
    }

    #[test]
    fn requires_a_selected_track_and_a_large_enough_buffer() {
        let mut extractor = AdtsExtractor::from_bytes(stream(&[&[0; 32]])).unwrap();
        let mut small = [0; 8];
        assert!(extractor.read_sample_data(&mut small).is_err());
        extractor.select_track(0).unwrap();
        assert!(extractor.read_sample_data(&mut small).is_err());
        assert!(extractor.select_track(1).is_err());
    }

    #[test]
    fn trailing_garbage_is_ignored() {
        let mut data = stream(&[&[9; 5]]);
        data.extend_from_slice(&[0x00, 0x01, 0x02]);
        let extractor = AdtsExtractor::from_bytes(data).unwrap();
        assert_eq!(extractor.frames().len(), 1);
    }

    #[test]
    fn rejects_streams_without_frames() {
        assert!(matches!(
            AdtsExtractor::from_bytes(vec![0; 20]),
            Err(Error::InvalidAdts(_))
        ));
        assert!(AdtsExtractor::from_bytes(Vec::new()).is_err());
        let mut truncated = stream(&[&[1; 10]]);
        truncated.truncate(12);
        assert!(AdtsExtractor::from_bytes(truncated).is_err());
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            AdtsExtractor::open("/nonexistent/encoder_file.aac"),
            Err(Error::SourceMissing(_))
        ));
    }
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Playback loop: streams a raw PCM file to an output.

use std::{
    fs::File,
    io::{BufReader, Read, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{DemoConfig, Error, Result};

/// An output for interleaved 16-bit little-endian PCM.
pub trait PlaybackSink: Send {
    fn start(&mut self) -> Result<()>;

    /// Plays `pcm`. May block until the output has room.
    fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Drains pending audio and releases the output.
    fn stop(&mut self) -> Result<()>;

    /// Preferred write size in bytes.
    fn chunk_size(&self) -> usize;
}

/// Plays into any [`Write`], e.g. the stdin of `aplay -f S16_LE -r 44100`.
pub struct WriterSink<W: Write + Send> {
    writer: W,
    chunk_size: usize,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W, chunk_size: usize) -> Self {
        Self { writer, chunk_size }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> PlaybackSink for WriterSink<W> {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        Ok(self.writer.write_all(pcm)?)
    }

    fn stop(&mut self) -> Result<()> {
        Ok(self.writer.flush()?)
    }

    fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

/// Which of the two PCM files to play.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PlaySource {
    /// The raw capture, as recorded.
    Recorded,
    /// The output of the decode loop.
    #[default]
    Decoded,
}

impl PlaySource {
    /// Picks the source the configuration asks for.
    pub fn from_config(config: &DemoConfig) -> Self {
        if config.capture.play_before_decoder {
            PlaySource::Recorded
        } else {
            PlaySource::Decoded
        }
    }

    pub fn path(self, config: &DemoConfig) -> PathBuf {
        match self {
            PlaySource::Recorded => config.storage.recorded_pcm(),
            PlaySource::Decoded => config.storage.decoded_pcm(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayReport {
    pub path: PathBuf,
    pub chunks: u64,
    pub bytes_played: u64,
}

/// Plays the file `source` selects from the configured storage.
///
/// # Errors
///
/// [`Error::SourceMissing`] if the file does not exist; sink failures are
/// returned as they occur.
pub fn play<S>(config: &DemoConfig, source: PlaySource, sink: &mut S) -> Result<PlayReport>
where
    S: PlaybackSink + ?Sized,
{
    play_file(&source.path(config), sink)
}

/// Streams the raw PCM file at `path` into `sink` until the end of the file.
pub fn play_file<S>(path: &Path, sink: &mut S) -> Result<PlayReport>
where
    S: PlaybackSink + ?Sized,
{
    if !path.is_file() {
        return Err(Error::SourceMissing(path.to_path_buf()));
    }
    let mut reader = BufReader::new(File::open(path)?);
    // Whole 16-bit samples only.
    let mut buf = vec![0; sink.chunk_size().max(2) & !1];
    let mut report = PlayReport {
        path: path.to_path_buf(),
        ..Default::default()
    };

    sink.start()?;
    info!("Playing {}", path.display());
    let streamed = stream(&mut reader, &mut buf, sink, &mut report);
    let stopped = sink.stop();
    streamed?;
    stopped?;
    info!("Playback finished: {} bytes", report.bytes_played);
    Ok(report)
}

fn stream<R, S>(reader: &mut R, buf: &mut [u8], sink: &mut S, report: &mut PlayReport) -> Result<()>
where
    R: Read,
    S: PlaybackSink + ?Sized,
{
    loop {
        let mut read = 0;
        while read < buf.len() {
            match reader.read(&mut buf[read..])? {
                0 => break,
                n => read += n,
            }
        }
        if read == 0 {
            return Ok(());
        }
        sink.write(&buf[..read])?;
        report.chunks += 1;
        report.bytes_played += read as u64;
        debug!("Played chunk {} ({} bytes)", report.chunks, read);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_follows_play_before_decoder() {
        let mut config = DemoConfig::default();
        assert_eq!(PlaySource::from_config(&config), PlaySource::Decoded);
        config.capture.play_before_decoder = true;
        assert_eq!(PlaySource::from_config(&config), PlaySource::Recorded);
        assert!(PlaySource::Recorded.path(&config).ends_with("recode_file.pcm"));
    }

    #[test]
    fn missing_file_is_reported() {
        let mut config = DemoConfig::default();
        config.storage.folder = PathBuf::from("/nonexistent");
        let mut sink = WriterSink::new(Vec::new(), 1024);
        assert!(matches!(
            play(&config, PlaySource::Decoded, &mut sink),
            Err(Error::SourceMissing(_))
        ));
    }

    /// Records the size of every write.
    struct SizeLog {
        chunk_size: usize,
        writes: Vec<usize>,
        pcm: Vec<u8>,
    }

    impl PlaybackSink for SizeLog {
        fn start(&mut self) -> Result<()> {
            Ok(())
        }
        fn write(&mut self, pcm: &[u8]) -> Result<()> {
            self.writes.push(pcm.len());
            self.pcm.extend_from_slice(pcm);
            Ok(())
        }
        fn stop(&mut self) -> Result<()> {
            Ok(())
        }
        fn chunk_size(&self) -> usize {
            self.chunk_size
        }
    }

    #[test]
    fn odd_chunk_size_keeps_samples_whole() {
        let path = std::env::temp_dir().join(format!(
            "aacdemo_player_odd_chunk_{}.pcm",
            std::process::id()
        ));
        let pcm: Vec<u8> = (0..20u8).collect();
        std::fs::write(&path, &pcm).unwrap();

        let mut sink = SizeLog {
            chunk_size: 7,
            writes: Vec::new(),
            pcm: Vec::new(),
        };
        let report = play_file(&path, &mut sink).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(sink.writes, vec![6, 6, 6, 2]);
        assert_eq!(sink.pcm, pcm);
        assert_eq!(report.bytes_played, 20);
        assert_eq!(report.chunks, 4);
    }
}

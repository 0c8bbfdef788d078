// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime configuration of the demo pipelines.
//!
//! Every loop receives the section it needs explicitly; nothing is global.
//! The configuration is plain JSON and every field has a default, so an empty
//! document `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "storage": { "folder": "/sdcard/AudioDemo" },
//!   "encoder": { "bit_rate": 96000, "flush_on_stop": true },
//!   "decoder": { "poll_timeout_ms": 5000, "max_idle_polls": 100 },
//!   "capture": { "chunk_size": 4096 },
//!   "workers": { "threads": 2 }
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{DecoderConfig, EncoderConfig, Result};

/// Where the three files of the demo live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub folder: PathBuf,
    /// Raw PCM written by the capture loop.
    pub recorded_file: String,
    /// ADTS stream written by the encode loop.
    pub encoded_file: String,
    /// Raw PCM written by the decode loop.
    pub decoded_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            folder: PathBuf::from("AudioDemo"),
            recorded_file: "recode_file.pcm".to_string(),
            encoded_file: "encoder_file.aac".to_string(),
            decoded_file: "decoder_file.pcm".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn recorded_pcm(&self) -> PathBuf {
        self.folder.join(&self.recorded_file)
    }

    pub fn encoded_aac(&self) -> PathBuf {
        self.folder.join(&self.encoded_file)
    }

    pub fn decoded_pcm(&self) -> PathBuf {
        self.folder.join(&self.decoded_file)
    }
}

/// Capture and playback settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub sample_rate: u32,
    pub channel_count: u16,
    /// Bytes read from the source per loop iteration.
    pub chunk_size: usize,
    /// Play the raw capture instead of the decoder output.
    pub play_before_decoder: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channel_count: 1,
            chunk_size: 3584,
            play_before_decoder: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub threads: usize,
    /// Tasks that may wait for a thread before submissions are rejected.
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            threads: 2,
            queue_capacity: 4,
        }
    }
}

/// Complete configuration of the demo.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub storage: StorageConfig,
    pub encoder: EncoderConfig,
    pub decoder: DecoderConfig,
    pub capture: CaptureConfig,
    pub workers: WorkerConfig,
}

impl DemoConfig {
    /// Reads a JSON configuration file.
    ///
    /// # Errors
    ///
    /// [`crate::Error::Io`] if the file cannot be read, [`crate::Error::Json`]
    /// if it is not a valid configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Keeps the capture format and the encoder format in agreement.
    ///
    /// The capture section is authoritative: the encoder must consume the PCM
    /// the source produces.
    pub fn normalized(mut self) -> Self {
        self.encoder.sample_rate = self.capture.sample_rate;
        self.encoder.channel_count = self.capture.channel_count;
        self
    }
}

// SPDX-FileCopyrightText: 2026 Contributors to the aacdemo project.
// SPDX-License-Identifier: Apache-2.0

//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

/// Initializes logging (respects the `RUST_LOG` environment variable).
pub fn setup_logging() {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .with_test_writer()
            .init();
    });
}

/// RAII guard for a test storage directory.
///
/// Creates a unique directory under the system temp dir and removes it
/// when dropped.
pub struct TestDirGuard {
    dir: PathBuf,
}

impl TestDirGuard {
    pub fn new(test: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "aacdemo_fdk_tests_{}_{}",
            test,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap_or_else(|_| {
            panic!("Failed to create test directory \"{}\".", dir.display())
        });
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }
}

impl Drop for TestDirGuard {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.dir).unwrap_or_else(|_| {
            panic!("Failed to remove test directory \"{}\".", self.dir.display())
        });
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

/// Storage section in config.
///
/// The core talks to storage through the traits in the `store` module;
/// this section selects and tunes the backend.
#[derive(Debug, Deserialize, Clone)]
pub struct Storage {
    /// Keep every accepted publication in the archive.
    ///
    /// Default is false.
    #[serde(default = "Storage::default_archive")]
    archive: bool,

    /// Maximum number of archived messages kept in memory before the
    /// oldest is evicted.
    ///
    /// Default is 100000.
    #[serde(default = "Storage::default_archive_capacity")]
    archive_capacity: usize,

    /// Seconds an archived message is kept before it is purged.
    ///
    /// Default is 86400 (one day); 0 keeps messages until capacity
    /// eviction.
    #[serde(default = "Storage::default_archive_retention")]
    archive_retention: u32,

    /// How many times a failing storage operation is retried with
    /// exponential backoff before the error surfaces.
    ///
    /// Default is 3.
    #[serde(default = "Storage::default_retry_limit")]
    retry_limit: u32,
}

impl Storage {
    #[must_use]
    pub const fn default_archive() -> bool {
        false
    }

    #[must_use]
    pub const fn default_archive_capacity() -> usize {
        100_000
    }

    #[must_use]
    pub const fn default_archive_retention() -> u32 {
        86_400
    }

    #[must_use]
    pub const fn default_retry_limit() -> u32 {
        3
    }

    #[must_use]
    pub const fn archive(&self) -> bool {
        self.archive
    }

    #[must_use]
    pub const fn archive_capacity(&self) -> usize {
        self.archive_capacity
    }

    #[must_use]
    pub const fn archive_retention(&self) -> u32 {
        self.archive_retention
    }

    #[must_use]
    pub const fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept for symmetry with the other sections.
    #[allow(clippy::unnecessary_wraps)]
    pub const fn validate(&self) -> Result<(), Error> {
        Ok(())
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            archive: Self::default_archive(),
            archive_capacity: Self::default_archive_capacity(),
            archive_retention: Self::default_archive_retention(),
            retry_limit: Self::default_retry_limit(),
        }
    }
}

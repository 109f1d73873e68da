// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

#[derive(Debug, Default, Deserialize, Clone, Copy)]
pub enum LogLevel {
    #[serde(alias = "off")]
    Off,

    #[serde(alias = "error")]
    Error,

    #[serde(alias = "warn")]
    Warn,

    #[default]
    #[serde(alias = "info")]
    Info,

    #[serde(alias = "debug")]
    Debug,

    #[serde(alias = "trace")]
    Trace,
}

/// Log section in config.
#[derive(Debug, Deserialize, Clone)]
pub struct Log {
    /// Also print log to console.
    ///
    /// Default is true.
    #[serde(default = "Log::default_console_log")]
    console_log: bool,

    /// Set minimum log level.
    ///
    /// Available values are: off, error, warn, info, debug, trace.
    ///
    /// Default is "info".
    #[serde(default = "LogLevel::default")]
    log_level: LogLevel,

    /// Path to log file.
    ///
    /// Default is None, console only.
    #[serde(default = "Log::default_log_file")]
    log_file: Option<PathBuf>,
}

impl Log {
    #[must_use]
    pub const fn default_console_log() -> bool {
        true
    }

    #[must_use]
    pub const fn default_log_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn console_log(&self) -> bool {
        self.console_log
    }

    #[must_use]
    pub const fn log_level(&self) -> LogLevel {
        self.log_level
    }

    #[must_use]
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the log file or its parent directory cannot be
    /// created.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(log_file) = &self.log_file {
            if let Some(parent) = log_file.parent() {
                fs::create_dir_all(parent).map_err(|err| {
                    Error::from_string(
                        ErrorKind::ConfigError,
                        format!("Failed to create log dir for {log_file:?}, err: {err:?}"),
                    )
                })?;
            }
            let _fd = File::options()
                .create(true)
                .append(true)
                .open(log_file)
                .map_err(|err| {
                    Error::from_string(
                        ErrorKind::ConfigError,
                        format!("Failed to create log file {log_file:?}, err: {err:?}"),
                    )
                })?;
        }
        Ok(())
    }
}

impl Default for Log {
    fn default() -> Self {
        Self {
            console_log: Self::default_console_log(),
            log_level: LogLevel::default(),
            log_file: Self::default_log_file(),
        }
    }
}

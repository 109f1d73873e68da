// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! `ServerContext` is the main entry point of the broker.
//!
//! It owns the config, spawns every app at startup and handles kernel
//! signals afterwards.

use std::fs::File;
use std::io::{Read, Write};
use std::net::SocketAddr;
use tokio::runtime::Runtime;

use crate::config::Config;
use crate::error::{Error, ErrorKind};

mod init;
mod run;

pub const CHANNEL_CAPACITY: usize = 64;

pub struct ServerContext {
    config: Config,

    /// Addresses the listeners actually bound to, in config order.
    bound_addresses: Vec<SocketAddr>,
}

impl ServerContext {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            bound_addresses: Vec::new(),
        }
    }

    #[must_use]
    pub fn bound_addresses(&self) -> &[SocketAddr] {
        &self.bound_addresses
    }

    /// Validate config, write the pid file and serve until a termination
    /// signal arrives.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid or an app fails to start.
    pub fn run_loop(&mut self, runtime: &Runtime) -> Result<(), Error> {
        if let Err(err) = self.config.validate(true) {
            eprintln!("Failed to validate config file!");
            return Err(err);
        }

        self.write_pid()?;

        runtime.block_on(async {
            self.init_modules().await?;
            self.run_inner_loop().await
        })
    }

    /// Send `SIGUSR1` to the running broker process.
    ///
    /// # Errors
    ///
    /// Returns error if the pid file is unreadable or the process is gone.
    pub fn send_reload_signal(&mut self) -> Result<(), Error> {
        #[cfg(target_os = "linux")]
        return self.send_signal(nc::SIGUSR1);

        #[cfg(not(target_os = "linux"))]
        return self.send_signal(0);
    }

    /// Send `SIGTERM` to the running broker process.
    ///
    /// # Errors
    ///
    /// Returns error if the pid file is unreadable or the process is gone.
    pub fn send_stop_signal(&mut self) -> Result<(), Error> {
        #[cfg(target_os = "linux")]
        return self.send_signal(nc::SIGTERM);

        #[cfg(not(target_os = "linux"))]
        return self.send_signal(0);
    }

    #[cfg(not(target_os = "linux"))]
    fn send_signal(&mut self, _sig: i32) -> Result<(), Error> {
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn send_signal(&mut self, sig: i32) -> Result<(), Error> {
        let mut fd = File::open(self.config.general().pid_file())?;
        let mut pid_str = String::new();
        fd.read_to_string(&mut pid_str)?;
        let pid = pid_str.trim().parse::<i32>().map_err(|err| {
            Error::from_string(
                ErrorKind::PidError,
                format!(
                    "Failed to parse pid {:?} from file {:?}, err: {:?}",
                    pid_str,
                    self.config.general().pid_file(),
                    err
                ),
            )
        })?;

        unsafe {
            nc::kill(pid, sig).map_err(|errno| {
                Error::from_string(
                    ErrorKind::PidError,
                    format!("Failed to notify process {pid}, errno: {errno}"),
                )
            })?;
        }
        Ok(())
    }

    fn write_pid(&self) -> Result<(), Error> {
        let pid = std::process::id();
        let mut fd = File::create(self.config.general().pid_file()).map_err(|err| {
            Error::from_string(
                ErrorKind::IoError,
                format!(
                    "Failed to create pid file {:?}, err: {:?}",
                    self.config.general().pid_file(),
                    err
                ),
            )
        })?;
        write!(fd, "{pid}")?;
        Ok(())
    }
}

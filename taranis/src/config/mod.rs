// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::Error;

mod bridge;
mod cluster;
mod connector;
mod general;
mod listener;
mod log;
mod security;
mod storage;

pub use self::log::{Log, LogLevel};
pub use bridge::{Bridge, BridgeDirection, BridgeTopic};
pub use cluster::Cluster;
pub use connector::Connector;
pub use general::{General, QueueOverflowPolicy};
pub use listener::{Listener, Protocol};
pub use security::{AclAccess, AclRule, Security};
pub use storage::Storage;

/// Server main config.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "General::default")]
    general: General,

    #[serde(default = "Listener::default_listeners")]
    listeners: Vec<Listener>,

    #[serde(default = "Security::default")]
    security: Security,

    #[serde(default = "Storage::default")]
    storage: Storage,

    #[serde(default = "Cluster::default")]
    cluster: Cluster,

    #[serde(default = "Bridge::default_bridges")]
    bridges: Vec<Bridge>,

    #[serde(default = "Connector::default_connectors")]
    connectors: Vec<Connector>,

    #[serde(default = "Log::default")]
    log: Log,
}

impl Config {
    #[must_use]
    pub const fn general(&self) -> &General {
        &self.general
    }

    #[must_use]
    pub fn listeners(&self) -> &[Listener] {
        &self.listeners
    }

    #[must_use]
    pub const fn security(&self) -> &Security {
        &self.security
    }

    #[must_use]
    pub const fn storage(&self) -> &Storage {
        &self.storage
    }

    #[must_use]
    pub const fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    #[must_use]
    pub fn bridges(&self) -> &[Bridge] {
        &self.bridges
    }

    #[must_use]
    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    #[must_use]
    pub const fn log(&self) -> &Log {
        &self.log
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if some options in config are invalid.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        self.general.validate()?;
        for listener in &self.listeners {
            listener.validate(bind_address)?;
        }
        self.security.validate()?;
        self.storage.validate()?;
        self.cluster.validate(bind_address)?;
        for bridge in &self.bridges {
            bridge.validate()?;
        }
        for connector in &self.connectors {
            connector.validate()?;
        }
        self.log.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: General::default(),
            listeners: Listener::default_listeners(),
            security: Security::default(),
            storage: Storage::default(),
            cluster: Cluster::default(),
            bridges: Bridge::default_bridges(),
            connectors: Connector::default_connectors(),
            log: Log::default(),
        }
    }
}

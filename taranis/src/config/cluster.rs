// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::net::ToSocketAddrs;

use crate::error::{Error, ErrorKind};

/// Cluster section in config.
#[derive(Debug, Deserialize, Clone)]
pub struct Cluster {
    /// Enable the cluster bus.
    ///
    /// Default is false.
    #[serde(default = "Cluster::default_enabled")]
    enabled: bool,

    /// Name of this node, must be unique inside the cluster.
    ///
    /// Default is "node-1".
    #[serde(default = "Cluster::default_node_id")]
    node_id: String,

    /// Address the peer listener binds to.
    ///
    /// Default is 0.0.0.0:18830.
    #[serde(default = "Cluster::default_listen_address")]
    listen_address: String,

    /// Addresses of the other nodes.
    #[serde(default = "Cluster::default_peers")]
    peers: Vec<String>,

    /// Seconds between reconnect attempts to an unreachable peer.
    ///
    /// Default is 5s.
    #[serde(default = "Cluster::default_reconnect_interval")]
    reconnect_interval: u32,

    /// Number of recently observed message ids remembered per origin node
    /// for deduplication of redelivered publications.
    ///
    /// Default is 4096.
    #[serde(default = "Cluster::default_dedup_window")]
    dedup_window: usize,
}

impl Cluster {
    #[must_use]
    pub const fn default_enabled() -> bool {
        false
    }

    #[must_use]
    pub fn default_node_id() -> String {
        "node-1".to_string()
    }

    #[must_use]
    pub fn default_listen_address() -> String {
        "0.0.0.0:18830".to_string()
    }

    #[must_use]
    pub const fn default_peers() -> Vec<String> {
        Vec::new()
    }

    #[must_use]
    pub const fn default_reconnect_interval() -> u32 {
        5
    }

    #[must_use]
    pub const fn default_dedup_window() -> usize {
        4096
    }

    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    #[must_use]
    pub fn listen_address(&self) -> &str {
        &self.listen_address
    }

    #[must_use]
    pub fn peers(&self) -> &[String] {
        &self.peers
    }

    #[must_use]
    pub const fn reconnect_interval(&self) -> u32 {
        self.reconnect_interval
    }

    #[must_use]
    pub const fn dedup_window(&self) -> usize {
        self.dedup_window
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if enabled with an unresolvable address.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        if !self.enabled {
            return Ok(());
        }
        if self.node_id.is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "cluster node_id is empty"));
        }
        if bind_address && self.listen_address.to_socket_addrs().is_err() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid cluster listen address: {}", self.listen_address),
            ));
        }
        Ok(())
    }
}

impl Default for Cluster {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            node_id: Self::default_node_id(),
            listen_address: Self::default_listen_address(),
            peers: Self::default_peers(),
            reconnect_interval: Self::default_reconnect_interval(),
            dedup_window: Self::default_dedup_window(),
        }
    }
}

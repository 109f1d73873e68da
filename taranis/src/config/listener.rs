// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::net::ToSocketAddrs;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Binding protocol types.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Raw MQTT over TCP.
    #[default]
    #[serde(alias = "mqtt")]
    Mqtt,

    /// Raw MQTT over TCP with TLS encryption.
    #[serde(alias = "mqtts")]
    Mqtts,

    /// MQTT over WebSocket, binary sub-protocol `mqtt`.
    #[serde(alias = "ws")]
    Ws,

    /// MQTT over secure WebSocket.
    #[serde(alias = "wss")]
    Wss,
}

/// One ip/port/protocol combination the broker listens on.
#[derive(Debug, Deserialize, Clone)]
pub struct Listener {
    /// Binding protocol.
    ///
    /// Default is mqtt.
    #[serde(default = "Protocol::default")]
    protocol: Protocol,

    /// Binding address, including host and port.
    ///
    /// Common addresses are:
    /// - 0.0.0.0:1883, for mqtt
    /// - 0.0.0.0:8883, for mqtts
    /// - 0.0.0.0:8083, for mqtt over WebSocket
    /// - 0.0.0.0:8084, for mqtt over secure WebSocket
    ///
    /// Default is 0.0.0.0:1883.
    #[serde(default = "Listener::default_address")]
    address: String,

    /// Url path to bind to, only used for websocket protocols.
    ///
    /// Default is None, which means do not check url path.
    #[serde(default = "Listener::default_path")]
    path: Option<String>,

    /// Path to TLS cert file.
    #[serde(default = "Listener::default_cert_file")]
    cert_file: Option<PathBuf>,

    /// Path to TLS private key file.
    #[serde(default = "Listener::default_key_file")]
    key_file: Option<PathBuf>,

    /// Connection keep alive timeout in seconds, used when the client sets
    /// no keep alive in CONNECT.
    ///
    /// Default is 60.
    #[serde(default = "Listener::default_keep_alive")]
    keep_alive: u16,

    /// Timeout value in seconds between stream accept and the CONNECT
    /// packet.
    ///
    /// Default is 30s.
    #[serde(default = "Listener::default_connect_timeout")]
    connect_timeout: u16,

    /// Allow a client to supply a zero length client id and have the
    /// broker assign a unique one.
    ///
    /// Default is true.
    #[serde(default = "Listener::default_allow_empty_client_id")]
    allow_empty_client_id: bool,

    /// Send window used for clients which do not negotiate a receive
    /// maximum, and upper bound for those which do.
    ///
    /// Default is 20.
    #[serde(default = "Listener::default_maximum_inflight_messages")]
    maximum_inflight_messages: u16,
}

impl Listener {
    #[must_use]
    pub fn default_listeners() -> Vec<Self> {
        vec![Self::default()]
    }

    #[must_use]
    pub fn default_address() -> String {
        "0.0.0.0:1883".to_string()
    }

    #[must_use]
    pub const fn default_path() -> Option<String> {
        None
    }

    #[must_use]
    pub const fn default_cert_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_key_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_keep_alive() -> u16 {
        60
    }

    #[must_use]
    pub const fn default_connect_timeout() -> u16 {
        30
    }

    #[must_use]
    pub const fn default_allow_empty_client_id() -> bool {
        true
    }

    #[must_use]
    pub const fn default_maximum_inflight_messages() -> u16 {
        20
    }

    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn cert_file(&self) -> Option<&Path> {
        self.cert_file.as_deref()
    }

    #[must_use]
    pub fn key_file(&self) -> Option<&Path> {
        self.key_file.as_deref()
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> u16 {
        self.connect_timeout
    }

    #[must_use]
    pub const fn allow_empty_client_id(&self) -> bool {
        self.allow_empty_client_id
    }

    #[must_use]
    pub const fn maximum_inflight_messages(&self) -> u16 {
        self.maximum_inflight_messages
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be resolved or TLS files are
    /// missing for a secure protocol.
    pub fn validate(&self, bind_address: bool) -> Result<(), Error> {
        if bind_address && self.address.to_socket_addrs().is_err() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid listener address: {}", self.address),
            ));
        }
        if matches!(self.protocol, Protocol::Mqtts | Protocol::Wss)
            && (self.cert_file.is_none() || self.key_file.is_none())
        {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!(
                    "cert_file and key_file are required for listener {}",
                    self.address
                ),
            ));
        }
        Ok(())
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            address: Self::default_address(),
            path: Self::default_path(),
            cert_file: Self::default_cert_file(),
            key_file: Self::default_key_file(),
            keep_alive: Self::default_keep_alive(),
            connect_timeout: Self::default_connect_timeout(),
            allow_empty_client_id: Self::default_allow_empty_client_id(),
            maximum_inflight_messages: Self::default_maximum_inflight_messages(),
        }
    }
}

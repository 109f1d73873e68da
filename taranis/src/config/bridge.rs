// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::QoS;
use serde::Deserialize;
use std::net::ToSocketAddrs;

use crate::error::{Error, ErrorKind};

/// Direction of one bridged topic.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum BridgeDirection {
    /// Pull: subscribe on the remote broker, publish locally.
    #[default]
    #[serde(alias = "in")]
    In,

    /// Push: subscribe locally, publish on the remote broker.
    #[serde(alias = "out")]
    Out,
}

/// One bridged topic filter.
#[derive(Debug, Deserialize, Clone)]
pub struct BridgeTopic {
    pub filter: String,

    #[serde(default = "BridgeDirection::default")]
    pub direction: BridgeDirection,

    #[serde(default = "BridgeTopic::default_qos")]
    pub qos: QoS,
}

impl BridgeTopic {
    #[must_use]
    pub const fn default_qos() -> QoS {
        QoS::AtMostOnce
    }
}

/// One upstream/downstream bridge connection.
#[derive(Debug, Deserialize, Clone)]
pub struct Bridge {
    /// Bridge name, also used in its pseudo client id.
    pub name: String,

    /// Address of the remote broker, host:port.
    pub address: String,

    /// Topics forwarded over this bridge.
    #[serde(default = "Bridge::default_topics")]
    pub topics: Vec<BridgeTopic>,

    /// Seconds between reconnect attempts.
    ///
    /// Default is 5s.
    #[serde(default = "Bridge::default_reconnect_interval")]
    pub reconnect_interval: u32,

    /// Keep alive sent in the outbound CONNECT.
    ///
    /// Default is 60.
    #[serde(default = "Bridge::default_keep_alive")]
    pub keep_alive: u16,
}

impl Bridge {
    #[must_use]
    pub const fn default_bridges() -> Vec<Self> {
        Vec::new()
    }

    #[must_use]
    pub const fn default_topics() -> Vec<BridgeTopic> {
        Vec::new()
    }

    #[must_use]
    pub const fn default_reconnect_interval() -> u32 {
        5
    }

    #[must_use]
    pub const fn default_keep_alive() -> u16 {
        60
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the address is unresolvable or a filter invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "bridge name is empty"));
        }
        if self.address.to_socket_addrs().is_err() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid bridge address: {}", self.address),
            ));
        }
        for topic in &self.topics {
            if codec::TopicFilter::parse(&topic.filter).is_err() {
                return Err(Error::from_string(
                    ErrorKind::ConfigError,
                    format!("Invalid bridge filter: {}", topic.filter),
                ));
            }
        }
        Ok(())
    }
}

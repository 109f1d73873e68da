// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;

use crate::error::{Error, ErrorKind};

/// One logger connector entry; messages matching the filter are written
/// to the broker log through a pseudo-session.
#[derive(Debug, Deserialize, Clone)]
pub struct Connector {
    /// Connector name, also part of its pseudo client id.
    pub name: String,

    /// Topic filter the connector listens on.
    pub filter: String,
}

impl Connector {
    #[must_use]
    pub const fn default_connectors() -> Vec<Self> {
        Vec::new()
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the filter is invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::new(ErrorKind::ConfigError, "connector name is empty"));
        }
        if codec::TopicFilter::parse(&self.filter).is_err() {
            return Err(Error::from_string(
                ErrorKind::ConfigError,
                format!("Invalid connector filter: {}", self.filter),
            ));
        }
        Ok(())
    }
}

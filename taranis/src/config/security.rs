// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// Which direction an ACL rule applies to.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum AclAccess {
    #[serde(alias = "publish")]
    Publish,

    #[serde(alias = "subscribe")]
    Subscribe,

    #[default]
    #[serde(alias = "all")]
    All,
}

/// One ACL entry; rules are checked in order, first match wins.
#[derive(Debug, Deserialize, Clone)]
pub struct AclRule {
    /// Topic filter the rule covers.
    pub filter: String,

    /// Restrict the rule to one client id; empty matches every client.
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default = "AclAccess::default")]
    pub access: AclAccess,

    /// Whether a matching action is allowed.
    #[serde(default = "AclRule::default_allow")]
    pub allow: bool,
}

impl AclRule {
    #[must_use]
    pub const fn default_allow() -> bool {
        true
    }
}

/// Security section in config.
#[derive(Debug, Deserialize, Clone)]
pub struct Security {
    /// Accept CONNECT packets without username/password.
    ///
    /// Default is true.
    #[serde(default = "Security::default_allow_anonymous")]
    allow_anonymous: bool,

    /// Path to the password file, entries of `username:base64(salt+hash)`.
    ///
    /// Default is None.
    #[serde(default = "Security::default_password_file")]
    password_file: Option<PathBuf>,

    /// ACL rules, checked in order; an empty list allows everything.
    #[serde(default = "Security::default_acl_rules")]
    acl_rules: Vec<AclRule>,

    /// Disconnect a client whose publish is denied by the ACL instead of
    /// dropping the message silently.
    ///
    /// Default is false.
    #[serde(default = "Security::default_disconnect_on_denied_publish")]
    disconnect_on_denied_publish: bool,
}

impl Security {
    /// An allow-anonymous config carrying only the given ACL rules.
    #[must_use]
    pub fn with_acl_rules(acl_rules: Vec<AclRule>) -> Self {
        Self {
            acl_rules,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn default_allow_anonymous() -> bool {
        true
    }

    #[must_use]
    pub const fn default_password_file() -> Option<PathBuf> {
        None
    }

    #[must_use]
    pub const fn default_acl_rules() -> Vec<AclRule> {
        Vec::new()
    }

    #[must_use]
    pub const fn default_disconnect_on_denied_publish() -> bool {
        false
    }

    #[must_use]
    pub const fn allow_anonymous(&self) -> bool {
        self.allow_anonymous
    }

    #[must_use]
    pub fn password_file(&self) -> Option<&Path> {
        self.password_file.as_deref()
    }

    #[must_use]
    pub fn acl_rules(&self) -> &[AclRule] {
        &self.acl_rules
    }

    #[must_use]
    pub const fn disconnect_on_denied_publish(&self) -> bool {
        self.disconnect_on_denied_publish
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the password file does not exist or a rule filter
    /// is invalid.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(password_file) = &self.password_file {
            if !password_file.exists() {
                return Err(Error::from_string(
                    ErrorKind::ConfigError,
                    format!("password_file not found: {password_file:?}"),
                ));
            }
        }
        for rule in &self.acl_rules {
            if codec::TopicFilter::parse(&rule.filter).is_err() {
                return Err(Error::from_string(
                    ErrorKind::ConfigError,
                    format!("Invalid acl filter: {}", rule.filter),
                ));
            }
        }
        Ok(())
    }
}

impl Default for Security {
    fn default() -> Self {
        Self {
            allow_anonymous: Self::default_allow_anonymous(),
            password_file: Self::default_password_file(),
            acl_rules: Self::default_acl_rules(),
            disconnect_on_denied_publish: Self::default_disconnect_on_denied_publish(),
        }
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

#![allow(clippy::unsafe_derive_deserialize)]

use codec::QoS;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, ErrorKind};

/// What to do with a new QoS 1/2 message when a session queue is full.
///
/// QoS 0 messages are always droppable; guaranteed traffic is only dropped
/// under an explicit policy. The default closes the slowest consumer
/// instead of silently losing messages.
#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum QueueOverflowPolicy {
    /// Discard the incoming message.
    #[serde(alias = "drop-new")]
    DropNew,

    /// Discard the oldest queued message.
    #[serde(alias = "drop-oldest")]
    DropOldest,

    /// Disconnect the session with reason 0x93.
    #[default]
    #[serde(alias = "disconnect")]
    Disconnect,
}

/// General section in config.
#[derive(Debug, Deserialize, Clone)]
pub struct General {
    /// Time interval to send $SYS messages in seconds.
    ///
    /// Set to 0 to disable $SYS messages.
    ///
    /// Default is 3s.
    #[serde(default = "General::default_sys_interval")]
    sys_interval: u32,

    /// Write process id to a file.
    ///
    /// Default is `/run/taranis.pid` for root,
    /// and `/run/user/UID/taranis.pid` for other users.
    #[serde(default = "General::default_pid_file")]
    pid_file: PathBuf,

    /// Set maximum size for publish message payload.
    ///
    /// Received messages that exceed this size are not accepted by the
    /// broker. Default is 64KB; 0 means any valid MQTT payload.
    #[serde(default = "General::default_message_size_limit")]
    message_size_limit: u32,

    /// Set the maximum QoS supported.
    ///
    /// Subscriptions asking for more are granted this value instead.
    ///
    /// Default is 2.
    #[serde(default = "General::default_maximum_qos")]
    maximum_qos: QoS,

    /// The maximum number of QoS 1/2 messages queued per session while the
    /// send window is exhausted or the client is away.
    ///
    /// Default is 1000.
    #[serde(default = "General::default_maximum_queued_messages")]
    maximum_queued_messages: usize,

    /// What happens when the per-session queue overflows.
    ///
    /// Default is "disconnect".
    #[serde(default = "QueueOverflowPolicy::default")]
    queue_overflow_policy: QueueOverflowPolicy,

    /// Seconds before an unacknowledged QoS 1/2 packet is retransmitted.
    ///
    /// Default is 20s.
    #[serde(default = "General::default_retransmit_interval")]
    retransmit_interval: u32,
}

impl General {
    #[must_use]
    pub const fn default_sys_interval() -> u32 {
        3
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn default_pid_file() -> PathBuf {
        PathBuf::from("taranis.pid")
    }

    #[cfg(unix)]
    #[must_use]
    pub fn default_pid_file() -> PathBuf {
        let uid = unsafe { nc::geteuid() };
        if uid == 0 {
            PathBuf::from("/run/taranis.pid")
        } else {
            PathBuf::from(&format!("/run/user/{uid}/taranis.pid"))
        }
    }

    #[must_use]
    pub const fn default_message_size_limit() -> u32 {
        64 * 1024
    }

    #[must_use]
    pub const fn default_maximum_qos() -> QoS {
        QoS::ExactOnce
    }

    #[must_use]
    pub const fn default_maximum_queued_messages() -> usize {
        1000
    }

    #[must_use]
    pub const fn default_retransmit_interval() -> u32 {
        20
    }

    #[must_use]
    pub const fn sys_interval(&self) -> u32 {
        self.sys_interval
    }

    #[must_use]
    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    #[must_use]
    pub const fn message_size_limit(&self) -> u32 {
        self.message_size_limit
    }

    #[must_use]
    pub const fn maximum_qos(&self) -> QoS {
        self.maximum_qos
    }

    #[must_use]
    pub const fn maximum_queued_messages(&self) -> usize {
        self.maximum_queued_messages
    }

    #[must_use]
    pub const fn queue_overflow_policy(&self) -> QueueOverflowPolicy {
        self.queue_overflow_policy
    }

    #[must_use]
    pub const fn retransmit_interval(&self) -> u32 {
        self.retransmit_interval
    }

    /// Validate config.
    ///
    /// # Errors
    ///
    /// Returns error if the pid file directory cannot be created.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(parent) = self.pid_file.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    Error::from_string(
                        ErrorKind::ConfigError,
                        format!(
                            "Failed to create pid dir {:?}, err: {:?}",
                            self.pid_file, err
                        ),
                    )
                })?;
            }
        }
        Ok(())
    }
}

impl Default for General {
    fn default() -> Self {
        Self {
            sys_interval: Self::default_sys_interval(),
            pid_file: Self::default_pid_file(),
            message_size_limit: Self::default_message_size_limit(),
            maximum_qos: Self::default_maximum_qos(),
            maximum_queued_messages: Self::default_maximum_queued_messages(),
            queue_overflow_policy: QueueOverflowPolicy::default(),
            retransmit_interval: Self::default_retransmit_interval(),
        }
    }
}

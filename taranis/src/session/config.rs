// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use codec::QoS;

use crate::config::QueueOverflowPolicy;

/// Per-session knobs, assembled by the listener from the listener and
/// general config sections.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    keep_alive: u16,
    connect_timeout: u16,
    allow_empty_client_id: bool,
    maximum_inflight_messages: u16,
    maximum_queued_messages: usize,
    queue_overflow_policy: QueueOverflowPolicy,
    retransmit_interval: u32,
    message_size_limit: u32,
    maximum_qos: QoS,
    disconnect_on_denied_publish: bool,
}

impl SessionConfig {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub const fn new(
        keep_alive: u16,
        connect_timeout: u16,
        allow_empty_client_id: bool,
        maximum_inflight_messages: u16,
        maximum_queued_messages: usize,
        queue_overflow_policy: QueueOverflowPolicy,
        retransmit_interval: u32,
        message_size_limit: u32,
        maximum_qos: QoS,
        disconnect_on_denied_publish: bool,
    ) -> Self {
        Self {
            keep_alive,
            connect_timeout,
            allow_empty_client_id,
            maximum_inflight_messages,
            maximum_queued_messages,
            queue_overflow_policy,
            retransmit_interval,
            message_size_limit,
            maximum_qos,
            disconnect_on_denied_publish,
        }
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

    #[must_use]
    pub const fn message_size_limit(&self) -> u32 {
        self.message_size_limit
    }

    #[must_use]
    pub const fn maximum_qos(&self) -> QoS {
        self.maximum_qos
    }

    #[must_use]
    pub const fn disconnect_on_denied_publish(&self) -> bool {
        self.disconnect_on_denied_publish
    }
}

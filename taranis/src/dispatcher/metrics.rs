// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Broker counters, published periodically as retained `$SYS` messages.

use bytes::Bytes;
use codec::{QoS, TopicName};

use super::Dispatcher;
use crate::message::Message;
use crate::types::unix_millis;

#[derive(Debug, Default)]
pub struct Metrics {
    pub started_at: u64,
    pub sessions_connected: u64,
    pub sessions_expired: u64,
    pub subscriptions: u64,
    pub messages_received: u64,
    pub messages_sent: u64,
    pub messages_queued: u64,
    pub messages_dropped: u64,
    pub messages_from_cluster: u64,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: unix_millis(),
            ..Self::default()
        }
    }
}

impl Dispatcher {
    pub(super) async fn on_timer_tick(&mut self) {
        let now = unix_millis();
        self.process_timers(now).await;

        if let Err(err) = self.retained_store.purge_expired(now).await {
            log::error!("dispatcher: Failed to purge retained store: {err}");
        }

        if self.archive_retention > 0 {
            if let Some(archive_store) = &self.archive_store {
                let cutoff = now.saturating_sub(u64::from(self.archive_retention) * 1000);
                if let Err(err) = archive_store.purge_before(cutoff).await {
                    log::error!("dispatcher: Failed to purge archive: {err}");
                }
            }
        }

        let sys_interval = self.config.sys_interval();
        if sys_interval > 0 && now >= self.next_sys_at {
            self.next_sys_at = now + u64::from(sys_interval) * 1000;
            self.publish_sys_messages().await;
        }
    }

    /// Publish the broker counters below `$SYS/broker`, retained so late
    /// subscribers see the latest value.
    async fn publish_sys_messages(&mut self) {
        let uptime_secs = (unix_millis() - self.metrics.started_at) / 1000;
        let entries = [
            ("$SYS/broker/uptime", uptime_secs.to_string()),
            (
                "$SYS/broker/clients/connected",
                self.metrics.sessions_connected.to_string(),
            ),
            (
                "$SYS/broker/clients/expired",
                self.metrics.sessions_expired.to_string(),
            ),
            (
                "$SYS/broker/subscriptions/count",
                self.metrics.subscriptions.to_string(),
            ),
            (
                "$SYS/broker/messages/received",
                self.metrics.messages_received.to_string(),
            ),
            (
                "$SYS/broker/messages/sent",
                self.metrics.messages_sent.to_string(),
            ),
            (
                "$SYS/broker/messages/dropped",
                self.metrics.messages_dropped.to_string(),
            ),
            (
                "$SYS/broker/cluster/messages/received",
                self.metrics.messages_from_cluster.to_string(),
            ),
        ];
        for (topic, value) in entries {
            let Ok(topic) = TopicName::parse(topic) else {
                continue;
            };
            let message = Message::new(topic, QoS::AtMostOnce, Bytes::from(value.into_bytes()))
                .with_retain(true);
            // $SYS traffic stays on this node.
            self.route_message(message, false).await;
        }
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles commands arriving from the cluster app.

use super::Dispatcher;
use crate::commands::{ClusterToDispatcherCmd, DispatcherToClusterCmd};

impl Dispatcher {
    pub(super) async fn handle_cluster_cmd(&mut self, cmd: ClusterToDispatcherCmd) {
        match cmd {
            ClusterToDispatcherCmd::RemotePublish(origin, message) => {
                log::debug!(
                    "dispatcher: Remote publish from {origin} on {}",
                    message.topic
                );
                self.metrics.messages_from_cluster += 1;
                // Forwarded publications are routed locally only; the
                // origin tag prevents a loop back onto the bus.
                self.route_message(message, false).await;
            }
            ClusterToDispatcherCmd::SnapshotRequest => {
                let entries = self
                    .trie
                    .entries()
                    .into_iter()
                    .map(|(client_id, subscription)| {
                        (
                            client_id,
                            subscription.filter.as_str().to_string(),
                            subscription.qos,
                        )
                    })
                    .collect();
                self.notify_cluster(DispatcherToClusterCmd::SubscriptionSnapshot(entries))
                    .await;
            }
        }
    }
}

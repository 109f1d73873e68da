// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles the connector contracts: publish, subscribe-internal and
//! unsubscribe-internal.

use super::{ClientHandle, ClientState, Dispatcher};
use crate::commands::{ConnectorToDispatcherCmd, DispatcherToClusterCmd};

impl Dispatcher {
    pub(super) async fn handle_connector_cmd(&mut self, cmd: ConnectorToDispatcherCmd) {
        match cmd {
            ConnectorToDispatcherCmd::Publish(message) => {
                self.route_message(message, true).await;
            }
            ConnectorToDispatcherCmd::SubscribeInternal {
                client_id,
                subscription,
                sender,
            } => {
                log::info!(
                    "dispatcher: Internal subscription {client_id} -> {}",
                    subscription.filter
                );
                let state = self
                    .clients
                    .entry(client_id.clone())
                    .or_insert_with(|| ClientState {
                        handle: None,
                        generation: 0,
                        // Pseudo-sessions never expire and have no will.
                        session_expiry: u32::MAX,
                        will: None,
                        expire_at: None,
                        will_at: None,
                    });
                state.handle = Some(ClientHandle::Internal(sender));
                let filter = subscription.filter.as_str().to_string();
                let qos = subscription.qos;
                self.trie.insert(&client_id, subscription);
                self.metrics.subscriptions = self.trie.len() as u64;
                self.notify_cluster(DispatcherToClusterCmd::SubscriptionAdded {
                    client_id,
                    filter,
                    qos,
                })
                .await;
            }
            ConnectorToDispatcherCmd::UnsubscribeInternal { client_id, filter } => {
                self.trie.remove(&client_id, &filter);
                self.metrics.subscriptions = self.trie.len() as u64;
                self.notify_cluster(DispatcherToClusterCmd::SubscriptionRemoved {
                    client_id: client_id.clone(),
                    filter,
                })
                .await;
                // Forget the pseudo-session when its last filter is gone.
                let has_filters = self
                    .trie
                    .entries()
                    .iter()
                    .any(|(owner, _)| owner == &client_id);
                if !has_filters {
                    self.clients.remove(&client_id);
                }
            }
        }
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles commands arriving from the listeners.

use codec::{PacketId, QoS, ReasonCode};

use super::Dispatcher;
use crate::commands::{
    DispatcherToClusterCmd, DispatcherToListenerCmd, ListenerToDispatcherCmd,
};
use crate::message::{Delivery, Message, Subscription};
use crate::store;
use crate::types::{unix_millis, SessionGid};

impl Dispatcher {
    pub(super) async fn handle_listener_cmd(&mut self, cmd: ListenerToDispatcherCmd) {
        match cmd {
            ListenerToDispatcherCmd::SessionAttach(gid, connect) => {
                self.on_session_attach(gid, connect).await;
            }
            ListenerToDispatcherCmd::Publish(gid, message) => {
                self.on_listener_publish(gid, message).await;
            }
            ListenerToDispatcherCmd::Subscribe {
                gid,
                packet_id,
                entries,
            } => {
                self.on_listener_subscribe(gid, packet_id, entries).await;
            }
            ListenerToDispatcherCmd::Unsubscribe {
                gid,
                packet_id,
                filters,
            } => {
                self.on_listener_unsubscribe(gid, packet_id, filters).await;
            }
            ListenerToDispatcherCmd::SessionDetach { gid, clean, state } => {
                self.on_session_detach(gid, clean, state).await;
            }
        }
    }

    async fn on_listener_publish(&mut self, gid: SessionGid, message: Message) {
        if !self.gids.contains_key(&gid) {
            // Session vanished between accept and routing; the message was
            // accepted, so it is routed anyway.
            log::debug!("dispatcher: Publish from detached session {gid:?}");
        }
        self.route_message(message, true).await;
    }

    async fn on_listener_subscribe(
        &mut self,
        gid: SessionGid,
        packet_id: PacketId,
        entries: Vec<(Subscription, bool)>,
    ) {
        let Some(client_id) = self.gids.get(&gid).cloned() else {
            log::error!("dispatcher: Subscribe from unknown session {gid:?}");
            return;
        };

        let now = unix_millis();
        let mut reason_codes = Vec::with_capacity(entries.len());
        let mut retained = Vec::new();
        for (mut subscription, allowed) in entries {
            if !allowed {
                reason_codes.push(ReasonCode::NotAuthorized);
                continue;
            }
            // Granted QoS is the minimum of the requested QoS and the
            // broker maximum.
            subscription.qos = subscription.qos.min(self.config.maximum_qos());
            let granted = subscription.qos;

            let is_new = self.trie.insert(&client_id, subscription.clone());
            self.metrics.subscriptions = self.trie.len() as u64;
            reason_codes.push(match granted {
                QoS::AtMostOnce => ReasonCode::Success,
                QoS::AtLeastOnce => ReasonCode::GrantedQoS1,
                QoS::ExactOnce => ReasonCode::GrantedQoS2,
            });

            self.collect_retained(&client_id, &subscription, is_new, now, &mut retained)
                .await;

            self.notify_cluster(DispatcherToClusterCmd::SubscriptionAdded {
                client_id: client_id.clone(),
                filter: subscription.filter.as_str().to_string(),
                qos: granted,
            })
            .await;
        }

        self.persist_session(&client_id).await;
        self.send_to_listener(
            gid,
            DispatcherToListenerCmd::SubscribeAck {
                session_id: gid.session_id(),
                packet_id,
                reason_codes,
                retained,
            },
        )
        .await;
    }

    /// Fetch retained messages for a fresh subscription, honouring its
    /// retain-handling option.
    async fn collect_retained(
        &self,
        client_id: &str,
        subscription: &Subscription,
        is_new: bool,
        now: u64,
        retained: &mut Vec<Delivery>,
    ) {
        let send_retained = match subscription.retain_handling {
            codec::v5::RetainHandling::SendAtSubscribe => true,
            // Send-if-new applies only when the subscription did not
            // already exist for this client.
            codec::v5::RetainHandling::SendIfNew => is_new,
            codec::v5::RetainHandling::DoNotSend => false,
        };
        if !send_retained {
            return;
        }

        match store::with_retry(self.retry_limit, || {
            self.retained_store.find_matching(&subscription.filter)
        })
        .await
        {
            Ok(messages) => {
                for message in messages {
                    if message.is_expired(now) {
                        continue;
                    }
                    if subscription.no_local && message.publisher.as_deref() == Some(client_id) {
                        continue;
                    }
                    let qos = message.qos.min(subscription.qos);
                    retained.push(Delivery {
                        message,
                        qos,
                        // Retained messages sent in response to a
                        // subscription keep their retain flag set.
                        retain: true,
                        subscription_ids: subscription.subscription_id.into_iter().collect(),
                    });
                }
            }
            Err(err) => {
                log::error!("dispatcher: Failed to fetch retained messages: {err}");
            }
        }
    }

    async fn on_listener_unsubscribe(
        &mut self,
        gid: SessionGid,
        packet_id: PacketId,
        filters: Vec<String>,
    ) {
        let Some(client_id) = self.gids.get(&gid).cloned() else {
            log::error!("dispatcher: Unsubscribe from unknown session {gid:?}");
            return;
        };

        let mut reason_codes = Vec::with_capacity(filters.len());
        for filter in filters {
            if self.trie.remove(&client_id, &filter) {
                reason_codes.push(ReasonCode::Success);
                self.notify_cluster(DispatcherToClusterCmd::SubscriptionRemoved {
                    client_id: client_id.clone(),
                    filter,
                })
                .await;
            } else {
                reason_codes.push(ReasonCode::NoSubscriptionExisted);
            }
        }
        self.metrics.subscriptions = self.trie.len() as u64;

        self.persist_session(&client_id).await;
        self.send_to_listener(
            gid,
            DispatcherToListenerCmd::UnsubscribeAck {
                session_id: gid.session_id(),
                packet_id,
                reason_codes,
            },
        )
        .await;
    }
}

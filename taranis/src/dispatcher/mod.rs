// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Dispatcher is the message router of the broker.
//!
//! It owns the topic index, the client/session table and the storage
//! handles, and fans accepted publications out to local sessions, internal
//! subscribers and the cluster bus. All of its state is mutated from one
//! task only; apps reach it through bounded command channels.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::{Receiver, Sender};

use codec::QoS;

use crate::commands::{
    ClusterToDispatcherCmd, ConnectorToDispatcherCmd, DispatcherToClusterCmd,
    DispatcherToListenerCmd, ListenerToDispatcherCmd,
};
use crate::config;
use crate::message::{Delivery, Message, WillMessage};
use crate::store::{
    self, ArchiveStore, QueueStore, RetainedStore, SessionStore, StoredSession,
};
use crate::types::{unix_millis, ListenerId, MessageIdGenerator, NodeId, SessionGid};

mod cluster;
mod connector;
mod listener;
mod metrics;
mod sessions;
#[cfg(test)]
mod tests;
pub mod trie;

use metrics::Metrics;
use trie::SubTrie;

/// How a routed message reaches one subscriber.
#[derive(Debug, Clone)]
pub enum ClientHandle {
    /// A network session, addressed through its listener.
    Local(SessionGid),

    /// An in-process pseudo-session; deliveries bypass wire encoding and
    /// window accounting.
    Internal(Sender<Delivery>),
}

/// Routing state of one client id.
#[derive(Debug)]
pub struct ClientState {
    /// None while the session is disconnected but not yet expired.
    handle: Option<ClientHandle>,

    /// Bumped on every take-over; stale commands are recognized by it.
    generation: u64,

    /// Seconds the session outlives a disconnect; `u32::MAX` never.
    session_expiry: u32,

    will: Option<WillMessage>,

    /// Deadline for dropping the whole session, unix milliseconds.
    expire_at: Option<u64>,

    /// Deadline for publishing the will, unix milliseconds.
    will_at: Option<u64>,
}

/// Storage handles of the dispatcher.
pub struct DispatcherStores {
    pub sessions: Box<dyn SessionStore>,
    pub queues: Box<dyn QueueStore>,
    pub retained: Box<dyn RetainedStore>,
    pub archive: Option<Box<dyn ArchiveStore>>,
    /// Seconds archived messages are kept; 0 keeps them all.
    pub archive_retention: u32,
}

pub struct Dispatcher {
    node_id: NodeId,
    config: config::General,
    retry_limit: u32,

    trie: SubTrie,
    clients: HashMap<String, ClientState>,
    gids: HashMap<SessionGid, String>,
    /// Connects waiting for the taken-over session to detach, by client id.
    pending_attaches: HashMap<String, (SessionGid, crate::commands::ConnectData)>,
    id_generator: MessageIdGenerator,

    session_store: Box<dyn SessionStore>,
    queue_store: Box<dyn QueueStore>,
    retained_store: Box<dyn RetainedStore>,
    archive_store: Option<Box<dyn ArchiveStore>>,
    archive_retention: u32,

    listener_senders: HashMap<ListenerId, Sender<DispatcherToListenerCmd>>,
    listener_receiver: Receiver<ListenerToDispatcherCmd>,

    cluster_sender: Option<Sender<DispatcherToClusterCmd>>,
    cluster_receiver: Receiver<ClusterToDispatcherCmd>,

    connector_receiver: Receiver<ConnectorToDispatcherCmd>,

    metrics: Metrics,
    next_sys_at: u64,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        node_id: NodeId,
        config: config::General,
        retry_limit: u32,
        stores: DispatcherStores,
        listener_senders: Vec<(ListenerId, Sender<DispatcherToListenerCmd>)>,
        listener_receiver: Receiver<ListenerToDispatcherCmd>,
        cluster_sender: Option<Sender<DispatcherToClusterCmd>>,
        cluster_receiver: Receiver<ClusterToDispatcherCmd>,
        connector_receiver: Receiver<ConnectorToDispatcherCmd>,
    ) -> Self {
        Self {
            node_id,
            config,
            retry_limit,

            trie: SubTrie::new(),
            clients: HashMap::new(),
            gids: HashMap::new(),
            pending_attaches: HashMap::new(),
            id_generator: MessageIdGenerator::new(),

            session_store: stores.sessions,
            queue_store: stores.queues,
            retained_store: stores.retained,
            archive_store: stores.archive,
            archive_retention: stores.archive_retention,

            listener_senders: listener_senders.into_iter().collect(),
            listener_receiver,

            cluster_sender,
            cluster_receiver,

            connector_receiver,

            metrics: Metrics::new(),
            next_sys_at: 0,
        }
    }

    pub async fn run_loop(&mut self) -> ! {
        log::info!("dispatcher: Message router of node {} started", self.node_id);
        self.restore_sessions().await;
        let mut timer = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                Some(cmd) = self.listener_receiver.recv() => {
                    self.handle_listener_cmd(cmd).await;
                }
                Some(cmd) = self.cluster_receiver.recv() => {
                    self.handle_cluster_cmd(cmd).await;
                }
                Some(cmd) = self.connector_receiver.recv() => {
                    self.handle_connector_cmd(cmd).await;
                }
                _ = timer.tick() => {
                    self.on_timer_tick().await;
                }
            }
        }
    }

    async fn send_to_listener(&self, gid: SessionGid, cmd: DispatcherToListenerCmd) {
        if let Some(listener_sender) = self.listener_senders.get(&gid.listener_id()) {
            if let Err(err) = listener_sender.send(cmd).await {
                log::error!(
                    "dispatcher: Failed to send cmd to listener {}, err: {:?}",
                    gid.listener_id(),
                    err
                );
            }
        } else {
            log::error!(
                "dispatcher: No listener sender with id: {}",
                gid.listener_id()
            );
        }
    }

    /// Route one accepted publication, steps 1-5 of the delivery pipeline.
    ///
    /// Messages arriving from the cluster bus set `forward_to_cluster` to
    /// false so a publication never loops between nodes.
    pub(super) async fn route_message(&mut self, mut message: Message, forward_to_cluster: bool) {
        if message.id.is_zero() {
            message.id = self.id_generator.next();
        }
        let now = unix_millis();
        if message.is_expired(now) {
            self.metrics.messages_dropped += 1;
            return;
        }
        self.metrics.messages_received += 1;

        // Step 1: retained store update. An empty payload deletes.
        if message.retain {
            let retained = message.clone();
            if let Err(err) = store::with_retry(self.retry_limit, || {
                self.retained_store.put(retained.clone())
            })
            .await
            {
                log::error!("dispatcher: Failed to update retained store: {err}");
            }
        }

        // Step 2: aggregate local matches per client. A session receiving
        // the same message through several subscriptions gets it once with
        // the maximum granted QoS and the union of subscription ids.
        struct MatchGroup {
            qos: QoS,
            subscription_ids: Vec<u32>,
            retain_as_published: bool,
        }
        let mut groups: Vec<(String, MatchGroup)> = Vec::new();
        {
            let mut index: HashMap<&str, usize> = HashMap::new();
            for (client_id, subscription) in self.trie.matches(message.topic.as_str()) {
                if subscription.no_local && message.publisher.as_deref() == Some(client_id) {
                    continue;
                }
                if let Some(&at) = index.get(client_id) {
                    let group = &mut groups[at].1;
                    group.qos = group.qos.max(subscription.qos);
                    group.retain_as_published &= subscription.retain_as_published;
                    if let Some(id) = subscription.subscription_id {
                        group.subscription_ids.push(id);
                    }
                } else {
                    index.insert(client_id, groups.len());
                    groups.push((
                        client_id.to_string(),
                        MatchGroup {
                            qos: subscription.qos,
                            subscription_ids: subscription.subscription_id.into_iter().collect(),
                            retain_as_published: subscription.retain_as_published,
                        },
                    ));
                }
            }
        }

        for (client_id, group) in groups {
            let delivery = Delivery {
                message: message.clone(),
                qos: message.qos.min(group.qos),
                retain: group.retain_as_published && message.retain,
                subscription_ids: group.subscription_ids,
            };
            self.deliver_to_client(&client_id, delivery).await;
        }

        // Step 3: cluster forwarding; the bus filters by remote interest.
        if forward_to_cluster {
            if let Some(cluster_sender) = &self.cluster_sender {
                if let Err(err) = cluster_sender
                    .send(DispatcherToClusterCmd::Publish(message.clone()))
                    .await
                {
                    log::error!("dispatcher: Failed to forward to cluster: {err:?}");
                }
            }
        }

        // Step 4: archive.
        if let Some(archive_store) = &self.archive_store {
            let archived = message.clone();
            if let Err(err) =
                store::with_retry(self.retry_limit, || archive_store.append(archived.clone()))
                    .await
            {
                log::error!("dispatcher: Failed to append to archive: {err}");
            }
        }
    }

    async fn deliver_to_client(&mut self, client_id: &str, delivery: Delivery) {
        let Some(client) = self.clients.get(client_id) else {
            log::error!("dispatcher: No client state for {client_id}");
            return;
        };
        match &client.handle {
            Some(ClientHandle::Local(gid)) => {
                let gid = *gid;
                self.metrics.messages_sent += 1;
                self.send_to_listener(
                    gid,
                    DispatcherToListenerCmd::Deliver(gid.session_id(), delivery),
                )
                .await;
            }
            Some(ClientHandle::Internal(sender)) => {
                // Internal subscribers have no flow control; a full inbox
                // drops the message.
                if sender.try_send(delivery).is_err() {
                    self.metrics.messages_dropped += 1;
                    log::warn!("dispatcher: Internal subscriber {client_id} inbox full");
                }
            }
            None => {
                // Disconnected persistent session. QoS 0 is never queued.
                if delivery.qos == QoS::AtMostOnce {
                    self.metrics.messages_dropped += 1;
                    return;
                }
                self.metrics.messages_queued += 1;
                if let Err(err) = store::with_retry(self.retry_limit, || {
                    self.queue_store.enqueue(client_id, delivery.clone())
                })
                .await
                {
                    log::error!("dispatcher: Failed to queue message for {client_id}: {err}");
                }
            }
        }
    }

    /// Refresh the stored session record of one client, keeping its
    /// in-flight state intact.
    async fn persist_session(&self, client_id: &str) {
        let Some(client) = self.clients.get(client_id) else {
            return;
        };
        let subscriptions = self
            .trie
            .entries()
            .into_iter()
            .filter_map(|(owner, subscription)| (owner == client_id).then_some(subscription))
            .collect();
        let previous = store::with_retry(self.retry_limit, || self.session_store.load(client_id))
            .await
            .ok()
            .flatten();
        let record = StoredSession {
            client_id: client_id.to_string(),
            session_expiry: client.session_expiry,
            subscriptions,
            state: previous.map(|p| p.state).unwrap_or_default(),
            updated_at: unix_millis(),
        };
        if let Err(err) =
            store::with_retry(self.retry_limit, || self.session_store.put(record.clone())).await
        {
            log::error!("dispatcher: Failed to persist session {client_id}: {err}");
        }
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The cluster bus app.
//!
//! Best effort, at-least-once exchange of subscription deltas and
//! forwarded publications between broker nodes. Every node dials its
//! configured peers and accepts inbound links; a pair of nodes may end up
//! with two links between them, which the per-origin dedup window absorbs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Receiver, Sender};

use codec::{QoS, TopicFilter};

use crate::commands::{ClusterToDispatcherCmd, DispatcherToClusterCmd};
use crate::config;
use crate::error::Error;
use crate::socket::new_tcp_listener;
use crate::types::NodeId;

mod dedup;
mod wire;

use dedup::DedupWindow;
pub use wire::{read_frame, write_frame, PeerFrame};

const LINK_CHANNEL_CAPACITY: usize = 64;

type LinkId = u64;

#[derive(Debug)]
enum LinkEvent {
    Up(LinkId, Sender<PeerFrame>),
    Frame(LinkId, PeerFrame),
    Down(LinkId),
}

#[derive(Debug)]
struct PeerLink {
    /// Learned from the peer's Hello frame.
    node_id: Option<NodeId>,
    sender: Sender<PeerFrame>,
}

pub struct ClusterApp {
    config: config::Cluster,

    dispatcher_sender: Sender<ClusterToDispatcherCmd>,
    dispatcher_receiver: Receiver<DispatcherToClusterCmd>,

    links: HashMap<LinkId, PeerLink>,

    /// Interest learned from each remote node, keyed by
    /// (client id, filter string).
    remote_filters: HashMap<NodeId, HashMap<(String, String), TopicFilter>>,

    /// Copy of the local subscription table, maintained from deltas and
    /// snapshots, rebroadcast whenever a link comes up.
    local_subs: HashMap<(String, String), QoS>,

    dedup: DedupWindow,

    event_sender: Sender<LinkEvent>,
    event_receiver: Receiver<LinkEvent>,
    next_link_id: Arc<AtomicU64>,
}

impl ClusterApp {
    #[must_use]
    pub fn new(
        config: config::Cluster,
        dispatcher_sender: Sender<ClusterToDispatcherCmd>,
        dispatcher_receiver: Receiver<DispatcherToClusterCmd>,
    ) -> Self {
        let (event_sender, event_receiver) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let dedup = DedupWindow::new(config.dedup_window());
        Self {
            config,
            dispatcher_sender,
            dispatcher_receiver,
            links: HashMap::new(),
            remote_filters: HashMap::new(),
            local_subs: HashMap::new(),
            dedup,
            event_sender,
            event_receiver,
            next_link_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bind the peer listener, dial the configured peers and serve.
    ///
    /// # Errors
    ///
    /// Returns error if the peer listener cannot be bound.
    pub async fn run_loop(&mut self) -> Result<(), Error> {
        let listener = new_tcp_listener(self.config.listen_address()).await?;
        log::info!(
            "cluster: Node {} listening on {}",
            self.config.node_id(),
            self.config.listen_address()
        );

        for peer in self.config.peers() {
            tokio::spawn(dial_peer(
                peer.clone(),
                self.config.node_id().to_string(),
                u64::from(self.config.reconnect_interval()),
                self.event_sender.clone(),
                Arc::clone(&self.next_link_id),
            ));
        }

        loop {
            tokio::select! {
                Ok((stream, address)) = listener.accept() => {
                    log::info!("cluster: Inbound peer link from {address}");
                    let link_id = self.next_link_id.fetch_add(1, Ordering::Relaxed);
                    let (frame_sender, frame_receiver) = mpsc::channel(LINK_CHANNEL_CAPACITY);
                    if self
                        .event_sender
                        .send(LinkEvent::Up(link_id, frame_sender))
                        .await
                        .is_ok()
                    {
                        tokio::spawn(run_link(
                            link_id,
                            stream,
                            self.config.node_id().to_string(),
                            self.event_sender.clone(),
                            frame_receiver,
                        ));
                    }
                }
                Some(event) = self.event_receiver.recv() => {
                    self.handle_link_event(event).await;
                }
                Some(cmd) = self.dispatcher_receiver.recv() => {
                    self.handle_dispatcher_cmd(cmd).await;
                }
            }
        }
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Up(link_id, sender) => {
                self.links.insert(
                    link_id,
                    PeerLink {
                        node_id: None,
                        sender,
                    },
                );
                // Ask the dispatcher for a fresh table; the snapshot reply
                // is rebroadcast to every link, including the new one.
                if let Err(err) = self
                    .dispatcher_sender
                    .send(ClusterToDispatcherCmd::SnapshotRequest)
                    .await
                {
                    log::error!("cluster: Failed to request snapshot: {err:?}");
                }
            }
            LinkEvent::Down(link_id) => {
                log::info!("cluster: Link {link_id} closed");
                self.links.remove(&link_id);
                // Learned interest stays until the peer reconnects and
                // replaces it with a fresh table.
            }
            LinkEvent::Frame(link_id, frame) => self.handle_peer_frame(link_id, frame).await,
        }
    }

    async fn handle_peer_frame(&mut self, link_id: LinkId, frame: PeerFrame) {
        let node_id = match &frame {
            PeerFrame::Hello { node_id } => {
                log::info!("cluster: Link {link_id} is node {node_id}");
                if let Some(link) = self.links.get_mut(&link_id) {
                    link.node_id = Some(node_id.clone());
                }
                return;
            }
            _ => match self.links.get(&link_id).and_then(|l| l.node_id.clone()) {
                Some(node_id) => node_id,
                None => {
                    log::warn!("cluster: Frame on link {link_id} before Hello");
                    return;
                }
            },
        };

        match frame {
            PeerFrame::Hello { .. } => {}
            PeerFrame::SubscriptionAdded {
                client_id, filter, ..
            } => {
                if let Ok(parsed) = TopicFilter::parse(&filter) {
                    self.remote_filters
                        .entry(node_id)
                        .or_default()
                        .insert((client_id, filter), parsed);
                }
            }
            PeerFrame::SubscriptionRemoved { client_id, filter } => {
                if let Some(filters) = self.remote_filters.get_mut(&node_id) {
                    filters.remove(&(client_id, filter));
                }
            }
            PeerFrame::SubscriptionTable { entries } => {
                let mut filters = HashMap::new();
                for (client_id, filter, _qos) in entries {
                    if let Ok(parsed) = TopicFilter::parse(&filter) {
                        filters.insert((client_id, filter), parsed);
                    }
                }
                log::info!(
                    "cluster: Learned {} subscriptions from {node_id}",
                    filters.len()
                );
                self.remote_filters.insert(node_id, filters);
            }
            PeerFrame::Publication { origin, message } => {
                // At-least-once redelivery is collapsed here.
                if origin == self.config.node_id() {
                    return;
                }
                if !self.dedup.observe(&origin, message.id) {
                    log::debug!("cluster: Duplicate publication from {origin}");
                    return;
                }
                if let Err(err) = self
                    .dispatcher_sender
                    .send(ClusterToDispatcherCmd::RemotePublish(origin, message))
                    .await
                {
                    log::error!("cluster: Failed to hand publication over: {err:?}");
                }
            }
        }
    }

    async fn handle_dispatcher_cmd(&mut self, cmd: DispatcherToClusterCmd) {
        match cmd {
            DispatcherToClusterCmd::Publish(message) => {
                for link in self.links.values() {
                    let Some(node_id) = &link.node_id else {
                        continue;
                    };
                    let interested = self.remote_filters.get(node_id).is_some_and(|filters| {
                        filters
                            .values()
                            .any(|filter| filter.matches(message.topic.as_str()))
                    });
                    if !interested {
                        continue;
                    }
                    let frame = PeerFrame::Publication {
                        origin: self.config.node_id().to_string(),
                        message: message.clone(),
                    };
                    // Best effort: a saturated link loses the frame rather
                    // than stalling the router.
                    if link.sender.try_send(frame).is_err() {
                        log::warn!("cluster: Link to {node_id} saturated, frame dropped");
                    }
                }
            }
            DispatcherToClusterCmd::SubscriptionAdded {
                client_id,
                filter,
                qos,
            } => {
                self.local_subs
                    .insert((client_id.clone(), filter.clone()), qos);
                self.broadcast(PeerFrame::SubscriptionAdded {
                    client_id,
                    filter,
                    qos,
                });
            }
            DispatcherToClusterCmd::SubscriptionRemoved { client_id, filter } => {
                self.local_subs.remove(&(client_id.clone(), filter.clone()));
                self.broadcast(PeerFrame::SubscriptionRemoved { client_id, filter });
            }
            DispatcherToClusterCmd::SubscriptionSnapshot(entries) => {
                self.local_subs = entries
                    .iter()
                    .map(|(client_id, filter, qos)| ((client_id.clone(), filter.clone()), *qos))
                    .collect();
                self.broadcast(PeerFrame::SubscriptionTable { entries });
            }
        }
    }

    fn broadcast(&self, frame: PeerFrame) {
        for link in self.links.values() {
            if link.sender.try_send(frame.clone()).is_err() {
                log::warn!("cluster: Broadcast frame dropped on saturated link");
            }
        }
    }
}

/// Keep one outbound link alive, reconnecting forever.
async fn dial_peer(
    address: String,
    node_id: NodeId,
    reconnect_secs: u64,
    events: Sender<LinkEvent>,
    next_link_id: Arc<AtomicU64>,
) {
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                log::info!("cluster: Connected to peer {address}");
                let link_id = next_link_id.fetch_add(1, Ordering::Relaxed);
                let (frame_sender, frame_receiver) = mpsc::channel(LINK_CHANNEL_CAPACITY);
                if events
                    .send(LinkEvent::Up(link_id, frame_sender))
                    .await
                    .is_err()
                {
                    return;
                }
                run_link(link_id, stream, node_id.clone(), events.clone(), frame_receiver).await;
            }
            Err(err) => {
                log::warn!("cluster: Failed to reach peer {address}: {err}");
            }
        }
        tokio::time::sleep(Duration::from_secs(reconnect_secs.max(1))).await;
    }
}

/// Serve one established link until either side fails.
async fn run_link(
    link_id: LinkId,
    stream: TcpStream,
    node_id: NodeId,
    events: Sender<LinkEvent>,
    mut outgoing: Receiver<PeerFrame>,
) {
    let (mut reader, mut writer) = stream.into_split();

    if let Err(err) = write_frame(&mut writer, &PeerFrame::Hello { node_id }).await {
        log::warn!("cluster: Failed to greet on link {link_id}: {err}");
        let _ret = events.send(LinkEvent::Down(link_id)).await;
        return;
    }

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => {
                match frame {
                    Ok(frame) => {
                        if events.send(LinkEvent::Frame(link_id, frame)).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        log::info!("cluster: Link {link_id} read failed: {err}");
                        break;
                    }
                }
            }
            maybe_frame = outgoing.recv() => {
                let Some(frame) = maybe_frame else {
                    break;
                };
                if let Err(err) = write_frame(&mut writer, &frame).await {
                    log::info!("cluster: Link {link_id} write failed: {err}");
                    break;
                }
            }
        }
    }
    let _ret = events.send(LinkEvent::Down(link_id)).await;
}

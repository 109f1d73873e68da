// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Typed commands exchanged between broker apps.
//!
//! Every app owns one end of a bounded mpsc channel per peer app; these
//! enums are the only way state crosses an app boundary.

use codec::{PacketId, ProtocolLevel, QoS, ReasonCode, TopicName};
use tokio::sync::mpsc::Sender;

use crate::message::{Delivery, Message, SessionState, Subscription, WillMessage};
use crate::types::{NodeId, SessionGid, SessionId};

/// Normalized CONNECT data, protocol version differences already resolved.
#[derive(Debug, Clone)]
pub struct ConnectData {
    pub protocol_level: ProtocolLevel,
    pub client_id: String,
    pub clean_start: bool,
    pub keep_alive: u16,
    /// Seconds the session outlives a disconnect. `u32::MAX` means the
    /// session never expires, the 3.1.1 behaviour for clean-session 0.
    pub session_expiry: u32,
    /// The client's receive maximum, our send window.
    pub receive_maximum: u16,
    pub will: Option<WillMessage>,
    pub username: Option<String>,
    pub password: Option<Vec<u8>>,
}

/// Session resume payload returned on attach.
#[derive(Debug, Clone)]
pub struct SessionAttachAck {
    pub session_present: bool,
    pub reason: ReasonCode,
    /// In-flight and receiving state of the previous connection.
    pub resumed: Option<SessionState>,
    /// Messages queued while the session was disconnected, in order.
    pub queued: Vec<Delivery>,
}

#[derive(Debug)]
pub enum SessionToListenerCmd {
    Connect(SessionId, ConnectData),

    /// Ask for the ACL verdict on a publish before acknowledging it.
    CheckPublish {
        session_id: SessionId,
        topic: TopicName,
        packet_id: PacketId,
        qos: QoS,
    },

    /// An accepted publication ready for routing.
    Publish(SessionId, Message),

    Subscribe {
        session_id: SessionId,
        packet_id: PacketId,
        subscriptions: Vec<Subscription>,
    },

    Unsubscribe {
        session_id: SessionId,
        packet_id: PacketId,
        filters: Vec<String>,
    },

    /// Connection is gone. `clean` is true only for DISCONNECT with reason
    /// 0x00; the state is present when the session had connected.
    Disconnect {
        session_id: SessionId,
        clean: bool,
        state: Option<SessionState>,
    },
}

#[derive(Debug)]
pub enum ListenerToSessionCmd {
    /// Verdict on the CONNECT handshake.
    ConnectAck(SessionAttachAck),

    /// Verdict on a publish; the session acknowledges or disconnects.
    PublishAck {
        packet_id: PacketId,
        qos: QoS,
        accepted: bool,
    },

    SubscribeAck {
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
        /// Retained messages matching the new subscriptions.
        retained: Vec<Delivery>,
    },

    UnsubscribeAck {
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
    },

    /// A routed message for this session.
    Deliver(Delivery),

    /// Server side disconnect, e.g. 0x8e on take-over.
    Disconnect(ReasonCode),
}

#[derive(Debug)]
pub enum ListenerToDispatcherCmd {
    /// Bind an authenticated connection to its session record.
    SessionAttach(SessionGid, ConnectData),

    /// Accepted publication from a client.
    Publish(SessionGid, Message),

    /// Subscription entries, each with its ACL verdict.
    Subscribe {
        gid: SessionGid,
        packet_id: PacketId,
        entries: Vec<(Subscription, bool)>,
    },

    Unsubscribe {
        gid: SessionGid,
        packet_id: PacketId,
        filters: Vec<String>,
    },

    /// Connection is gone; persist or drop the session per its expiry.
    SessionDetach {
        gid: SessionGid,
        clean: bool,
        state: Option<SessionState>,
    },
}

#[derive(Debug)]
pub enum DispatcherToListenerCmd {
    SessionAttachAck(SessionId, SessionAttachAck),

    SubscribeAck {
        session_id: SessionId,
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
        retained: Vec<Delivery>,
    },

    UnsubscribeAck {
        session_id: SessionId,
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
    },

    Deliver(SessionId, Delivery),

    /// Close a session from the server side.
    Disconnect(SessionId, ReasonCode),
}

#[derive(Debug, Clone)]
pub enum ListenerToAuthCmd {
    /// gid, client id, username, password.
    RequestAuth(SessionGid, String, Option<String>, Option<Vec<u8>>),
}

#[derive(Debug, Clone)]
pub enum AuthToListenerCmd {
    /// gid, access granted.
    ResponseAuth(SessionGid, bool),
}

#[derive(Debug, Clone)]
pub enum ListenerToAclCmd {
    /// Is this client allowed to publish to the topic?
    CheckPublish {
        gid: SessionGid,
        client_id: String,
        topic: TopicName,
        packet_id: PacketId,
        qos: QoS,
    },

    /// Filter the subscription list through the ACL.
    CheckSubscribe {
        gid: SessionGid,
        client_id: String,
        packet_id: PacketId,
        subscriptions: Vec<Subscription>,
    },
}

#[derive(Debug, Clone)]
pub enum AclToListenerCmd {
    PublishResult {
        gid: SessionGid,
        packet_id: PacketId,
        qos: QoS,
        allowed: bool,
    },

    SubscribeResult {
        gid: SessionGid,
        packet_id: PacketId,
        entries: Vec<(Subscription, bool)>,
    },
}

/// Subscription delta broadcast on the cluster bus.
#[derive(Debug, Clone)]
pub enum DispatcherToClusterCmd {
    /// Accepted local publication, candidate for forwarding.
    Publish(Message),

    SubscriptionAdded {
        client_id: String,
        filter: String,
        qos: QoS,
    },

    SubscriptionRemoved {
        client_id: String,
        filter: String,
    },

    /// Full local subscription table, reply to a snapshot request.
    SubscriptionSnapshot(Vec<(String, String, QoS)>),
}

#[derive(Debug, Clone)]
pub enum ClusterToDispatcherCmd {
    /// Deduplicated publication received from a peer node.
    RemotePublish(NodeId, Message),

    /// A peer link came up; the dispatcher answers with a snapshot.
    SnapshotRequest,
}

/// The three connector contracts of the routing core.
#[derive(Debug)]
pub enum ConnectorToDispatcherCmd {
    /// Inject a message into the router.
    Publish(Message),

    /// Register a pseudo-session; deliveries flow through `sender` and
    /// bypass wire encoding and window accounting.
    SubscribeInternal {
        client_id: String,
        subscription: Subscription,
        sender: Sender<Delivery>,
    },

    UnsubscribeInternal {
        client_id: String,
        filter: String,
    },
}

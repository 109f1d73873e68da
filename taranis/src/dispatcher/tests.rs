// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Routing scenarios driven directly against the dispatcher actor.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc::{self, Receiver, Sender};

use codec::{ProtocolLevel, QoS, ReasonCode, TopicFilter, TopicName};

use super::{Dispatcher, DispatcherStores};
use crate::commands::{
    ClusterToDispatcherCmd, ConnectData, ConnectorToDispatcherCmd, DispatcherToListenerCmd,
    ListenerToDispatcherCmd, SessionAttachAck,
};
use crate::config::General;
use crate::message::{Message, SessionState, Subscription, WillMessage};
use crate::store::{
    MemoryQueueStore, MemoryRetainedStore, MemorySessionStore,
};
use crate::types::{unix_millis, SessionGid};

struct TestBed {
    dispatcher: Dispatcher,
    listener_rx: Receiver<DispatcherToListenerCmd>,
    _listener_tx: Sender<ListenerToDispatcherCmd>,
    _cluster_tx: Sender<ClusterToDispatcherCmd>,
    _connector_tx: Sender<ConnectorToDispatcherCmd>,
}

fn new_test_bed() -> TestBed {
    let (listener_tx, listener_rx_cmd) = mpsc::channel(64);
    let (dispatcher_to_listener_tx, listener_rx) = mpsc::channel(64);
    let (cluster_tx, cluster_rx) = mpsc::channel(64);
    let (connector_tx, connector_rx) = mpsc::channel(64);

    let stores = DispatcherStores {
        sessions: Box::new(MemorySessionStore::new()),
        queues: Box::new(MemoryQueueStore::new()),
        retained: Box::new(MemoryRetainedStore::new()),
        archive: None,
        archive_retention: 0,
    };
    let dispatcher = Dispatcher::new(
        "node-1".to_string(),
        General::default(),
        0,
        stores,
        vec![(1, dispatcher_to_listener_tx)],
        listener_rx_cmd,
        None,
        cluster_rx,
        connector_rx,
    );
    TestBed {
        dispatcher,
        listener_rx,
        _listener_tx: listener_tx,
        _cluster_tx: cluster_tx,
        _connector_tx: connector_tx,
    }
}

fn connect_data(client_id: &str, clean_start: bool, session_expiry: u32) -> ConnectData {
    ConnectData {
        protocol_level: ProtocolLevel::V5,
        client_id: client_id.to_string(),
        clean_start,
        keep_alive: 60,
        session_expiry,
        receive_maximum: 16,
        will: None,
        username: None,
        password: None,
    }
}

fn message(topic: &str, payload: &'static [u8], qos: QoS, publisher: &str) -> Message {
    Message::new(
        TopicName::parse(topic).unwrap(),
        qos,
        Bytes::from_static(payload),
    )
    .with_publisher(publisher)
}

fn subscription(filter: &str, qos: QoS) -> Subscription {
    Subscription::new(TopicFilter::parse(filter).unwrap(), qos)
}

async fn recv_cmd(rx: &mut Receiver<DispatcherToListenerCmd>) -> DispatcherToListenerCmd {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for listener cmd")
        .expect("listener channel closed")
}

async fn expect_attach_ack(rx: &mut Receiver<DispatcherToListenerCmd>) -> SessionAttachAck {
    match recv_cmd(rx).await {
        DispatcherToListenerCmd::SessionAttachAck(_, ack) => ack,
        other => panic!("expected SessionAttachAck, got {other:?}"),
    }
}

async fn attach(
    bed: &mut TestBed,
    gid: SessionGid,
    connect: ConnectData,
) -> SessionAttachAck {
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionAttach(gid, connect))
        .await;
    expect_attach_ack(&mut bed.listener_rx).await
}

async fn subscribe(bed: &mut TestBed, gid: SessionGid, subscriptions: Vec<Subscription>) {
    let entries = subscriptions.into_iter().map(|s| (s, true)).collect();
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Subscribe {
            gid,
            packet_id: 1,
            entries,
        })
        .await;
}

#[tokio::test]
async fn test_retained_delivery_on_subscribe() {
    let mut bed = new_test_bed();
    let publisher = SessionGid::new(1, 1);
    let ack = attach(&mut bed, publisher, connect_data("a", true, 0)).await;
    assert!(!ack.session_present);

    // Client A publishes a retained reading.
    let msg = message("home/temp", b"21", QoS::AtMostOnce, "a").with_retain(true);
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(publisher, msg))
        .await;

    // Client B subscribes home/# afterwards and receives exactly the one
    // retained message with the retain flag set.
    let subscriber = SessionGid::new(1, 2);
    attach(&mut bed, subscriber, connect_data("b", true, 0)).await;
    subscribe(&mut bed, subscriber, vec![subscription("home/#", QoS::AtMostOnce)]).await;

    match recv_cmd(&mut bed.listener_rx).await {
        DispatcherToListenerCmd::SubscribeAck {
            reason_codes,
            retained,
            ..
        } => {
            assert_eq!(reason_codes, vec![ReasonCode::Success]);
            assert_eq!(retained.len(), 1);
            assert!(retained[0].retain);
            assert_eq!(retained[0].message.payload, Bytes::from_static(b"21"));
        }
        other => panic!("expected SubscribeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retained_empty_payload_deletes() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("a", true, 0)).await;

    let msg = message("home/temp", b"21", QoS::AtMostOnce, "a").with_retain(true);
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(gid, msg))
        .await;
    let delete = message("home/temp", b"", QoS::AtMostOnce, "a").with_retain(true);
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(gid, delete))
        .await;

    let subscriber = SessionGid::new(1, 2);
    attach(&mut bed, subscriber, connect_data("b", true, 0)).await;
    subscribe(&mut bed, subscriber, vec![subscription("home/#", QoS::AtMostOnce)]).await;
    match recv_cmd(&mut bed.listener_rx).await {
        DispatcherToListenerCmd::SubscribeAck { retained, .. } => {
            assert!(retained.is_empty());
        }
        other => panic!("expected SubscribeAck, got {other:?}"),
    }
}

#[tokio::test]
async fn test_wildcard_fanout_deduplicates_per_session() {
    let mut bed = new_test_bed();
    let subscriber = SessionGid::new(1, 1);
    attach(&mut bed, subscriber, connect_data("s", true, 0)).await;

    let mut first = subscription("a/+", QoS::AtLeastOnce);
    first.subscription_id = Some(7);
    let mut second = subscription("a/#", QoS::AtMostOnce);
    second.subscription_id = Some(9);
    subscribe(&mut bed, subscriber, vec![first, second]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;

    let publisher = SessionGid::new(1, 2);
    attach(&mut bed, publisher, connect_data("p", true, 0)).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(
            publisher,
            message("a/b", b"x", QoS::ExactOnce, "p"),
        ))
        .await;

    // One delivery only, with the maximum granted QoS and the union of
    // subscription identifiers.
    match recv_cmd(&mut bed.listener_rx).await {
        DispatcherToListenerCmd::Deliver(session_id, delivery) => {
            assert_eq!(session_id, 1);
            assert_eq!(delivery.qos, QoS::AtLeastOnce);
            let mut ids = delivery.subscription_ids.clone();
            ids.sort_unstable();
            assert_eq!(ids, vec![7, 9]);
        }
        other => panic!("expected Deliver, got {other:?}"),
    }
    assert!(
        tokio::time::timeout(Duration::from_millis(100), bed.listener_rx.recv())
            .await
            .is_err(),
        "message must be delivered once"
    );
}

#[tokio::test]
async fn test_offline_queueing_and_resume_order() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("y", true, 3600)).await;
    subscribe(&mut bed, gid, vec![subscription("jobs/#", QoS::AtLeastOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;

    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid,
            clean: true,
            state: Some(SessionState::default()),
        })
        .await;

    let publisher = SessionGid::new(1, 2);
    attach(&mut bed, publisher, connect_data("p", true, 0)).await;
    for payload in [b"1" as &[u8], b"2", b"3"] {
        let msg = Message::new(
            TopicName::parse("jobs/build").unwrap(),
            QoS::AtLeastOnce,
            Bytes::copy_from_slice(payload),
        )
        .with_publisher("p");
        bed.dispatcher
            .handle_listener_cmd(ListenerToDispatcherCmd::Publish(publisher, msg))
            .await;
    }

    // Reconnect without clean start: the queue comes back in order.
    let new_gid = SessionGid::new(1, 3);
    let ack = attach(&mut bed, new_gid, connect_data("y", false, 3600)).await;
    assert!(ack.session_present);
    let payloads: Vec<&[u8]> = ack.queued.iter().map(|d| d.message.payload.as_ref()).collect();
    assert_eq!(payloads, vec![b"1" as &[u8], b"2", b"3"]);
}

#[tokio::test]
async fn test_qos0_is_not_queued_offline() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("y", true, 3600)).await;
    subscribe(&mut bed, gid, vec![subscription("news/#", QoS::AtMostOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid,
            clean: true,
            state: Some(SessionState::default()),
        })
        .await;

    let publisher = SessionGid::new(1, 2);
    attach(&mut bed, publisher, connect_data("p", true, 0)).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(
            publisher,
            message("news/today", b"x", QoS::AtMostOnce, "p"),
        ))
        .await;

    let ack = attach(&mut bed, SessionGid::new(1, 3), connect_data("y", false, 3600)).await;
    assert!(ack.session_present);
    assert!(ack.queued.is_empty());
}

#[tokio::test]
async fn test_expired_message_is_not_delivered_after_reconnect() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("y", true, 3600)).await;
    subscribe(&mut bed, gid, vec![subscription("m/#", QoS::AtLeastOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid,
            clean: true,
            state: Some(SessionState::default()),
        })
        .await;

    let publisher = SessionGid::new(1, 2);
    attach(&mut bed, publisher, connect_data("p", true, 0)).await;
    let mut msg = message("m/1", b"soon gone", QoS::AtLeastOnce, "p");
    msg.expires_at = Some(unix_millis() + 50);
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(publisher, msg))
        .await;

    tokio::time::sleep(Duration::from_millis(120)).await;
    let ack = attach(&mut bed, SessionGid::new(1, 3), connect_data("y", false, 3600)).await;
    assert!(ack.session_present);
    assert!(ack.queued.is_empty(), "expired message must be discarded");
}

#[tokio::test]
async fn test_clean_start_discards_session() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("z", true, 3600)).await;
    subscribe(&mut bed, gid, vec![subscription("q/#", QoS::AtLeastOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid,
            clean: true,
            state: Some(SessionState::default()),
        })
        .await;

    let publisher = SessionGid::new(1, 2);
    attach(&mut bed, publisher, connect_data("p", true, 0)).await;
    for payload in [b"1" as &[u8], b"2"] {
        let msg = Message::new(
            TopicName::parse("q/t").unwrap(),
            QoS::AtLeastOnce,
            Bytes::copy_from_slice(payload),
        )
        .with_publisher("p");
        bed.dispatcher
            .handle_listener_cmd(ListenerToDispatcherCmd::Publish(publisher, msg))
            .await;
    }

    // Clean start: prior subscriptions and the queue are gone.
    let ack = attach(&mut bed, SessionGid::new(1, 3), connect_data("z", true, 3600)).await;
    assert!(!ack.session_present);
    assert!(ack.queued.is_empty());

    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(
            publisher,
            message("q/t", b"3", QoS::AtLeastOnce, "p"),
        ))
        .await;
    assert!(
        tokio::time::timeout(Duration::from_millis(100), bed.listener_rx.recv())
            .await
            .is_err(),
        "discarded subscription must not route"
    );
}

#[tokio::test]
async fn test_take_over_disconnects_old_session_and_resumes_state() {
    let mut bed = new_test_bed();
    let old_gid = SessionGid::new(1, 1);
    attach(&mut bed, old_gid, connect_data("x", true, 3600)).await;

    // Second CONNECT for the same client id.
    let new_gid = SessionGid::new(1, 2);
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionAttach(
            new_gid,
            connect_data("x", false, 3600),
        ))
        .await;

    // The old session is told to go away with 0x8e first.
    match recv_cmd(&mut bed.listener_rx).await {
        DispatcherToListenerCmd::Disconnect(session_id, reason) => {
            assert_eq!(session_id, 1);
            assert_eq!(reason, ReasonCode::SessionTakenOver);
        }
        other => panic!("expected Disconnect, got {other:?}"),
    }

    // Once the old session detaches with its in-flight state, the new
    // connection resumes it.
    let mut state = SessionState::default();
    state.receiving.push((
        17,
        message("inflight/q2", b"x", QoS::ExactOnce, "someone"),
    ));
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid: old_gid,
            clean: false,
            state: Some(state),
        })
        .await;

    let ack = expect_attach_ack(&mut bed.listener_rx).await;
    assert!(ack.session_present);
    let resumed = ack.resumed.expect("state must resume");
    assert_eq!(resumed.receiving.len(), 1);
    assert_eq!(resumed.receiving[0].0, 17);
}

#[tokio::test]
async fn test_will_published_after_delay_unless_reconnected() {
    let mut bed = new_test_bed();

    // A watcher subscribed to the will topic.
    let watcher = SessionGid::new(1, 1);
    attach(&mut bed, watcher, connect_data("watcher", true, 0)).await;
    subscribe(&mut bed, watcher, vec![subscription("stat/w", QoS::AtMostOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;

    let mut connect = connect_data("w", true, 60);
    connect.will = Some(WillMessage {
        topic: TopicName::parse("stat/w").unwrap(),
        payload: Bytes::from_static(b"off"),
        qos: QoS::AtMostOnce,
        retain: false,
        delay: 5,
        properties: codec::Properties::default(),
    });
    let w_gid = SessionGid::new(1, 2);
    attach(&mut bed, w_gid, connect).await;

    // Abnormal drop arms the delayed will.
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid: w_gid,
            clean: false,
            state: Some(SessionState::default()),
        })
        .await;

    // Before the delay: nothing.
    bed.dispatcher.process_timers(unix_millis() + 3_000).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(50), bed.listener_rx.recv())
            .await
            .is_err()
    );

    // After the delay the will reaches the watcher.
    bed.dispatcher.process_timers(unix_millis() + 6_000).await;
    match recv_cmd(&mut bed.listener_rx).await {
        DispatcherToListenerCmd::Deliver(session_id, delivery) => {
            assert_eq!(session_id, 1);
            assert_eq!(delivery.message.topic.as_str(), "stat/w");
            assert_eq!(delivery.message.payload, Bytes::from_static(b"off"));
        }
        other => panic!("expected Deliver, got {other:?}"),
    }
}

#[tokio::test]
async fn test_will_cancelled_by_reconnect() {
    let mut bed = new_test_bed();
    let watcher = SessionGid::new(1, 1);
    attach(&mut bed, watcher, connect_data("watcher", true, 0)).await;
    subscribe(&mut bed, watcher, vec![subscription("stat/w", QoS::AtMostOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;

    let mut connect = connect_data("w", true, 60);
    connect.will = Some(WillMessage {
        topic: TopicName::parse("stat/w").unwrap(),
        payload: Bytes::from_static(b"off"),
        qos: QoS::AtMostOnce,
        retain: false,
        delay: 5,
        properties: codec::Properties::default(),
    });
    attach(&mut bed, SessionGid::new(1, 2), connect).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid: SessionGid::new(1, 2),
            clean: false,
            state: Some(SessionState::default()),
        })
        .await;

    // W comes back before the delay elapses; no will may fire, not even
    // long after.
    let mut reconnect = connect_data("w", false, 60);
    reconnect.will = Some(WillMessage {
        topic: TopicName::parse("stat/w").unwrap(),
        payload: Bytes::from_static(b"off"),
        qos: QoS::AtMostOnce,
        retain: false,
        delay: 5,
        properties: codec::Properties::default(),
    });
    attach(&mut bed, SessionGid::new(1, 3), reconnect).await;

    bed.dispatcher.process_timers(unix_millis() + 60_000).await;
    assert!(
        tokio::time::timeout(Duration::from_millis(50), bed.listener_rx.recv())
            .await
            .is_err(),
        "will must not fire after reconnect"
    );
}

#[tokio::test]
async fn test_session_expiry_drops_subscriptions() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("e", true, 10)).await;
    subscribe(&mut bed, gid, vec![subscription("x/#", QoS::AtLeastOnce)]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;
    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::SessionDetach {
            gid,
            clean: true,
            state: Some(SessionState::default()),
        })
        .await;

    bed.dispatcher.process_timers(unix_millis() + 11_000).await;

    // Session is gone; a fresh connect finds nothing.
    let ack = attach(&mut bed, SessionGid::new(1, 2), connect_data("e", false, 10)).await;
    assert!(!ack.session_present);
}

#[tokio::test]
async fn test_internal_subscriber_receives_matching_messages() {
    let mut bed = new_test_bed();
    let (delivery_tx, mut delivery_rx) = mpsc::channel(8);
    bed.dispatcher
        .handle_connector_cmd(ConnectorToDispatcherCmd::SubscribeInternal {
            client_id: "$connector/audit".to_string(),
            subscription: subscription("audit/#", QoS::AtMostOnce),
            sender: delivery_tx,
        })
        .await;

    bed.dispatcher
        .handle_connector_cmd(ConnectorToDispatcherCmd::Publish(message(
            "audit/login",
            b"ok",
            QoS::AtMostOnce,
            "gateway",
        )))
        .await;

    let delivery = tokio::time::timeout(Duration::from_secs(1), delivery_rx.recv())
        .await
        .expect("timed out")
        .expect("channel closed");
    assert_eq!(delivery.message.topic.as_str(), "audit/login");
}

#[tokio::test]
async fn test_no_local_suppresses_echo() {
    let mut bed = new_test_bed();
    let gid = SessionGid::new(1, 1);
    attach(&mut bed, gid, connect_data("chat", true, 0)).await;
    let mut sub = subscription("room/1", QoS::AtMostOnce);
    sub.no_local = true;
    subscribe(&mut bed, gid, vec![sub]).await;
    let _suback = recv_cmd(&mut bed.listener_rx).await;

    bed.dispatcher
        .handle_listener_cmd(ListenerToDispatcherCmd::Publish(
            gid,
            message("room/1", b"hi", QoS::AtMostOnce, "chat"),
        ))
        .await;
    assert!(
        tokio::time::timeout(Duration::from_millis(100), bed.listener_rx.recv())
            .await
            .is_err(),
        "no-local subscription must not receive its own publish"
    );
}

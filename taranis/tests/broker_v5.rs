// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end broker tests over TCP, MQTT 5.0.

use std::time::Duration;

use bytes::Bytes;
use codec::{v5, ByteArray, DecodePacket, PacketType, QoS, ReasonCode};

mod common;
use common::{start_broker, TestClient};

#[tokio::test]
async fn test_connack_carries_receive_maximum() {
    let address = start_broker().await;
    let mut client = TestClient::open(address).await;
    client.send(&v5::ConnectPacket::new("v5-client")).await;

    let bytes = client.read_packet().await;
    let mut ba = ByteArray::new(&bytes);
    let ack = v5::ConnectAckPacket::decode(&mut ba).unwrap();
    assert_eq!(ack.reason_code(), ReasonCode::Success);
    assert!(ack.properties().receive_maximum.is_some());
    assert_eq!(ack.properties().topic_alias_maximum, Some(0));
}

#[tokio::test]
async fn test_wildcard_fanout_is_deduplicated() {
    let address = start_broker().await;

    // One client, two overlapping subscriptions with different ids.
    let (mut subscriber, _) = TestClient::connect_v5(address, "fan-s", true, 0).await;
    subscriber
        .subscribe_v5(1, "a/+", QoS::AtLeastOnce, Some(7))
        .await;
    subscriber
        .subscribe_v5(2, "a/#", QoS::AtMostOnce, Some(9))
        .await;

    let (mut publisher, _) = TestClient::connect_v5(address, "fan-p", true, 0).await;
    publisher.publish_qos2_v5(17, "a/b", b"x").await;

    // Exactly one PUBLISH with the maximum granted QoS and both ids.
    let received = subscriber.expect_publish_v5().await;
    assert_eq!(received.qos(), QoS::AtLeastOnce);
    assert_eq!(received.payload(), &Bytes::from_static(b"x"));
    let mut ids = received.properties().subscription_identifiers.clone();
    ids.sort_unstable();
    assert_eq!(ids, vec![7, 9]);

    subscriber
        .send(&v5::PublishAckPacket::new(
            received.packet_id(),
            ReasonCode::Success,
        ))
        .await;
    assert!(subscriber.is_silent(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_session_expiry_keeps_queued_messages() {
    let address = start_broker().await;

    let (mut subscriber, _) = TestClient::connect_v5(address, "roamer", true, 3600).await;
    subscriber
        .subscribe_v5(1, "jobs/#", QoS::AtLeastOnce, None)
        .await;
    subscriber.send(&v5::DisconnectPacket::default()).await;
    drop(subscriber);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut publisher, _) = TestClient::connect_v5(address, "sender", true, 0).await;
    let mut publish =
        v5::PublishPacket::new("jobs/build", QoS::AtLeastOnce, Bytes::from_static(b"go")).unwrap();
    publish.set_packet_id(4);
    publisher.send(&publish).await;
    let bytes = publisher.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishAck);

    // Resume without clean start: the queued message arrives.
    let (mut subscriber, session_present) =
        TestClient::connect_v5(address, "roamer", false, 3600).await;
    assert!(session_present);
    let received = subscriber.expect_publish_v5().await;
    assert_eq!(received.payload(), &Bytes::from_static(b"go"));
    subscriber
        .send(&v5::PublishAckPacket::new(
            received.packet_id(),
            ReasonCode::Success,
        ))
        .await;
}

#[tokio::test]
async fn test_qos2_handshake_resumes_after_reconnect() {
    let address = start_broker().await;

    // X subscribes at QoS 2 with a persistent session.
    let (mut x, _) = TestClient::connect_v5(address, "x", true, 3600).await;
    x.subscribe_v5(1, "q2/t", QoS::ExactOnce, None).await;

    // P publishes exactly-once; the broker routes it on PUBREL.
    let (mut p, _) = TestClient::connect_v5(address, "p", true, 0).await;
    p.publish_qos2_v5(9, "q2/t", b"payload").await;

    // X answers the PUBLISH with PUBREC, then the connection drops before
    // PUBCOMP.
    let received = x.expect_publish_v5().await;
    assert_eq!(received.qos(), QoS::ExactOnce);
    let packet_id = received.packet_id();
    x.send(&v5::PublishReceivedPacket::new(packet_id, ReasonCode::Success))
        .await;
    // Broker moves to awaiting-pubcomp and sends PUBREL.
    let bytes = x.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishRelease);
    drop(x);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // On resume the broker retransmits PUBREL for the same packet id.
    let (mut x, session_present) = TestClient::connect_v5(address, "x", false, 3600).await;
    assert!(session_present);
    let bytes = x.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishRelease);
    let mut ba = ByteArray::new(&bytes);
    let release = v5::PublishReleasePacket::decode(&mut ba).unwrap();
    assert_eq!(release.packet_id(), packet_id);

    // PUBCOMP frees the packet id; nothing further arrives.
    x.send(&v5::PublishCompletePacket::new(
        packet_id,
        ReasonCode::Success,
    ))
    .await;
    assert!(x.is_silent(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_take_over_closes_old_connection() {
    let address = start_broker().await;
    let (mut old, _) = TestClient::connect_v5(address, "twin", true, 3600).await;

    let (mut new, session_present) =
        TestClient::connect_v5(address, "twin", false, 3600).await;
    assert!(session_present);

    // The first connection gets DISCONNECT with reason 0x8e.
    let bytes = old.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::Disconnect);
    let mut ba = ByteArray::new(&bytes);
    let disconnect = v5::DisconnectPacket::decode(&mut ba).unwrap();
    assert_eq!(disconnect.reason_code(), ReasonCode::SessionTakenOver);

    // The new connection is alive and well.
    new.send(&v5::PingRequestPacket::new()).await;
    let bytes = new.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PingResponse);
}

#[tokio::test]
async fn test_message_expiry_recomputed_on_delivery() {
    let address = start_broker().await;

    let (mut subscriber, _) = TestClient::connect_v5(address, "exp-s", true, 0).await;
    subscriber
        .subscribe_v5(1, "e/t", QoS::AtMostOnce, None)
        .await;

    let (mut publisher, _) = TestClient::connect_v5(address, "exp-p", true, 0).await;
    let mut publish =
        v5::PublishPacket::new("e/t", QoS::AtMostOnce, Bytes::from_static(b"ttl")).unwrap();
    publish.properties_mut().message_expiry_interval = Some(30);
    publisher.send(&publish).await;

    let received = subscriber.expect_publish_v5().await;
    let remaining = received
        .properties()
        .message_expiry_interval
        .expect("expiry must be forwarded");
    // The forwarded interval reflects time already spent on the broker.
    assert!(remaining >= 1 && remaining <= 30);
}

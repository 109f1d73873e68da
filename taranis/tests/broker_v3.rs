// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! End-to-end broker tests over TCP, MQTT 3.1.1.

use std::time::Duration;

use bytes::Bytes;
use codec::{v3, ByteArray, DecodePacket, PacketType, QoS};

mod common;
use common::{start_broker, TestClient};

#[tokio::test]
async fn test_connect_and_ping() {
    let address = start_broker().await;
    let (mut client, session_present) = TestClient::connect_v3(address, "pinger", true).await;
    assert!(!session_present);

    client.send(&v3::PingRequestPacket::new()).await;
    let bytes = client.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PingResponse);
}

#[tokio::test]
async fn test_retained_delivery_on_subscribe() {
    let address = start_broker().await;

    // Client A leaves a retained reading behind.
    let (mut publisher, _) = TestClient::connect_v3(address, "client-a", true).await;
    let mut publish =
        v3::PublishPacket::new("home/temp", QoS::AtMostOnce, Bytes::from_static(b"21")).unwrap();
    publish.set_retain(true);
    publisher.send(&publish).await;

    // Give the broker a moment to route into the retained store.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Client B connects fresh and subscribes with a wildcard.
    let (mut subscriber, _) = TestClient::connect_v3(address, "client-b", true).await;
    subscriber
        .subscribe_v3(9, "home/#", QoS::AtMostOnce)
        .await;

    let received = subscriber.expect_publish_v3().await;
    assert_eq!(received.topic(), "home/temp");
    assert_eq!(received.payload(), &Bytes::from_static(b"21"));
    assert!(received.retain());
    assert!(subscriber.is_silent(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_qos1_publish_round_trip() {
    let address = start_broker().await;
    let (mut subscriber, _) = TestClient::connect_v3(address, "sub-1", true).await;
    subscriber.subscribe_v3(3, "a/b", QoS::AtLeastOnce).await;

    let (mut publisher, _) = TestClient::connect_v3(address, "pub-1", true).await;
    let mut publish =
        v3::PublishPacket::new("a/b", QoS::AtLeastOnce, Bytes::from_static(b"x")).unwrap();
    publish.set_packet_id(5);
    publisher.send(&publish).await;

    // Publisher gets its PUBACK back.
    let bytes = publisher.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishAck);
    let mut ba = ByteArray::new(&bytes);
    assert_eq!(v3::PublishAckPacket::decode(&mut ba).unwrap().packet_id(), 5);

    // Subscriber receives the message at QoS 1 and acknowledges it.
    let received = subscriber.expect_publish_v3().await;
    assert_eq!(received.qos(), QoS::AtLeastOnce);
    assert_eq!(received.payload(), &Bytes::from_static(b"x"));
    assert!(received.packet_id() > 0);
    subscriber
        .send(&v3::PublishAckPacket::new(received.packet_id()))
        .await;
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let address = start_broker().await;
    let (mut subscriber, _) = TestClient::connect_v3(address, "sub-2", true).await;
    subscriber.subscribe_v3(3, "news/#", QoS::AtMostOnce).await;

    subscriber
        .send(&v3::UnsubscribePacket::new(4, "news/#").unwrap())
        .await;
    let bytes = subscriber.read_packet().await;
    assert_eq!(TestClient::packet_type(&bytes), PacketType::UnsubscribeAck);

    let (mut publisher, _) = TestClient::connect_v3(address, "pub-2", true).await;
    publisher
        .send(
            &v3::PublishPacket::new("news/today", QoS::AtMostOnce, Bytes::from_static(b"n"))
                .unwrap(),
        )
        .await;
    assert!(subscriber.is_silent(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_clean_session_discards_queued_messages() {
    let address = start_broker().await;

    // Persistent session subscribes, then goes away.
    let (mut subscriber, _) = TestClient::connect_v3(address, "sleepy", false).await;
    subscriber.subscribe_v3(3, "q/t", QoS::AtLeastOnce).await;
    subscriber.send(&v3::DisconnectPacket::new()).await;
    drop(subscriber);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Two guaranteed messages are queued while it is away.
    let (mut publisher, _) = TestClient::connect_v3(address, "pub-3", true).await;
    for (packet_id, payload) in [(10, b"1"), (11, b"2")] {
        let mut publish =
            v3::PublishPacket::new("q/t", QoS::AtLeastOnce, Bytes::from_static(payload)).unwrap();
        publish.set_packet_id(packet_id);
        publisher.send(&publish).await;
        let bytes = publisher.read_packet().await;
        assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishAck);
    }

    // Clean session reconnect drops subscriptions and the queue.
    let (mut subscriber, session_present) =
        TestClient::connect_v3(address, "sleepy", true).await;
    assert!(!session_present);
    assert!(subscriber.is_silent(Duration::from_millis(300)).await);
}

#[tokio::test]
async fn test_persistent_session_receives_queued_messages_in_order() {
    let address = start_broker().await;

    let (mut subscriber, _) = TestClient::connect_v3(address, "keeper", false).await;
    subscriber.subscribe_v3(3, "q/t", QoS::AtLeastOnce).await;
    subscriber.send(&v3::DisconnectPacket::new()).await;
    drop(subscriber);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (mut publisher, _) = TestClient::connect_v3(address, "pub-4", true).await;
    for (packet_id, payload) in [(10, b"1"), (11, b"2")] {
        let mut publish =
            v3::PublishPacket::new("q/t", QoS::AtLeastOnce, Bytes::from_static(payload)).unwrap();
        publish.set_packet_id(packet_id);
        publisher.send(&publish).await;
        let bytes = publisher.read_packet().await;
        assert_eq!(TestClient::packet_type(&bytes), PacketType::PublishAck);
    }

    let (mut subscriber, session_present) =
        TestClient::connect_v3(address, "keeper", false).await;
    assert!(session_present);
    let first = subscriber.expect_publish_v3().await;
    assert_eq!(first.payload(), &Bytes::from_static(b"1"));
    subscriber
        .send(&v3::PublishAckPacket::new(first.packet_id()))
        .await;
    let second = subscriber.expect_publish_v3().await;
    assert_eq!(second.payload(), &Bytes::from_static(b"2"));
    subscriber
        .send(&v3::PublishAckPacket::new(second.packet_id()))
        .await;
}

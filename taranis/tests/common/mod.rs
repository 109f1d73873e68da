// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Test harness: an in-process broker plus a tiny raw-packet client.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use codec::utils::peek_packet_length;
use codec::{v3, v5, ByteArray, DecodePacket, EncodePacket, FixedHeader, PacketType, QoS};

use taranis::config::Config;
use taranis::server::ServerContext;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

const TEST_CONFIG: &str = r#"
[general]
sys_interval = 0

[[listeners]]
protocol = "mqtt"
address = "127.0.0.1:0"

[log]
console_log = false
"#;

/// Start a full broker on an ephemeral port and return its address.
pub async fn start_broker() -> SocketAddr {
    let config: Config = toml::from_str(TEST_CONFIG).expect("invalid test config");
    let mut server = ServerContext::new(config);
    server.init_modules().await.expect("failed to start broker");
    server.bound_addresses()[0]
}

/// A raw MQTT client speaking through the codec, no session logic.
pub struct TestClient {
    stream: TcpStream,
    buf: Vec<u8>,
}

impl TestClient {
    pub async fn open(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).await.expect("connect failed");
        Self {
            stream,
            buf: Vec::with_capacity(4096),
        }
    }

    /// 3.1.1 connect returning the session-present flag.
    pub async fn connect_v3(address: SocketAddr, client_id: &str, clean_session: bool) -> (Self, bool) {
        let mut client = Self::open(address).await;
        let mut connect = v3::ConnectPacket::new(client_id);
        connect.set_clean_session(clean_session);
        client.send(&connect).await;

        let bytes = client.read_packet().await;
        let mut ba = ByteArray::new(&bytes);
        let ack = v3::ConnectAckPacket::decode(&mut ba).expect("bad CONNACK");
        assert_eq!(ack.return_code(), v3::ConnectReturnCode::Accepted);
        let session_present = ack.session_present();
        (client, session_present)
    }

    /// MQTT 5 connect returning the session-present flag.
    pub async fn connect_v5(
        address: SocketAddr,
        client_id: &str,
        clean_start: bool,
        session_expiry: u32,
    ) -> (Self, bool) {
        let mut client = Self::open(address).await;
        let mut connect = v5::ConnectPacket::new(client_id);
        connect.set_clean_start(clean_start);
        if session_expiry > 0 {
            connect.properties_mut().session_expiry_interval = Some(session_expiry);
        }
        client.send(&connect).await;

        let bytes = client.read_packet().await;
        let mut ba = ByteArray::new(&bytes);
        let ack = v5::ConnectAckPacket::decode(&mut ba).expect("bad CONNACK");
        assert!(!ack.reason_code().is_error(), "connect refused: {ack:?}");
        let session_present = ack.session_present();
        (client, session_present)
    }

    pub async fn send<P: EncodePacket>(&mut self, packet: &P) {
        let mut buf = Vec::new();
        packet.encode(&mut buf).expect("encode failed");
        self.stream.write_all(&buf).await.expect("write failed");
    }

    /// Read one complete packet, waiting up to the test timeout.
    pub async fn read_packet(&mut self) -> Vec<u8> {
        loop {
            if let Some(packet_len) = peek_packet_length(&self.buf).expect("bad header") {
                if self.buf.len() >= packet_len {
                    return self.buf.drain(..packet_len).collect();
                }
            }
            let n = tokio::time::timeout(READ_TIMEOUT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a packet")
                .expect("read failed");
            assert!(n > 0, "connection closed by broker");
        }
    }

    /// True if no packet arrives within `wait`.
    pub async fn is_silent(&mut self, wait: Duration) -> bool {
        if peek_packet_length(&self.buf)
            .expect("bad header")
            .is_some_and(|len| self.buf.len() >= len)
        {
            return false;
        }
        matches!(
            tokio::time::timeout(wait, self.stream.read_buf(&mut self.buf)).await,
            Err(_)
        )
    }

    pub fn packet_type(bytes: &[u8]) -> PacketType {
        let mut ba = ByteArray::new(bytes);
        FixedHeader::decode(&mut ba)
            .expect("bad fixed header")
            .packet_type()
    }

    /// Read packets until a PUBLISH arrives, 3.1.1 form.
    pub async fn expect_publish_v3(&mut self) -> v3::PublishPacket {
        loop {
            let bytes = self.read_packet().await;
            if matches!(Self::packet_type(&bytes), PacketType::Publish { .. }) {
                let mut ba = ByteArray::new(&bytes);
                return v3::PublishPacket::decode(&mut ba).expect("bad PUBLISH");
            }
        }
    }

    /// Read packets until a PUBLISH arrives, MQTT 5 form.
    pub async fn expect_publish_v5(&mut self) -> v5::PublishPacket {
        loop {
            let bytes = self.read_packet().await;
            if matches!(Self::packet_type(&bytes), PacketType::Publish { .. }) {
                let mut ba = ByteArray::new(&bytes);
                return v5::PublishPacket::decode(&mut ba).expect("bad PUBLISH");
            }
        }
    }

    /// Subscribe (3.1.1) and wait for the SUBACK.
    pub async fn subscribe_v3(&mut self, packet_id: u16, filter: &str, qos: QoS) {
        let packet = v3::SubscribePacket::new(packet_id, filter, qos).expect("bad filter");
        self.send(&packet).await;
        let bytes = self.read_packet().await;
        assert_eq!(Self::packet_type(&bytes), PacketType::SubscribeAck);
        let mut ba = ByteArray::new(&bytes);
        let ack = v3::SubscribeAckPacket::decode(&mut ba).expect("bad SUBACK");
        assert_eq!(ack.packet_id(), packet_id);
        assert!(matches!(ack.acks()[0], v3::SubscribeAck::QoS(_)));
    }

    /// Subscribe (MQTT 5) with options and wait for the SUBACK.
    pub async fn subscribe_v5(
        &mut self,
        packet_id: u16,
        filter: &str,
        qos: QoS,
        subscription_id: Option<u32>,
    ) {
        let mut packet = v5::SubscribePacket::new(packet_id, filter, qos).expect("bad filter");
        if let Some(id) = subscription_id {
            packet.properties_mut().subscription_identifiers = vec![id];
        }
        self.send(&packet).await;
        let bytes = self.read_packet().await;
        assert_eq!(Self::packet_type(&bytes), PacketType::SubscribeAck);
        let mut ba = ByteArray::new(&bytes);
        let ack = v5::SubscribeAckPacket::decode(&mut ba).expect("bad SUBACK");
        assert_eq!(ack.packet_id(), packet_id);
        assert!(!ack.reason_codes()[0].is_error());
    }

    /// Run a full client-side QoS 2 publish handshake, MQTT 5 form.
    pub async fn publish_qos2_v5(&mut self, packet_id: u16, topic: &str, payload: &[u8]) {
        let mut publish = v5::PublishPacket::new(
            topic,
            QoS::ExactOnce,
            bytes::Bytes::copy_from_slice(payload),
        )
        .expect("bad topic");
        publish.set_packet_id(packet_id);
        self.send(&publish).await;

        let bytes = self.read_packet().await;
        assert_eq!(Self::packet_type(&bytes), PacketType::PublishReceived);
        self.send(&v5::PublishReleasePacket::new(
            packet_id,
            codec::ReasonCode::Success,
        ))
        .await;
        let bytes = self.read_packet().await;
        assert_eq!(Self::packet_type(&bytes), PacketType::PublishComplete);
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Upstream/downstream MQTT bridge.
//!
//! A bridge is a connector wearing a client hat: it dials a remote broker
//! with the 3.1.1 client handshake, pulls configured remote topics into
//! the local router and pushes locally routed topics out. Its local side
//! is a pseudo-session with no-local set, so pushed traffic never echoes
//! back to the remote broker.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, Receiver};

use codec::v5::RetainHandling;
use codec::{
    utils::peek_packet_length, v3, ByteArray, DecodePacket, EncodePacket, PacketId, PacketType,
    QoS, TopicName,
};

use crate::config::{Bridge, BridgeDirection};
use crate::connectors::{ConnectorHandle, CONNECTOR_CHANNEL_CAPACITY};
use crate::error::{Error, ErrorKind};
use crate::message::{Delivery, Message, Subscription};

pub struct BridgeApp {
    config: Bridge,
    handle: ConnectorHandle,
    client_id: String,
}

impl BridgeApp {
    #[must_use]
    pub fn new(config: Bridge, handle: ConnectorHandle) -> Self {
        let client_id = format!("$bridge/{}", config.name);
        Self {
            config,
            handle,
            client_id,
        }
    }

    pub async fn run_loop(self) {
        // The local pseudo-session outlives remote reconnects; deliveries
        // pile up in its channel while the remote side is away.
        let (sender, mut local_receiver) = mpsc::channel(CONNECTOR_CHANNEL_CAPACITY);
        for topic in &self.config.topics {
            if topic.direction != BridgeDirection::Out {
                continue;
            }
            let Ok(filter) = codec::TopicFilter::parse(&topic.filter) else {
                continue;
            };
            let subscription = Subscription {
                filter,
                qos: topic.qos,
                no_local: true,
                retain_as_published: true,
                retain_handling: RetainHandling::DoNotSend,
                subscription_id: None,
            };
            if let Err(err) = self
                .handle
                .subscribe_internal_subscription(&self.client_id, subscription, sender.clone())
                .await
            {
                log::error!("bridge: Failed to register {}: {err:?}", self.client_id);
                return;
            }
        }

        loop {
            if let Err(err) = self.serve(&mut local_receiver).await {
                log::warn!("bridge: Link {} failed: {err}", self.config.name);
            }
            tokio::time::sleep(Duration::from_secs(u64::from(
                self.config.reconnect_interval.max(1),
            )))
            .await;
        }
    }

    /// One remote connection from CONNECT to failure.
    async fn serve(&self, local_receiver: &mut Receiver<Delivery>) -> Result<(), Error> {
        let mut stream = TcpStream::connect(&self.config.address).await?;
        log::info!(
            "bridge: {} connected to {}",
            self.config.name,
            self.config.address
        );

        let mut connect = v3::ConnectPacket::new(&self.client_id.replace('/', "-"));
        connect
            .set_keep_alive(self.config.keep_alive)
            .set_clean_session(true);
        write_packet(&mut stream, &connect).await?;

        let mut buf: Vec<u8> = Vec::with_capacity(4096);
        let ack_bytes = read_packet(&mut stream, &mut buf).await?;
        let mut ba = ByteArray::new(&ack_bytes);
        let ack = v3::ConnectAckPacket::decode(&mut ba)?;
        if ack.return_code() != v3::ConnectReturnCode::Accepted {
            return Err(Error::from_string(
                ErrorKind::AuthError,
                format!("bridge: Remote refused connect: {:?}", ack.return_code()),
            ));
        }

        // Pull topics: subscribe on the remote broker. QoS is capped at 1,
        // the strongest guarantee the bridge tracks.
        let mut next_packet_id: PacketId = 1;
        let pull_topics: Vec<v3::SubscribeTopic> = self
            .config
            .topics
            .iter()
            .filter(|topic| topic.direction == BridgeDirection::In)
            .filter_map(|topic| {
                v3::SubscribeTopic::new(&topic.filter, topic.qos.min(QoS::AtLeastOnce)).ok()
            })
            .collect();
        if !pull_topics.is_empty() {
            let packet = v3::SubscribePacket::with_topics(next_packet_id, pull_topics);
            next_packet_id += 1;
            write_packet(&mut stream, &packet).await?;
        }

        let ping_secs = u64::from(self.config.keep_alive / 2).max(5);
        let mut ping_timer = tokio::time::interval(Duration::from_secs(ping_secs));
        ping_timer.tick().await;

        loop {
            tokio::select! {
                read_result = stream.read_buf(&mut buf) => {
                    if read_result? == 0 {
                        return Err(Error::new(ErrorKind::SocketError, "bridge: Remote closed"));
                    }
                    self.drain_remote_packets(&mut stream, &mut buf).await?;
                }
                Some(delivery) = local_receiver.recv() => {
                    next_packet_id = self
                        .push_to_remote(&mut stream, delivery, next_packet_id)
                        .await?;
                }
                _ = ping_timer.tick() => {
                    write_packet(&mut stream, &v3::PingRequestPacket::new()).await?;
                }
            }
        }
    }

    async fn drain_remote_packets(
        &self,
        stream: &mut TcpStream,
        buf: &mut Vec<u8>,
    ) -> Result<(), Error> {
        loop {
            let Some(packet_len) = peek_packet_length(buf)? else {
                return Ok(());
            };
            if buf.len() < packet_len {
                return Ok(());
            }
            let packet: Vec<u8> = buf.drain(..packet_len).collect();
            self.handle_remote_packet(stream, &packet).await?;
        }
    }

    async fn handle_remote_packet(
        &self,
        stream: &mut TcpStream,
        packet: &[u8],
    ) -> Result<(), Error> {
        let mut ba = ByteArray::new(packet);
        let fixed_header = codec::FixedHeader::decode(&mut ba)?;
        match fixed_header.packet_type() {
            PacketType::Publish { .. } => {
                let mut ba = ByteArray::new(packet);
                let publish = v3::PublishPacket::decode(&mut ba)?;
                if publish.qos() == QoS::AtLeastOnce {
                    write_packet(stream, &v3::PublishAckPacket::new(publish.packet_id())).await?;
                }
                let message = Message::new(
                    TopicName::parse(publish.topic())
                        .map_err(|_| Error::new(ErrorKind::DecodeError, "bridge: Bad topic"))?,
                    publish.qos().min(QoS::AtLeastOnce),
                    publish.payload().clone(),
                )
                .with_retain(publish.retain())
                .with_publisher(&self.client_id);
                self.handle.publish(message).await?;
            }
            PacketType::PublishAck
            | PacketType::SubscribeAck
            | PacketType::PingResponse => {}
            packet_type => {
                log::debug!("bridge: Ignoring remote packet: {packet_type:?}");
            }
        }
        Ok(())
    }

    async fn push_to_remote(
        &self,
        stream: &mut TcpStream,
        delivery: Delivery,
        mut next_packet_id: PacketId,
    ) -> Result<PacketId, Error> {
        let qos = delivery.qos.min(QoS::AtLeastOnce);
        let mut publish = v3::PublishPacket::new(
            delivery.message.topic.as_str(),
            qos,
            delivery.message.payload.clone(),
        )
        .map_err(Error::from)?;
        publish.set_retain(delivery.retain);
        if qos != QoS::AtMostOnce {
            publish.set_packet_id(next_packet_id);
            next_packet_id = next_packet_id.wrapping_add(1).max(1);
        }
        write_packet(stream, &publish).await?;
        Ok(next_packet_id)
    }
}

async fn write_packet<P: EncodePacket>(stream: &mut TcpStream, packet: &P) -> Result<(), Error> {
    let mut buf = Vec::new();
    packet.encode(&mut buf)?;
    stream.write_all(&buf).await?;
    Ok(())
}

/// Read until one whole packet is buffered, returning its bytes.
async fn read_packet(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Result<Vec<u8>, Error> {
    loop {
        if let Some(packet_len) = peek_packet_length(buf)? {
            if buf.len() >= packet_len {
                return Ok(buf.drain(..packet_len).collect());
            }
        }
        if stream.read_buf(buf).await? == 0 {
            return Err(Error::new(
                ErrorKind::SocketError,
                "bridge: Remote closed during handshake",
            ));
        }
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles client packets.

use codec::{
    utils::random_client_id, v3, ByteArray, DecodePacket, FixedHeader, PacketType, ProtocolLevel,
    QoS, ReasonCode, TopicFilter, TopicName,
};

use super::{Session, Status};
use crate::commands::{ConnectData, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::message::{Message, Subscription, WillMessage};

impl Session {
    pub(super) async fn handle_client_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let fixed_header = match FixedHeader::decode(&mut ba) {
            Ok(fixed_header) => fixed_header,
            Err(err) => {
                // Malformed header: the connection is closed, for MQTT 5
                // with a DISCONNECT carrying reason 0x81.
                log::error!("session: Invalid packet header: {err:?}");
                self.on_protocol_error().await;
                return Ok(());
            }
        };
        if !fixed_header.is_valid_for(self.protocol_level) {
            self.on_protocol_error().await;
            return Ok(());
        }

        match fixed_header.packet_type() {
            PacketType::Connect => self.on_client_connect(buf).await,
            PacketType::PingRequest => self.on_client_ping().await,
            PacketType::Publish { .. } => self.on_client_publish(buf).await,
            PacketType::PublishAck => self.on_client_publish_ack_packet(buf).await,
            PacketType::PublishReceived => self.on_client_publish_received_packet(buf).await,
            PacketType::PublishRelease => self.on_client_publish_release(buf).await,
            PacketType::PublishComplete => self.on_client_publish_complete_packet(buf).await,
            PacketType::Subscribe => self.on_client_subscribe(buf).await,
            PacketType::Unsubscribe => self.on_client_unsubscribe(buf).await,
            PacketType::Disconnect => self.on_client_disconnect(buf).await,
            PacketType::Auth => self.on_client_auth(buf).await,
            packet_type => {
                // CONNACK, SUBACK and friends never originate from a
                // client; receiving one is a protocol violation.
                log::error!("session: Unexpected packet from client: {packet_type:?}");
                self.on_protocol_error().await;
                Ok(())
            }
        }
    }

    async fn on_client_connect(&mut self, buf: &[u8]) -> Result<(), Error> {
        // The server MUST process a second CONNECT packet sent from a
        // client as a protocol violation and disconnect [MQTT-3.1.0-2].
        if self.status == Status::Connecting || self.status == Status::Connected {
            log::error!("session: Second CONNECT packet, {}", self.id);
            self.on_protocol_error().await;
            return Ok(());
        }

        let protocol_level = match peek_protocol_level(buf) {
            Ok(protocol_level) => protocol_level,
            Err(_err) => {
                // The server MUST respond with CONNACK return code 0x01
                // and close the connection if the protocol is not
                // supported [MQTT-3.1.2-2].
                let ack_packet = v3::ConnectAckPacket::new(
                    false,
                    v3::ConnectReturnCode::UnacceptedProtocol,
                );
                let _ret = self.send(ack_packet).await;
                self.status = Status::Disconnected;
                return Ok(());
            }
        };

        self.protocol_level = protocol_level;
        if protocol_level == ProtocolLevel::V5 {
            self.on_client_connect_v5(buf).await
        } else {
            self.on_client_connect_v3(buf).await
        }
    }

    async fn on_client_connect_v3(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v3::ConnectPacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                // The server MUST close the connection without sending a
                // CONNACK if the packet does not conform [MQTT-3.1.4-1].
                log::error!("session: Malformed CONNECT: {err:?}");
                self.status = Status::Disconnected;
                return Ok(());
            }
        };

        if packet.client_id().is_empty() {
            // A zero length client id with clean-session 0 is rejected
            // with return code 0x02 [MQTT-3.1.3-8].
            if !packet.clean_session() || !self.config.allow_empty_client_id() {
                return self.reject_client_id().await;
            }
            let assigned = random_client_id();
            let _ret = packet.set_client_id(&assigned);
        }
        self.client_id = packet.client_id().to_string();
        self.clean_start = packet.clean_session();
        self.keep_alive_secs = super::stretch_keep_alive(packet.keep_alive());

        let will = match packet.will() {
            Some(will) => Some(WillMessage {
                topic: TopicName::parse(&will.topic)
                    .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid will topic"))?,
                payload: will.message.clone().into(),
                qos: will.qos,
                retain: will.retain,
                delay: 0,
                properties: codec::Properties::default(),
            }),
            None => None,
        };

        let connect = ConnectData {
            protocol_level: self.protocol_level,
            client_id: self.client_id.clone(),
            clean_start: self.clean_start,
            keep_alive: packet.keep_alive(),
            // A 3.1.1 persistent session lasts until it is taken over by a
            // clean-start connect.
            session_expiry: if self.clean_start { 0 } else { u32::MAX },
            receive_maximum: self.config.maximum_inflight_messages(),
            will,
            username: packet.username().map(ToString::to_string),
            password: packet.password().map(<[u8]>::to_vec),
        };
        self.send_quota = connect.receive_maximum;
        self.status = Status::Connecting;
        self.send_to_listener(SessionToListenerCmd::Connect(self.id, connect))
            .await
    }

    pub(super) async fn reject_client_id(&mut self) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let ack_packet =
                codec::v5::ConnectAckPacket::new(false, ReasonCode::ClientIdentifierNotValid);
            self.send(ack_packet).await?;
        } else {
            // A CONNACK with a non-zero return code MUST carry session
            // present 0 [MQTT-3.2.2-4].
            let ack_packet =
                v3::ConnectAckPacket::new(false, v3::ConnectReturnCode::IdentifierRejected);
            self.send(ack_packet).await?;
        }
        self.status = Status::Disconnected;
        Ok(())
    }

    async fn on_client_ping(&mut self) -> Result<(), Error> {
        self.send(v3::PingResponsePacket::new()).await
    }

    async fn on_client_publish(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.on_protocol_error().await;
            return Ok(());
        }
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_publish_v5(buf).await;
        }

        let mut ba = ByteArray::new(buf);
        let packet = v3::PublishPacket::decode(&mut ba)?;
        let message = Message::new(
            TopicName::parse(packet.topic())
                .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid topic name"))?,
            packet.qos(),
            packet.payload().clone(),
        )
        .with_retain(packet.retain())
        .with_publisher(&self.client_id);
        self.begin_publish(message, packet.packet_id(), packet.dup())
            .await
    }

    /// Common inbound-publish path: policy checks, then the ACL verdict
    /// round trip through the listener.
    pub(super) async fn begin_publish(
        &mut self,
        message: Message,
        packet_id: codec::PacketId,
        dup: bool,
    ) -> Result<(), Error> {
        if message.qos > self.config.maximum_qos() {
            // Clients publishing at a higher QoS than supported are
            // disconnected.
            log::error!("session: Publish QoS above maximum, {}", self.id);
            return self.send_disconnect(ReasonCode::QoSNotSupported).await;
        }
        let size_limit = self.config.message_size_limit() as usize;
        if size_limit > 0 && message.payload.len() > size_limit {
            log::error!("session: Publish payload too large, {}", self.id);
            return self.send_disconnect(ReasonCode::PacketTooLarge).await;
        }

        if message.qos == QoS::ExactOnce {
            if self.receiving.len() >= usize::from(self.config.maximum_inflight_messages()) {
                log::error!("session: Too many unreleased QoS 2 messages, {}", self.id);
                return self.send_disconnect(ReasonCode::ReceiveMaximumExceeded).await;
            }
            // A duplicate PUBLISH for a packet id still awaiting PUBREL is
            // acknowledged again but not re-routed.
            if dup && self.receiving.contains_key(&packet_id) {
                return self.send_publish_received(packet_id, ReasonCode::Success).await;
            }
        }

        let topic = message.topic.clone();
        let qos = message.qos;
        match qos {
            QoS::AtMostOnce => self.pending_acl_qos0.push_back(message),
            _ => {
                self.pending_acl.insert(packet_id, message);
            }
        }
        self.send_to_listener(SessionToListenerCmd::CheckPublish {
            session_id: self.id,
            topic,
            packet_id,
            qos,
        })
        .await
    }

    pub(super) async fn send_publish_received(
        &mut self,
        packet_id: codec::PacketId,
        reason: ReasonCode,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(codec::v5::PublishReceivedPacket::new(packet_id, reason))
                .await
        } else {
            self.send(v3::PublishReceivedPacket::new(packet_id)).await
        }
    }

    pub(super) async fn send_publish_ack(
        &mut self,
        packet_id: codec::PacketId,
        reason: ReasonCode,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(codec::v5::PublishAckPacket::new(packet_id, reason))
                .await
        } else {
            self.send(v3::PublishAckPacket::new(packet_id)).await
        }
    }

    /// PUBREL releases a stored QoS 2 message into the router, exactly
    /// once, and is answered with PUBCOMP.
    async fn on_client_publish_release(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            codec::v5::PublishReleasePacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishReleasePacket::decode(&mut ba)?.packet_id()
        };

        let released = self.receiving.remove(&packet_id);
        let reason = if released.is_some() {
            ReasonCode::Success
        } else {
            log::warn!("session: PUBREL for unknown packet id {packet_id}");
            ReasonCode::PacketIdentifierNotFound
        };
        if let Some(message) = released {
            self.send_to_listener(SessionToListenerCmd::Publish(self.id, message))
                .await?;
        }
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(codec::v5::PublishCompletePacket::new(packet_id, reason))
                .await
        } else {
            self.send(v3::PublishCompletePacket::new(packet_id)).await
        }
    }

    async fn on_client_publish_ack_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            codec::v5::PublishAckPacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishAckPacket::decode(&mut ba)?.packet_id()
        };
        self.on_client_publish_ack(packet_id).await
    }

    async fn on_client_publish_received_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let (packet_id, failed) = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            let packet = codec::v5::PublishReceivedPacket::decode(&mut ba)?;
            (packet.packet_id(), packet.reason_code().is_error())
        } else {
            let mut ba = ByteArray::new(buf);
            (v3::PublishReceivedPacket::decode(&mut ba)?.packet_id(), false)
        };
        self.on_client_publish_received(packet_id, failed).await
    }

    async fn on_client_publish_complete_packet(&mut self, buf: &[u8]) -> Result<(), Error> {
        let packet_id = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            codec::v5::PublishCompletePacket::decode(&mut ba)?.packet_id()
        } else {
            let mut ba = ByteArray::new(buf);
            v3::PublishCompletePacket::decode(&mut ba)?.packet_id()
        };
        self.on_client_publish_complete(packet_id).await
    }

    async fn on_client_subscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.on_protocol_error().await;
            return Ok(());
        }
        if self.protocol_level == ProtocolLevel::V5 {
            return self.on_client_subscribe_v5(buf).await;
        }

        let mut ba = ByteArray::new(buf);
        let packet = match v3::SubscribePacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                // Reserved flag or payload violations close the connection
                // [MQTT-3.8.1-1], [MQTT-3.8.3-3].
                log::error!("session: Malformed SUBSCRIBE: {err:?}");
                self.on_protocol_error().await;
                return Ok(());
            }
        };

        let mut subscriptions = Vec::with_capacity(packet.topics().len());
        for topic in packet.topics() {
            let filter = TopicFilter::parse(topic.filter())
                .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid topic filter"))?;
            subscriptions.push(Subscription::new(filter, topic.qos()));
        }
        self.send_to_listener(SessionToListenerCmd::Subscribe {
            session_id: self.id,
            packet_id: packet.packet_id(),
            subscriptions,
        })
        .await
    }

    async fn on_client_unsubscribe(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.status != Status::Connected {
            self.on_protocol_error().await;
            return Ok(());
        }
        let (packet_id, filters) = if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            let packet = codec::v5::UnsubscribePacket::decode(&mut ba)?;
            (
                packet.packet_id(),
                packet
                    .filters()
                    .iter()
                    .map(|filter| filter.as_str().to_string())
                    .collect(),
            )
        } else {
            let mut ba = ByteArray::new(buf);
            let packet = v3::UnsubscribePacket::decode(&mut ba)?;
            (
                packet.packet_id(),
                packet
                    .filters()
                    .iter()
                    .map(|filter| filter.as_str().to_string())
                    .collect(),
            )
        };
        self.send_to_listener(SessionToListenerCmd::Unsubscribe {
            session_id: self.id,
            packet_id,
            filters,
        })
        .await
    }

    async fn on_client_disconnect(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            let mut ba = ByteArray::new(buf);
            let packet = codec::v5::DisconnectPacket::decode(&mut ba)?;
            // Only a normal disconnection discards the will
            // [MQTT-3.14.4-3]; 0x04 explicitly requests will publication.
            self.clean_disconnect = packet.reason_code() == ReasonCode::Success;
        } else {
            self.clean_disconnect = true;
        }
        self.status = Status::Disconnected;
        Ok(())
    }

    async fn on_client_auth(&mut self, _buf: &[u8]) -> Result<(), Error> {
        // Extended re-authentication is not offered in CONNACK, so an AUTH
        // packet here is unexpected.
        self.send_disconnect(ReasonCode::BadAuthenticationMethod)
            .await
    }
}

/// Look at protocol name and level without decoding the whole CONNECT.
fn peek_protocol_level(buf: &[u8]) -> Result<ProtocolLevel, Error> {
    let mut ba = ByteArray::new(buf);
    let _fixed_header = FixedHeader::decode(&mut ba)?;
    let name = ba.read_string()?;
    if name != "MQTT" && name != "MQIsdp" {
        return Err(Error::new(
            ErrorKind::ProtocolError,
            "Invalid protocol name",
        ));
    }
    Ok(ProtocolLevel::try_from(ba.read_byte()?)?)
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! MQTT 5 specific client packet handlers.

use codec::{
    utils::random_client_id, v5, ByteArray, DecodePacket, ProtocolLevel, ReasonCode, TopicName,
};

use super::{Session, Status};
use crate::commands::{ConnectData, SessionToListenerCmd};
use crate::error::{Error, ErrorKind};
use crate::message::{Message, Subscription, WillMessage};

impl Session {
    pub(super) async fn on_client_connect_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let mut packet = match v5::ConnectPacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                log::error!("session: Malformed CONNECT: {err:?}");
                self.status = Status::Disconnected;
                return Ok(());
            }
        };

        let mut assigned_client_id = None;
        if packet.client_id().is_empty() {
            if !self.config.allow_empty_client_id() {
                return self.reject_client_id().await;
            }
            // The server assigns a unique client id and tells the client
            // through the CONNACK [MQTT-3.1.3-7].
            let assigned = random_client_id();
            let _ret = packet.set_client_id(&assigned);
            assigned_client_id = Some(assigned);
        }
        self.client_id = packet.client_id().to_string();
        self.clean_start = packet.clean_start();
        self.assigned_client_id = assigned_client_id;
        self.keep_alive_secs = super::stretch_keep_alive(packet.keep_alive());

        let will = match packet.will() {
            Some(will) => Some(WillMessage {
                topic: TopicName::parse(&will.topic)
                    .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid will topic"))?,
                payload: will.payload.clone().into(),
                qos: will.qos,
                retain: will.retain,
                delay: will.properties.will_delay_interval.unwrap_or(0),
                properties: will.properties.clone(),
            }),
            None => None,
        };

        let receive_maximum = packet
            .properties()
            .receive_maximum
            .unwrap_or_else(|| self.config.maximum_inflight_messages())
            .min(self.config.maximum_inflight_messages());

        let connect = ConnectData {
            protocol_level: ProtocolLevel::V5,
            client_id: self.client_id.clone(),
            clean_start: self.clean_start,
            keep_alive: packet.keep_alive(),
            session_expiry: packet.session_expiry_interval(),
            receive_maximum,
            will,
            username: packet.username().map(ToString::to_string),
            password: packet.password().map(<[u8]>::to_vec),
        };
        self.send_quota = receive_maximum;
        self.status = Status::Connecting;
        self.send_to_listener(SessionToListenerCmd::Connect(self.id, connect))
            .await
    }

    pub(super) async fn on_client_publish_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = v5::PublishPacket::decode(&mut ba)?;

        if packet.properties().topic_alias.is_some() {
            // Topic aliases are not offered: topic alias maximum is 0 in
            // the CONNACK, so receiving one is an error [MQTT-3.3.2-7].
            return self.send_disconnect(ReasonCode::TopicAliasInvalid).await;
        }

        let mut properties = packet.properties().clone();
        // Subscription identifiers only flow server to client.
        properties.subscription_identifiers.clear();

        let message = Message::new(
            TopicName::parse(packet.topic())
                .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid topic name"))?,
            packet.qos(),
            packet.payload().clone(),
        )
        .with_retain(packet.retain())
        .with_publisher(&self.client_id)
        .with_properties(properties);
        self.begin_publish(message, packet.packet_id(), packet.dup())
            .await
    }

    pub(super) async fn on_client_subscribe_v5(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut ba = ByteArray::new(buf);
        let packet = match v5::SubscribePacket::decode(&mut ba) {
            Ok(packet) => packet,
            Err(err) => {
                log::error!("session: Malformed SUBSCRIBE: {err:?}");
                self.on_protocol_error().await;
                return Ok(());
            }
        };

        let subscription_id = packet.subscription_id();
        let mut subscriptions = Vec::with_capacity(packet.topics().len());
        for topic in packet.topics() {
            let filter = codec::TopicFilter::parse(topic.filter())
                .map_err(|_| Error::new(ErrorKind::ProtocolError, "Invalid topic filter"))?;
            let options = topic.options();
            subscriptions.push(Subscription {
                filter,
                qos: options.qos,
                no_local: options.no_local,
                retain_as_published: options.retain_as_published,
                retain_handling: options.retain_handling,
                subscription_id,
            });
        }
        self.send_to_listener(SessionToListenerCmd::Subscribe {
            session_id: self.id,
            packet_id: packet.packet_id(),
            subscriptions,
        })
        .await
    }
}

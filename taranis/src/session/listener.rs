// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Handles commands from the listener.

use std::collections::VecDeque;

use codec::{v3, v5, PacketId, ProtocolLevel, QoS, ReasonCode};

use super::{Session, Status};
use crate::commands::{ListenerToSessionCmd, SessionAttachAck, SessionToListenerCmd};
use crate::error::Error;
use crate::message::Delivery;

impl Session {
    pub(super) async fn handle_listener_cmd(
        &mut self,
        cmd: ListenerToSessionCmd,
    ) -> Result<(), Error> {
        match cmd {
            ListenerToSessionCmd::ConnectAck(ack) => self.on_listener_connect_ack(ack).await,
            ListenerToSessionCmd::PublishAck {
                packet_id,
                qos,
                accepted,
            } => self.on_listener_publish_ack(packet_id, qos, accepted).await,
            ListenerToSessionCmd::SubscribeAck {
                packet_id,
                reason_codes,
                retained,
            } => {
                self.on_listener_subscribe_ack(packet_id, reason_codes, retained)
                    .await
            }
            ListenerToSessionCmd::UnsubscribeAck {
                packet_id,
                reason_codes,
            } => {
                self.on_listener_unsubscribe_ack(packet_id, reason_codes)
                    .await
            }
            ListenerToSessionCmd::Deliver(delivery) => self.accept_delivery(delivery).await,
            ListenerToSessionCmd::Disconnect(reason) => self.on_listener_disconnect(reason).await,
        }
    }

    async fn on_listener_connect_ack(&mut self, ack: SessionAttachAck) -> Result<(), Error> {
        if ack.reason.is_error() {
            if self.protocol_level == ProtocolLevel::V5 {
                self.send(v5::ConnectAckPacket::new(false, ack.reason))
                    .await?;
            } else {
                let return_code = match ack.reason {
                    ReasonCode::ServerUnavailable => v3::ConnectReturnCode::ServerUnavailable,
                    ReasonCode::BadUserNameOrPassword => {
                        v3::ConnectReturnCode::MalformedUsernamePassword
                    }
                    ReasonCode::NotAuthorized => v3::ConnectReturnCode::Unauthorized,
                    _ => v3::ConnectReturnCode::IdentifierRejected,
                };
                self.send(v3::ConnectAckPacket::new(false, return_code))
                    .await?;
            }
            self.status = Status::Disconnected;
            return Ok(());
        }

        // Send the CONNACK first, then replay the resumed state.
        if self.protocol_level == ProtocolLevel::V5 {
            let mut packet = v5::ConnectAckPacket::new(ack.session_present, ReasonCode::Success);
            let properties = packet.properties_mut();
            properties.receive_maximum = Some(self.config.maximum_inflight_messages());
            properties.topic_alias_maximum = Some(0);
            if let Some(assigned) = self.assigned_client_id.take() {
                properties.assigned_client_identifier = Some(assigned);
            }
            self.send(packet).await?;
        } else {
            self.send(v3::ConnectAckPacket::new(
                ack.session_present,
                v3::ConnectReturnCode::Accepted,
            ))
            .await?;
        }
        self.status = Status::Connected;
        log::info!(
            "session: Client {} connected, clean_start: {}, session_present: {}",
            self.client_id,
            self.clean_start,
            ack.session_present
        );

        if let Some(resumed) = ack.resumed {
            // Restore the previous connection's handshakes; every pending
            // in-flight message holds a window slot again.
            let occupied = u16::try_from(resumed.inflight.len()).unwrap_or(u16::MAX);
            self.send_quota = self.send_quota.saturating_sub(occupied);
            self.inflight = resumed.inflight.into();
            self.receiving = resumed.receiving.into_iter().collect();
            self.queue = VecDeque::from(resumed.queued);
        }
        for delivery in ack.queued {
            self.queue.push_back(delivery);
        }
        self.resume_inflight().await
    }

    /// Verdict of the ACL check on an inbound publish.
    async fn on_listener_publish_ack(
        &mut self,
        packet_id: PacketId,
        qos: QoS,
        accepted: bool,
    ) -> Result<(), Error> {
        let message = match qos {
            QoS::AtMostOnce => self.pending_acl_qos0.pop_front(),
            _ => self.pending_acl.remove(&packet_id),
        };
        let Some(message) = message else {
            log::error!("session: PublishAck without pending message, {}", self.id);
            return Ok(());
        };

        if !accepted {
            // The broker either acknowledges per the normal QoS rules or
            // closes the connection [MQTT-3.3.5-2]; which one is a policy
            // decision.
            if self.config.disconnect_on_denied_publish() {
                return self.send_disconnect(ReasonCode::NotAuthorized).await;
            }
            return match qos {
                QoS::AtMostOnce => Ok(()),
                QoS::AtLeastOnce => self.send_publish_ack(packet_id, ReasonCode::NotAuthorized).await,
                QoS::ExactOnce => {
                    self.send_publish_received(packet_id, ReasonCode::NotAuthorized)
                        .await
                }
            };
        }

        match qos {
            QoS::AtMostOnce => {
                self.send_to_listener(SessionToListenerCmd::Publish(self.id, message))
                    .await
            }
            QoS::AtLeastOnce => {
                self.send_to_listener(SessionToListenerCmd::Publish(self.id, message))
                    .await?;
                self.send_publish_ack(packet_id, ReasonCode::Success).await
            }
            QoS::ExactOnce => {
                // Routed on PUBREL, not before.
                self.receiving.insert(packet_id, message);
                self.send_publish_received(packet_id, ReasonCode::Success)
                    .await
            }
        }
    }

    async fn on_listener_subscribe_ack(
        &mut self,
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
        retained: Vec<Delivery>,
    ) -> Result<(), Error> {
        // The SUBACK carries the same packet id as the SUBSCRIBE it
        // acknowledges [MQTT-3.8.4-2].
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::SubscribeAckPacket::with_reason_codes(
                packet_id,
                reason_codes,
            ))
            .await?;
        } else {
            let acks = reason_codes
                .into_iter()
                .map(|reason| match reason {
                    ReasonCode::Success => v3::SubscribeAck::QoS(QoS::AtMostOnce),
                    ReasonCode::GrantedQoS1 => v3::SubscribeAck::QoS(QoS::AtLeastOnce),
                    ReasonCode::GrantedQoS2 => v3::SubscribeAck::QoS(QoS::ExactOnce),
                    _ => v3::SubscribeAck::Failed,
                })
                .collect();
            self.send(v3::SubscribeAckPacket::with_acks(packet_id, acks))
                .await?;
        }

        // Matching retained messages follow the SUBACK.
        for delivery in retained {
            self.accept_delivery(delivery).await?;
        }
        Ok(())
    }

    async fn on_listener_unsubscribe_ack(
        &mut self,
        packet_id: PacketId,
        reason_codes: Vec<ReasonCode>,
    ) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::UnsubscribeAckPacket::with_reason_codes(
                packet_id,
                reason_codes,
            ))
            .await
        } else {
            self.send(v3::UnsubscribeAckPacket::new(packet_id)).await
        }
    }

    async fn on_listener_disconnect(&mut self, reason: ReasonCode) -> Result<(), Error> {
        log::info!(
            "session: Server side disconnect of {}, reason: {reason:?}",
            self.client_id
        );
        self.send_disconnect(reason).await
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Outbound flow control and the server-to-client QoS state machines.
//!
//! QoS 1: PUBLISH -> awaiting-puback -> done on PUBACK.
//! QoS 2: PUBLISH -> awaiting-pubrec -> PUBREL -> awaiting-pubcomp ->
//! done on PUBCOMP. Unacknowledged packets are retransmitted with the DUP
//! flag after the retransmit interval and on session resume.

use codec::{v3, v5, PacketId, ProtocolLevel, QoS, ReasonCode};

use super::{Session, Status};
use crate::config::QueueOverflowPolicy;
use crate::error::{Error, ErrorKind};
use crate::message::{Delivery, InflightMessage, InflightState};
use crate::types::unix_millis;

impl Session {
    /// Next free packet id for a server-to-client publish.
    ///
    /// Ids live in 1..=65535 and must be unique among the in-flight
    /// handshakes; running out is fatal to the session.
    fn alloc_packet_id(&mut self) -> Result<PacketId, Error> {
        for _ in 0..=u16::MAX {
            let candidate = self.next_packet_id;
            self.next_packet_id = self.next_packet_id.wrapping_add(1).max(1);
            if !self
                .inflight
                .iter()
                .any(|inflight| inflight.packet_id == candidate)
            {
                return Ok(candidate);
            }
        }
        Err(Error::new(
            ErrorKind::ResourceError,
            "session: Packet ids exhausted",
        ))
    }

    /// Feed one routed message into the outbound pipeline.
    ///
    /// QoS 0 is transmitted immediately or dropped, never queued. QoS 1/2
    /// enters the in-flight window when a slot is free, the queue
    /// otherwise.
    pub(super) async fn accept_delivery(&mut self, delivery: Delivery) -> Result<(), Error> {
        if delivery.qos == QoS::AtMostOnce {
            if self.status == Status::Connected
                && self.send_quota > 0
                && !delivery.message.is_expired(unix_millis())
            {
                self.transmit_publish(&delivery, 0, false).await?;
            }
            return Ok(());
        }

        if self.status == Status::Connected && self.send_quota > 0 {
            self.transmit_inflight(delivery).await
        } else {
            self.push_queue(delivery).await
        }
    }

    /// First transmission of a QoS 1/2 message.
    async fn transmit_inflight(&mut self, delivery: Delivery) -> Result<(), Error> {
        let now = unix_millis();
        if delivery.message.is_expired(now) {
            // Expired before the first attempt: silently discarded.
            return Ok(());
        }
        let packet_id = match self.alloc_packet_id() {
            Ok(packet_id) => packet_id,
            Err(err) => {
                log::error!("session: {}: {err}", self.id);
                return self.send_disconnect(ReasonCode::ReceiveMaximumExceeded).await;
            }
        };
        self.send_quota -= 1;
        self.transmit_publish(&delivery, packet_id, false).await?;
        let state = match delivery.qos {
            QoS::AtLeastOnce => InflightState::AwaitingPuback,
            _ => InflightState::AwaitingPubrec,
        };
        self.inflight.push_back(InflightMessage {
            packet_id,
            delivery,
            state,
            last_sent_at: now,
        });
        Ok(())
    }

    /// Append to the session queue, applying the overflow policy.
    async fn push_queue(&mut self, delivery: Delivery) -> Result<(), Error> {
        if self.queue.len() < self.config.maximum_queued_messages() {
            self.queue.push_back(delivery);
            return Ok(());
        }
        match self.config.queue_overflow_policy() {
            QueueOverflowPolicy::DropNew => {
                log::warn!("session: Queue full, dropping new message, {}", self.id);
            }
            QueueOverflowPolicy::DropOldest => {
                self.queue.pop_front();
                self.queue.push_back(delivery);
            }
            QueueOverflowPolicy::Disconnect => {
                log::warn!("session: Queue full, disconnecting {}", self.id);
                return self.send_disconnect(ReasonCode::ReceiveMaximumExceeded).await;
            }
        }
        Ok(())
    }

    /// Move queued messages into freed window slots, in order.
    pub(super) async fn drain_queue(&mut self) -> Result<(), Error> {
        while self.status == Status::Connected
            && self.send_quota > 0
            && !self.queue.is_empty()
        {
            let Some(delivery) = self.queue.pop_front() else {
                break;
            };
            if delivery.qos == QoS::AtMostOnce {
                // QoS 0 only sits in the queue when restored from an old
                // broker version; transmit it without a window slot.
                self.transmit_publish(&delivery, 0, false).await?;
            } else {
                self.transmit_inflight(delivery).await?;
            }
        }
        Ok(())
    }

    /// Encode and send one PUBLISH, recomputing the message expiry so the
    /// client observes time already spent queued.
    pub(super) async fn transmit_publish(
        &mut self,
        delivery: &Delivery,
        packet_id: PacketId,
        dup: bool,
    ) -> Result<(), Error> {
        let message = &delivery.message;
        if self.protocol_level == ProtocolLevel::V5 {
            let mut packet =
                v5::PublishPacket::new(message.topic.as_str(), delivery.qos, message.payload.clone())?;
            packet.set_retain(delivery.retain).set_dup(dup);
            if packet_id != 0 {
                packet.set_packet_id(packet_id);
            }
            let mut properties = message.properties.clone();
            properties.subscription_identifiers = delivery.subscription_ids.clone();
            properties.message_expiry_interval = message.remaining_expiry_secs(unix_millis());
            packet.set_properties(properties);
            self.send(packet).await
        } else {
            let mut packet =
                v3::PublishPacket::new(message.topic.as_str(), delivery.qos, message.payload.clone())?;
            packet.set_retain(delivery.retain).set_dup(dup);
            if packet_id != 0 {
                packet.set_packet_id(packet_id);
            }
            self.send(packet).await
        }
    }

    /// PUBACK from the client completes a QoS 1 handshake.
    pub(super) async fn on_client_publish_ack(&mut self, packet_id: PacketId) -> Result<(), Error> {
        let position = self.inflight.iter().position(|inflight| {
            inflight.packet_id == packet_id && inflight.state == InflightState::AwaitingPuback
        });
        if let Some(position) = position {
            self.inflight.remove(position);
            self.release_window_slot().await?;
        } else {
            log::warn!("session: Unsolicited PUBACK for {packet_id}, {}", self.id);
        }
        Ok(())
    }

    /// PUBREC from the client; answer PUBREL or abort on an error reason.
    pub(super) async fn on_client_publish_received(
        &mut self,
        packet_id: PacketId,
        failed: bool,
    ) -> Result<(), Error> {
        let position = self.inflight.iter().position(|inflight| {
            inflight.packet_id == packet_id && inflight.state == InflightState::AwaitingPubrec
        });
        let Some(position) = position else {
            log::warn!("session: Unsolicited PUBREC for {packet_id}, {}", self.id);
            return Ok(());
        };
        if failed {
            // A PUBREC with a reason code of 0x80 or higher ends the
            // exchange and frees the packet id.
            self.inflight.remove(position);
            return self.release_window_slot().await;
        }
        if let Some(inflight) = self.inflight.get_mut(position) {
            inflight.state = InflightState::AwaitingPubcomp;
            inflight.last_sent_at = unix_millis();
        }
        self.send_publish_release(packet_id).await
    }

    /// PUBCOMP from the client completes a QoS 2 handshake.
    pub(super) async fn on_client_publish_complete(
        &mut self,
        packet_id: PacketId,
    ) -> Result<(), Error> {
        let position = self.inflight.iter().position(|inflight| {
            inflight.packet_id == packet_id && inflight.state == InflightState::AwaitingPubcomp
        });
        if let Some(position) = position {
            self.inflight.remove(position);
            self.release_window_slot().await?;
        } else {
            log::warn!("session: Unsolicited PUBCOMP for {packet_id}, {}", self.id);
        }
        Ok(())
    }

    async fn release_window_slot(&mut self) -> Result<(), Error> {
        self.send_quota = self
            .send_quota
            .saturating_add(1)
            .min(self.config.maximum_inflight_messages());
        self.drain_queue().await
    }

    async fn send_publish_release(&mut self, packet_id: PacketId) -> Result<(), Error> {
        if self.protocol_level == ProtocolLevel::V5 {
            self.send(v5::PublishReleasePacket::new(packet_id, ReasonCode::Success))
                .await
        } else {
            self.send(v3::PublishReleasePacket::new(packet_id)).await
        }
    }

    /// Retransmit in-flight packets whose retransmit interval elapsed.
    pub(super) async fn retransmit_due(&mut self) -> Result<(), Error> {
        let now = unix_millis();
        let interval_millis = u64::from(self.config.retransmit_interval()) * 1000;
        if interval_millis == 0 {
            return Ok(());
        }
        let due: Vec<(PacketId, InflightState, Delivery)> = self
            .inflight
            .iter()
            .filter(|inflight| now.saturating_sub(inflight.last_sent_at) >= interval_millis)
            .map(|inflight| (inflight.packet_id, inflight.state, inflight.delivery.clone()))
            .collect();
        for (packet_id, state, delivery) in due {
            match state {
                InflightState::AwaitingPuback | InflightState::AwaitingPubrec => {
                    // Re-delivery attempts carry the DUP flag and the
                    // original packet id [MQTT-3.3.1-1].
                    self.transmit_publish(&delivery, packet_id, true).await?;
                }
                InflightState::AwaitingPubcomp => {
                    self.send_publish_release(packet_id).await?;
                }
            }
            self.touch_inflight(packet_id, now);
        }
        Ok(())
    }

    /// Resume the handshakes of a restored session, then drain the queue.
    pub(super) async fn resume_inflight(&mut self) -> Result<(), Error> {
        let now = unix_millis();
        let resumed: Vec<(PacketId, InflightState, Delivery)> = self
            .inflight
            .iter()
            .map(|inflight| (inflight.packet_id, inflight.state, inflight.delivery.clone()))
            .collect();
        for (packet_id, state, delivery) in resumed {
            match state {
                InflightState::AwaitingPuback | InflightState::AwaitingPubrec => {
                    self.transmit_publish(&delivery, packet_id, true).await?;
                }
                InflightState::AwaitingPubcomp => {
                    self.send_publish_release(packet_id).await?;
                }
            }
            self.touch_inflight(packet_id, now);
        }
        self.drain_queue().await
    }

    fn touch_inflight(&mut self, packet_id: PacketId, now: u64) {
        if let Some(inflight) = self
            .inflight
            .iter_mut()
            .find(|inflight| inflight.packet_id == packet_id)
        {
            inflight.last_sent_at = now;
        }
    }
}

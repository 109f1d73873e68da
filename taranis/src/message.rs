// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! The application message record and the per-session delivery state
//! derived from it.

use bytes::Bytes;
use codec::v5::RetainHandling;
use codec::{PacketId, Properties, QoS, TopicFilter, TopicName};
use serde::{Deserialize, Serialize};

use crate::types::{unix_millis, MessageId};

/// An accepted publication.
///
/// Immutable after creation; the dup flag and the applied subscription
/// identifiers live in the per-subscriber [`Delivery`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Broker assigned, time ordered.
    pub id: MessageId,
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    /// Client id of the originator; `None` for broker internal messages.
    pub publisher: Option<String>,
    /// Server receive time, unix milliseconds.
    pub received_at: u64,
    /// Absolute expiry deadline, unix milliseconds.
    pub expires_at: Option<u64>,
    /// MQTT 5 properties preserved verbatim on forwarding, minus the
    /// fields tracked above.
    pub properties: Properties,
}

impl Message {
    #[must_use]
    pub fn new(topic: TopicName, qos: QoS, payload: Bytes) -> Self {
        Self {
            id: MessageId::zero(),
            topic,
            payload,
            qos,
            retain: false,
            publisher: None,
            received_at: unix_millis(),
            expires_at: None,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: &str) -> Self {
        self.publisher = Some(publisher.to_string());
        self
    }

    /// Attach decoded properties, converting a message expiry interval into
    /// an absolute deadline.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        if let Some(interval) = properties.message_expiry_interval {
            self.expires_at = Some(self.received_at + u64::from(interval) * 1000);
        }
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }

    /// Seconds left until the expiry deadline, at least one.
    ///
    /// Transmitted to MQTT 5 clients as the message expiry interval so that
    /// time already spent queued on the server is observable
    /// [MQTT-3.3.2-6].
    #[must_use]
    pub fn remaining_expiry_secs(&self, now: u64) -> Option<u32> {
        self.expires_at.map(|deadline| {
            let remaining_millis = deadline.saturating_sub(now);
            let secs = remaining_millis.div_ceil(1000).max(1);
            u32::try_from(secs).unwrap_or(u32::MAX)
        })
    }
}

/// A client subscription.
///
/// Keyed by (client id, filter); re-subscribing replaces the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub filter: TopicFilter,
    pub qos: QoS,
    pub no_local: bool,
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
    pub subscription_id: Option<u32>,
}

impl Subscription {
    #[must_use]
    pub fn new(filter: TopicFilter, qos: QoS) -> Self {
        Self {
            filter,
            qos,
            no_local: false,
            retain_as_published: false,
            retain_handling: RetainHandling::default(),
            subscription_id: None,
        }
    }
}

/// Will message captured at CONNECT time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WillMessage {
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    /// Seconds to wait after an abnormal disconnect before publishing.
    pub delay: u32,
    pub properties: Properties,
}

impl WillMessage {
    /// Turn the will into a routable message.
    #[must_use]
    pub fn into_message(self, publisher: &str) -> Message {
        let mut properties = self.properties;
        properties.will_delay_interval = None;
        Message::new(self.topic, self.qos, self.payload)
            .with_retain(self.retain)
            .with_publisher(publisher)
            .with_properties(properties)
    }
}

/// One message on its way to one subscriber.
///
/// Carries the effective QoS (the maximum of the matched granted QoS
/// values, capped at the message QoS), the union of matched subscription
/// identifiers and the retain flag to put on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub message: Message,
    pub qos: QoS,
    pub retain: bool,
    pub subscription_ids: Vec<u32>,
}

impl Delivery {
    #[must_use]
    pub fn new(message: Message, qos: QoS) -> Self {
        Self {
            message,
            qos,
            retain: false,
            subscription_ids: Vec::new(),
        }
    }
}

/// Delivery state of one unacknowledged QoS 1/2 publish, server to client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InflightState {
    /// QoS 1, PUBLISH sent.
    AwaitingPuback,

    /// QoS 2, PUBLISH sent.
    AwaitingPubrec,

    /// QoS 2, PUBREC received and PUBREL sent.
    AwaitingPubcomp,
}

/// One in-flight QoS 1/2 message, server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflightMessage {
    pub packet_id: PacketId,
    pub delivery: Delivery,
    pub state: InflightState,
    /// Unix milliseconds of the most recent transmission attempt.
    pub last_sent_at: u64,
}

/// Session state which survives a disconnect.
///
/// Shipped from the session actor to the dispatcher when the connection
/// goes away and back on resume.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Server to client handshakes in progress.
    pub inflight: Vec<InflightMessage>,

    /// Client to server QoS 2 messages awaiting PUBREL, by packet id.
    pub receiving: Vec<(PacketId, Message)>,

    /// Messages awaiting their first transmission attempt, in order.
    pub queued: Vec<Delivery>,
}

impl SessionState {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty() && self.receiving.is_empty() && self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(s: &str) -> TopicName {
        TopicName::parse(s).unwrap()
    }

    #[test]
    fn test_expiry_deadline() {
        let mut properties = Properties::default();
        properties.message_expiry_interval = Some(10);
        let msg = Message::new(topic("a"), QoS::AtMostOnce, Bytes::new())
            .with_properties(properties);

        let deadline = msg.expires_at.unwrap();
        assert_eq!(deadline, msg.received_at + 10_000);
        assert!(!msg.is_expired(deadline));
        assert!(msg.is_expired(deadline + 1));
    }

    #[test]
    fn test_remaining_expiry_is_at_least_one_second() {
        let mut properties = Properties::default();
        properties.message_expiry_interval = Some(10);
        let msg = Message::new(topic("a"), QoS::AtMostOnce, Bytes::new())
            .with_properties(properties);

        let deadline = msg.expires_at.unwrap();
        assert_eq!(msg.remaining_expiry_secs(msg.received_at), Some(10));
        // 500ms before the deadline rounds up to one second.
        assert_eq!(msg.remaining_expiry_secs(deadline - 500), Some(1));
        assert_eq!(msg.remaining_expiry_secs(deadline), Some(1));
    }

    #[test]
    fn test_will_into_message_drops_delay_property() {
        let mut properties = Properties::default();
        properties.will_delay_interval = Some(5);
        let will = WillMessage {
            topic: topic("stat/w"),
            payload: Bytes::from_static(b"off"),
            qos: QoS::AtLeastOnce,
            retain: false,
            delay: 5,
            properties,
        };
        let msg = will.into_message("w");
        assert_eq!(msg.publisher.as_deref(), Some("w"));
        assert!(msg.properties.will_delay_interval.is_none());
    }
}

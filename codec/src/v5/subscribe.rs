// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};

use crate::byte_array::{write_string, write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, QoS, TopicFilter,
};

/// Controls whether retained messages are sent when a subscription is
/// created.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetainHandling {
    /// Send retained messages at the time of the subscribe.
    #[default]
    SendAtSubscribe = 0,

    /// Send retained messages only if the subscription does not currently
    /// exist.
    SendIfNew = 1,

    /// Do not send retained messages.
    DoNotSend = 2,
}

impl TryFrom<u8> for RetainHandling {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::SendAtSubscribe),
            1 => Ok(Self::SendIfNew),
            2 => Ok(Self::DoNotSend),
            _ => Err(DecodeError::InvalidPacketFlags),
        }
    }
}

/// Subscription options byte of an MQTT 5 SUBSCRIBE entry.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    pub qos: QoS,
    /// Application messages are not forwarded to a connection with a client
    /// id equal to the publisher's [MQTT-3.8.3-3].
    pub no_local: bool,
    /// Keep the retain flag of forwarded messages as published.
    pub retain_as_published: bool,
    pub retain_handling: RetainHandling,
}

impl SubscriptionOptions {
    const fn to_byte(self) -> u8 {
        let mut byte = self.qos as u8;
        if self.no_local {
            byte |= 0b0000_0100;
        }
        if self.retain_as_published {
            byte |= 0b0000_1000;
        }
        byte |= (self.retain_handling as u8) << 4;
        byte
    }
}

impl TryFrom<u8> for SubscriptionOptions {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        // Bits 6 and 7 of the subscription options byte are reserved and
        // MUST be set to 0 [MQTT-3.8.3-5].
        if v & 0b1100_0000 != 0 {
            return Err(DecodeError::InvalidPacketFlags);
        }
        Ok(Self {
            qos: QoS::try_from(v & 0b0000_0011)?,
            no_local: v & 0b0000_0100 != 0,
            retain_as_published: v & 0b0000_1000 != 0,
            retain_handling: RetainHandling::try_from((v & 0b0011_0000) >> 4)?,
        })
    }
}

/// One topic filter / options pair of a SUBSCRIBE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTopic {
    filter: TopicFilter,
    options: SubscriptionOptions,
}

impl SubscribeTopic {
    /// Create a new entry.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is not a valid topic filter.
    pub fn new(filter: &str, options: SubscriptionOptions) -> Result<Self, DecodeError> {
        let filter = TopicFilter::parse(filter).map_err(|_| DecodeError::InvalidTopicFilter)?;
        Ok(Self { filter, options })
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter.as_str()
    }

    #[must_use]
    pub const fn options(&self) -> SubscriptionOptions {
        self.options
    }
}

/// Create one or more subscriptions, MQTT 5 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    packet_id: PacketId,
    properties: Properties,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    /// Create a single-filter subscribe packet.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is invalid.
    pub fn new(packet_id: PacketId, filter: &str, qos: QoS) -> Result<Self, DecodeError> {
        let options = SubscriptionOptions {
            qos,
            ..SubscriptionOptions::default()
        };
        Ok(Self {
            packet_id,
            properties: Properties::default(),
            topics: vec![SubscribeTopic::new(filter, options)?],
        })
    }

    #[must_use]
    pub fn with_topics(packet_id: PacketId, topics: Vec<SubscribeTopic>) -> Self {
        Self {
            packet_id,
            properties: Properties::default(),
            topics,
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }

    /// The subscription identifier, if the client supplied one.
    #[must_use]
    pub fn subscription_id(&self) -> Option<u32> {
        self.properties.subscription_identifiers.first().copied()
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.topics.is_empty() {
            return Err(EncodeError::InvalidPacketData);
        }
        let remaining_length = 2
            + self.properties.bytes_with_length()
            + self
                .topics
                .iter()
                .map(|t| 2 + t.filter().len() + 1)
                .sum::<usize>();
        let fixed_header = FixedHeader::new(PacketType::Subscribe, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        written += self.properties.encode(buf)?;
        for topic in &self.topics {
            written += write_string(buf, topic.filter())?;
            written += write_u8(buf, topic.options().to_byte());
        }
        Ok(written)
    }
}

impl DecodePacket for SubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Subscribe {
            return Err(DecodeError::InvalidPacketType);
        }
        let end = ba.offset() + fixed_header.remaining_length();

        let packet_id = ba.read_u16()?;
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketId);
        }
        let properties = Properties::decode(ba)?;

        let mut topics = Vec::new();
        while ba.offset() < end {
            let filter = ba.read_string()?;
            let options = SubscriptionOptions::try_from(ba.read_byte()?)?;
            topics.push(SubscribeTopic::new(&filter, options)?);
        }
        if topics.is_empty() {
            return Err(DecodeError::EmptyTopicFilter);
        }
        Ok(Self {
            packet_id,
            properties,
            topics,
        })
    }
}

impl Packet for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_round_trip() {
        let options = SubscriptionOptions {
            qos: QoS::AtLeastOnce,
            no_local: true,
            retain_as_published: true,
            retain_handling: RetainHandling::SendIfNew,
        };
        let mut packet = SubscribePacket::with_topics(
            7,
            vec![SubscribeTopic::new("a/+", options).unwrap()],
        );
        packet.properties_mut().subscription_identifiers = vec![7];

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = SubscribePacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.subscription_id(), Some(7));
        assert_eq!(decoded.topics()[0].options(), options);
    }

    #[test]
    fn test_reserved_option_bits_rejected() {
        assert!(SubscriptionOptions::try_from(0b1000_0001).is_err());
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_string, write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS, TopicFilter,
};

/// One topic filter / requested QoS pair of a SUBSCRIBE payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeTopic {
    filter: TopicFilter,
    qos: QoS,
}

impl SubscribeTopic {
    /// Create a new entry.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is not a valid topic filter.
    pub fn new(filter: &str, qos: QoS) -> Result<Self, DecodeError> {
        let filter = TopicFilter::parse(filter).map_err(|_| DecodeError::InvalidTopicFilter)?;
        Ok(Self { filter, qos })
    }

    #[must_use]
    pub fn filter(&self) -> &str {
        self.filter.as_str()
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }
}

/// Create one or more subscriptions.
///
/// The payload of a SUBSCRIBE packet MUST contain at least one topic filter
/// and QoS pair [MQTT-3.8.3-3].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribePacket {
    packet_id: PacketId,
    topics: Vec<SubscribeTopic>,
}

impl SubscribePacket {
    /// Create a single-filter subscribe packet.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is invalid.
    pub fn new(packet_id: PacketId, filter: &str, qos: QoS) -> Result<Self, DecodeError> {
        Ok(Self {
            packet_id,
            topics: vec![SubscribeTopic::new(filter, qos)?],
        })
    }

    #[must_use]
    pub const fn with_topics(packet_id: PacketId, topics: Vec<SubscribeTopic>) -> Self {
        Self { packet_id, topics }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn topics(&self) -> &[SubscribeTopic] {
        &self.topics
    }
}

impl EncodePacket for SubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.topics.is_empty() {
            return Err(EncodeError::InvalidPacketData);
        }
        let remaining_length = 2 + self
            .topics
            .iter()
            .map(|t| 2 + t.filter().len() + 1)
            .sum::<usize>();
        let fixed_header = FixedHeader::new(PacketType::Subscribe, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        for topic in &self.topics {
            written += write_string(buf, topic.filter())?;
            written += write_u8(buf, topic.qos() as u8);
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

        let mut topics = Vec::new();
        while ba.offset() < end {
            let filter = ba.read_string()?;
            let qos_byte = ba.read_byte()?;
            // The upper 6 bits of the requested QoS byte are reserved; the
            // server MUST treat a SUBSCRIBE packet as malformed if any are
            // non-zero [MQTT-3-8.3-4].
            if qos_byte & 0b1111_1100 != 0 {
                return Err(DecodeError::InvalidQoS);
            }
            let qos = QoS::try_from(qos_byte)?;
            topics.push(SubscribeTopic::new(&filter, qos)?);
        }

        if topics.is_empty() {
            return Err(DecodeError::EmptyTopicFilter);
        }
        Ok(Self { packet_id, topics })
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
        let packet = SubscribePacket::with_topics(
            9,
            vec![
                SubscribeTopic::new("home/#", QoS::AtLeastOnce).unwrap(),
                SubscribeTopic::new("office/+/temp", QoS::AtMostOnce).unwrap(),
            ],
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x82);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(SubscribePacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_empty_payload_rejected() {
        // SUBSCRIBE with only a packet id in the body.
        let buf = [0x82, 0x02, 0x00, 0x09];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SubscribePacket::decode(&mut ba).unwrap_err(),
            DecodeError::EmptyTopicFilter
        );
    }

    #[test]
    fn test_reserved_qos_bits_rejected() {
        let packet = SubscribePacket::new(9, "a/b", QoS::AtMostOnce).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] = 0b0100_0000;

        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            SubscribePacket::decode(&mut ba).unwrap_err(),
            DecodeError::InvalidQoS
        );
    }
}

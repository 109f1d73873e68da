// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;

use crate::byte_array::{write_string, write_u16};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS, TopicName,
};

/// Transport an application message from client to server or from server
/// to client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    topic: TopicName,
    qos: QoS,
    retain: bool,
    dup: bool,
    /// Only present when QoS is 1 or 2.
    packet_id: PacketId,
    payload: Bytes,
}

impl PublishPacket {
    /// Create a new publish packet.
    ///
    /// # Errors
    ///
    /// Returns error if `topic` is not a valid topic name.
    pub fn new(topic: &str, qos: QoS, payload: Bytes) -> Result<Self, DecodeError> {
        let topic = TopicName::parse(topic).map_err(|_| DecodeError::InvalidTopicName)?;
        Ok(Self {
            topic,
            qos,
            retain: false,
            dup: false,
            packet_id: 0,
            payload,
        })
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        self.topic.as_str()
    }

    #[must_use]
    pub const fn qos(&self) -> QoS {
        self.qos
    }

    #[must_use]
    pub const fn retain(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) -> &mut Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub const fn dup(&self) -> bool {
        self.dup
    }

    /// The DUP flag MUST be set to 1 when the client or server attempts to
    /// re-deliver a PUBLISH packet [MQTT-3.3.1-1].
    pub fn set_dup(&mut self, dup: bool) -> &mut Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    pub fn set_packet_id(&mut self, packet_id: PacketId) -> &mut Self {
        self.packet_id = packet_id;
        self
    }

    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn remaining_length(&self) -> usize {
        let packet_id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        2 + self.topic.as_str().len() + packet_id_len + self.payload.len()
    }
}

impl EncodePacket for PublishPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.qos != QoS::AtMostOnce && self.packet_id == 0 {
            return Err(EncodeError::InvalidPacketData);
        }
        let fixed_header = FixedHeader::new(
            PacketType::Publish {
                dup: self.dup,
                qos: self.qos,
                retain: self.retain,
            },
            self.remaining_length(),
        )?;
        let mut written = fixed_header.encode(buf)?;
        written += write_string(buf, self.topic.as_str())?;
        if self.qos != QoS::AtMostOnce {
            written += write_u16(buf, self.packet_id);
        }
        buf.extend_from_slice(&self.payload);
        Ok(written + self.payload.len())
    }
}

impl DecodePacket for PublishPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        let PacketType::Publish { dup, qos, retain } = fixed_header.packet_type() else {
            return Err(DecodeError::InvalidPacketType);
        };
        // The DUP flag MUST be set to 0 for all QoS 0 messages
        // [MQTT-3.3.1-2].
        if dup && qos == QoS::AtMostOnce {
            return Err(DecodeError::InvalidPacketFlags);
        }

        let body_start = ba.offset();
        let topic = ba.read_string()?;
        let topic = TopicName::parse(&topic).map_err(|_| DecodeError::InvalidTopicName)?;

        let packet_id = if qos == QoS::AtMostOnce {
            0
        } else {
            let id = ba.read_u16()?;
            if id == 0 {
                return Err(DecodeError::InvalidPacketId);
            }
            id
        };

        let header_len = ba.offset() - body_start;
        let payload_len = fixed_header
            .remaining_length()
            .checked_sub(header_len)
            .ok_or(DecodeError::InvalidRemainingLength)?;
        let payload = Bytes::copy_from_slice(ba.read_bytes(payload_len)?);

        Ok(Self {
            topic,
            qos,
            retain,
            dup,
            packet_id,
            payload,
        })
    }
}

impl Packet for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish {
            dup: self.dup,
            qos: self.qos,
            retain: self.retain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_qos0_round_trip() {
        let mut packet =
            PublishPacket::new("home/temp", QoS::AtMostOnce, Bytes::from_static(b"21")).unwrap();
        packet.set_retain(true);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0b0011_0001);

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_publish_qos2_round_trip() {
        let mut packet =
            PublishPacket::new("a/b", QoS::ExactOnce, Bytes::from_static(b"x")).unwrap();
        packet.set_packet_id(17);

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.packet_id(), 17);
        assert_eq!(decoded.qos(), QoS::ExactOnce);
    }

    #[test]
    fn test_qos1_requires_packet_id() {
        let packet = PublishPacket::new("a/b", QoS::AtLeastOnce, Bytes::new()).unwrap();
        let mut buf = Vec::new();
        assert_eq!(
            packet.encode(&mut buf).unwrap_err(),
            EncodeError::InvalidPacketData
        );
    }

    #[test]
    fn test_wildcard_topic_rejected() {
        assert!(PublishPacket::new("a/+", QoS::AtMostOnce, Bytes::new()).is_err());
    }
}

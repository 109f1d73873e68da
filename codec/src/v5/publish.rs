// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use bytes::Bytes;

use crate::byte_array::{write_string, write_u16};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, QoS, TopicName,
};

/// Transport an application message, MQTT 5 form with properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishPacket {
    topic: TopicName,
    qos: QoS,
    retain: bool,
    dup: bool,
    packet_id: PacketId,
    properties: Properties,
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
            properties: Properties::default(),
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
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn set_properties(&mut self, properties: Properties) -> &mut Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    fn remaining_length(&self) -> usize {
        let packet_id_len = if self.qos == QoS::AtMostOnce { 0 } else { 2 };
        2 + self.topic.as_str().len()
            + packet_id_len
            + self.properties.bytes_with_length()
            + self.payload.len()
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
        written += self.properties.encode(buf)?;
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
        let properties = Properties::decode(ba)?;

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
            properties,
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
    fn test_publish_round_trip() {
        let mut packet =
            PublishPacket::new("a/b", QoS::AtLeastOnce, Bytes::from_static(b"x")).unwrap();
        packet.set_packet_id(3);
        packet.properties_mut().message_expiry_interval = Some(10);
        packet.properties_mut().subscription_identifiers = vec![7, 9];
        packet
            .properties_mut()
            .user_properties
            .push(("k".to_string(), "v".to_string()));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        let decoded = PublishPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_empty_properties_payload() {
        let packet = PublishPacket::new("t", QoS::AtMostOnce, Bytes::new()).unwrap();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // topic + one property length byte, no packet id, no payload.
        assert_eq!(buf, [0x30, 0x04, 0x00, 0x01, b't', 0x00]);
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, ReasonCode,
};

/// Response to a PUBLISH packet with QoS 1.
///
/// The reason code and properties may be omitted on the wire when the
/// reason is success and there are no properties [MQTT-3.4.2.1].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishAckPacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl EncodePacket for PublishAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let short_form = self.reason_code == ReasonCode::Success && self.properties.is_empty();
        let remaining_length = if short_form {
            2
        } else {
            2 + 1 + self.properties.bytes_with_length()
        };
        let fixed_header = FixedHeader::new(PacketType::PublishAck, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        if !short_form {
            written += write_u8(buf, self.reason_code as u8);
            written += self.properties.encode(buf)?;
        }
        Ok(written)
    }
}

impl DecodePacket for PublishAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PublishAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let packet_id = ba.read_u16()?;
        let reason_code = if fixed_header.remaining_length() > 2 {
            ReasonCode::try_from(ba.read_byte()?)?
        } else {
            ReasonCode::Success
        };
        let properties = if fixed_header.remaining_length() > 3 {
            Properties::decode(ba)?
        } else {
            Properties::default()
        };
        Ok(Self {
            packet_id,
            reason_code,
            properties,
        })
    }
}

impl Packet for PublishAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_form() {
        let packet = PublishAckPacket::new(5, ReasonCode::Success);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x40, 0x02, 0x00, 0x05]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(PublishAckPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_with_reason_code() {
        let packet = PublishAckPacket::new(5, ReasonCode::NotAuthorized);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = PublishAckPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded.reason_code(), ReasonCode::NotAuthorized);
        assert!(decoded.reason_code().is_error());
    }
}

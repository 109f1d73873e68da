// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, ReasonCode,
};

/// Response to a PUBREC packet, QoS 2 step two.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReleasePacket {
    packet_id: PacketId,
    reason_code: ReasonCode,
    properties: Properties,
}

impl PublishReleasePacket {
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
}

impl EncodePacket for PublishReleasePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let short_form = self.reason_code == ReasonCode::Success && self.properties.is_empty();
        let remaining_length = if short_form {
            2
        } else {
            2 + 1 + self.properties.bytes_with_length()
        };
        let fixed_header = FixedHeader::new(PacketType::PublishRelease, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        if !short_form {
            written += write_u8(buf, self.reason_code as u8);
            written += self.properties.encode(buf)?;
        }
        Ok(written)
    }
}

impl DecodePacket for PublishReleasePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::PublishRelease {
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

impl Packet for PublishReleasePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::PublishRelease
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_short_form() {
        let packet = PublishReleasePacket::new(17, ReasonCode::Success);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x62, 0x02, 0x00, 0x11]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(PublishReleasePacket::decode(&mut ba).unwrap(), packet);
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::write_u8;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, Properties, ReasonCode,
};

/// Final packet of a connection, sent by either end.
///
/// The reason code and properties may be omitted when the reason is normal
/// disconnection and there are no properties.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DisconnectPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub const fn reason_code(&self) -> ReasonCode {
        self.reason_code
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }
}

impl EncodePacket for DisconnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let short_form = self.reason_code == ReasonCode::Success && self.properties.is_empty();
        let remaining_length = if short_form {
            0
        } else {
            1 + self.properties.bytes_with_length()
        };
        let fixed_header = FixedHeader::new(PacketType::Disconnect, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        if !short_form {
            written += write_u8(buf, self.reason_code as u8);
            written += self.properties.encode(buf)?;
        }
        Ok(written)
    }
}

impl DecodePacket for DisconnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Disconnect {
            return Err(DecodeError::InvalidPacketType);
        }
        let reason_code = if fixed_header.remaining_length() > 0 {
            ReasonCode::try_from(ba.read_byte()?)?
        } else {
            ReasonCode::Success
        };
        let properties = if fixed_header.remaining_length() > 1 {
            Properties::decode(ba)?
        } else {
            Properties::default()
        };
        Ok(Self {
            reason_code,
            properties,
        })
    }
}

impl Packet for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_round_trip() {
        let packet = DisconnectPacket::new(ReasonCode::SessionTakenOver);
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, [0xe0, 0x02, 0x8e, 0x00]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(DisconnectPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_disconnect_short_form() {
        let packet = DisconnectPacket::default();
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, [0xe0, 0x00]);
    }
}

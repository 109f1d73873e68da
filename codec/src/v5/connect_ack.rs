// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::write_u8;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, Properties, ReasonCode,
};

/// Reply to an MQTT 5 CONNECT packet.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectAckPacket {
    session_present: bool,
    reason_code: ReasonCode,
    properties: Properties,
}

impl ConnectAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason_code: ReasonCode) -> Self {
        // If a Server sends a CONNACK packet containing a non-zero Reason
        // Code it MUST set Session Present to 0 [MQTT-3.2.2-6].
        let session_present = session_present && !reason_code.is_error();
        Self {
            session_present,
            reason_code,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub const fn session_present(&self) -> bool {
        self.session_present
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

impl EncodePacket for ConnectAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let remaining_length = 1 + 1 + self.properties.bytes_with_length();
        let fixed_header = FixedHeader::new(PacketType::ConnectAck, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u8(buf, u8::from(self.session_present));
        written += write_u8(buf, self.reason_code as u8);
        written += self.properties.encode(buf)?;
        Ok(written)
    }
}

impl DecodePacket for ConnectAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::ConnectAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let ack_flags = ba.read_byte()?;
        if ack_flags & 0b1111_1110 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let session_present = ack_flags & 0b0000_0001 == 0b0000_0001;
        let reason_code = ReasonCode::try_from(ba.read_byte()?)?;
        let properties = Properties::decode(ba)?;
        Ok(Self {
            session_present,
            reason_code,
            properties,
        })
    }
}

impl Packet for ConnectAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnectAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_ack_round_trip() {
        let mut packet = ConnectAckPacket::new(true, ReasonCode::Success);
        packet.properties_mut().receive_maximum = Some(32);
        packet.properties_mut().assigned_client_identifier = Some("taranis-auto-1".to_string());

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(ConnectAckPacket::decode(&mut ba).unwrap(), packet);
    }

    #[test]
    fn test_session_present_cleared_on_error() {
        let packet = ConnectAckPacket::new(true, ReasonCode::NotAuthorized);
        assert!(!packet.session_present());
    }
}

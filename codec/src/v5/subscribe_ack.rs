// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, ReasonCode,
};

/// Reply to an MQTT 5 SUBSCRIBE packet.
///
/// Contains one reason code per requested topic filter, in the same order
/// [MQTT-3.9.3-1].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reason_codes: Vec<ReasonCode>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, reason_code: ReasonCode) -> Self {
        Self {
            packet_id,
            properties: Properties::default(),
            reason_codes: vec![reason_code],
        }
    }

    #[must_use]
    pub fn with_reason_codes(packet_id: PacketId, reason_codes: Vec<ReasonCode>) -> Self {
        Self {
            packet_id,
            properties: Properties::default(),
            reason_codes,
        }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn reason_codes(&self) -> &[ReasonCode] {
        &self.reason_codes
    }
}

impl EncodePacket for SubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let remaining_length =
            2 + self.properties.bytes_with_length() + self.reason_codes.len();
        let fixed_header = FixedHeader::new(PacketType::SubscribeAck, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        written += self.properties.encode(buf)?;
        for reason_code in &self.reason_codes {
            written += write_u8(buf, *reason_code as u8);
        }
        Ok(written)
    }
}

impl DecodePacket for SubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::SubscribeAck {
            return Err(DecodeError::InvalidPacketType);
        }
        let end = ba.offset() + fixed_header.remaining_length();
        let packet_id = ba.read_u16()?;
        let properties = Properties::decode(ba)?;
        let mut reason_codes = Vec::new();
        while ba.offset() < end {
            reason_codes.push(ReasonCode::try_from(ba.read_byte()?)?);
        }
        Ok(Self {
            packet_id,
            properties,
            reason_codes,
        })
    }
}

impl Packet for SubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubscribeAck
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_ack_round_trip() {
        let packet = SubscribeAckPacket::with_reason_codes(
            7,
            vec![
                ReasonCode::GrantedQoS1,
                ReasonCode::Success,
                ReasonCode::NotAuthorized,
            ],
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        let mut ba = ByteArray::new(&buf);
        assert_eq!(SubscribeAckPacket::decode(&mut ba).unwrap(), packet);
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, ReasonCode,
};

/// Reply to an MQTT 5 UNSUBSCRIBE packet, one reason code per filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribeAckPacket {
    packet_id: PacketId,
    properties: Properties,
    reason_codes: Vec<ReasonCode>,
}

impl UnsubscribeAckPacket {
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

impl EncodePacket for UnsubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let remaining_length =
            2 + self.properties.bytes_with_length() + self.reason_codes.len();
        let fixed_header = FixedHeader::new(PacketType::UnsubscribeAck, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        written += self.properties.encode(buf)?;
        for reason_code in &self.reason_codes {
            written += write_u8(buf, *reason_code as u8);
        }
        Ok(written)
    }
}

impl DecodePacket for UnsubscribeAckPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::UnsubscribeAck {
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

impl Packet for UnsubscribeAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubscribeAck
    }
}

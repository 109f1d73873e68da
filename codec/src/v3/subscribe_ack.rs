// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_u16, write_u8};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, QoS,
};

const FAILURE_CODE: u8 = 0x80;

/// Result of one subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeAck {
    /// Subscription accepted with the granted maximum QoS.
    QoS(QoS),

    /// Subscription refused.
    Failed,
}

impl SubscribeAck {
    const fn to_byte(self) -> u8 {
        match self {
            Self::QoS(qos) => qos as u8,
            Self::Failed => FAILURE_CODE,
        }
    }
}

impl TryFrom<u8> for SubscribeAck {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        if v == FAILURE_CODE {
            Ok(Self::Failed)
        } else {
            Ok(Self::QoS(QoS::try_from(v)?))
        }
    }
}

/// Reply to a SUBSCRIBE packet.
///
/// The SUBACK packet MUST have the same packet identifier as the SUBSCRIBE
/// packet that it is acknowledging [MQTT-3.8.4-2], and contains one return
/// code per requested topic filter in the same order [MQTT-3.8.4-5].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeAckPacket {
    packet_id: PacketId,
    acks: Vec<SubscribeAck>,
}

impl SubscribeAckPacket {
    #[must_use]
    pub fn new(packet_id: PacketId, ack: SubscribeAck) -> Self {
        Self {
            packet_id,
            acks: vec![ack],
        }
    }

    #[must_use]
    pub const fn with_acks(packet_id: PacketId, acks: Vec<SubscribeAck>) -> Self {
        Self { packet_id, acks }
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn acks(&self) -> &[SubscribeAck] {
        &self.acks
    }
}

impl EncodePacket for SubscribeAckPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader::new(PacketType::SubscribeAck, 2 + self.acks.len())?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        for ack in &self.acks {
            written += write_u8(buf, ack.to_byte());
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
        let mut acks = Vec::new();
        while ba.offset() < end {
            acks.push(SubscribeAck::try_from(ba.read_byte()?)?);
        }
        Ok(Self { packet_id, acks })
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
        let packet = SubscribeAckPacket::with_acks(
            9,
            vec![
                SubscribeAck::QoS(QoS::AtLeastOnce),
                SubscribeAck::Failed,
                SubscribeAck::QoS(QoS::AtMostOnce),
            ],
        );
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf, [0x90, 0x05, 0x00, 0x09, 0x01, 0x80, 0x00]);

        let mut ba = ByteArray::new(&buf);
        assert_eq!(SubscribeAckPacket::decode(&mut ba).unwrap(), packet);
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, ProtocolLevel, QoS, VarInt,
};

/// Control packet type, with the per-type flag bits folded in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PacketType {
    /// Request to connect to broker.
    #[default]
    Connect,

    /// Broker reply to connect request.
    ConnectAck,

    /// Publish message.
    Publish { dup: bool, qos: QoS, retain: bool },

    /// Publish acknowledgement, QoS 1 final step.
    PublishAck,

    /// Publish received, QoS 2 step one.
    PublishReceived,

    /// Publish release, QoS 2 step two.
    PublishRelease,

    /// Publish complete, QoS 2 final step.
    PublishComplete,

    /// Client subscribe request.
    Subscribe,

    /// Subscribe acknowledgement.
    SubscribeAck,

    /// Unsubscribe request.
    Unsubscribe,

    /// Unsubscribe acknowledgement.
    UnsubscribeAck,

    /// Client ping request.
    PingRequest,

    /// Server ping response.
    PingResponse,

    /// Connection is being closed.
    Disconnect,

    /// Authentication exchange, MQTT 5 only.
    Auth,
}

impl PacketType {
    /// Byte length used in packet.
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl From<PacketType> for u8 {
    fn from(packet_type: PacketType) -> Self {
        let type_bits: Self = match packet_type {
            PacketType::Connect => 1,
            PacketType::ConnectAck => 2,
            PacketType::Publish { .. } => 3,
            PacketType::PublishAck => 4,
            PacketType::PublishReceived => 5,
            PacketType::PublishRelease => 6,
            PacketType::PublishComplete => 7,
            PacketType::Subscribe => 8,
            PacketType::SubscribeAck => 9,
            PacketType::Unsubscribe => 10,
            PacketType::UnsubscribeAck => 11,
            PacketType::PingRequest => 12,
            PacketType::PingResponse => 13,
            PacketType::Disconnect => 14,
            PacketType::Auth => 15,
        };
        let flag_bits: Self = match packet_type {
            PacketType::Publish { dup, qos, retain } => {
                let dup = if dup { 0b1000 } else { 0 };
                let qos = (qos as Self) << 1;
                let retain = Self::from(retain);
                dup | qos | retain
            }
            // Bits 3,2,1 and 0 of the fixed header in the PUBREL, SUBSCRIBE
            // and UNSUBSCRIBE packets are reserved and MUST be set to
            // 0,0,1,0 [MQTT-3.6.1-1].
            PacketType::PublishRelease | PacketType::Subscribe | PacketType::Unsubscribe => 0b0010,
            _ => 0b0000,
        };
        (type_bits << 4) | flag_bits
    }
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    /// Parse packet type and flags from the first header byte.
    ///
    /// Where a flag bit is marked as reserved it MUST be set to the listed
    /// value; if invalid flags are received, the receiver MUST close the
    /// network connection [MQTT-2.2.2-2].
    ///
    /// # Errors
    ///
    /// Returns `InvalidPacketFlags` if reserved flag bits hold an unexpected
    /// value and `InvalidPacketType` for type bits 0.
    fn try_from(v: u8) -> Result<Self, Self::Error> {
        let type_bits = (v & 0b1111_0000) >> 4;
        let flag = v & 0b0000_1111;
        let packet_type = match (type_bits, flag) {
            (1, 0b0000) => Self::Connect,
            (2, 0b0000) => Self::ConnectAck,
            (3, _) => {
                let dup = flag & 0b1000 == 0b1000;
                let retain = flag & 0b0001 == 0b0001;
                let qos = QoS::try_from((flag & 0b0110) >> 1)
                    .map_err(|_| DecodeError::InvalidPacketFlags)?;
                Self::Publish { dup, qos, retain }
            }
            (4, 0b0000) => Self::PublishAck,
            (5, 0b0000) => Self::PublishReceived,
            (6, 0b0010) => Self::PublishRelease,
            (7, 0b0000) => Self::PublishComplete,
            (8, 0b0010) => Self::Subscribe,
            (9, 0b0000) => Self::SubscribeAck,
            (10, 0b0010) => Self::Unsubscribe,
            (11, 0b0000) => Self::UnsubscribeAck,
            (12, 0b0000) => Self::PingRequest,
            (13, 0b0000) => Self::PingResponse,
            (14, 0b0000) => Self::Disconnect,
            (15, 0b0000) => Self::Auth,
            (0, _) => {
                log::error!("header: Invalid packet type bits: {type_bits:#b}");
                return Err(DecodeError::InvalidPacketType);
            }
            (_, _) => {
                log::error!("header: Invalid flag bits {flag:#b} for type {type_bits}");
                return Err(DecodeError::InvalidPacketFlags);
            }
        };
        Ok(packet_type)
    }
}

/// Fixed header part of a control packet.
///
/// ```txt
///  7 6 5 4 3 2 1 0
/// +-------+-------+
/// | Type  | Flags |
/// +-------+-------+
/// | Remaining Len |
/// +-------+-------+
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedHeader {
    packet_type: PacketType,
    remaining_length: VarInt,
}

impl FixedHeader {
    /// Create a new fixed header.
    ///
    /// # Errors
    ///
    /// Returns error if `remaining_length` exceeds the protocol maximum.
    pub const fn new(packet_type: PacketType, remaining_length: usize) -> Result<Self, EncodeError> {
        let remaining_length = match VarInt::new(remaining_length) {
            Ok(v) => v,
            Err(err) => return Err(err),
        };
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }

    #[must_use]
    pub const fn packet_type(&self) -> PacketType {
        self.packet_type
    }

    #[must_use]
    pub const fn remaining_length(&self) -> usize {
        self.remaining_length.value()
    }

    /// Byte length of the encoded header.
    #[must_use]
    pub const fn bytes(&self) -> usize {
        PacketType::bytes() + self.remaining_length.bytes()
    }

    /// The Auth packet only exists in MQTT 5.
    #[must_use]
    pub fn is_valid_for(&self, protocol_level: ProtocolLevel) -> bool {
        !(self.packet_type == PacketType::Auth && protocol_level != ProtocolLevel::V5)
    }
}

impl DecodePacket for FixedHeader {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let flag = ba.read_byte()?;
        let packet_type = PacketType::try_from(flag)?;
        let remaining_length = VarInt::decode(ba)?;
        if remaining_length.value() > ba.remaining() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(Self {
            packet_type,
            remaining_length,
        })
    }
}

impl EncodePacket for FixedHeader {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        buf.push(u8::from(self.packet_type));
        let len = self.remaining_length.encode(buf)?;
        Ok(PacketType::bytes() + len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let mut buf = Vec::new();
        let header = FixedHeader::new(
            PacketType::Publish {
                dup: false,
                qos: QoS::AtLeastOnce,
                retain: true,
            },
            10,
        )
        .unwrap();
        assert_eq!(header.encode(&mut buf).unwrap(), 2);
        assert_eq!(buf[0], 0b0011_0011);

        buf.extend_from_slice(&[0; 10]);
        let mut ba = ByteArray::new(&buf);
        let decoded = FixedHeader::decode(&mut ba).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_reserved_flags_rejected() {
        // SUBSCRIBE with flag bits 0 is malformed.
        let buf = [0b1000_0000, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba).unwrap_err(),
            DecodeError::InvalidPacketFlags
        );
    }

    #[test]
    fn test_truncated_body_rejected() {
        // Remaining length larger than the actual buffer.
        let buf = [0b1110_0000, 0x04, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            FixedHeader::decode(&mut ba).unwrap_err(),
            DecodeError::InvalidRemainingLength
        );
    }
}

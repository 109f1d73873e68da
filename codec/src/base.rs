// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ByteArray, DecodeError, EncodeError, PacketType};

/// Packet identifier, non-zero in packets which carry one.
pub type PacketId = u16;

/// Serialize a packet into a byte buffer.
pub trait EncodePacket {
    /// Append the encoded form of `self` to `buf`, returning the number of
    /// bytes written.
    ///
    /// # Errors
    ///
    /// Returns error when a field cannot be represented on the wire.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError>;
}

/// Parse a packet from a byte buffer.
pub trait DecodePacket: Sized {
    /// Decode one value starting at the reader's current offset.
    ///
    /// # Errors
    ///
    /// Returns error when the bytes do not form a valid packet.
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError>;
}

/// Common behaviour of all control packets.
pub trait Packet: Send + fmt::Debug {
    fn packet_type(&self) -> PacketType;
}

/// Quality of service levels for publish delivery.
#[repr(u8)]
#[derive(
    Clone, Copy, Debug, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum QoS {
    /// At most once delivery.
    #[default]
    AtMostOnce = 0,

    /// At least once delivery.
    AtLeastOnce = 1,

    /// Exactly once delivery.
    ExactOnce = 2,
}

impl QoS {
    #[must_use]
    pub const fn bytes() -> usize {
        1
    }
}

impl TryFrom<u8> for QoS {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactOnce),
            _ => Err(DecodeError::InvalidQoS),
        }
    }
}

/// MQTT protocol version as carried in the CONNECT variable header.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolLevel {
    V31 = 3,

    #[default]
    V311 = 4,

    V5 = 5,
}

impl TryFrom<u8> for ProtocolLevel {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            3 => Ok(Self::V31),
            4 => Ok(Self::V311),
            5 => Ok(Self::V5),
            _ => Err(DecodeError::InvalidProtocolLevel),
        }
    }
}

impl fmt::Display for ProtocolLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::V31 => write!(f, "3.1"),
            Self::V311 => write!(f, "3.1.1"),
            Self::V5 => write!(f, "5.0"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_order() {
        assert!(QoS::AtMostOnce < QoS::AtLeastOnce);
        assert_eq!(QoS::AtLeastOnce.max(QoS::ExactOnce), QoS::ExactOnce);
        assert_eq!(QoS::try_from(3).unwrap_err(), DecodeError::InvalidQoS);
    }
}

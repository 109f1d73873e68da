// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::write_u8;
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, Properties, ReasonCode,
};

/// Extended authentication exchange, MQTT 5 only.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthPacket {
    reason_code: ReasonCode,
    properties: Properties,
}

impl AuthPacket {
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

impl EncodePacket for AuthPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let short_form = self.reason_code == ReasonCode::Success && self.properties.is_empty();
        let remaining_length = if short_form {
            0
        } else {
            1 + self.properties.bytes_with_length()
        };
        let fixed_header = FixedHeader::new(PacketType::Auth, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        if !short_form {
            written += write_u8(buf, self.reason_code as u8);
            written += self.properties.encode(buf)?;
        }
        Ok(written)
    }
}

impl DecodePacket for AuthPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Auth {
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

impl Packet for AuthPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Auth
    }
}

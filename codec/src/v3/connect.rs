// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_binary, write_string, write_u16, write_u8};
use crate::{
    utils, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, ProtocolLevel, QoS,
};

const PROTOCOL_NAME_V311: &str = "MQTT";
const PROTOCOL_NAME_V31: &str = "MQIsdp";

/// Will message carried in the CONNECT payload.
///
/// Stored by the server and published when the network connection is
/// closed without a clean DISCONNECT.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Will {
    pub topic: String,
    pub message: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// The first packet sent from the client to the server.
///
/// After a network connection is established by a client to a server, the
/// first packet sent from the client to the server MUST be a CONNECT packet
/// [MQTT-3.1.0-1].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    protocol_level: ProtocolLevel,
    keep_alive: u16,
    clean_session: bool,
    client_id: String,
    will: Option<Will>,
    username: Option<String>,
    password: Option<Vec<u8>>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        Self {
            protocol_level: ProtocolLevel::V311,
            keep_alive: 60,
            clean_session: true,
            client_id: client_id.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn protocol_level(&self) -> ProtocolLevel {
        self.protocol_level
    }

    #[must_use]
    pub const fn keep_alive(&self) -> u16 {
        self.keep_alive
    }

    pub fn set_keep_alive(&mut self, keep_alive: u16) -> &mut Self {
        self.keep_alive = keep_alive;
        self
    }

    #[must_use]
    pub const fn clean_session(&self) -> bool {
        self.clean_session
    }

    pub fn set_clean_session(&mut self, clean_session: bool) -> &mut Self {
        self.clean_session = clean_session;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Replace the client id, used when the server assigns one.
    ///
    /// # Errors
    ///
    /// Returns error if `client_id` contains invalid characters.
    pub fn set_client_id(&mut self, client_id: &str) -> Result<&mut Self, DecodeError> {
        if !utils::is_valid_client_id(client_id) {
            return Err(DecodeError::InvalidClientId);
        }
        self.client_id = client_id.to_string();
        Ok(self)
    }

    #[must_use]
    pub const fn will(&self) -> Option<&Will> {
        self.will.as_ref()
    }

    pub fn set_will(&mut self, will: Option<Will>) -> &mut Self {
        self.will = will;
        self
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn set_username(&mut self, username: Option<&str>) -> &mut Self {
        self.username = username.map(ToString::to_string);
        self
    }

    #[must_use]
    pub fn password(&self) -> Option<&[u8]> {
        self.password.as_deref()
    }

    pub fn set_password(&mut self, password: Option<&[u8]>) -> &mut Self {
        self.password = password.map(<[u8]>::to_vec);
        self
    }

    fn protocol_name(&self) -> &'static str {
        match self.protocol_level {
            ProtocolLevel::V31 => PROTOCOL_NAME_V31,
            ProtocolLevel::V311 | ProtocolLevel::V5 => PROTOCOL_NAME_V311,
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.username.is_some() {
            flags |= 0b1000_0000;
        }
        if self.password.is_some() {
            flags |= 0b0100_0000;
        }
        if let Some(will) = &self.will {
            flags |= 0b0000_0100;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= 0b0010_0000;
            }
        }
        if self.clean_session {
            flags |= 0b0000_0010;
        }
        flags
    }

    fn remaining_length(&self) -> usize {
        let mut len = 2 + self.protocol_name().len() // protocol name
            + 1 // protocol level
            + 1 // connect flags
            + 2 // keep alive
            + 2 + self.client_id.len();
        if let Some(will) = &self.will {
            len += 2 + will.topic.len() + 2 + will.message.len();
        }
        if let Some(username) = &self.username {
            len += 2 + username.len();
        }
        if let Some(password) = &self.password {
            len += 2 + password.len();
        }
        len
    }
}

impl EncodePacket for ConnectPacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let fixed_header = FixedHeader::new(PacketType::Connect, self.remaining_length())?;
        let mut written = fixed_header.encode(buf)?;
        written += write_string(buf, self.protocol_name())?;
        written += write_u8(buf, self.protocol_level as u8);
        written += write_u8(buf, self.connect_flags());
        written += write_u16(buf, self.keep_alive);
        written += write_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            written += write_string(buf, &will.topic)?;
            written += write_binary(buf, &will.message)?;
        }
        if let Some(username) = &self.username {
            written += write_string(buf, username)?;
        }
        if let Some(password) = &self.password {
            written += write_binary(buf, password)?;
        }
        Ok(written)
    }
}

impl DecodePacket for ConnectPacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Connect {
            return Err(DecodeError::InvalidPacketType);
        }

        let protocol_name = ba.read_string()?;
        if protocol_name != PROTOCOL_NAME_V311 && protocol_name != PROTOCOL_NAME_V31 {
            return Err(DecodeError::InvalidProtocolName);
        }
        let protocol_level = ProtocolLevel::try_from(ba.read_byte()?)?;

        let flags = ba.read_byte()?;
        // The Server MUST validate that the reserved flag in the CONNECT
        // packet is set to zero and disconnect the Client if it is not zero
        // [MQTT-3.1.2-3].
        if flags & 0b0000_0001 != 0 {
            return Err(DecodeError::InvalidConnectFlags);
        }
        let has_username = flags & 0b1000_0000 != 0;
        let has_password = flags & 0b0100_0000 != 0;
        let will_retain = flags & 0b0010_0000 != 0;
        let will_qos = QoS::try_from((flags & 0b0001_1000) >> 3)?;
        let has_will = flags & 0b0000_0100 != 0;
        let clean_session = flags & 0b0000_0010 != 0;
        // If the Will Flag is set to 0, then Will QoS and Will Retain MUST
        // be set to zero [MQTT-3.1.2-13].
        if !has_will && (will_retain || will_qos != QoS::AtMostOnce) {
            return Err(DecodeError::InvalidConnectFlags);
        }

        let keep_alive = ba.read_u16()?;

        let client_id = ba.read_string()?;
        if !client_id.is_empty() && !utils::is_valid_client_id(&client_id) {
            return Err(DecodeError::InvalidClientId);
        }

        let will = if has_will {
            let topic = ba.read_string()?;
            let message = ba.read_binary()?;
            Some(Will {
                topic,
                message,
                qos: will_qos,
                retain: will_retain,
            })
        } else {
            None
        };
        let username = if has_username {
            Some(ba.read_string()?)
        } else {
            None
        };
        let password = if has_password {
            Some(ba.read_binary()?)
        } else {
            None
        };

        Ok(Self {
            protocol_level,
            keep_alive,
            clean_session,
            client_id,
            will,
            username,
            password,
        })
    }
}

impl Packet for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_round_trip() {
        let mut packet = ConnectPacket::new("sensor-7");
        packet.set_keep_alive(30).set_clean_session(false);
        packet.set_will(Some(Will {
            topic: "stat/sensor-7".to_string(),
            message: b"offline".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: true,
        }));
        packet.set_username(Some("alice"));
        packet.set_password(Some(b"secret"));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_reserved_flag_rejected() {
        let packet = ConnectPacket::new("c");
        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();
        // Flip the reserved connect flag bit. The flags byte sits in front
        // of the keep alive word and the 3 byte client id field.
        let flags_index = buf.len() - 6;
        buf[flags_index] |= 0b0000_0001;

        let mut ba = ByteArray::new(&buf);
        assert!(ConnectPacket::decode(&mut ba).is_err());
    }
}

// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_binary, write_string, write_u16, write_u8};
use crate::{
    utils, ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet,
    PacketType, Properties, ProtocolLevel, QoS,
};

const PROTOCOL_NAME: &str = "MQTT";

/// Will message carried in the MQTT 5 CONNECT payload.
///
/// In addition to the 3.1.1 fields the will has its own property block,
/// most notably the will delay interval.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Will {
    pub properties: Properties,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

/// The first packet sent from the client to the server.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectPacket {
    keep_alive: u16,
    clean_start: bool,
    properties: Properties,
    client_id: String,
    will: Option<Will>,
    username: Option<String>,
    password: Option<Vec<u8>>,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        Self {
            keep_alive: 60,
            clean_start: true,
            client_id: client_id.to_string(),
            ..Self::default()
        }
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
    pub const fn clean_start(&self) -> bool {
        self.clean_start
    }

    pub fn set_clean_start(&mut self, clean_start: bool) -> &mut Self {
        self.clean_start = clean_start;
        self
    }

    #[must_use]
    pub const fn properties(&self) -> &Properties {
        &self.properties
    }

    #[must_use]
    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
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

    /// Session expiry requested by the client, zero when absent.
    #[must_use]
    pub fn session_expiry_interval(&self) -> u32 {
        self.properties.session_expiry_interval.unwrap_or(0)
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
        if self.clean_start {
            flags |= 0b0000_0010;
        }
        flags
    }

    fn remaining_length(&self) -> usize {
        let mut len = 2 + PROTOCOL_NAME.len() // protocol name
            + 1 // protocol level
            + 1 // connect flags
            + 2 // keep alive
            + self.properties.bytes_with_length()
            + 2 + self.client_id.len();
        if let Some(will) = &self.will {
            len += will.properties.bytes_with_length();
            len += 2 + will.topic.len() + 2 + will.payload.len();
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
        written += write_string(buf, PROTOCOL_NAME)?;
        written += write_u8(buf, ProtocolLevel::V5 as u8);
        written += write_u8(buf, self.connect_flags());
        written += write_u16(buf, self.keep_alive);
        written += self.properties.encode(buf)?;
        written += write_string(buf, &self.client_id)?;
        if let Some(will) = &self.will {
            written += will.properties.encode(buf)?;
            written += write_string(buf, &will.topic)?;
            written += write_binary(buf, &will.payload)?;
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

        if ba.read_string()? != PROTOCOL_NAME {
            return Err(DecodeError::InvalidProtocolName);
        }
        if ProtocolLevel::try_from(ba.read_byte()?)? != ProtocolLevel::V5 {
            return Err(DecodeError::InvalidProtocolLevel);
        }

        let flags = ba.read_byte()?;
        if flags & 0b0000_0001 != 0 {
            // The Server MUST validate that the reserved flag is set to zero
            // [MQTT-3.1.2-3].
            return Err(DecodeError::InvalidConnectFlags);
        }
        let has_username = flags & 0b1000_0000 != 0;
        let has_password = flags & 0b0100_0000 != 0;
        let will_retain = flags & 0b0010_0000 != 0;
        let will_qos = QoS::try_from((flags & 0b0001_1000) >> 3)?;
        let has_will = flags & 0b0000_0100 != 0;
        let clean_start = flags & 0b0000_0010 != 0;
        if !has_will && (will_retain || will_qos != QoS::AtMostOnce) {
            return Err(DecodeError::InvalidConnectFlags);
        }

        let keep_alive = ba.read_u16()?;
        let properties = Properties::decode(ba)?;

        let client_id = ba.read_string()?;
        if !client_id.is_empty() && !utils::is_valid_client_id(&client_id) {
            return Err(DecodeError::InvalidClientId);
        }

        let will = if has_will {
            let will_properties = Properties::decode(ba)?;
            let topic = ba.read_string()?;
            let payload = ba.read_binary()?;
            Some(Will {
                properties: will_properties,
                topic,
                payload,
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
            keep_alive,
            clean_start,
            properties,
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
        let mut packet = ConnectPacket::new("meter-4");
        packet.set_clean_start(false).set_keep_alive(20);
        packet.properties_mut().session_expiry_interval = Some(3600);
        packet.properties_mut().receive_maximum = Some(16);

        let mut will = Will {
            topic: "stat/meter-4".to_string(),
            payload: b"off".to_vec(),
            qos: QoS::AtLeastOnce,
            retain: false,
            ..Will::default()
        };
        will.properties.will_delay_interval = Some(5);
        packet.set_will(Some(will));

        let mut buf = Vec::new();
        packet.encode(&mut buf).unwrap();

        let mut ba = ByteArray::new(&buf);
        let decoded = ConnectPacket::decode(&mut ba).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(decoded.session_expiry_interval(), 3600);
        assert_eq!(decoded.will().unwrap().properties.will_delay_interval, Some(5));
    }
}

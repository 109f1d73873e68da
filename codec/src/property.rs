// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! MQTT 5 properties.
//!
//! Properties are carried in the variable header of most MQTT 5 packets,
//! prefixed by their total byte length as a variable byte integer. Unknown
//! user properties MUST be kept intact when a packet is forwarded, so they
//! are stored verbatim.

use serde::{Deserialize, Serialize};

use crate::byte_array::{write_binary, write_string, write_u16, write_u32, write_u8};
use crate::{ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, VarInt};

/// Property identifiers from the MQTT 5 specification, table 2-4.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyType {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0b,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1a,
    ServerReference = 0x1c,
    ReasonString = 0x1f,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQoS = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2a,
}

impl TryFrom<u8> for PropertyType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0x01 => Ok(Self::PayloadFormatIndicator),
            0x02 => Ok(Self::MessageExpiryInterval),
            0x03 => Ok(Self::ContentType),
            0x08 => Ok(Self::ResponseTopic),
            0x09 => Ok(Self::CorrelationData),
            0x0b => Ok(Self::SubscriptionIdentifier),
            0x11 => Ok(Self::SessionExpiryInterval),
            0x12 => Ok(Self::AssignedClientIdentifier),
            0x13 => Ok(Self::ServerKeepAlive),
            0x15 => Ok(Self::AuthenticationMethod),
            0x16 => Ok(Self::AuthenticationData),
            0x17 => Ok(Self::RequestProblemInformation),
            0x18 => Ok(Self::WillDelayInterval),
            0x19 => Ok(Self::RequestResponseInformation),
            0x1a => Ok(Self::ResponseInformation),
            0x1c => Ok(Self::ServerReference),
            0x1f => Ok(Self::ReasonString),
            0x21 => Ok(Self::ReceiveMaximum),
            0x22 => Ok(Self::TopicAliasMaximum),
            0x23 => Ok(Self::TopicAlias),
            0x24 => Ok(Self::MaximumQoS),
            0x25 => Ok(Self::RetainAvailable),
            0x26 => Ok(Self::UserProperty),
            0x27 => Ok(Self::MaximumPacketSize),
            0x28 => Ok(Self::WildcardSubscriptionAvailable),
            0x29 => Ok(Self::SubscriptionIdentifierAvailable),
            0x2a => Ok(Self::SharedSubscriptionAvailable),
            _ => Err(DecodeError::InvalidPropertyType),
        }
    }
}

/// Decoded property set of one packet.
///
/// Every property that may appear at most once is an `Option`; user
/// properties and subscription identifiers may repeat and are collected in
/// order of appearance.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub payload_format_indicator: Option<u8>,
    pub message_expiry_interval: Option<u32>,
    pub content_type: Option<String>,
    pub response_topic: Option<String>,
    pub correlation_data: Option<Vec<u8>>,
    pub subscription_identifiers: Vec<u32>,
    pub session_expiry_interval: Option<u32>,
    pub assigned_client_identifier: Option<String>,
    pub server_keep_alive: Option<u16>,
    pub authentication_method: Option<String>,
    pub authentication_data: Option<Vec<u8>>,
    pub request_problem_information: Option<u8>,
    pub will_delay_interval: Option<u32>,
    pub request_response_information: Option<u8>,
    pub response_information: Option<String>,
    pub server_reference: Option<String>,
    pub reason_string: Option<String>,
    pub receive_maximum: Option<u16>,
    pub topic_alias_maximum: Option<u16>,
    pub topic_alias: Option<u16>,
    pub maximum_qos: Option<u8>,
    pub retain_available: Option<u8>,
    pub user_properties: Vec<(String, String)>,
    pub maximum_packet_size: Option<u32>,
    pub wildcard_subscription_available: Option<u8>,
    pub subscription_identifier_available: Option<u8>,
    pub shared_subscription_available: Option<u8>,
}

const fn opt_bytes<T>(opt: &Option<T>, value_len: usize) -> usize {
    if opt.is_some() {
        1 + value_len
    } else {
        0
    }
}

fn opt_string_bytes(opt: &Option<String>) -> usize {
    opt.as_ref().map_or(0, |s| 1 + 2 + s.len())
}

fn opt_binary_bytes(opt: &Option<Vec<u8>>) -> usize {
    opt.as_ref().map_or(0, |b| 1 + 2 + b.len())
}

impl Properties {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Byte length of the encoded property data, without the leading
    /// length field.
    #[must_use]
    pub fn bytes(&self) -> usize {
        let mut len = 0;
        len += opt_bytes(&self.payload_format_indicator, 1);
        len += opt_bytes(&self.message_expiry_interval, 4);
        len += opt_string_bytes(&self.content_type);
        len += opt_string_bytes(&self.response_topic);
        len += opt_binary_bytes(&self.correlation_data);
        for id in &self.subscription_identifiers {
            len += 1 + VarInt::new(*id as usize).map_or(1, |v| v.bytes());
        }
        len += opt_bytes(&self.session_expiry_interval, 4);
        len += opt_string_bytes(&self.assigned_client_identifier);
        len += opt_bytes(&self.server_keep_alive, 2);
        len += opt_string_bytes(&self.authentication_method);
        len += opt_binary_bytes(&self.authentication_data);
        len += opt_bytes(&self.request_problem_information, 1);
        len += opt_bytes(&self.will_delay_interval, 4);
        len += opt_bytes(&self.request_response_information, 1);
        len += opt_string_bytes(&self.response_information);
        len += opt_string_bytes(&self.server_reference);
        len += opt_string_bytes(&self.reason_string);
        len += opt_bytes(&self.receive_maximum, 2);
        len += opt_bytes(&self.topic_alias_maximum, 2);
        len += opt_bytes(&self.topic_alias, 2);
        len += opt_bytes(&self.maximum_qos, 1);
        len += opt_bytes(&self.retain_available, 1);
        for (key, value) in &self.user_properties {
            len += 1 + 2 + key.len() + 2 + value.len();
        }
        len += opt_bytes(&self.maximum_packet_size, 4);
        len += opt_bytes(&self.wildcard_subscription_available, 1);
        len += opt_bytes(&self.subscription_identifier_available, 1);
        len += opt_bytes(&self.shared_subscription_available, 1);
        len
    }

    /// Byte length including the leading length field.
    #[must_use]
    pub fn bytes_with_length(&self) -> usize {
        let len = self.bytes();
        VarInt::new(len).map_or(1, |v| v.bytes()) + len
    }
}

impl EncodePacket for Properties {
    #[allow(clippy::too_many_lines)]
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        let data_len = self.bytes();
        let mut written = VarInt::new(data_len)?.encode(buf)?;

        let put_u8 = |buf: &mut Vec<u8>, t: PropertyType, v: u8| {
            write_u8(buf, t as u8) + write_u8(buf, v)
        };

        if let Some(v) = self.payload_format_indicator {
            written += put_u8(buf, PropertyType::PayloadFormatIndicator, v);
        }
        if let Some(v) = self.message_expiry_interval {
            write_u8(buf, PropertyType::MessageExpiryInterval as u8);
            written += 1 + write_u32(buf, v);
        }
        if let Some(v) = &self.content_type {
            write_u8(buf, PropertyType::ContentType as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = &self.response_topic {
            write_u8(buf, PropertyType::ResponseTopic as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = &self.correlation_data {
            write_u8(buf, PropertyType::CorrelationData as u8);
            written += 1 + write_binary(buf, v)?;
        }
        for id in &self.subscription_identifiers {
            write_u8(buf, PropertyType::SubscriptionIdentifier as u8);
            written += 1 + VarInt::new(*id as usize)?.encode(buf)?;
        }
        if let Some(v) = self.session_expiry_interval {
            write_u8(buf, PropertyType::SessionExpiryInterval as u8);
            written += 1 + write_u32(buf, v);
        }
        if let Some(v) = &self.assigned_client_identifier {
            write_u8(buf, PropertyType::AssignedClientIdentifier as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = self.server_keep_alive {
            write_u8(buf, PropertyType::ServerKeepAlive as u8);
            written += 1 + write_u16(buf, v);
        }
        if let Some(v) = &self.authentication_method {
            write_u8(buf, PropertyType::AuthenticationMethod as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = &self.authentication_data {
            write_u8(buf, PropertyType::AuthenticationData as u8);
            written += 1 + write_binary(buf, v)?;
        }
        if let Some(v) = self.request_problem_information {
            written += put_u8(buf, PropertyType::RequestProblemInformation, v);
        }
        if let Some(v) = self.will_delay_interval {
            write_u8(buf, PropertyType::WillDelayInterval as u8);
            written += 1 + write_u32(buf, v);
        }
        if let Some(v) = self.request_response_information {
            written += put_u8(buf, PropertyType::RequestResponseInformation, v);
        }
        if let Some(v) = &self.response_information {
            write_u8(buf, PropertyType::ResponseInformation as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = &self.server_reference {
            write_u8(buf, PropertyType::ServerReference as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = &self.reason_string {
            write_u8(buf, PropertyType::ReasonString as u8);
            written += 1 + write_string(buf, v)?;
        }
        if let Some(v) = self.receive_maximum {
            write_u8(buf, PropertyType::ReceiveMaximum as u8);
            written += 1 + write_u16(buf, v);
        }
        if let Some(v) = self.topic_alias_maximum {
            write_u8(buf, PropertyType::TopicAliasMaximum as u8);
            written += 1 + write_u16(buf, v);
        }
        if let Some(v) = self.topic_alias {
            write_u8(buf, PropertyType::TopicAlias as u8);
            written += 1 + write_u16(buf, v);
        }
        if let Some(v) = self.maximum_qos {
            written += put_u8(buf, PropertyType::MaximumQoS, v);
        }
        if let Some(v) = self.retain_available {
            written += put_u8(buf, PropertyType::RetainAvailable, v);
        }
        for (key, value) in &self.user_properties {
            write_u8(buf, PropertyType::UserProperty as u8);
            written += 1 + write_string(buf, key)? + write_string(buf, value)?;
        }
        if let Some(v) = self.maximum_packet_size {
            write_u8(buf, PropertyType::MaximumPacketSize as u8);
            written += 1 + write_u32(buf, v);
        }
        if let Some(v) = self.wildcard_subscription_available {
            written += put_u8(buf, PropertyType::WildcardSubscriptionAvailable, v);
        }
        if let Some(v) = self.subscription_identifier_available {
            written += put_u8(buf, PropertyType::SubscriptionIdentifierAvailable, v);
        }
        if let Some(v) = self.shared_subscription_available {
            written += put_u8(buf, PropertyType::SharedSubscriptionAvailable, v);
        }

        Ok(written)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Result<(), DecodeError> {
    if slot.is_some() {
        // It is a Protocol Error to include most properties more than once.
        return Err(DecodeError::DuplicateProperty);
    }
    *slot = Some(value);
    Ok(())
}

impl DecodePacket for Properties {
    #[allow(clippy::too_many_lines)]
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let data_len = VarInt::decode(ba)?.value();
        if data_len > ba.remaining() {
            return Err(DecodeError::InvalidRemainingLength);
        }
        let end = ba.offset() + data_len;

        let mut p = Self::default();
        while ba.offset() < end {
            let property_type = PropertyType::try_from(ba.read_byte()?)?;
            match property_type {
                PropertyType::PayloadFormatIndicator => {
                    set_once(&mut p.payload_format_indicator, ba.read_byte()?)?;
                }
                PropertyType::MessageExpiryInterval => {
                    set_once(&mut p.message_expiry_interval, ba.read_u32()?)?;
                }
                PropertyType::ContentType => {
                    set_once(&mut p.content_type, ba.read_string()?)?;
                }
                PropertyType::ResponseTopic => {
                    set_once(&mut p.response_topic, ba.read_string()?)?;
                }
                PropertyType::CorrelationData => {
                    set_once(&mut p.correlation_data, ba.read_binary()?)?;
                }
                PropertyType::SubscriptionIdentifier => {
                    let id = VarInt::decode(ba)?.value();
                    if id == 0 {
                        return Err(DecodeError::InvalidPropertyValue);
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    p.subscription_identifiers.push(id as u32);
                }
                PropertyType::SessionExpiryInterval => {
                    set_once(&mut p.session_expiry_interval, ba.read_u32()?)?;
                }
                PropertyType::AssignedClientIdentifier => {
                    set_once(&mut p.assigned_client_identifier, ba.read_string()?)?;
                }
                PropertyType::ServerKeepAlive => {
                    set_once(&mut p.server_keep_alive, ba.read_u16()?)?;
                }
                PropertyType::AuthenticationMethod => {
                    set_once(&mut p.authentication_method, ba.read_string()?)?;
                }
                PropertyType::AuthenticationData => {
                    set_once(&mut p.authentication_data, ba.read_binary()?)?;
                }
                PropertyType::RequestProblemInformation => {
                    set_once(&mut p.request_problem_information, ba.read_byte()?)?;
                }
                PropertyType::WillDelayInterval => {
                    set_once(&mut p.will_delay_interval, ba.read_u32()?)?;
                }
                PropertyType::RequestResponseInformation => {
                    set_once(&mut p.request_response_information, ba.read_byte()?)?;
                }
                PropertyType::ResponseInformation => {
                    set_once(&mut p.response_information, ba.read_string()?)?;
                }
                PropertyType::ServerReference => {
                    set_once(&mut p.server_reference, ba.read_string()?)?;
                }
                PropertyType::ReasonString => {
                    set_once(&mut p.reason_string, ba.read_string()?)?;
                }
                PropertyType::ReceiveMaximum => {
                    let v = ba.read_u16()?;
                    if v == 0 {
                        // It is a Protocol Error to include the value 0.
                        return Err(DecodeError::InvalidPropertyValue);
                    }
                    set_once(&mut p.receive_maximum, v)?;
                }
                PropertyType::TopicAliasMaximum => {
                    set_once(&mut p.topic_alias_maximum, ba.read_u16()?)?;
                }
                PropertyType::TopicAlias => {
                    set_once(&mut p.topic_alias, ba.read_u16()?)?;
                }
                PropertyType::MaximumQoS => {
                    let v = ba.read_byte()?;
                    if v > 1 {
                        return Err(DecodeError::InvalidPropertyValue);
                    }
                    set_once(&mut p.maximum_qos, v)?;
                }
                PropertyType::RetainAvailable => {
                    set_once(&mut p.retain_available, ba.read_byte()?)?;
                }
                PropertyType::UserProperty => {
                    let key = ba.read_string()?;
                    let value = ba.read_string()?;
                    p.user_properties.push((key, value));
                }
                PropertyType::MaximumPacketSize => {
                    let v = ba.read_u32()?;
                    if v == 0 {
                        return Err(DecodeError::InvalidPropertyValue);
                    }
                    set_once(&mut p.maximum_packet_size, v)?;
                }
                PropertyType::WildcardSubscriptionAvailable => {
                    set_once(&mut p.wildcard_subscription_available, ba.read_byte()?)?;
                }
                PropertyType::SubscriptionIdentifierAvailable => {
                    set_once(&mut p.subscription_identifier_available, ba.read_byte()?)?;
                }
                PropertyType::SharedSubscriptionAvailable => {
                    set_once(&mut p.shared_subscription_available, ba.read_byte()?)?;
                }
            }
        }

        if ba.offset() != end {
            return Err(DecodeError::InvalidRemainingLength);
        }
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_properties() {
        let p = Properties::default();
        assert!(p.is_empty());
        assert_eq!(p.bytes(), 0);

        let mut buf = Vec::new();
        assert_eq!(p.encode(&mut buf).unwrap(), 1);
        assert_eq!(buf, [0x00]);
    }

    #[test]
    fn test_round_trip() {
        let mut p = Properties::default();
        p.message_expiry_interval = Some(30);
        p.receive_maximum = Some(24);
        p.subscription_identifiers = vec![7, 9];
        p.user_properties
            .push(("origin".to_string(), "sensor-1".to_string()));

        let mut buf = Vec::new();
        let written = p.encode(&mut buf).unwrap();
        assert_eq!(written, buf.len());
        assert_eq!(p.bytes_with_length(), buf.len());

        let mut ba = ByteArray::new(&buf);
        let decoded = Properties::decode(&mut ba).unwrap();
        assert_eq!(decoded, p);
    }

    #[test]
    fn test_duplicate_rejected() {
        // Two receive-maximum properties.
        let buf = [0x06, 0x21, 0x00, 0x08, 0x21, 0x00, 0x09];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba).unwrap_err(),
            DecodeError::DuplicateProperty
        );
    }

    #[test]
    fn test_zero_receive_maximum_rejected() {
        let buf = [0x03, 0x21, 0x00, 0x00];
        let mut ba = ByteArray::new(&buf);
        assert_eq!(
            Properties::decode(&mut ba).unwrap_err(),
            DecodeError::InvalidPropertyValue
        );
    }
}

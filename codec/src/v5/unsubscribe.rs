// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

use crate::byte_array::{write_string, write_u16};
use crate::{
    ByteArray, DecodeError, DecodePacket, EncodeError, EncodePacket, FixedHeader, Packet, PacketId,
    PacketType, Properties, TopicFilter,
};

/// Remove one or more subscriptions, MQTT 5 form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsubscribePacket {
    packet_id: PacketId,
    properties: Properties,
    filters: Vec<TopicFilter>,
}

impl UnsubscribePacket {
    /// Create a single-filter unsubscribe packet.
    ///
    /// # Errors
    ///
    /// Returns error if `filter` is invalid.
    pub fn new(packet_id: PacketId, filter: &str) -> Result<Self, DecodeError> {
        let filter = TopicFilter::parse(filter).map_err(|_| DecodeError::InvalidTopicFilter)?;
        Ok(Self {
            packet_id,
            properties: Properties::default(),
            filters: vec![filter],
        })
    }

    #[must_use]
    pub const fn packet_id(&self) -> PacketId {
        self.packet_id
    }

    #[must_use]
    pub fn filters(&self) -> &[TopicFilter] {
        &self.filters
    }
}

impl EncodePacket for UnsubscribePacket {
    fn encode(&self, buf: &mut Vec<u8>) -> Result<usize, EncodeError> {
        if self.filters.is_empty() {
            return Err(EncodeError::InvalidPacketData);
        }
        let remaining_length = 2
            + self.properties.bytes_with_length()
            + self
                .filters
                .iter()
                .map(|f| 2 + f.as_str().len())
                .sum::<usize>();
        let fixed_header = FixedHeader::new(PacketType::Unsubscribe, remaining_length)?;
        let mut written = fixed_header.encode(buf)?;
        written += write_u16(buf, self.packet_id);
        written += self.properties.encode(buf)?;
        for filter in &self.filters {
            written += write_string(buf, filter.as_str())?;
        }
        Ok(written)
    }
}

impl DecodePacket for UnsubscribePacket {
    fn decode(ba: &mut ByteArray) -> Result<Self, DecodeError> {
        let fixed_header = FixedHeader::decode(ba)?;
        if fixed_header.packet_type() != PacketType::Unsubscribe {
            return Err(DecodeError::InvalidPacketType);
        }
        let end = ba.offset() + fixed_header.remaining_length();
        let packet_id = ba.read_u16()?;
        if packet_id == 0 {
            return Err(DecodeError::InvalidPacketId);
        }
        let properties = Properties::decode(ba)?;

        let mut filters = Vec::new();
        while ba.offset() < end {
            let filter = ba.read_string()?;
            filters
                .push(TopicFilter::parse(&filter).map_err(|_| DecodeError::InvalidTopicFilter)?);
        }
        if filters.is_empty() {
            return Err(DecodeError::EmptyTopicFilter);
        }
        Ok(Self {
            packet_id,
            properties,
            filters,
        })
    }
}

impl Packet for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }
}

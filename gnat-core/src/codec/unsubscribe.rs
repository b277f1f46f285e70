use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_utf8, encode_packet, encode_utf8, take_u16};
use crate::PacketType;

/// UNSUBSCRIBE removes one or more Topic Filters from the session.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct UnsubscribePacket {
    packet_id: u16,
    filters: Vec<String>,
}

impl UnsubscribePacket {
    pub fn new(packet_id: u16, filters: Vec<String>) -> Self {
        return Self { packet_id, filters };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = take_u16(bytes)?;

        let mut filters = Vec::new();
        while !bytes.is_empty() {
            filters.push(decode_utf8(bytes)?);
        }

        if filters.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("UNSUBSCRIBE packets must carry at least one topic filter."),
            ));
        }

        return Ok(Self { packet_id, filters });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);
        for filter in &self.filters {
            encode_utf8(&mut body, filter)?;
        }

        return encode_packet(PacketType::Unsubscribe as u8 | 0x02, &body);
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn filters(&self) -> &[String] {
        return &self.filters;
    }
}

use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind};
use crate::io::take_u16;
use crate::{FixedHeader, PacketType};

/// PUBACK is the terminal response to a QoS 1 PUBLISH.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct PubAckPacket {
    id: u16,
}

impl PubAckPacket {
    pub fn new(id: u16) -> Self {
        return Self { id };
    }

    pub fn decode(header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        if header.rest_len() != 2 {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedLength,
                String::from("PUBACK packets carry exactly a packet id."),
            ));
        }
        return Ok(Self {
            id: take_u16(bytes)?,
        });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);
        bytes.put_u8(PacketType::PubAck as u8);
        bytes.put_u8(2);
        bytes.put_u16(self.id);
        return bytes.into();
    }

    pub fn id(&self) -> u16 {
        return self.id;
    }
}

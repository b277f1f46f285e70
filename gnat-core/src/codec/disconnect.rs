use bytes::{BufMut, Bytes, BytesMut};

use crate::PacketType;

/// DISCONNECT announces a clean close; it suppresses the Will Message.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct DisconnectPacket;

impl DisconnectPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(2);
        bytes.put_u8(PacketType::Disconnect as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

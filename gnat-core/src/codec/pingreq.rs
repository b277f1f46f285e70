use bytes::{BufMut, Bytes, BytesMut};

use crate::PacketType;

/// PINGREQ keeps an otherwise idle connection alive.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct PingReqPacket;

impl PingReqPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(2);
        bytes.put_u8(PacketType::PingReq as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

#[cfg(test)]
mod packet {
    use super::PingReqPacket;

    #[test]
    fn wire_bytes() {
        assert_eq!(&PingReqPacket::new().encode()[..], &[0xC0, 0x00]);
    }
}

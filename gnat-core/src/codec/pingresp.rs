use bytes::{BufMut, Bytes, BytesMut};

use crate::PacketType;

/// PINGRESP answers a PINGREQ.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct PingRespPacket;

impl PingRespPacket {
    pub fn new() -> Self {
        return Self;
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(2);
        bytes.put_u8(PacketType::PingResp as u8);
        bytes.put_u8(0);
        return bytes.into();
    }
}

#[cfg(test)]
mod packet {
    use super::PingRespPacket;

    #[test]
    fn wire_bytes() {
        assert_eq!(&PingRespPacket::new().encode()[..], &[0xD0, 0x00]);
    }
}

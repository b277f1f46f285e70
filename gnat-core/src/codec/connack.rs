use bytes::{BufMut, Bytes, BytesMut};

use crate::err::DecodeError;
use crate::io::take_u8;
use crate::{ConnectReturnCode, PacketType};

/*
 * The CONNACK packet is sent by the Server in response to a CONNECT packet.
 * It has a fixed remaining length of 2: acknowledge flags, return code.
 */
#[derive(PartialEq, Debug, Clone)]
pub struct ConnAckPacket {
    session_present: bool,
    return_code: ConnectReturnCode,
}

impl ConnAckPacket {
    pub fn new(session_present: bool, return_code: ConnectReturnCode) -> Self {
        return Self {
            session_present,
            return_code,
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let flags = take_u8(bytes)?;
        let return_code = take_u8(bytes)?.try_into()?;

        return Ok(Self {
            session_present: flags & 1 != 0,
            return_code,
        });
    }

    pub fn encode(&self) -> Bytes {
        let mut bytes = BytesMut::with_capacity(4);

        bytes.put_u8(PacketType::ConnAck as u8);
        bytes.put_u8(2);
        bytes.put_u8(self.session_present as u8);
        bytes.put_u8(self.return_code as u8);

        return bytes.into();
    }

    pub fn return_code(&self) -> ConnectReturnCode {
        return self.return_code;
    }

    pub fn session_present(&self) -> bool {
        return self.session_present;
    }
}

use std::fmt::Display;

use bytes::Bytes;

mod connack;
mod connect;
mod disconnect;
mod pingreq;
mod pingresp;
mod puback;
mod pubcomp;
mod publish;
mod pubrec;
mod pubrel;
mod suback;
mod subscribe;
mod unsuback;
mod unsubscribe;

pub use connack::ConnAckPacket;
pub use connect::{ConnectPacket, Will};
pub use disconnect::DisconnectPacket;
pub use pingreq::PingReqPacket;
pub use pingresp::PingRespPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::SubAckPacket;
pub use subscribe::{SubscribePacket, SubscriptionRequest};
pub use unsuback::UnsubAckPacket;
pub use unsubscribe::UnsubscribePacket;

use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_remaining_length, take_u8};

const PACKET_TYPE_BITS: u8 = 0b1111_0000;
const PACKET_FLAG_BITS: u8 = 0b0000_1111;

#[derive(PartialEq, Debug, Clone)]
pub enum MqttPacket {
    Connect(ConnectPacket),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq(PingReqPacket),
    PingResp(PingRespPacket),
    Disconnect(DisconnectPacket),
}

impl MqttPacket {
    pub fn decode(header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        return match header.packet_type() {
            PacketType::Connect => Ok(Self::Connect(ConnectPacket::decode(bytes)?)),
            PacketType::ConnAck => Ok(Self::ConnAck(ConnAckPacket::decode(bytes)?)),
            PacketType::Publish => Ok(Self::Publish(PublishPacket::decode(header, bytes)?)),
            PacketType::PubAck => Ok(Self::PubAck(PubAckPacket::decode(header, bytes)?)),
            PacketType::PubRec => Ok(Self::PubRec(PubRecPacket::decode(header, bytes)?)),
            PacketType::PubRel => Ok(Self::PubRel(PubRelPacket::decode(header, bytes)?)),
            PacketType::PubComp => Ok(Self::PubComp(PubCompPacket::decode(header, bytes)?)),
            PacketType::Subscribe => Ok(Self::Subscribe(SubscribePacket::decode(bytes)?)),
            PacketType::SubAck => Ok(Self::SubAck(SubAckPacket::decode(bytes)?)),
            PacketType::Unsubscribe => Ok(Self::Unsubscribe(UnsubscribePacket::decode(bytes)?)),
            PacketType::UnsubAck => Ok(Self::UnsubAck(UnsubAckPacket::decode(header, bytes)?)),
            PacketType::PingReq => Ok(Self::PingReq(PingReqPacket::new())),
            PacketType::PingResp => Ok(Self::PingResp(PingRespPacket::new())),
            PacketType::Disconnect => Ok(Self::Disconnect(DisconnectPacket::new())),
        };
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        return match self {
            Self::Connect(packet) => packet.encode(),
            Self::ConnAck(packet) => Ok(packet.encode()),
            Self::Publish(packet) => packet.encode(),
            Self::PubAck(packet) => Ok(packet.encode()),
            Self::PubRec(packet) => Ok(packet.encode()),
            Self::PubRel(packet) => Ok(packet.encode()),
            Self::PubComp(packet) => Ok(packet.encode()),
            Self::Subscribe(packet) => packet.encode(),
            Self::SubAck(packet) => packet.encode(),
            Self::Unsubscribe(packet) => packet.encode(),
            Self::UnsubAck(packet) => Ok(packet.encode()),
            Self::PingReq(packet) => Ok(packet.encode()),
            Self::PingResp(packet) => Ok(packet.encode()),
            Self::Disconnect(packet) => Ok(packet.encode()),
        };
    }

    pub fn packet_type(&self) -> PacketType {
        return match self {
            Self::Connect(_) => PacketType::Connect,
            Self::ConnAck(_) => PacketType::ConnAck,
            Self::Publish(_) => PacketType::Publish,
            Self::PubAck(_) => PacketType::PubAck,
            Self::PubRec(_) => PacketType::PubRec,
            Self::PubRel(_) => PacketType::PubRel,
            Self::PubComp(_) => PacketType::PubComp,
            Self::Subscribe(_) => PacketType::Subscribe,
            Self::SubAck(_) => PacketType::SubAck,
            Self::Unsubscribe(_) => PacketType::Unsubscribe,
            Self::UnsubAck(_) => PacketType::UnsubAck,
            Self::PingReq(_) => PacketType::PingReq,
            Self::PingResp(_) => PacketType::PingResp,
            Self::Disconnect(_) => PacketType::Disconnect,
        };
    }
}

#[derive(Copy, Clone, Debug)]
pub struct FixedHeader {
    packet_type: PacketType,
    flags: u8,
    rest_len: usize,
}

impl FixedHeader {
    /// Decodes the type byte and Remaining Length from an in-memory buffer.
    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let type_byte = take_u8(bytes)?;
        let (_, rest_len) = decode_remaining_length(bytes)?;
        return Self::from_parts(type_byte, rest_len);
    }

    /// Builds the header when the framing layer has already pulled the type
    /// byte and Remaining Length off the stream.
    pub fn from_parts(type_byte: u8, rest_len: usize) -> Result<Self, DecodeError> {
        let packet_type = PacketType::try_from(type_byte)?;

        return Ok(Self {
            packet_type,
            flags: type_byte & PACKET_FLAG_BITS,
            rest_len,
        });
    }

    pub fn packet_type(&self) -> PacketType {
        return self.packet_type;
    }

    pub fn flags(&self) -> u8 {
        return self.flags;
    }

    pub fn rest_len(&self) -> usize {
        return self.rest_len;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum PacketType {
    Connect = 0x10,
    ConnAck = 0x20,
    Publish = 0x30,
    PubAck = 0x40,
    PubRec = 0x50,
    PubRel = 0x60,
    PubComp = 0x70,
    Subscribe = 0x80,
    SubAck = 0x90,
    Unsubscribe = 0xA0,
    UnsubAck = 0xB0,
    PingReq = 0xC0,
    PingResp = 0xD0,
    Disconnect = 0xE0,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        // only the high nibble names the packet type.
        let out = match value & PACKET_TYPE_BITS {
            0x10 => Self::Connect,
            0x20 => Self::ConnAck,
            0x30 => Self::Publish,
            0x40 => Self::PubAck,
            0x50 => Self::PubRec,
            0x60 => Self::PubRel,
            0x70 => Self::PubComp,
            0x80 => Self::Subscribe,
            0x90 => Self::SubAck,
            0xA0 => Self::Unsubscribe,
            0xB0 => Self::UnsubAck,
            0xC0 => Self::PingReq,
            0xD0 => Self::PingResp,
            0xE0 => Self::Disconnect,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::UnknownPacketType,
                    format!("Packet type {} is not a valid packet.", value >> 4),
                ))
            }
        };
        return Ok(out);
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connect => "CONNECT",
            Self::ConnAck => "CONNACK",
            Self::Publish => "PUBLISH",
            Self::PubAck => "PUBACK",
            Self::PubRec => "PUBREC",
            Self::PubRel => "PUBREL",
            Self::PubComp => "PUBCOMP",
            Self::Subscribe => "SUBSCRIBE",
            Self::SubAck => "SUBACK",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::UnsubAck => "UNSUBACK",
            Self::PingReq => "PINGREQ",
            Self::PingResp => "PINGRESP",
            Self::Disconnect => "DISCONNECT",
        };
        return write!(f, "{name}");
    }
}

#[cfg(test)]
mod header {
    use bytes::Bytes;

    use super::{FixedHeader, PacketType};
    use crate::err::DecodeErrorKind;

    #[test]
    fn decode_splits_type_and_flags() {
        let mut bytes = Bytes::from_static(&[0x3B, 100]);
        let header = FixedHeader::decode(&mut bytes).expect("Could not decode header.");

        assert_eq!(header.packet_type(), PacketType::Publish);
        assert_eq!(header.flags(), 0x0B);
        assert_eq!(header.rest_len(), 100);
    }

    #[test]
    fn reserved_type_nibbles_are_rejected() {
        for byte in [0x00, 0xF0] {
            let err = PacketType::try_from(byte).unwrap_err();
            assert_eq!(err.kind(), DecodeErrorKind::UnknownPacketType);
        }
    }
}

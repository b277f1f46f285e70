use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, EncodeError};
use crate::io::{encode_packet, take_u16, take_u8};
use crate::qos::QosLevel;
use crate::PacketType;

/*
 * SUBACK confirms a SUBSCRIBE. The payload is one granted-QoS byte per
 * requested filter, in request order [MQTT-3.9.3-1].
 */
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct SubAckPacket {
    packet_id: u16,
    granted: Vec<QosLevel>,
}

impl SubAckPacket {
    pub fn new(packet_id: u16, granted: Vec<QosLevel>) -> Self {
        return Self { packet_id, granted };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = take_u16(bytes)?;

        let mut granted = Vec::new();
        while !bytes.is_empty() {
            granted.push(QosLevel::try_from(take_u8(bytes)?)?);
        }

        return Ok(Self { packet_id, granted });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::with_capacity(2 + self.granted.len());
        body.put_u16(self.packet_id);
        for qos in &self.granted {
            body.put_u8(*qos as u8);
        }

        return encode_packet(PacketType::SubAck as u8, &body);
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn granted(&self) -> &[QosLevel] {
        return &self.granted;
    }
}

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_utf8, encode_packet, encode_utf8, take_u16};
use crate::qos::QosLevel;
use crate::topic::TopicName;
use crate::{FixedHeader, PacketType};

const RETAIN: u8 = 0b0000_0001;
const QOS_BITS: u8 = 0b0000_0110;
const DUP: u8 = 0b0000_1000;

/*
 * A PUBLISH packet transports an Application Message in either direction.
 * The fixed-header flag bits carry RETAIN (bit 0), QoS (bits 1-2) and DUP
 * (bit 3); the Packet Identifier is present only when QoS > 0.
 */
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct PublishPacket {
    dup: bool,
    qos: QosLevel,
    retain: bool,
    topic: TopicName,
    packet_id: Option<u16>,
    payload: Bytes,
}

impl PublishPacket {
    pub fn new(topic: TopicName, payload: Bytes) -> Self {
        return Self {
            dup: false,
            qos: QosLevel::AtMostOnce,
            retain: false,
            topic,
            packet_id: None,
            payload,
        };
    }

    pub fn decode(header: FixedHeader, bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let flags = header.flags();

        let qos = QosLevel::try_from((flags & QOS_BITS) >> 1)?;
        let topic = TopicName::new(decode_utf8(bytes)?);

        let packet_id = if qos != QosLevel::AtMostOnce {
            let id = take_u16(bytes)?;
            if id == 0 {
                return Err(DecodeError::new(
                    DecodeErrorKind::ProtocolError,
                    String::from("Packet id 0 is not valid for a QoS > 0 PUBLISH."),
                ));
            }
            Some(id)
        } else {
            None
        };

        let payload = bytes.copy_to_bytes(bytes.remaining());

        return Ok(Self {
            dup: flags & DUP != 0,
            qos,
            retain: flags & RETAIN != 0,
            topic,
            packet_id,
            payload,
        });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut len = 2 + self.topic.len() + self.payload.len();
        if self.packet_id.is_some() {
            len += 2;
        }

        let mut body = BytesMut::with_capacity(len);
        encode_utf8(&mut body, self.topic.as_str())?;
        if let Some(packet_id) = self.packet_id {
            body.put_u16(packet_id);
        }
        body.put_slice(&self.payload);

        return encode_packet(PacketType::Publish as u8 | self.flag_bits(), &body);
    }

    fn flag_bits(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.retain {
            flags |= RETAIN;
        }
        if self.dup {
            flags |= DUP;
        }
        return flags;
    }

    pub fn set_qos_at_least_once(&mut self, packet_id: u16) {
        self.qos = QosLevel::AtLeastOnce;
        self.packet_id = Some(packet_id);
    }

    pub fn set_qos_exactly_once(&mut self, packet_id: u16) {
        self.qos = QosLevel::ExactlyOnce;
        self.packet_id = Some(packet_id);
    }

    pub fn set_retain(&mut self, val: bool) {
        self.retain = val;
    }

    pub fn set_dup(&mut self, val: bool) {
        self.dup = val;
    }

    pub fn topic(&self) -> &TopicName {
        return &self.topic;
    }

    pub fn qos(&self) -> QosLevel {
        return self.qos;
    }

    pub fn retain(&self) -> bool {
        return self.retain;
    }

    pub fn dup(&self) -> bool {
        return self.dup;
    }

    pub fn id(&self) -> Option<u16> {
        return self.packet_id;
    }

    pub fn payload(&self) -> &Bytes {
        return &self.payload;
    }
}

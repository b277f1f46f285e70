use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, EncodeError};
use crate::io::{
    decode_bytes, decode_utf8, encode_bytes, encode_packet, encode_utf8, take_u16, take_u8,
};
use crate::qos::QosLevel;
use crate::topic::TopicName;
use crate::PacketType;

const WILL_FLAG: u8 = 0b0000_0100;
const WILL_QOS_BITS: u8 = 0b0001_1000;
const WILL_RETAIN: u8 = 0b0010_0000;
const PASSWORD_FLAG: u8 = 0b0100_0000;
const USERNAME_FLAG: u8 = 0b1000_0000;

/*
 * The first packet sent from the Client to the Server MUST be a CONNECT
 * packet [MQTT-3.1.0-1]. The payload carries the Client Identifier, then
 * Will Topic / Will Message, User Name and Password as flagged in the
 * variable header.
 */
#[derive(Clone, PartialEq, Debug)]
pub struct ConnectPacket {
    /// Read off the wire but not validated beyond its length prefix.
    protocol_name: String,
    /// Protocol Level; 4 is MQTT 3.1.1.
    level: u8,
    keep_alive: u16,
    client_id: String,
    will: Option<Will>,
    username: Option<String>,
    password: Option<Bytes>,
}

/// The message the broker publishes on the client's behalf when the
/// connection ends without a DISCONNECT.
#[derive(Clone, PartialEq, Debug)]
pub struct Will {
    pub topic: TopicName,
    pub payload: Bytes,
    pub qos: QosLevel,
    pub retain: bool,
}

impl ConnectPacket {
    pub fn new(client_id: impl Into<String>) -> Self {
        return Self {
            protocol_name: String::from("MQTT"),
            level: 4,
            keep_alive: 0,
            client_id: client_id.into(),
            will: None,
            username: None,
            password: None,
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let protocol_name = decode_utf8(bytes)?;
        let level = take_u8(bytes)?;
        let flags = take_u8(bytes)?;
        let keep_alive = take_u16(bytes)?;

        let client_id = decode_utf8(bytes)?;

        let will = if flags & WILL_FLAG != 0 {
            let topic = TopicName::new(decode_utf8(bytes)?);
            let payload = decode_bytes(bytes)?;
            let qos = QosLevel::try_from((flags & WILL_QOS_BITS) >> 3)?;
            let retain = flags & WILL_RETAIN != 0;

            Some(Will {
                topic,
                payload,
                qos,
                retain,
            })
        } else {
            None
        };

        let username = if flags & USERNAME_FLAG != 0 {
            Some(decode_utf8(bytes)?)
        } else {
            None
        };

        let password = if flags & PASSWORD_FLAG != 0 {
            Some(decode_bytes(bytes)?)
        } else {
            None
        };

        return Ok(Self {
            protocol_name,
            level,
            keep_alive,
            client_id,
            will,
            username,
            password,
        });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        // protocol name prefix + level + flags + keep alive
        let mut len = 2 + self.protocol_name.len() + 1 + 1 + 2;
        len += 2 + self.client_id.len();

        if let Some(will) = &self.will {
            len += 2 + will.topic.len();
            len += 2 + will.payload.len();
        }
        if let Some(username) = &self.username {
            len += 2 + username.len();
        }
        if let Some(password) = &self.password {
            len += 2 + password.len();
        }

        let mut body = BytesMut::with_capacity(len);
        encode_utf8(&mut body, &self.protocol_name)?;
        body.put_u8(self.level);
        body.put_u8(self.flag_byte());
        body.put_u16(self.keep_alive);
        encode_utf8(&mut body, &self.client_id)?;

        if let Some(will) = &self.will {
            encode_utf8(&mut body, will.topic.as_str())?;
            encode_bytes(&mut body, &will.payload)?;
        }
        if let Some(username) = &self.username {
            encode_utf8(&mut body, username)?;
        }
        if let Some(password) = &self.password {
            encode_bytes(&mut body, password)?;
        }

        return encode_packet(PacketType::Connect as u8, &body);
    }

    fn flag_byte(&self) -> u8 {
        let mut flags = 0;
        if let Some(will) = &self.will {
            flags |= WILL_FLAG;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= WILL_RETAIN;
            }
        }
        if self.username.is_some() {
            flags |= USERNAME_FLAG;
        }
        if self.password.is_some() {
            flags |= PASSWORD_FLAG;
        }
        return flags;
    }

    pub fn set_keep_alive(&mut self, seconds: u16) {
        self.keep_alive = seconds;
    }

    pub fn set_will(&mut self, will: Will) {
        self.will = Some(will);
    }

    pub fn set_credentials(&mut self, username: &str, password: &[u8]) {
        self.username = Some(String::from(username));
        self.password = Some(Bytes::copy_from_slice(password));
    }

    pub fn protocol_name(&self) -> &str {
        return &self.protocol_name;
    }

    pub fn level(&self) -> u8 {
        return self.level;
    }

    pub fn keep_alive(&self) -> u16 {
        return self.keep_alive;
    }

    pub fn client_id(&self) -> &str {
        return &self.client_id;
    }

    pub fn take_will(&mut self) -> Option<Will> {
        return self.will.take();
    }

    pub fn username(&self) -> Option<&str> {
        return self.username.as_deref();
    }

    pub fn password(&self) -> Option<&Bytes> {
        return self.password.as_ref();
    }
}

#[cfg(test)]
mod packet {
    use bytes::Bytes;

    use super::{ConnectPacket, Will};
    use crate::qos::QosLevel;
    use crate::topic::TopicName;
    use crate::{FixedHeader, MqttPacket};

    #[test]
    fn minimal_connect_bytes() {
        // protocol "MQTT", level 4, no flags, keep alive 60, empty
        // client id
        let mut packet = ConnectPacket::new("");
        packet.set_keep_alive(60);
        let buf = packet.encode().unwrap();

        assert_eq!(
            &buf[..],
            &[
                0x10, 0x0C, 0x00, 0x04, b'M', b'Q', b'T', b'T', 0x04, 0x00, 0x00, 0x3C, 0x00,
                0x00
            ]
        );
    }

    #[test]
    fn will_and_credentials_survive_the_wire() {
        let mut packet = ConnectPacket::new("sensor-7");
        packet.set_keep_alive(30);
        packet.set_will(Will {
            topic: TopicName::new("bye"),
            payload: Bytes::from_static(b"gone"),
            qos: QosLevel::AtLeastOnce,
            retain: true,
        });
        packet.set_credentials("user", b"hunter2");

        let mut buf = packet.encode().unwrap();
        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = MqttPacket::decode(header, &mut buf).unwrap();

        match &decoded {
            MqttPacket::Connect(connect) => {
                assert_eq!(connect.protocol_name(), "MQTT");
                assert_eq!(connect.username(), Some("user"));
                assert_eq!(connect.password().map(|p| &p[..]), Some(&b"hunter2"[..]));
            }
            other => panic!("Decoded the wrong packet type: {other:?}"),
        }
        assert_eq!(decoded, MqttPacket::Connect(packet));
    }
}

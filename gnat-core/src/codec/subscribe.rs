use bytes::{BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError};
use crate::io::{decode_utf8, encode_packet, encode_utf8, take_u16, take_u8};
use crate::qos::QosLevel;
use crate::topic::TopicFilter;
use crate::PacketType;

/*
 * A SUBSCRIBE packet registers one or more Topic Filters, each paired with
 * the maximum QoS the client is willing to receive on it. The filter/QoS
 * pairs are packed contiguously until the Remaining Length is consumed.
 */
#[derive(PartialEq, Clone, Debug)]
pub struct SubscribePacket {
    packet_id: u16,
    requests: Vec<SubscriptionRequest>,
}

#[derive(PartialEq, Clone, Debug)]
pub struct SubscriptionRequest {
    filter: TopicFilter,
    requested_qos: u8,
}

impl SubscriptionRequest {
    pub fn new(filter: TopicFilter, requested_qos: u8) -> Self {
        return Self {
            filter,
            requested_qos,
        };
    }

    pub fn filter(&self) -> &TopicFilter {
        return &self.filter;
    }

    /// The requested level when it is a valid QoS, at-most-once otherwise.
    /// This broker never answers with the 0x80 failure code.
    pub fn granted_qos(&self) -> QosLevel {
        return QosLevel::granted_for(self.requested_qos);
    }
}

impl SubscribePacket {
    pub fn new(packet_id: u16, requests: Vec<SubscriptionRequest>) -> Self {
        return Self {
            packet_id,
            requests,
        };
    }

    pub fn decode(bytes: &mut Bytes) -> Result<Self, DecodeError> {
        let packet_id = take_u16(bytes)?;

        let mut requests = Vec::new();
        while !bytes.is_empty() {
            let filter = TopicFilter::from_str(&decode_utf8(bytes)?);
            let requested_qos = take_u8(bytes)?;
            requests.push(SubscriptionRequest {
                filter,
                requested_qos,
            });
        }

        if requests.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::ProtocolError,
                String::from("SUBSCRIBE packets must carry at least one topic filter."),
            ));
        }

        return Ok(Self {
            packet_id,
            requests,
        });
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let mut body = BytesMut::new();
        body.put_u16(self.packet_id);

        for request in &self.requests {
            encode_utf8(&mut body, request.filter.as_str())?;
            body.put_u8(request.requested_qos);
        }

        return encode_packet(PacketType::Subscribe as u8 | 0x02, &body);
    }

    pub fn id(&self) -> u16 {
        return self.packet_id;
    }

    pub fn requests(&self) -> &[SubscriptionRequest] {
        return &self.requests;
    }
}

#[cfg(test)]
mod packet {
    use bytes::Bytes;

    use super::{SubscribePacket, SubscriptionRequest};
    use crate::qos::QosLevel;
    use crate::topic::TopicFilter;
    use crate::{FixedHeader, MqttPacket};

    #[test]
    fn single_filter_frame_decodes() {
        // SUBSCRIBE pid=1, filter "temp", requested QoS 0
        let raw: &[u8] = &[0x82, 0x09, 0x00, 0x01, 0x00, 0x04, b't', b'e', b'm', b'p', 0x00];
        let mut bytes = Bytes::from_static(raw);
        let header = FixedHeader::decode(&mut bytes).unwrap();

        match MqttPacket::decode(header, &mut bytes).unwrap() {
            MqttPacket::Subscribe(packet) => {
                assert_eq!(packet.id(), 1);
                assert_eq!(packet.requests().len(), 1);
                assert_eq!(packet.requests()[0].filter().as_str(), "temp");
                assert_eq!(packet.requests()[0].granted_qos(), QosLevel::AtMostOnce);
            }
            other => panic!("Decoded the wrong packet type: {other:?}"),
        }
    }

    #[test]
    fn multiple_filters_round_trip() {
        let packet = SubscribePacket::new(
            1234,
            vec![
                SubscriptionRequest::new(TopicFilter::from_str("a/+"), 1),
                SubscriptionRequest::new(TopicFilter::from_str("b/#"), 2),
            ],
        );

        let mut buf = packet.encode().unwrap();
        assert_eq!(buf[0], 0x82);

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = MqttPacket::decode(header, &mut buf).unwrap();
        assert_eq!(decoded, MqttPacket::Subscribe(packet));
    }

    #[test]
    fn an_out_of_range_request_grants_qos0() {
        let request = SubscriptionRequest::new(TopicFilter::from_str("x"), 3);
        assert_eq!(request.granted_qos(), QosLevel::AtMostOnce);
    }

    #[test]
    fn empty_payload_is_a_protocol_error() {
        let raw: &[u8] = &[0x82, 0x02, 0x00, 0x01];
        let mut bytes = Bytes::from_static(raw);
        let header = FixedHeader::decode(&mut bytes).unwrap();
        assert!(MqttPacket::decode(header, &mut bytes).is_err());
    }
}

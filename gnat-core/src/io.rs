use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{pin_mut, FutureExt};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::sleep;

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};
use crate::{FixedHeader, MqttPacket};

/*
 * MQTT v3.1.1 standard, the Remaining Length field on the fixed header can
 * be at most 4 bytes (0xFF, 0xFF, 0xFF, 0x7F on the wire).
 */
pub const MAX_REMAINING_LEN: usize = (128 as u64).pow(4) as usize - 1;

pub fn encode_remaining_length(bytes: &mut BytesMut, mut len: usize) -> Result<usize, EncodeError> {
    if len > MAX_REMAINING_LEN {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!("Packet payload exceeded max length of 128^4 - 1, found length {len}"),
        ));
    }

    let mut num_bytes = 0;

    loop {
        let mut d: u8 = (len % 128) as u8;

        len /= 128;

        if len > 0 {
            d |= 128;
        }

        bytes.put_u8(d);

        num_bytes += 1;

        if len == 0 {
            break;
        }
    }

    return Ok(num_bytes);
}

/// Decodes a Remaining Length varint, consuming its bytes.
///
/// ## Returns (length_of_encoded_length, remaining_length)
pub fn decode_remaining_length(bytes: &mut Bytes) -> Result<(usize, usize), DecodeError> {
    let mut mult = 1;
    let mut len: usize = 0;

    for i in 0..4 {
        let byte = take_u8(bytes)?;
        len += (byte as usize & 127) * mult;
        mult *= 128;

        if byte & 128 == 0 {
            return Ok((i + 1, len));
        }
    }

    return Err(DecodeError::new(
        DecodeErrorKind::MalformedLength,
        String::from("Remaining Length continued past its fourth byte."),
    ));
}

/// Assembles a full control packet: type byte, Remaining Length, body.
pub fn encode_packet(first_byte: u8, body: &[u8]) -> Result<Bytes, EncodeError> {
    let mut bytes = BytesMut::with_capacity(2 + body.len());
    bytes.put_u8(first_byte);
    encode_remaining_length(&mut bytes, body.len())?;
    bytes.put_slice(body);
    return Ok(bytes.into());
}

pub fn encode_utf8(bytes: &mut BytesMut, val: &str) -> Result<(), EncodeError> {
    return encode_bytes(bytes, val.as_bytes());
}

pub fn encode_bytes(bytes: &mut BytesMut, val: &[u8]) -> Result<(), EncodeError> {
    let len = val.len() as u16;

    bytes.put_slice(&len.to_be_bytes());
    bytes.put_slice(val);

    return Ok(());
}

pub fn decode_utf8(bytes: &mut Bytes) -> Result<String, DecodeError> {
    let slice = decode_bytes(bytes)?;

    match String::from_utf8(slice.to_vec()) {
        Ok(string) => return Ok(string),
        Err(err) => {
            return Err(DecodeError::new(
                DecodeErrorKind::BadUtf8,
                err.to_string(),
            ))
        }
    }
}

pub fn decode_bytes(bytes: &mut Bytes) -> Result<Bytes, DecodeError> {
    let len = take_u16(bytes)?;

    if len as usize > bytes.len() {
        return Err(DecodeError::new(
            DecodeErrorKind::BadTopicLen,
            format!(
                "Field claims {len} bytes but only {} remain in the packet.",
                bytes.len()
            ),
        ));
    }

    let slice = bytes.slice(0..len as usize);
    bytes.advance(len as usize);
    return Ok(slice);
}

/// Bounds-checked single byte read. `bytes::Buf` panics on underflow, and a
/// malformed frame off the network must never take the process down.
pub fn take_u8(bytes: &mut Bytes) -> Result<u8, DecodeError> {
    if bytes.is_empty() {
        return Err(short_body());
    }
    return Ok(bytes.get_u8());
}

pub fn take_u16(bytes: &mut Bytes) -> Result<u16, DecodeError> {
    if bytes.len() < 2 {
        return Err(short_body());
    }
    return Ok(bytes.get_u16());
}

fn short_body() -> DecodeError {
    return DecodeError::new(
        DecodeErrorKind::ShortRead,
        String::from("Packet body ended before the declared field."),
    );
}

/// Reads one control packet off the stream.
///
/// The first byte is awaited for as long as the caller keeps polling; once
/// it arrives the rest of the frame must land within `frame_wait`, so one
/// stalled peer cannot wedge its session task forever mid-packet.
///
/// ## Returns None when the stream is cleanly closed between frames.
pub async fn read_packet<S>(
    stream: &mut S,
    frame_wait: Duration,
) -> Result<Option<MqttPacket>, DecodeError>
where
    S: AsyncRead + Unpin,
{
    let mut first = [0u8; 1];
    match stream.read(&mut first).await {
        Ok(0) => return Ok(None),
        Ok(_) => {}
        Err(err) => {
            return Err(DecodeError::new(
                DecodeErrorKind::ShortRead,
                format!("Transport error while waiting for a packet: {err}"),
            ))
        }
    }

    return read_packet_after(stream, first[0], frame_wait).await.map(Some);
}

/// Completes a frame whose first byte the caller already holds (e.g. pulled
/// with a non-blocking read on a readiness edge). The remainder must arrive
/// within `frame_wait`.
pub async fn read_packet_after<S>(
    stream: &mut S,
    first_byte: u8,
    frame_wait: Duration,
) -> Result<MqttPacket, DecodeError>
where
    S: AsyncRead + Unpin,
{
    let rest = read_frame_rest(stream, first_byte).fuse();
    let stall = sleep(frame_wait).fuse();
    pin_mut!(rest, stall);

    futures::select! {
        packet = rest => return packet,
        _ = stall => {
            return Err(DecodeError::new(
                DecodeErrorKind::ShortRead,
                String::from("Peer stalled mid-frame past the frame wait."),
            ));
        }
    }
}

async fn read_frame_rest<S>(stream: &mut S, first_byte: u8) -> Result<MqttPacket, DecodeError>
where
    S: AsyncRead + Unpin,
{
    let mut rest_len: usize = 0;
    let mut mult: usize = 1;
    let mut complete = false;

    for _ in 0..4 {
        let byte = read_byte(stream).await?;
        rest_len += (byte as usize & 127) * mult;
        mult *= 128;

        if byte & 128 == 0 {
            complete = true;
            break;
        }
    }

    if !complete {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedLength,
            String::from("Remaining Length continued past its fourth byte."),
        ));
    }

    let mut body = vec![0u8; rest_len];
    if let Err(err) = stream.read_exact(&mut body).await {
        return Err(DecodeError::new(
            DecodeErrorKind::ShortRead,
            format!("Stream closed mid-packet: {err}"),
        ));
    }

    let header = FixedHeader::from_parts(first_byte, rest_len)?;
    let mut body = Bytes::from(body);
    return MqttPacket::decode(header, &mut body);
}

async fn read_byte<S>(stream: &mut S) -> Result<u8, DecodeError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1];
    match stream.read_exact(&mut buf).await {
        Ok(_) => return Ok(buf[0]),
        Err(err) => {
            return Err(DecodeError::new(
                DecodeErrorKind::ShortRead,
                format!("Stream closed mid-packet: {err}"),
            ))
        }
    }
}


#[cfg(test)]
mod strings {
    use bytes::{Bytes, BytesMut};

    use super::{decode_utf8, encode_utf8};
    use crate::err::DecodeErrorKind;

    #[test]
    fn empty_strings_are_legal() {
        let mut buf = BytesMut::new();
        encode_utf8(&mut buf, "").unwrap();
        assert_eq!(&buf[..], &[0, 0]);

        let mut bytes = Bytes::from(buf);
        assert_eq!(decode_utf8(&mut bytes).unwrap(), "");
    }

    #[test]
    fn declared_length_cannot_outrun_the_packet() {
        let mut bytes = Bytes::from_static(&[0x00, 0x05, b'a', b'b']);
        let err = decode_utf8(&mut bytes).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::BadTopicLen);
    }
}

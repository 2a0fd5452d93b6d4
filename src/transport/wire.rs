//! # Wire Framing
//!
//! `[u32 total_size][header bytes][metadata bytes][payload bytes]`, all
//! integers little-endian (§4.2, §6). The framing is transport-agnostic:
//! TCP reads it off a stream length-prefixed the way the teacher's
//! `tcp_socket::read_message`/`write_message` do; MPI sends the same bytes
//! over a single `Send`. The thread transport bypasses this entirely and
//! hands the `Message` object across an in-process channel.

use crate::error::{MultioError, Result};
use crate::message::{Message, Payload, Peer, Tag};
use crate::metadata::Metadata;

fn write_domain(buf: &mut Vec<u8>, domain: &str) {
    let bytes = domain.as_bytes();
    buf.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn read_domain(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u16(buf, pos)? as usize;
    let end = *pos + len;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| MultioError::TransportFailure("truncated peer domain".into()))?;
    *pos = end;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MultioError::TransportFailure(format!("non-utf8 peer domain: {e}")))
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Result<u16> {
    let end = *pos + 2;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| MultioError::TransportFailure("truncated frame (u16)".into()))?;
    *pos = end;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_i64(buf: &[u8], pos: &mut usize) -> Result<i64> {
    let end = *pos + 8;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| MultioError::TransportFailure("truncated frame (i64)".into()))?;
    *pos = end;
    Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let bytes = buf
        .get(*pos..end)
        .ok_or_else(|| MultioError::TransportFailure("truncated frame (u32)".into()))?;
    *pos = end;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn write_peer(buf: &mut Vec<u8>, peer: &Peer) {
    write_domain(buf, &peer.domain);
    buf.extend_from_slice(&peer.id.to_le_bytes());
}

fn read_peer(buf: &[u8], pos: &mut usize) -> Result<Peer> {
    let domain = read_domain(buf, pos)?;
    let id = read_i64(buf, pos)?;
    Ok(Peer { domain, id })
}

/// Encode a message as `[header][metadata][payload]`, without the leading
/// `total_size` prefix (callers that need the prefix, e.g. a stream-based
/// transport, add it around this).
pub fn encode_body(msg: &Message) -> Vec<u8> {
    let mut buf = Vec::with_capacity(64 + msg.payload().size());
    buf.push(msg.tag() as u8);
    write_peer(&mut buf, msg.source());
    write_peer(&mut buf, msg.destination());
    let metadata_bytes = msg.metadata().to_wire_bytes();
    buf.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(&metadata_bytes);
    buf.extend_from_slice(msg.payload().data());
    buf
}

/// Prefix a body with its `u32` total length, ready to write to a stream.
pub fn encode_frame(msg: &Message) -> Vec<u8> {
    let body = encode_body(msg);
    let mut framed = Vec::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_le_bytes());
    framed.extend_from_slice(&body);
    framed
}

/// Decode a message from a body (no length prefix).
pub fn decode_body(buf: &[u8]) -> Result<Message> {
    let mut pos = 0usize;
    let tag_byte = *buf
        .first()
        .ok_or_else(|| MultioError::TransportFailure("empty frame".into()))?;
    pos += 1;
    let tag = Tag::from_byte(tag_byte)?;
    let source = read_peer(buf, &mut pos)?;
    let destination = read_peer(buf, &mut pos)?;
    let metadata_len = read_u32(buf, &mut pos)? as usize;
    let metadata_end = pos + metadata_len;
    let metadata_bytes = buf
        .get(pos..metadata_end)
        .ok_or_else(|| MultioError::TransportFailure("truncated metadata frame".into()))?;
    let metadata = Metadata::from_wire_bytes(metadata_bytes)?;
    pos = metadata_end;
    let payload = Payload::new(buf[pos..].to_vec());

    Ok(Message::new(tag, source, destination, metadata, payload))
}

/// Read the `u32` length prefix out of the first 4 bytes of a frame.
pub fn frame_len_prefix(len_bytes: [u8; 4]) -> u32 {
    u32::from_le_bytes(len_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Tag;

    #[test]
    fn round_trips_a_field_message() {
        let mut meta = Metadata::new();
        meta.set("precision", "single");
        meta.set("step", 3i64);
        let msg = Message::new(
            Tag::Field,
            Peer::new("sim", 1),
            Peer::new("io", 0),
            meta,
            Payload::new(vec![1, 2, 3, 4, 5, 6, 7, 8]),
        );

        let framed = encode_frame(&msg);
        let total = frame_len_prefix(framed[0..4].try_into().unwrap()) as usize;
        assert_eq!(total, framed.len() - 4);

        let decoded = decode_body(&framed[4..]).unwrap();
        assert_eq!(decoded.tag(), Tag::Field);
        assert_eq!(decoded.source(), msg.source());
        assert_eq!(decoded.destination(), msg.destination());
        assert_eq!(decoded.payload().data(), msg.payload().data());
        assert_eq!(
            decoded.metadata().get::<i64>("step").unwrap(),
            msg.metadata().get::<i64>("step").unwrap()
        );
    }
}

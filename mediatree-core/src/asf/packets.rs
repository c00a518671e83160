//! Data Object packets.
//!
//! ```text
//! [error correction]  flags  ec_length bytes
//! length type flags   multiple | sequence | padding | packet length
//! property flags      replicated | offset | object number | stream number
//! packet length, sequence, padding length, send time (u32), duration (u16)
//! [payload flags]     count | payload length type        (multiple only)
//! payload*            stream, object number, offset, replicated data, data
//! padding
//! ```

use bytes::{Buf, Bytes};

use crate::error::{DemuxError, Result};
use crate::node::ByteRange;

const ERROR_CORRECTION_PRESENT: u8 = 0x80;
const MULTIPLE_PAYLOADS: u8 = 0x01;
const KEYFRAME: u8 = 0x80;

/// Replicated data length marking a compressed payload.
const COMPRESSED: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payload {
    pub stream: u8,
    pub keyframe: bool,
    pub media_object: u32,
    /// Milliseconds, preroll included.
    pub presentation_ms: u32,
    /// Absolute position of the payload data.
    pub range: ByteRange,
}

fn malformed(reason: impl Into<String>) -> DemuxError {
    DemuxError::malformed("packet", reason)
}

fn need(buf: &Bytes, n: u64, what: &str) -> Result<()> {
    if (buf.remaining() as u64) < n {
        return Err(malformed(format!("{} truncated", what)));
    }
    Ok(())
}

/// Field whose width is given by a 2-bit length type.
fn read_typed(buf: &mut Bytes, length_type: u8, what: &str) -> Result<u32> {
    match length_type & 0x03 {
        0 => Ok(0),
        1 => {
            need(buf, 1, what)?;
            Ok(buf.get_u8() as u32)
        }
        2 => {
            need(buf, 2, what)?;
            Ok(buf.get_u16_le() as u32)
        }
        _ => {
            need(buf, 4, what)?;
            Ok(buf.get_u32_le())
        }
    }
}

/// Every payload of one fixed-size packet starting at absolute offset `base`.
/// Compressed payloads yield one entry per sub-payload.
pub fn parse_packet(packet: Bytes, base: u64) -> Result<Vec<Payload>> {
    let packet_size = packet.len() as u64;
    let mut buf = packet;
    let consumed = |buf: &Bytes| packet_size - buf.remaining() as u64;

    need(&buf, 1, "packet flags")?;
    let mut flags = buf.get_u8();
    if flags & ERROR_CORRECTION_PRESENT != 0 {
        if (flags >> 5) & 0x03 != 0 {
            return Err(malformed("unsupported error correction length type"));
        }
        let ec_length = (flags & 0x0F) as usize;
        need(&buf, ec_length as u64 + 1, "error correction data")?;
        buf.advance(ec_length);
        flags = buf.get_u8();
    }

    need(&buf, 1, "property flags")?;
    let properties = buf.get_u8();
    let multiple = flags & MULTIPLE_PAYLOADS != 0;

    let packet_length = read_typed(&mut buf, flags >> 5, "packet length")? as u64;
    let _sequence = read_typed(&mut buf, flags >> 1, "sequence")?;
    let padding = read_typed(&mut buf, flags >> 3, "padding length")? as u64;
    need(&buf, 6, "send time")?;
    let send_time = buf.get_u32_le();
    let _duration = buf.get_u16_le();

    let packet_length = if packet_length == 0 || packet_length > packet_size {
        packet_size
    } else {
        packet_length
    };
    let data_end = packet_length
        .checked_sub(padding)
        .ok_or_else(|| malformed("padding larger than packet"))?;

    let replicated_type = properties;
    let offset_type = properties >> 2;
    let object_type = properties >> 4;

    let (count, payload_length_type) = if multiple {
        need(&buf, 1, "payload flags")?;
        let b = buf.get_u8();
        ((b & 0x3F) as usize, b >> 6)
    } else {
        (1, 0)
    };

    let mut payloads = Vec::with_capacity(count);
    for _ in 0..count {
        need(&buf, 1, "stream number")?;
        let stream_byte = buf.get_u8();
        let stream = stream_byte & 0x7F;
        let keyframe = stream_byte & KEYFRAME != 0;
        let media_object = read_typed(&mut buf, object_type, "media object number")?;
        let offset_or_time = read_typed(&mut buf, offset_type, "offset into media object")?;
        let replicated = read_typed(&mut buf, replicated_type, "replicated data length")? as u64;

        if replicated == COMPRESSED {
            // The offset field carries the presentation time instead.
            need(&buf, 1, "presentation time delta")?;
            let delta = buf.get_u8() as u32;
            let here = consumed(&buf);
            let length = payload_length(&mut buf, multiple, payload_length_type, data_end, here)?;
            need(&buf, length, "compressed payload")?;

            let mut pos = consumed(&buf);
            let mut sub = buf.split_to(length as usize);
            let mut index = 0u32;
            while sub.has_remaining() {
                let size = sub.get_u8() as u64;
                pos += 1;
                if size > sub.remaining() as u64 {
                    return Err(malformed("sub-payload overruns its payload"));
                }
                payloads.push(Payload {
                    stream,
                    keyframe,
                    media_object: media_object.wrapping_add(index),
                    presentation_ms: offset_or_time.wrapping_add(index * delta),
                    range: ByteRange::new(base + pos, size),
                });
                sub.advance(size as usize);
                pos += size;
                index += 1;
            }
            continue;
        }

        need(&buf, replicated, "replicated data")?;
        let mut presentation_ms = send_time;
        if replicated >= 8 {
            let _object_size = buf.get_u32_le();
            presentation_ms = buf.get_u32_le();
            buf.advance((replicated - 8) as usize);
        } else {
            buf.advance(replicated as usize);
        }

        let here = consumed(&buf);
        let length = payload_length(&mut buf, multiple, payload_length_type, data_end, here)?;
        need(&buf, length, "payload data")?;
        payloads.push(Payload {
            stream,
            keyframe,
            media_object,
            presentation_ms,
            range: ByteRange::new(base + consumed(&buf), length),
        });
        buf.advance(length as usize);
    }

    Ok(payloads)
}

/// Explicit length for multiple-payload packets; a single payload runs up
/// to the padding.
fn payload_length(buf: &mut Bytes, multiple: bool, length_type: u8, data_end: u64, pos: u64) -> Result<u64> {
    if multiple {
        return Ok(read_typed(buf, length_type, "payload length")? as u64);
    }
    data_end
        .checked_sub(pos)
        .ok_or_else(|| malformed("payload header runs into padding"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_payload_packet() -> Vec<u8> {
        let mut p = vec![0x82, 0x00, 0x00]; // 2 bytes of error correction data
        p.push(0x10); // padding length: u16
        p.push(0x5D); // replicated u8, offset u32, object u8, stream u8
        p.extend_from_slice(&10u16.to_le_bytes());
        p.extend_from_slice(&1000u32.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&[0x81, 0x00]);
        p.extend_from_slice(&0u32.to_le_bytes());
        p.push(8);
        p.extend_from_slice(&26u32.to_le_bytes());
        p.extend_from_slice(&3100u32.to_le_bytes());
        p.resize(64, 0xAB);
        p
    }

    #[test]
    fn single_payload_fills_packet_up_to_padding() {
        let payloads = parse_packet(Bytes::from(single_payload_packet()), 5000).unwrap();
        assert_eq!(
            payloads,
            vec![Payload {
                stream: 1,
                keyframe: true,
                media_object: 0,
                presentation_ms: 3100,
                range: ByteRange::new(5028, 26),
            }]
        );
    }

    #[test]
    fn multiple_and_compressed_payloads() {
        let mut p = vec![0x01, 0x5D];
        p.extend_from_slice(&2000u32.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p.push(0x82); // 2 payloads, u16 lengths

        p.extend_from_slice(&[0x02, 0x01]);
        p.extend_from_slice(&0u32.to_le_bytes());
        p.push(8);
        p.extend_from_slice(&4u32.to_le_bytes());
        p.extend_from_slice(&2000u32.to_le_bytes());
        p.extend_from_slice(&4u16.to_le_bytes());
        p.extend_from_slice(&[1, 2, 3, 4]);

        p.extend_from_slice(&[0x82, 0x02]);
        p.extend_from_slice(&2100u32.to_le_bytes());
        p.push(1); // compressed
        p.push(10); // delta
        p.extend_from_slice(&7u16.to_le_bytes());
        p.extend_from_slice(&[3, 0xA, 0xB, 0xC, 2, 0xD, 0xE]);
        p.resize(64, 0);

        let payloads = parse_packet(Bytes::from(p), 0).unwrap();
        let summary: Vec<_> = payloads
            .iter()
            .map(|p| (p.stream, p.keyframe, p.presentation_ms, p.range.offset, p.range.size))
            .collect();
        assert_eq!(
            summary,
            vec![(2, false, 2000, 26, 4), (2, true, 2100, 41, 3), (2, true, 2110, 45, 2)]
        );
        assert_eq!(payloads[2].media_object, 3);
    }

    #[test]
    fn truncated_packets_are_errors() {
        let packet = single_payload_packet();
        assert!(parse_packet(Bytes::copy_from_slice(&packet[..20]), 0).is_err());
        assert!(parse_packet(Bytes::new(), 0).is_err());
    }
}

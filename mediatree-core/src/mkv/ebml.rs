//! EBML variable-length integers, element headers and element values.

use bytes::Buf;

use crate::bitstream::BitCursor;
use crate::error::{DemuxError, Result};
use crate::node::{Node, NodeId};
use crate::walker::{HeaderCodec, Walk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vint {
    pub length: usize,
    /// Value with the length marker stripped.
    pub value: u64,
}

impl Vint {
    /// All value bits set: the "unknown size" sentinel.
    pub fn is_all_ones(&self) -> bool {
        self.value == (1u64 << (7 * self.length)) - 1
    }
}

/// Variable-length integer: the count of leading zero bits in the first
/// byte gives the width, 1 to 8 bytes.
pub fn read_vint<B: Buf>(buf: &mut B) -> Result<Vint> {
    if !buf.has_remaining() {
        return Err(DemuxError::malformed("vint", "missing vint byte"));
    }
    let first = buf.get_u8();
    let length = first.leading_zeros() as usize + 1;
    if length > 8 {
        return Err(DemuxError::malformed("vint", "vint without a length marker"));
    }
    if buf.remaining() < length - 1 {
        return Err(DemuxError::malformed(
            "vint",
            format!("truncated {}-byte vint", length),
        ));
    }

    let value = (1..length).fold((first as u64) & ((1u64 << (8 - length)) - 1), |value, _| {
        (value << 8) | buf.get_u8() as u64
    });
    Ok(Vint { length, value })
}

/// Signed vint as used by EBML lacing: the stored value is biased by half
/// the range of its width.
pub fn read_signed_vint<B: Buf>(buf: &mut B) -> Result<i64> {
    let vint = read_vint(buf)?;
    let bias = (1i64 << (7 * vint.length - 1)) - 1;
    Ok(vint.value as i64 - bias)
}

/// Element ID, length marker kept, 1 to 4 bytes wide.
pub fn read_element_id(cursor: &mut BitCursor) -> Result<u32> {
    let first = cursor.read_u8()?;
    let width = first.leading_zeros() + 1;
    if width > 4 {
        return Err(DemuxError::malformed(
            "element",
            format!("invalid element id byte 0x{:02X}", first),
        ));
    }
    let mut id = first as u32;
    for _ in 1..width {
        id = (id << 8) | cursor.read_u8()? as u32;
    }
    Ok(id)
}

fn read_cursor_vint(cursor: &mut BitCursor) -> Result<Vint> {
    let pos = cursor.absolute_byte_offset();
    let mut window = cursor
        .slice(pos, cursor.remaining_bytes().min(8))
        .unwrap_or_default();
    let vint = read_vint(&mut window)?;
    cursor.skip_bytes(vint.length as u64)?;
    Ok(vint)
}

pub struct EbmlHeader;

impl HeaderCodec for EbmlHeader {
    const MIN_HEADER_SIZE: u64 = 2;

    fn read_header(cursor: &mut BitCursor, parent: &Node) -> Result<Node> {
        let start = cursor.absolute_byte_offset();
        let id = read_element_id(cursor)?;
        let size = read_cursor_vint(cursor)?;
        let header_size = cursor.absolute_byte_offset() - start;

        if size.is_all_ones() {
            let mut node = Node::new(NodeId::Ebml(id), start, header_size, parent.offset_end);
            node.unknown_size = true;
            return Ok(node);
        }
        let end = (start + header_size).saturating_add(size.value);
        Ok(Node::new(NodeId::Ebml(id), start, header_size, end))
    }
}

// ============================================================================
// Element values
// ============================================================================

pub fn read_uint(walk: &mut Walk<'_>, node: &Node) -> Result<u64> {
    let len = node.payload_size();
    if len > 8 {
        return Err(DemuxError::malformed(node.id.to_string(), format!("{}-byte unsigned integer", len)));
    }
    if len == 0 {
        return Ok(0);
    }
    Ok(walk.cursor.read_bits64(len as u32 * 8)?)
}

pub fn read_sint(walk: &mut Walk<'_>, node: &Node) -> Result<i64> {
    let len = node.payload_size();
    let raw = read_uint(walk, node)?;
    if len == 0 || len == 8 {
        return Ok(raw as i64);
    }
    let shift = 64 - len * 8;
    Ok(((raw << shift) as i64) >> shift)
}

pub fn read_float(walk: &mut Walk<'_>, node: &Node) -> Result<f64> {
    match node.payload_size() {
        0 => Ok(0.0),
        4 => Ok(walk.cursor.read_f32()? as f64),
        8 => Ok(walk.cursor.read_f64()?),
        len => Err(DemuxError::malformed(node.id.to_string(), format!("{}-byte float", len))),
    }
}

pub fn read_string(walk: &Walk<'_>, node: &Node) -> String {
    crate::riff::fixed_string(&walk.payload(node))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vint(bytes: &[u8]) -> Result<Vint> {
        let mut data = bytes;
        read_vint(&mut data)
    }

    #[test]
    fn vint_widths() {
        assert_eq!(vint(b"\x85").unwrap(), Vint { length: 1, value: 5 });
        assert_eq!(vint(b"\x21\x00\x10").unwrap(), Vint { length: 3, value: 0x01_0010 });
        let widest = vint(b"\x01\x00\x00\x00\x00\x00\x12\x34").unwrap();
        assert_eq!(widest, Vint { length: 8, value: 0x1234 });
    }

    #[test]
    fn all_ones_marks_unknown_size() {
        assert!(vint(b"\xFF").unwrap().is_all_ones());
        assert!(vint(b"\x7F\xFF").unwrap().is_all_ones());
        assert!(vint(b"\x01\xFF\xFF\xFF\xFF\xFF\xFF\xFF").unwrap().is_all_ones());
        assert!(!vint(b"\x7F\xFE").unwrap().is_all_ones());
    }

    #[test]
    fn rejects_bad_vints() {
        assert!(vint(b"").is_err());
        assert!(vint(b"\x00\x01").is_err());
        assert!(vint(b"\x01\x00\x00").is_err());
    }

    #[test]
    fn signed_vints() {
        let mut data = &b"\xBF"[..];
        assert_eq!(read_signed_vint(&mut data).unwrap(), 0);
        let mut data = &b"\x80"[..];
        assert_eq!(read_signed_vint(&mut data).unwrap(), -63);
        let mut data = &b"\x5F\xFE"[..];
        assert_eq!(read_signed_vint(&mut data).unwrap(), -1);
    }

    #[test]
    fn element_ids_keep_marker() {
        let mut c = BitCursor::new(b"\x1A\x45\xDF\xA3\x84".to_vec());
        assert_eq!(read_element_id(&mut c).unwrap(), 0x1A45_DFA3);
        let mut c = BitCursor::new(b"\x10\x00\x00\x01".to_vec());
        assert_eq!(read_element_id(&mut c).unwrap(), 0x1000_0001);
        let mut c = BitCursor::new(b"\x08\x00\x00\x00\x01".to_vec());
        assert!(read_element_id(&mut c).is_err());
    }

    #[test]
    fn unknown_size_extends_to_parent() {
        let mut data = b"\x1F\x43\xB6\x75\x01\xFF\xFF\xFF\xFF\xFF\xFF\xFF".to_vec();
        data.resize(100, 0);
        let mut parent = Node::root(100);
        parent.offset_end = 80;
        let mut c = BitCursor::new(data);
        let node = EbmlHeader::read_header(&mut c, &parent).unwrap();
        assert_eq!(node.id, NodeId::Ebml(0x1F43_B675));
        assert!(node.unknown_size);
        assert_eq!(node.header_size, 12);
        assert_eq!(node.offset_end, 80);
    }

    #[test]
    fn sized_element() {
        let mut c = BitCursor::new(b"\xE7\x81\x05".to_vec());
        let node = EbmlHeader::read_header(&mut c, &Node::root(3)).unwrap();
        assert_eq!(node.id, NodeId::Ebml(0xE7));
        assert_eq!((node.header_size, node.offset_end), (2, 3));
    }
}

//! ISO-BMFF box header codec.

use crate::bitstream::BitCursor;
use crate::error::{DemuxError, Result};
use crate::node::{FourCc, FullHeader, Node, NodeId};
use crate::walker::HeaderCodec;

pub const UUID: FourCc = FourCc::new(b"uuid");

pub struct BoxHeader;

impl HeaderCodec for BoxHeader {
    const MIN_HEADER_SIZE: u64 = 8;

    fn read_header(cursor: &mut BitCursor, _parent: &Node) -> Result<Node> {
        let start = cursor.absolute_byte_offset();
        let size = cursor.read_u32()?;
        let box_type = FourCc(cursor.read_array::<4>()?);

        let mut header_size = 8;
        let end = match size {
            // Extends to the end of the file.
            0 => cursor.total_size(),
            1 => {
                let large = cursor.read_u64()?;
                header_size = 16;
                if large < 16 {
                    return Err(DemuxError::malformed(
                        box_type.to_string(),
                        format!("invalid extended box size {}", large),
                    ));
                }
                start.saturating_add(large)
            }
            n if n < 8 => {
                return Err(DemuxError::malformed(
                    box_type.to_string(),
                    format!("invalid box size {}", n),
                ));
            }
            n => start + n as u64,
        };

        let extended_type = if box_type == UUID {
            header_size += 16;
            Some(cursor.read_array::<16>()?)
        } else {
            None
        };

        let mut node = Node::new(NodeId::FourCc(box_type), start, header_size, end);
        node.extended_type = extended_type;
        Ok(node)
    }
}

/// Read the version/flags prefix of a full box and widen its header.
pub fn read_full_header(cursor: &mut BitCursor, node: &mut Node) -> Result<FullHeader> {
    let version = cursor.read_u8()?;
    let flags = cursor.read_u24()?;
    let header = FullHeader { version, flags };
    node.full_header = Some(header);
    node.header_size += 4;
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(data: &[u8], file_size: usize) -> Result<Node> {
        let mut bytes = data.to_vec();
        bytes.resize(file_size.max(data.len()), 0);
        let root = Node::root(bytes.len() as u64);
        let mut c = BitCursor::new(bytes);
        BoxHeader::read_header(&mut c, &root)
    }

    #[test]
    fn parses_basic_box_header() {
        let node = header(b"\x00\x00\x00\x10ftyp", 16).expect("header");
        assert_eq!(node.id, NodeId::tag(b"ftyp"));
        assert_eq!(node.offset_end, 16);
        assert_eq!(node.header_size, 8);
    }

    #[test]
    fn large_size_field() {
        let node = header(b"\x00\x00\x00\x01mdat\x00\x00\x00\x00\x00\x00\x00\x28", 64).expect("header");
        assert_eq!(node.size(), 40);
        assert_eq!(node.header_size, 16);
    }

    #[test]
    fn zero_size_extends_to_end_of_file() {
        let mut data = vec![0u8; 1000];
        data[904..908].copy_from_slice(b"mdat");
        let root = Node::root(1000);
        let mut c = BitCursor::new(data);
        c.goto_byte_offset(900).unwrap();
        let node = BoxHeader::read_header(&mut c, &root).expect("header");
        assert_eq!(node.offset_start, 900);
        assert_eq!(node.offset_end, 1000);
    }

    #[test]
    fn uuid_box_carries_extended_type() {
        let mut data = b"\x00\x00\x00\x20uuid".to_vec();
        data.extend_from_slice(&[0xAB; 16]);
        let node = header(&data, 32).expect("header");
        assert_eq!(node.extended_type, Some([0xAB; 16]));
        assert_eq!(node.payload_offset(), 24);
    }

    #[test]
    fn rejects_too_small_box() {
        let err = header(b"\x00\x00\x00\x07free", 16).unwrap_err();
        assert!(err.to_string().contains("invalid box size"));
    }

    #[test]
    fn full_header_widens_header() {
        let mut c = BitCursor::new(b"\x00\x00\x00\x10mvhd\x01\x00\x00\x03".to_vec());
        let root = Node::root(16);
        let mut node = BoxHeader::read_header(&mut c, &root).unwrap();
        let fh = read_full_header(&mut c, &mut node).unwrap();
        assert_eq!(fh.version, 1);
        assert_eq!(fh.flags, 3);
        assert_eq!(node.payload_offset(), 12);
        assert_eq!(node.version(), 1);
    }
}

//! The node model shared by every container: one header, one byte extent.

use std::fmt;

use serde::{Serialize, Serializer};
use uuid::Uuid;

/// Four packed ASCII bytes, kept in file order.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Big-endian value, as the code appears in ISO-BMFF type fields.
    pub fn as_u32(&self) -> u32 {
        u32::from_be_bytes(self.0)
    }

    pub fn from_u32(v: u32) -> Self {
        Self(v.to_be_bytes())
    }

    pub fn to_ascii_uppercase(&self) -> Self {
        Self(self.0.map(|b| b.to_ascii_uppercase()))
    }

    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Format-specific node discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    /// Synthetic parent spanning the whole file.
    Root,
    /// ISO-BMFF box type or RIFF chunk tag.
    FourCc(FourCc),
    /// RIFF `RIFF`/`LIST` node, keyed by its list type.
    List(FourCc),
    /// EBML element ID, length marker included.
    Ebml(u32),
    /// ASF object GUID.
    Guid(Uuid),
}

impl NodeId {
    pub const fn tag(bytes: &[u8; 4]) -> Self {
        NodeId::FourCc(FourCc::new(bytes))
    }

    pub const fn list(bytes: &[u8; 4]) -> Self {
        NodeId::List(FourCc::new(bytes))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Root => write!(f, "root"),
            NodeId::FourCc(cc) => write!(f, "{}", cc),
            NodeId::List(cc) => write!(f, "LIST<{}>", cc),
            NodeId::Ebml(id) => write!(f, "0x{:X}", id),
            NodeId::Guid(g) => write!(f, "{}", g),
        }
    }
}

/// Version and flags of an ISO-BMFF "full box".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FullHeader {
    pub version: u8,
    pub flags: u32,
}

/// One node of a container tree. `offset_end` is what the file *declares*;
/// it is only trusted after the resync guard cross-checks it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub offset_start: u64,
    pub offset_end: u64,
    /// Bytes between `offset_start` and the payload.
    pub header_size: u64,
    /// ISO-BMFF `uuid` boxes carry a 16 byte extended type.
    pub extended_type: Option<[u8; 16]>,
    /// EBML "unknown size": extends to the end of the parent.
    pub unknown_size: bool,
    pub full_header: Option<FullHeader>,
    pub depth: usize,
}

impl Node {
    pub fn new(id: NodeId, offset_start: u64, header_size: u64, offset_end: u64) -> Self {
        Self {
            id,
            offset_start,
            offset_end: offset_end.max(offset_start + header_size),
            header_size,
            extended_type: None,
            unknown_size: false,
            full_header: None,
            depth: 0,
        }
    }

    /// Synthetic node covering `0..size`.
    pub fn root(size: u64) -> Self {
        Self::new(NodeId::Root, 0, 0, size)
    }

    pub fn payload_offset(&self) -> u64 {
        self.offset_start + self.header_size
    }

    pub fn payload_size(&self) -> u64 {
        self.offset_end.saturating_sub(self.payload_offset())
    }

    pub fn size(&self) -> u64 {
        self.offset_end - self.offset_start
    }

    pub fn fourcc(&self) -> Option<FourCc> {
        match self.id {
            NodeId::FourCc(cc) | NodeId::List(cc) => Some(cc),
            _ => None,
        }
    }

    pub fn version(&self) -> u8 {
        self.full_header.map(|h| h.version).unwrap_or(0)
    }

    pub fn flags(&self) -> u32 {
        self.full_header.map(|h| h.flags).unwrap_or(0)
    }
}

/// Absolute byte range inside the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub offset: u64,
    pub size: u64,
}

impl ByteRange {
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_display_escapes_binary() {
        assert_eq!(FourCc::new(b"moov").to_string(), "moov");
        assert_eq!(FourCc([b'a', 0, b'c', b'd']).to_string(), "a\\x00cd");
        assert_eq!(FourCc::from_u32(0x6D6F6F76), FourCc::new(b"moov"));
    }

    #[test]
    fn node_end_never_precedes_header() {
        let n = Node::new(NodeId::FourCc(FourCc::new(b"free")), 100, 8, 104);
        assert_eq!(n.offset_end, 108);
        assert_eq!(n.payload_size(), 0);
    }
}

//! `SimpleBlock` / `Block` payloads and their four lacing modes.

use bytes::{Buf, Bytes};

use crate::error::{DemuxError, Result};
use crate::mkv::ebml::{read_signed_vint, read_vint};
use crate::node::ByteRange;

const KEYFRAME: u8 = 0x80;
const LACING_MASK: u8 = 0x06;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lacing {
    None,
    Xiph,
    Fixed,
    Ebml,
}

impl Lacing {
    fn from_flags(flags: u8) -> Self {
        match (flags & LACING_MASK) >> 1 {
            0 => Lacing::None,
            1 => Lacing::Xiph,
            2 => Lacing::Fixed,
            _ => Lacing::Ebml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub track: u64,
    /// Relative to the cluster timecode, in TimecodeScale units.
    pub timecode: i16,
    /// Only meaningful for `SimpleBlock`.
    pub keyframe: bool,
    pub lacing: Lacing,
    /// Absolute byte range of every frame, in storage order.
    pub frames: Vec<ByteRange>,
}

fn malformed(reason: impl Into<String>) -> DemuxError {
    DemuxError::malformed("block", reason)
}

/// Parse a block payload that starts at absolute offset `base`.
pub fn parse_block(payload: Bytes, base: u64) -> Result<Block> {
    let total = payload.len() as u64;
    let mut buf = payload;

    let track = read_vint(&mut buf)?.value;
    if buf.remaining() < 3 {
        return Err(malformed("block header truncated"));
    }
    let timecode = buf.get_i16();
    let flags = buf.get_u8();
    let lacing = Lacing::from_flags(flags);

    let sizes = match lacing {
        Lacing::None => vec![buf.remaining() as u64],
        _ => {
            if !buf.has_remaining() {
                return Err(malformed("missing lace count"));
            }
            let count = buf.get_u8() as usize + 1;
            lace_sizes(&mut buf, lacing, count)?
        }
    };

    let mut offset = base + (total - buf.remaining() as u64);
    let frames = sizes
        .into_iter()
        .map(|size| {
            let frame = ByteRange::new(offset, size);
            offset += size;
            frame
        })
        .collect();

    Ok(Block {
        track,
        timecode,
        keyframe: flags & KEYFRAME != 0,
        lacing,
        frames,
    })
}

/// Sizes of all `count` laced frames. The last size is implied by what is
/// left of the payload once the lace header has been read.
fn lace_sizes(buf: &mut Bytes, lacing: Lacing, count: usize) -> Result<Vec<u64>> {
    let mut sizes = Vec::with_capacity(count);

    match lacing {
        Lacing::None => return Ok(vec![buf.remaining() as u64]),
        Lacing::Xiph => {
            for _ in 1..count {
                let mut size = 0u64;
                loop {
                    if !buf.has_remaining() {
                        return Err(malformed("Xiph lace size truncated"));
                    }
                    let byte = buf.get_u8();
                    size += byte as u64;
                    if byte != 0xFF {
                        break;
                    }
                }
                sizes.push(size);
            }
        }
        // A single frame carries no size fields.
        Lacing::Ebml if count > 1 => {
            let mut size = read_vint(buf)?.value as i64;
            sizes.push(size as u64);
            for _ in 2..count {
                size = size
                    .checked_add(read_signed_vint(buf)?)
                    .filter(|s| *s >= 0)
                    .ok_or_else(|| malformed("EBML lace size out of range"))?;
                sizes.push(size as u64);
            }
        }
        Lacing::Ebml => {}
        Lacing::Fixed => {
            let remaining = buf.remaining() as u64;
            if remaining % count as u64 != 0 {
                return Err(malformed(format!(
                    "{} bytes do not split into {} equal frames",
                    remaining, count
                )));
            }
            return Ok(vec![remaining / count as u64; count]);
        }
    }

    let laced = sizes.iter().fold(0u64, |sum, s| sum.saturating_add(*s));
    let remaining = buf.remaining() as u64;
    if laced > remaining {
        return Err(malformed(format!(
            "lace sizes total {} but only {} bytes remain",
            laced, remaining
        )));
    }
    sizes.push(remaining - laced);
    Ok(sizes)
}

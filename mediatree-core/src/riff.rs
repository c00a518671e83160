//! RIFF chunk layer shared by AVI and WAVE.
//!
//! Structure:
//! ```text
//! RIFF <size> <form>          form = 'AVI ', 'AVIX', 'WAVE'
//! ├── LIST <size> <type>      nested lists
//! │   └── <tag> <size> data   chunks, padded to an even size
//! └── ...
//! ```
//! Sizes are little-endian and exclude the 8-byte tag/size prefix.

use serde::Serialize;
use uuid::Uuid;

use crate::bitstream::BitCursor;
use crate::codec::Codec;
use crate::error::{DemuxError, Result};
use crate::media::{AudioParams, MediaFile, VideoParams};
use crate::node::{ByteRange, FourCc, Node, NodeId};
use crate::walker::{walk_children, Format, HeaderCodec, Walk};

// ============================================================================
// Header codec
// ============================================================================

pub const RIFF: FourCc = FourCc::new(b"RIFF");
pub const RF64: FourCc = FourCc::new(b"RF64");
pub const LIST: FourCc = FourCc::new(b"LIST");

pub struct RiffHeader;

impl HeaderCodec for RiffHeader {
    const MIN_HEADER_SIZE: u64 = 8;

    fn read_header(cursor: &mut BitCursor, parent: &Node) -> Result<Node> {
        let mut start = cursor.absolute_byte_offset();
        // Word alignment: odd-sized chunks are followed by a pad byte.
        if start % 2 == 1 && start + 1 < parent.offset_end {
            cursor.skip_bytes(1)?;
            start += 1;
        }

        let tag = FourCc(cursor.read_array::<4>()?);
        let size = cursor.read_u32_le()? as u64;
        let end = start + 8 + size;

        if tag == RIFF || tag == RF64 || tag == LIST {
            let list_type = FourCc(cursor.read_array::<4>()?);
            return Ok(Node::new(NodeId::List(list_type), start, 12, end));
        }
        Ok(Node::new(NodeId::FourCc(tag), start, 8, end))
    }
}

// ============================================================================
// WAVEFORMATEX / BITMAPINFOHEADER
// ============================================================================

pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub valid_bits_per_sample: Option<u16>,
    pub channel_mask: Option<u32>,
    pub sub_format: Option<Uuid>,
    /// Codec specific bytes after the structure.
    pub extra: Option<ByteRange>,
}

impl WaveFormat {
    /// Read a WAVEFORMAT(EX/EXTENSIBLE) ending at `end`.
    pub fn read(cursor: &mut BitCursor, end: u64) -> Result<Self> {
        let mut fmt = WaveFormat {
            format_tag: cursor.read_u16_le()?,
            channels: cursor.read_u16_le()?,
            samples_per_sec: cursor.read_u32_le()?,
            avg_bytes_per_sec: cursor.read_u32_le()?,
            block_align: cursor.read_u16_le()?,
            ..Default::default()
        };

        // Plain WAVEFORMAT stops here.
        if cursor.absolute_byte_offset() + 2 > end {
            return Ok(fmt);
        }
        fmt.bits_per_sample = cursor.read_u16_le()?;

        if cursor.absolute_byte_offset() + 2 > end {
            return Ok(fmt);
        }
        let cb_size = cursor.read_u16_le()? as u64;
        let extra_start = cursor.absolute_byte_offset();
        let cb_size = cb_size.min(end.saturating_sub(extra_start));

        if fmt.format_tag == WAVE_FORMAT_EXTENSIBLE && cb_size >= 22 {
            fmt.valid_bits_per_sample = Some(cursor.read_u16_le()?);
            fmt.channel_mask = Some(cursor.read_u32_le()?);
            fmt.sub_format = Some(Uuid::from_bytes_le(cursor.read_array::<16>()?));
            if cb_size > 22 {
                fmt.extra = Some(ByteRange::new(extra_start + 22, cb_size - 22));
            }
        } else if cb_size > 0 {
            fmt.extra = Some(ByteRange::new(extra_start, cb_size));
        }
        Ok(fmt)
    }

    /// The format tag, looked through WAVE_FORMAT_EXTENSIBLE.
    pub fn effective_tag(&self) -> u16 {
        match (self.format_tag, self.sub_format) {
            (WAVE_FORMAT_EXTENSIBLE, Some(guid)) => guid.as_fields().0 as u16,
            (tag, _) => tag,
        }
    }

    pub fn codec(&self) -> Codec {
        Codec::from_twocc(self.effective_tag())
    }

    pub fn audio_params(&self) -> AudioParams {
        AudioParams {
            sample_rate: self.samples_per_sec,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
            block_align: self.block_align,
            avg_bytes_per_sec: self.avg_bytes_per_sec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BitmapInfo {
    pub width: i32,
    pub height: i32,
    pub bit_count: u16,
    pub compression: FourCc,
    pub size_image: u32,
    pub extra: Option<ByteRange>,
}

impl BitmapInfo {
    pub fn read(cursor: &mut BitCursor, end: u64) -> Result<Self> {
        let start = cursor.absolute_byte_offset();
        let header_size = cursor.read_u32_le()? as u64;
        let width = cursor.read_i32_le()?;
        let height = cursor.read_i32_le()?;
        let _planes = cursor.read_u16_le()?;
        let bit_count = cursor.read_u16_le()?;
        let compression = FourCc(cursor.read_array::<4>()?);
        let size_image = cursor.read_u32_le()?;

        let extra_start = start + header_size.max(40);
        let extra = (extra_start < end).then(|| ByteRange::new(extra_start, end - extra_start));

        Ok(BitmapInfo {
            width,
            height,
            bit_count,
            compression,
            size_image,
            extra,
        })
    }

    pub fn video_params(&self) -> VideoParams {
        VideoParams {
            width: self.width.unsigned_abs(),
            height: self.height.unsigned_abs(),
            bit_depth: (self.bit_count > 0).then_some(self.bit_count),
            ..Default::default()
        }
    }
}

// ============================================================================
// LIST INFO
// ============================================================================

/// Forms whose `LIST INFO` feeds the media record.
pub(crate) trait RiffForm: Format {
    fn media_mut(&mut self) -> &mut MediaFile;
}

pub(crate) fn info_list<S: RiffForm>(state: &mut S, walk: &mut Walk<'_>, node: &mut Node) -> Result<()> {
    walk_children(state, walk, node)
}

/// `INAM`
pub(crate) fn info_title<S: RiffForm>(state: &mut S, walk: &mut Walk<'_>, node: &mut Node) -> Result<()> {
    let text = info_text(walk, node)?;
    walk.field("title", text.as_str());
    state.media_mut().title = Some(text);
    Ok(())
}

/// `ISFT`
pub(crate) fn info_software<S: RiffForm>(state: &mut S, walk: &mut Walk<'_>, node: &mut Node) -> Result<()> {
    let text = info_text(walk, node)?;
    walk.field("software", text.as_str());
    state.media_mut().writing_app = Some(text);
    Ok(())
}

fn info_text(walk: &Walk<'_>, node: &Node) -> Result<String> {
    let payload = walk.payload(node);
    if payload.is_empty() {
        return Err(DemuxError::malformed(node.id.to_string(), "empty text chunk"));
    }
    Ok(fixed_string(&payload))
}

/// Zero-terminated (or zero-padded) 8-bit text.
pub(crate) fn fixed_string(bytes: &[u8]) -> String {
    let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..len]).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_list_and_chunk_headers() {
        let mut data = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00".to_vec();
        data.resize(44, 0);
        let root = Node::root(44);
        let mut c = BitCursor::new(data);

        let riff = RiffHeader::read_header(&mut c, &root).unwrap();
        assert_eq!(riff.id, NodeId::list(b"WAVE"));
        assert_eq!(riff.header_size, 12);
        assert_eq!(riff.offset_end, 44);

        let fmt = RiffHeader::read_header(&mut c, &riff).unwrap();
        assert_eq!(fmt.id, NodeId::tag(b"fmt "));
        assert_eq!(fmt.offset_start, 12);
        assert_eq!(fmt.offset_end, 36);
    }

    #[test]
    fn skips_pad_byte_after_odd_chunk() {
        let mut data = b"JUNK\x03\x00\x00\x00abc\x00data\x00\x00\x00\x00".to_vec();
        data.resize(24, 0);
        let root = Node::root(24);
        let mut c = BitCursor::new(data);
        let junk = RiffHeader::read_header(&mut c, &root).unwrap();
        assert_eq!(junk.offset_end, 11);
        c.goto_byte_offset(11).unwrap();
        let next = RiffHeader::read_header(&mut c, &root).unwrap();
        assert_eq!(next.id, NodeId::tag(b"data"));
        assert_eq!(next.offset_start, 12);
    }

    #[test]
    fn extensible_format_resolves_sub_format() {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&0xFFFEu16.to_le_bytes());
        fmt.extend_from_slice(&2u16.to_le_bytes());
        fmt.extend_from_slice(&48_000u32.to_le_bytes());
        fmt.extend_from_slice(&288_000u32.to_le_bytes());
        fmt.extend_from_slice(&6u16.to_le_bytes());
        fmt.extend_from_slice(&24u16.to_le_bytes());
        fmt.extend_from_slice(&22u16.to_le_bytes());
        fmt.extend_from_slice(&24u16.to_le_bytes());
        fmt.extend_from_slice(&3u32.to_le_bytes());
        // KSDATAFORMAT_SUBTYPE_IEEE_FLOAT
        fmt.extend_from_slice(&[
            0x03, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0xAA, 0x00, 0x38,
            0x9B, 0x71,
        ]);
        let end = fmt.len() as u64;
        let mut c = BitCursor::new(fmt);
        let wf = WaveFormat::read(&mut c, end).unwrap();
        assert_eq!(wf.effective_tag(), 3);
        assert_eq!(wf.codec(), Codec::PcmFloat);
        assert_eq!(wf.channel_mask, Some(3));
        assert_eq!(wf.extra, None);
    }

    #[test]
    fn bitmap_info_keeps_extra_data() {
        let mut bih = Vec::new();
        bih.extend_from_slice(&40u32.to_le_bytes());
        bih.extend_from_slice(&640i32.to_le_bytes());
        bih.extend_from_slice(&(-480i32).to_le_bytes());
        bih.extend_from_slice(&1u16.to_le_bytes());
        bih.extend_from_slice(&24u16.to_le_bytes());
        bih.extend_from_slice(b"H264");
        bih.resize(40, 0);
        bih.extend_from_slice(&[1, 2, 3, 4]);
        let end = bih.len() as u64;
        let mut c = BitCursor::new(bih);
        let info = BitmapInfo::read(&mut c, end).unwrap();
        assert_eq!(info.video_params().height, 480);
        assert_eq!(Codec::from_fourcc(info.compression), Codec::H264);
        assert_eq!(info.extra, Some(ByteRange::new(40, 4)));
    }

    #[test]
    fn fixed_string_stops_at_nul() {
        assert_eq!(fixed_string(b"Lavf60\0\0\0"), "Lavf60");
        assert_eq!(fixed_string(b"plain "), "plain");
    }
}

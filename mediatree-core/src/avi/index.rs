//! AVI index tables and their reduction to per-stream sample lists.
//!
//! ```text
//! indx  AVISUPERINDEX  wLongsPerEntry bIndexSubType bIndexType nEntriesInUse dwChunkId
//!       INDEX_OF_INDEXES  { qwOffset dwSize dwDuration }*  -> ix## chunks
//!       INDEX_OF_CHUNKS   qwBaseOffset { dwOffset dwSize }*
//! ix##  AVISTDINDEX    same header, qwBaseOffset { dwOffset dwSize }*
//! idx1  AVIOLDINDEX    { ckid dwFlags dwChunkOffset dwChunkLength }*
//! ```

use bytes::Bytes;

use crate::bitstream::BitCursor;
use crate::config::ParseOptions;
use crate::error::{DemuxError, IndexError, Result};
use crate::index;
use crate::jumpy::jumpy;
use crate::media::{Sample, TimeBase};
use crate::node::{FourCc, Node, NodeId};
use crate::riff::RiffHeader;
use crate::walker::HeaderCodec;

pub const AVI_INDEX_OF_INDEXES: u8 = 0x00;
pub const AVI_INDEX_OF_CHUNKS: u8 = 0x01;

pub const AVIIF_LIST: u32 = 0x0000_0001;
pub const AVIIF_KEYFRAME: u32 = 0x0000_0010;

/// Standard index entries flag delta frames in the top bit of the size.
const DELTA_FRAME: u32 = 0x8000_0000;

const REC: FourCc = FourCc::new(b"rec ");

/// One chunk of stream data; `offset` points at the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: u64,
    pub size: u32,
    pub keyframe: bool,
}

impl IndexEntry {
    pub fn standard(base: u64, offset: u32, size: u32) -> Self {
        Self {
            offset: base.saturating_add(offset as u64),
            size: size & !DELTA_FRAME,
            keyframe: size & DELTA_FRAME == 0,
        }
    }
}

/// Location of one `ix##` chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperIndexEntry {
    pub offset: u64,
    pub size: u32,
    pub duration: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Idx1Entry {
    pub chunk_id: FourCc,
    pub flags: u32,
    /// Points at the chunk header, not the payload.
    pub offset: u32,
    pub size: u32,
}

/// Stream number of a data chunk id such as `01wb`.
pub fn stream_number(chunk_id: FourCc) -> Option<usize> {
    let [a, b, ..] = chunk_id.0;
    if a.is_ascii_digit() && b.is_ascii_digit() {
        Some(((a - b'0') as usize) * 10 + (b - b'0') as usize)
    } else {
        None
    }
}

/// Read `count` chunk entries of `entry_size` bytes each.
pub fn read_chunk_entries(
    cursor: &mut BitCursor,
    base: u64,
    count: u64,
    entry_size: u64,
) -> Result<Vec<IndexEntry>> {
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = cursor.read_u32_le()?;
        let size = cursor.read_u32_le()?;
        cursor.skip_bytes(entry_size - 8)?;
        entries.push(IndexEntry::standard(base, offset, size));
    }
    Ok(entries)
}

/// Read the `ix##` chunk starting at `at`.
pub fn read_standard_index(cursor: &mut BitCursor, at: u64) -> Result<Vec<IndexEntry>> {
    cursor.goto_byte_offset(at)?;
    let tag = FourCc(cursor.read_array::<4>()?);
    let size = cursor.read_u32_le()? as u64;
    let longs_per_entry = cursor.read_u16_le()?;
    let _sub_type = cursor.read_u8()?;
    let index_type = cursor.read_u8()?;
    let in_use = cursor.read_u32_le()? as u64;
    let _chunk_id = cursor.read_array::<4>()?;
    let base = cursor.read_u64_le()?;
    let _reserved = cursor.read_u32_le()?;

    if index_type != AVI_INDEX_OF_CHUNKS || longs_per_entry < 2 {
        return Err(DemuxError::malformed(
            tag.to_string(),
            format!(
                "not a standard index (type {}, {} longs per entry)",
                index_type, longs_per_entry
            ),
        ));
    }

    let entry_size = longs_per_entry as u64 * 4;
    let fits = size.saturating_sub(24).min(cursor.remaining_bytes()) / entry_size;
    if in_use > fits {
        tracing::warn!(at, in_use, fits, "standard index entry count exceeds chunk");
    }
    read_chunk_entries(cursor, base, in_use.min(fits), entry_size)
}

/// Follow every super-index entry to its standard index.
pub fn read_super_index(
    cursor: &mut BitCursor,
    entries: &[SuperIndexEntry],
) -> std::result::Result<Vec<IndexEntry>, IndexError> {
    let mut out = Vec::new();
    for entry in entries {
        let chunk = read_standard_index(cursor, entry.offset).map_err(|e| {
            IndexError::Inconsistent(format!("standard index at {}: {}", entry.offset, e))
        })?;
        out.extend(chunk);
    }
    Ok(out)
}

fn tag_at(data: &Bytes, pos: u64) -> Option<FourCc> {
    let start = usize::try_from(pos).ok()?;
    let bytes = data.get(start..start.checked_add(4)?)?;
    let mut cc = [0u8; 4];
    cc.copy_from_slice(bytes);
    Some(FourCc(cc))
}

/// Base of the `idx1` offsets: the `movi` type field, or 0 for writers that
/// stored absolute offsets. Decided on the first entry naming a stream.
pub fn idx1_base(entries: &[Idx1Entry], movi_type_offset: u64, data: &Bytes) -> u64 {
    let first = match entries.iter().find(|e| stream_number(e.chunk_id).is_some()) {
        Some(first) => first,
        None => return movi_type_offset,
    };
    if tag_at(data, movi_type_offset + first.offset as u64) == Some(first.chunk_id) {
        movi_type_offset
    } else if tag_at(data, first.offset as u64) == Some(first.chunk_id) {
        0
    } else {
        tracing::warn!(
            chunk = %first.chunk_id,
            offset = first.offset,
            "idx1 offsets match neither movi nor file; assuming movi-relative"
        );
        movi_type_offset
    }
}

/// Distribute `idx1` entries over `streams` streams. Streams for which
/// `indexed` is true already have their own index and get nothing.
pub fn split_idx1(
    entries: &[Idx1Entry],
    base: u64,
    streams: usize,
    indexed: impl Fn(usize) -> bool,
) -> Vec<Vec<IndexEntry>> {
    let mut per_stream = vec![Vec::new(); streams];
    for entry in entries {
        if entry.flags & AVIIF_LIST != 0 {
            continue;
        }
        let Some(n) = stream_number(entry.chunk_id) else {
            continue;
        };
        if indexed(n) {
            continue;
        }
        if let Some(list) = per_stream.get_mut(n) {
            list.push(IndexEntry {
                offset: base + entry.offset as u64 + 8,
                size: entry.size,
                keyframe: entry.flags & AVIIF_KEYFRAME != 0,
            });
        }
    }
    per_stream
}

/// Index the data chunks of `movi` lists directly, for files without any
/// index. Only the first compressed video frame of a stream is taken as a
/// keyframe.
pub fn scan_movi(data: &Bytes, lists: &[Node], streams: usize) -> Vec<Vec<IndexEntry>> {
    let mut cursor = BitCursor::new(data.clone());
    let mut per_stream = vec![Vec::new(); streams];
    for list in lists {
        scan_list(&mut cursor, list, &mut per_stream);
    }
    per_stream
}

fn scan_list(cursor: &mut BitCursor, parent: &Node, out: &mut [Vec<IndexEntry>]) {
    let end = parent.offset_end.min(cursor.total_size());
    if cursor.goto_byte_offset(parent.payload_offset()).is_err() {
        return;
    }

    while cursor.absolute_byte_offset() + RiffHeader::MIN_HEADER_SIZE <= end {
        let node = match RiffHeader::read_header(cursor, parent) {
            Ok(node) => node,
            Err(_) => break,
        };
        match node.id {
            NodeId::List(list_type) if list_type == REC => scan_list(cursor, &node, out),
            NodeId::FourCc(tag) => {
                if let Some(list) = stream_number(tag).and_then(|n| out.get_mut(n)) {
                    let keyframe = match &tag.0[2..] {
                        b"dc" => list.is_empty(),
                        _ => true,
                    };
                    list.push(IndexEntry {
                        offset: node.payload_offset(),
                        size: node.payload_size() as u32,
                        keyframe,
                    });
                }
            }
            _ => {}
        }
        if jumpy(cursor, parent, &node).is_err() {
            break;
        }
    }
}

/// Per-stream clock from `strh`.
#[derive(Debug, Clone, Copy)]
pub struct StreamClock {
    /// `dwScale / dwRate` seconds per tick.
    pub time_base: TimeBase,
    pub start: u32,
    /// Non-zero for CBR audio: ticks advance by bytes / sample size.
    pub sample_size: u32,
}

/// Turn one stream's entries into samples. Zero-sized entries are dropped
/// frames: they take time but produce no sample.
pub fn build_samples(
    entries: &[IndexEntry],
    clock: StreamClock,
    all_sync: bool,
    options: &ParseOptions,
) -> std::result::Result<Vec<Sample>, IndexError> {
    let emitted = entries.iter().filter(|e| e.size > 0).count() as u64;
    let mut samples = index::allocate(emitted, options)?;

    let mut position = clock.start as i64;
    for entry in entries {
        let time = clock.time_base.to_ticks(position);
        position += if clock.sample_size > 0 {
            (entry.size / clock.sample_size) as i64
        } else {
            1
        };
        if entry.size == 0 {
            continue;
        }
        samples.push(Sample::frame(
            entry.offset,
            entry.size,
            all_sync || entry.keyframe,
            time,
            time,
        ));
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(offset: u64, size: u32, keyframe: bool) -> IndexEntry {
        IndexEntry {
            offset,
            size,
            keyframe,
        }
    }

    #[test]
    fn stream_numbers() {
        assert_eq!(stream_number(FourCc::new(b"00dc")), Some(0));
        assert_eq!(stream_number(FourCc::new(b"12wb")), Some(12));
        assert_eq!(stream_number(FourCc::new(b"ix00")), None);
    }

    #[test]
    fn standard_entry_delta_bit() {
        let e = IndexEntry::standard(1000, 24, 0x8000_0010);
        assert_eq!(e, entry(1024, 16, false));
        let e = IndexEntry::standard(0, 8, 16);
        assert!(e.keyframe);
    }

    #[test]
    fn dropped_frames_advance_time() {
        let clock = StreamClock {
            time_base: TimeBase::new(1, 25),
            start: 0,
            sample_size: 0,
        };
        let entries = [entry(100, 10, true), entry(110, 0, false), entry(120, 10, false)];
        let samples = build_samples(&entries, clock, false, &ParseOptions::default()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].dts, Some(80_000));
        assert!(samples[0].is_sync());
        assert!(!samples[1].is_sync());
    }

    #[test]
    fn cbr_audio_counts_bytes() {
        let clock = StreamClock {
            time_base: TimeBase::new(1, 8000),
            start: 0,
            sample_size: 2,
        };
        let entries = [entry(0, 1600, false), entry(1600, 1600, false)];
        let samples = build_samples(&entries, clock, true, &ParseOptions::default()).unwrap();
        assert_eq!(samples[1].pts, Some(100_000));
        assert!(samples.iter().all(|s| s.is_sync()));
    }

    #[test]
    fn idx1_entries_are_split_per_stream() {
        let entries = [
            Idx1Entry {
                chunk_id: FourCc::new(b"00dc"),
                flags: AVIIF_KEYFRAME,
                offset: 4,
                size: 10,
            },
            Idx1Entry {
                chunk_id: FourCc::new(b"01wb"),
                flags: 0,
                offset: 22,
                size: 6,
            },
            Idx1Entry {
                chunk_id: FourCc::new(b"rec "),
                flags: AVIIF_LIST,
                offset: 36,
                size: 0,
            },
        ];
        let split = split_idx1(&entries, 100, 2, |_| false);
        assert_eq!(split[0], vec![entry(112, 10, true)]);
        assert_eq!(split[1], vec![entry(130, 6, false)]);

        let split = split_idx1(&entries, 100, 2, |n| n == 0);
        assert!(split[0].is_empty());
        assert_eq!(split[1].len(), 1);
    }

    #[test]
    fn idx1_base_detection() {
        let mut data = vec![0u8; 64];
        data[20..24].copy_from_slice(b"00dc");
        let data = Bytes::from(data);
        let relative = [Idx1Entry {
            chunk_id: FourCc::new(b"00dc"),
            flags: 0,
            offset: 4,
            size: 0,
        }];
        assert_eq!(idx1_base(&relative, 16, &data), 16);
        let absolute = [Idx1Entry {
            offset: 20,
            ..relative[0]
        }];
        assert_eq!(idx1_base(&absolute, 16, &data), 0);
    }

    #[test]
    fn scan_reads_nested_rec_lists() {
        let mut data = b"LIST\x24\x00\x00\x00movi".to_vec();
        data.extend_from_slice(b"00dc\x02\x00\x00\x00ab");
        data.extend_from_slice(b"LIST\x0e\x00\x00\x00rec ");
        data.extend_from_slice(b"00dc\x01\x00\x00\x00c\x00");
        let movi = Node::new(NodeId::list(b"movi"), 0, 12, data.len() as u64);
        let lists = [movi];
        let found = scan_movi(&Bytes::from(data), &lists, 1);
        assert_eq!(found[0], vec![entry(20, 2, true), entry(42, 1, false)]);
    }
}

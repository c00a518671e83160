//! RIFF/AVI, including the OpenDML (AVI 2.0) extensions.
//!
//! ```text
//! RIFF AVI
//! ├── LIST hdrl
//! │   ├── avih
//! │   ├── LIST strl*   strh strf [strn] [indx]
//! │   └── LIST odml    dmlh
//! ├── LIST INFO
//! ├── LIST movi        ##dc ##db ##wb ##tx, LIST rec, ix##
//! └── idx1
//! RIFF AVIX*           LIST movi
//! ```
//! Every stream is indexed from the first source available: its `indx`
//! super-index, the legacy `idx1`, or a scan of the `movi` lists.

pub mod index;

use once_cell::sync::Lazy;

use crate::bitstream::BitCursor;
use crate::codec::Codec;
use crate::error::{DemuxError, IndexError, Result};
use crate::index::{attach_nal_config, with_parameter_sets};
use crate::media::{ContainerFormat, ContainerProfile, MediaFile, TimeBase, Track, TrackKind};
use crate::node::{FourCc, Node, NodeId};
use crate::params;
use crate::riff::{self, BitmapInfo, RiffForm, RiffHeader, WaveFormat};
use crate::walker::{walk_children, walk_root, DispatchTable, Format, Walk};

use index::{IndexEntry, Idx1Entry, StreamClock, SuperIndexEntry};

// ============================================================================
// Headers
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
struct MainHeader {
    micro_sec_per_frame: u32,
    total_frames: u32,
}

/// AVISTREAMHEADER
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamHeader {
    pub fcc_type: FourCc,
    pub fcc_handler: FourCc,
    pub flags: u32,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    pub scale: u32,
    pub rate: u32,
    pub start: u32,
    pub length: u32,
    pub suggested_buffer_size: u32,
    pub quality: u32,
    pub sample_size: u32,
}

impl StreamHeader {
    fn read(cursor: &mut BitCursor) -> Result<Self> {
        Ok(StreamHeader {
            fcc_type: FourCc(cursor.read_array::<4>()?),
            fcc_handler: FourCc(cursor.read_array::<4>()?),
            flags: cursor.read_u32_le()?,
            priority: cursor.read_u16_le()?,
            language: cursor.read_u16_le()?,
            initial_frames: cursor.read_u32_le()?,
            scale: cursor.read_u32_le()?,
            rate: cursor.read_u32_le()?,
            start: cursor.read_u32_le()?,
            length: cursor.read_u32_le()?,
            suggested_buffer_size: cursor.read_u32_le()?,
            quality: cursor.read_u32_le()?,
            sample_size: cursor.read_u32_le()?,
        })
    }

    fn kind(&self) -> TrackKind {
        match &self.fcc_type.0 {
            b"vids" => TrackKind::Video,
            b"auds" => TrackKind::Audio,
            b"txts" => TrackKind::Subtitle,
            _ => TrackKind::Other,
        }
    }

    fn time_base(&self) -> TimeBase {
        TimeBase::new(self.scale as u64, self.rate as u64)
    }
}

// ============================================================================
// Parse state
// ============================================================================

pub(crate) struct Stream {
    track: Track,
    header: StreamHeader,
    super_index: Vec<SuperIndexEntry>,
    /// `indx` of type INDEX_OF_CHUNKS.
    chunk_index: Vec<IndexEntry>,
}

impl Stream {
    fn has_own_index(&self) -> bool {
        !self.super_index.is_empty() || !self.chunk_index.is_empty()
    }
}

pub(crate) struct Avi {
    media: MediaFile,
    main: MainHeader,
    /// `dmlh` frame count, covering every RIFF of an OpenDML file.
    total_frames: Option<u32>,
    streams: Vec<Stream>,
    movi_lists: Vec<Node>,
    idx1: Vec<Idx1Entry>,
}

impl Avi {
    fn new(file_size: u64) -> Self {
        Self {
            media: MediaFile::new(ContainerFormat::Avi, ContainerProfile::Avi, file_size),
            main: MainHeader::default(),
            total_frames: None,
            streams: Vec::new(),
            movi_lists: Vec::new(),
            idx1: Vec::new(),
        }
    }

    fn current(&mut self, node: &Node) -> Result<&mut Stream> {
        self.streams
            .last_mut()
            .ok_or_else(|| DemuxError::malformed(node.id.to_string(), "chunk outside of a strl list"))
    }

    fn finish(self, walk: &Walk<'_>) -> MediaFile {
        let Avi {
            mut media,
            main,
            total_frames,
            streams,
            movi_lists,
            idx1,
        } = self;
        let options = walk.options;
        let data = walk.cursor.data().clone();

        let mut from_idx1 = (!idx1.is_empty()).then(|| {
            let movi_type = movi_lists.first().map_or(0, |movi| movi.offset_start + 8);
            let base = index::idx1_base(&idx1, movi_type, &data);
            index::split_idx1(&idx1, base, streams.len(), |n| {
                streams.get(n).map_or(false, Stream::has_own_index)
            })
        });
        let needs_scan = from_idx1.is_none() && !streams.iter().all(Stream::has_own_index);
        let mut scanned = (needs_scan && options.scan_unindexed_movi)
            .then(|| index::scan_movi(&data, &movi_lists, streams.len()));

        let mut reader = BitCursor::new(data);
        for (n, stream) in streams.into_iter().enumerate() {
            let Stream {
                mut track,
                header,
                super_index,
                chunk_index,
            } = stream;

            let fallback = from_idx1
                .as_mut()
                .or(scanned.as_mut())
                .and_then(|lists| lists.get_mut(n))
                .map(std::mem::take);
            let entries = if !super_index.is_empty() {
                index::read_super_index(&mut reader, &super_index)
            } else if !chunk_index.is_empty() {
                Ok(chunk_index)
            } else {
                fallback.ok_or(IndexError::MissingTable("idx1"))
            };

            let audio = track.kind == TrackKind::Audio;
            let clock = StreamClock {
                time_base: header.time_base(),
                start: header.start,
                sample_size: if audio { header.sample_size } else { 0 },
            };
            let built = entries
                .and_then(|entries| index::build_samples(&entries, clock, audio, options))
                .and_then(|samples| with_parameter_sets(&track, samples, options));
            track.finalize(built, media.file_size);
            tracing::debug!(
                stream = n,
                codec = ?track.codec,
                samples = track.sample_count(),
                "avi stream indexed"
            );
            media.tracks.push(track);
        }

        let frames = total_frames.unwrap_or(main.total_frames) as u64;
        media.duration_us = if main.micro_sec_per_frame > 0 && frames > 0 {
            Some(main.micro_sec_per_frame as u64 * frames)
        } else {
            media.tracks.iter().filter_map(|t| t.duration_us).max()
        };
        media
    }
}

// ============================================================================
// Handlers
// ============================================================================

type Handler = Result<()>;

fn container(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    walk_children(s, w, n)
}

/// `RIFF AVIX` and `LIST odml` only exist in OpenDML files.
fn open_dml(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.media.profile = ContainerProfile::OpenDml;
    walk_children(s, w, n)
}

fn avih(s: &mut Avi, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let micro_sec_per_frame = c.read_u32_le()?;
    // max bytes per sec, padding granularity, flags
    c.skip_bytes(12)?;
    let total_frames = c.read_u32_le()?;
    let _initial_frames = c.read_u32_le()?;
    let streams = c.read_u32_le()?;
    let _suggested_buffer_size = c.read_u32_le()?;
    let width = c.read_u32_le()?;
    let height = c.read_u32_le()?;

    w.field("micro_sec_per_frame", micro_sec_per_frame);
    w.field("total_frames", total_frames);
    w.field("streams", streams);
    w.field("width", width);
    w.field("height", height);
    s.main = MainHeader {
        micro_sec_per_frame,
        total_frames,
    };
    Ok(())
}

fn strl(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let number = s.streams.len() as u64;
    s.streams.push(Stream {
        track: Track::new(number, TrackKind::Other),
        header: StreamHeader::default(),
        super_index: Vec::new(),
        chunk_index: Vec::new(),
    });
    walk_children(s, w, n)
}

fn strh(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let header = StreamHeader::read(&mut w.cursor)?;
    w.field("type", header.fcc_type.to_string());
    w.field("handler", header.fcc_handler.to_string());
    w.field("scale", header.scale);
    w.field("rate", header.rate);
    w.field("length", header.length);
    w.field("sample_size", header.sample_size);

    let stream = s.current(n)?;
    let track = &mut stream.track;
    track.kind = header.kind();
    track.time_base = header.time_base();
    track.declared_sample_count = Some(header.length as u64);
    if header.scale > 0 && header.rate > 0 {
        track.duration_us = Some(track.time_base.to_ticks(header.start as i64 + header.length as i64) as u64);
    }
    if track.kind == TrackKind::Video {
        track.codec = Codec::from_fourcc(header.fcc_handler);
        if header.fcc_handler.is_printable() {
            track.codec_tag = Some(header.fcc_handler.to_string());
        }
        if header.scale > 0 && header.rate > 0 {
            track.video_mut().frame_rate = Some(header.rate as f64 / header.scale as f64);
        }
    }
    stream.header = header;
    Ok(())
}

fn strf(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let end = n.offset_end.min(w.file_size());
    let kind = s.current(n)?.track.kind;

    match kind {
        TrackKind::Video => {
            let info = BitmapInfo::read(&mut w.cursor, end)?;
            w.field("compression", info.compression.to_string());
            w.field("width", info.width as i64);
            w.field("height", info.height as i64);

            let config = match (Codec::from_fourcc(info.compression), info.extra) {
                (Codec::H264, Some(extra)) => w
                    .cursor
                    .slice(extra.offset, extra.size)
                    .and_then(|bytes| params::locate_avcc(&bytes, extra.offset)),
                _ => None,
            };

            let track = &mut s.current(n)?.track;
            let codec = Codec::from_fourcc(info.compression);
            if codec != Codec::Unknown || track.codec == Codec::Unknown {
                track.codec = codec;
                track.codec_tag = Some(info.compression.to_string());
            }
            let frame_rate = track.video.as_ref().and_then(|v| v.frame_rate);
            track.video = Some(info.video_params());
            track.video_mut().frame_rate = frame_rate;
            track.codec_private = info.extra;
            if let Some(config) = config {
                attach_nal_config(w, track, config);
            }
        }
        TrackKind::Audio => {
            let format = WaveFormat::read(&mut w.cursor, end)?;
            w.field("format_tag", format.format_tag);
            w.field("channels", format.channels);
            w.field("samples_per_sec", format.samples_per_sec);

            let track = &mut s.current(n)?.track;
            track.codec = format.codec();
            track.codec_tag = Some(format!("0x{:04X}", format.effective_tag()));
            track.audio = Some(format.audio_params());
            track.codec_private = format.extra;
        }
        _ => {}
    }
    Ok(())
}

fn strn(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let name = riff::fixed_string(&w.payload(n));
    w.field("name", name.as_str());
    if !name.is_empty() {
        s.current(n)?.track.name = Some(name);
    }
    Ok(())
}

fn indx(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let longs_per_entry = c.read_u16_le()?;
    let _sub_type = c.read_u8()?;
    let index_type = c.read_u8()?;
    let in_use = c.read_u32_le()? as u64;
    let chunk_id = FourCc(c.read_array::<4>()?);

    let entry_size = longs_per_entry as u64 * 4;
    w.field("index_type", index_type);
    w.field("entries_in_use", in_use);
    w.field("chunk_id", chunk_id.to_string());

    match index_type {
        index::AVI_INDEX_OF_INDEXES => {
            w.cursor.skip_bytes(12)?;
            if entry_size < 16 {
                return Err(DemuxError::malformed("indx", format!("{} longs per entry", longs_per_entry)));
            }
            let count = in_use.min(w.remaining_in(n) / entry_size);
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let c = &mut w.cursor;
                entries.push(SuperIndexEntry {
                    offset: c.read_u64_le()?,
                    size: c.read_u32_le()?,
                    duration: c.read_u32_le()?,
                });
                c.skip_bytes(entry_size - 16)?;
            }
            s.current(n)?.super_index = entries;
        }
        index::AVI_INDEX_OF_CHUNKS => {
            let base = w.cursor.read_u64_le()?;
            let _reserved = w.cursor.read_u32_le()?;
            if entry_size < 8 {
                return Err(DemuxError::malformed("indx", format!("{} longs per entry", longs_per_entry)));
            }
            let count = in_use.min(w.remaining_in(n) / entry_size);
            let entries = index::read_chunk_entries(&mut w.cursor, base, count, entry_size)?;
            s.current(n)?.chunk_index = entries;
        }
        other => {
            return Err(DemuxError::malformed("indx", format!("unknown index type {}", other)));
        }
    }

    s.media.profile = ContainerProfile::OpenDml;
    Ok(())
}

fn dmlh(s: &mut Avi, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let total_frames = w.cursor.read_u32_le()?;
    w.field("total_frames", total_frames);
    s.total_frames = Some(total_frames);
    Ok(())
}

/// Stream data is only located here; the index builders read it later.
fn movi(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    w.field("data_bytes", n.payload_size());
    s.movi_lists.push(n.clone());
    Ok(())
}

fn idx1(s: &mut Avi, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let count = w.remaining_in(n) / 16;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let c = &mut w.cursor;
        entries.push(Idx1Entry {
            chunk_id: FourCc(c.read_array::<4>()?),
            flags: c.read_u32_le()?,
            offset: c.read_u32_le()?,
            size: c.read_u32_le()?,
        });
    }
    w.field("entry_count", count);
    s.idx1 = entries;
    w.stop_if_indexed();
    Ok(())
}

static AVI_TABLE: Lazy<DispatchTable<Avi>> = Lazy::new(|| {
    DispatchTable::new()
        .on(NodeId::list(b"AVI "), "RIFF AVI", container)
        .on(NodeId::list(b"AVIX"), "RIFF AVIX", open_dml)
        .on(NodeId::list(b"hdrl"), "hdrl", container)
        .on(NodeId::tag(b"avih"), "avih", avih)
        .on(NodeId::list(b"strl"), "strl", strl)
        .on(NodeId::tag(b"strh"), "strh", strh)
        .on(NodeId::tag(b"strf"), "strf", strf)
        .on(NodeId::tag(b"strn"), "strn", strn)
        .on(NodeId::tag(b"indx"), "indx", indx)
        .on(NodeId::list(b"odml"), "odml", open_dml)
        .on(NodeId::tag(b"dmlh"), "dmlh", dmlh)
        .on(NodeId::list(b"movi"), "movi", movi)
        .on(NodeId::tag(b"idx1"), "idx1", idx1)
        .on(NodeId::list(b"INFO"), "INFO", riff::info_list)
        .on(NodeId::tag(b"INAM"), "INAM", riff::info_title)
        .on(NodeId::tag(b"ISFT"), "ISFT", riff::info_software)
        .skip(NodeId::tag(b"JUNK"), "JUNK")
        .skip(NodeId::tag(b"strd"), "strd")
        .skip(NodeId::tag(b"vprp"), "vprp")
});

impl Format for Avi {
    type Header = RiffHeader;

    fn dispatch_table() -> &'static DispatchTable<Self> {
        &AVI_TABLE
    }
}

impl RiffForm for Avi {
    fn media_mut(&mut self) -> &mut MediaFile {
        &mut self.media
    }
}

pub(crate) fn parse(walk: &mut Walk<'_>) -> Result<MediaFile> {
    let mut state = Avi::new(walk.file_size());
    walk_root(&mut state, walk)?;
    Ok(state.finish(walk))
}

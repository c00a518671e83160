//! Matroska and WebM.
//!
//! ```text
//! EBML            DocType
//! Segment
//! ├── SeekHead, Void, Tags, Chapters, Attachments   (skipped)
//! ├── Info        TimecodeScale, Duration, DateUTC, Title, WritingApp
//! ├── Tracks
//! │   └── TrackEntry*  (Video, Audio, CodecPrivate)
//! ├── Cluster*    Timecode, SimpleBlock*, BlockGroup*
//! └── Cues        CuePoint* / CueTrackPositions
//! ```
//! Both `Segment` and `Cluster` may have an unknown size; a live-written
//! cluster ends where the next top-level element starts.

pub mod blocks;
pub mod ebml;

mod elements;

use once_cell::sync::Lazy;

pub use blocks::{parse_block, Block, Lacing};
pub use ebml::{read_vint, EbmlHeader, Vint};

use crate::config::ParseOptions;
use crate::error::{DemuxError, IndexError, Result};
use crate::index;
use crate::media::{
    ContainerFormat, ContainerProfile, CuePoint, MediaFile, Sample, TimeBase, Track, TrackKind,
};
use crate::node::{ByteRange, Node, NodeId};
use crate::walker::{walk_root, DispatchTable, Format, Walk};

use elements::ids;

/// TimecodeScale when `Info` does not say: one millisecond.
const DEFAULT_TIMECODE_SCALE: u64 = 1_000_000;

/// One frame of a block, before the track's timing is known.
#[derive(Debug, Clone, Copy)]
struct RawFrame {
    range: ByteRange,
    /// Cluster timecode plus block offset, in TimecodeScale units.
    time: i64,
    /// Position inside the lace.
    lace: u32,
    keyframe: bool,
}

/// Track under construction.
pub(crate) struct TrackEntry {
    track: Track,
    number: u64,
    /// Nanoseconds.
    default_duration: Option<u64>,
    frames: Vec<RawFrame>,
    overflow: Option<IndexError>,
}

impl TrackEntry {
    fn new() -> Self {
        let mut track = Track::new(0, TrackKind::Other);
        // FlagDefault defaults to 1.
        track.default = true;
        Self {
            track,
            number: 0,
            default_duration: None,
            frames: Vec::new(),
            overflow: None,
        }
    }

    fn push_frames(&mut self, block: &Block, cluster_time: i64, keyframe: bool, options: &ParseOptions) {
        if self.overflow.is_some() {
            return;
        }
        let time = cluster_time.saturating_add(block.timecode as i64);
        for (lace, range) in block.frames.iter().enumerate() {
            if let Err(e) = index::check_limit(self.frames.len() as u64 + 1, options) {
                self.overflow = Some(e);
                return;
            }
            self.frames.push(RawFrame {
                range: *range,
                time,
                lace: lace as u32,
                keyframe,
            });
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct RawCue {
    time: u64,
    track: Option<u64>,
    cluster_position: Option<u64>,
}

pub(crate) struct Mkv {
    media: MediaFile,
    timecode_scale: u64,
    /// `Info/Duration`, in TimecodeScale units.
    duration: Option<f64>,
    /// Absolute offset of the Segment payload; positions are relative to it.
    segment_data: u64,
    cluster_time: i64,
    clusters: u64,
    entries: Vec<TrackEntry>,
    group_block: Option<Block>,
    group_referenced: bool,
    cues: Vec<RawCue>,
}

impl Mkv {
    fn new(file_size: u64) -> Self {
        Self {
            media: MediaFile::new(ContainerFormat::Matroska, ContainerProfile::Matroska, file_size),
            timecode_scale: DEFAULT_TIMECODE_SCALE,
            duration: None,
            segment_data: 0,
            cluster_time: 0,
            clusters: 0,
            entries: Vec::new(),
            group_block: None,
            group_referenced: false,
            cues: Vec::new(),
        }
    }

    /// The `TrackEntry` whose children are being walked.
    fn entry(&mut self, node: &Node) -> Result<&mut TrackEntry> {
        self.entries
            .last_mut()
            .ok_or_else(|| DemuxError::malformed(node.id.to_string(), "element outside of a TrackEntry"))
    }

    fn cue(&mut self, node: &Node) -> Result<&mut RawCue> {
        self.cues
            .last_mut()
            .ok_or_else(|| DemuxError::malformed(node.id.to_string(), "element outside of a CuePoint"))
    }

    fn add_block(&mut self, block: &Block, keyframe: bool, options: &ParseOptions) {
        let cluster_time = self.cluster_time;
        match self.entries.iter_mut().find(|e| e.number == block.track) {
            Some(entry) => entry.push_frames(block, cluster_time, keyframe, options),
            None => tracing::debug!(track = block.track, "block for undeclared track"),
        }
    }

    fn scale_to_us(&self, time: f64) -> u64 {
        (time * self.timecode_scale as f64 / 1000.0).max(0.0) as u64
    }

    fn finish(self, walk: &Walk<'_>) -> MediaFile {
        let options = walk.options;
        let scale = self.timecode_scale;
        let duration_us = self.duration.map(|d| self.scale_to_us(d));
        let mut media = self.media;
        media.duration_us = duration_us;

        for cue in &self.cues {
            let Some(track) = cue.track else { continue };
            media.cue_points.push(CuePoint {
                id: media.cue_points.len() as u64 + 1,
                time_us: Some(TimeBase::new(scale, 1_000_000_000).to_ticks(cue.time as i64)),
                track: Some(track),
                byte_offset: cue.cluster_position.map(|p| self.segment_data.saturating_add(p)),
            });
        }

        for entry in self.entries {
            let TrackEntry {
                mut track,
                default_duration,
                frames,
                overflow,
                ..
            } = entry;
            track.time_base = TimeBase::new(scale, 1_000_000_000);

            let built = match overflow {
                Some(e) => Err(e),
                None => build_index(&frames, scale, default_duration, options),
            };
            let built = built.and_then(|samples| index::with_parameter_sets(&track, samples, options));
            track.finalize(built, media.file_size);

            let last = track.frames().filter_map(|s| s.pts).max();
            track.duration_us =
                last.map(|pts| (pts.max(0) as u64).saturating_add(default_duration.unwrap_or(0) / 1000));
            tracing::debug!(
                track = track.id,
                codec = ?track.codec,
                samples = track.sample_count(),
                "matroska track indexed"
            );
            media.tracks.push(track);
        }

        tracing::debug!(clusters = self.clusters, cues = media.cue_points.len(), "matroska walk done");
        if media.duration_us.is_none() {
            media.duration_us = media.tracks.iter().filter_map(|t| t.duration_us).max();
        }
        media
    }
}

/// Presentation times come from the blocks; decode times are those same
/// times in sorted order.
fn build_index(
    frames: &[RawFrame],
    timecode_scale: u64,
    default_duration: Option<u64>,
    options: &ParseOptions,
) -> std::result::Result<Vec<Sample>, IndexError> {
    let mut samples = index::allocate(frames.len() as u64, options)?;
    let lace_step = default_duration.unwrap_or(0) as i128;

    for frame in frames {
        let size = u32::try_from(frame.range.size).map_err(|_| {
            IndexError::Inconsistent(format!("{}-byte frame at {}", frame.range.size, frame.range.offset))
        })?;
        let ns = (frame.time as i128)
            .saturating_mul(timecode_scale as i128)
            .saturating_add(frame.lace as i128 * lace_step);
        let pts = (ns / 1000) as i64;
        samples.push(Sample::frame(frame.range.offset, size, frame.keyframe, pts, pts));
    }

    index::decode_times_from_pts(&mut samples);
    Ok(samples)
}

fn top_level(id: &NodeId) -> bool {
    matches!(
        id,
        NodeId::Ebml(
            ids::CLUSTER
                | ids::CUES
                | ids::INFO
                | ids::TRACKS
                | ids::SEEK_HEAD
                | ids::TAGS
                | ids::CHAPTERS
                | ids::ATTACHMENTS
                | ids::SEGMENT
                | ids::EBML
        )
    )
}

static MKV_TABLE: Lazy<DispatchTable<Mkv>> = Lazy::new(|| {
    use elements::*;

    let el = NodeId::Ebml;
    DispatchTable::new()
        .on(el(ids::EBML), "EBML", container)
        .on(el(ids::DOC_TYPE), "DocType", doc_type)
        .skip(el(ids::EBML_VERSION), "EBMLVersion")
        .skip(el(ids::DOC_TYPE_VERSION), "DocTypeVersion")
        .on(el(ids::SEGMENT), "Segment", segment)
        .skip(el(ids::SEEK_HEAD), "SeekHead")
        .skip(el(ids::VOID), "Void")
        .skip(el(ids::CRC32), "CRC-32")
        .skip(el(ids::TAGS), "Tags")
        .skip(el(ids::CHAPTERS), "Chapters")
        .skip(el(ids::ATTACHMENTS), "Attachments")
        // Info
        .on(el(ids::INFO), "Info", container)
        .on(el(ids::TIMECODE_SCALE), "TimecodeScale", timecode_scale)
        .on(el(ids::DURATION), "Duration", duration)
        .on(el(ids::DATE_UTC), "DateUTC", date_utc)
        .on(el(ids::TITLE), "Title", title)
        .on(el(ids::MUXING_APP), "MuxingApp", muxing_app)
        .on(el(ids::WRITING_APP), "WritingApp", writing_app)
        // Tracks
        .on(el(ids::TRACKS), "Tracks", container)
        .on(el(ids::TRACK_ENTRY), "TrackEntry", track_entry)
        .on(el(ids::TRACK_NUMBER), "TrackNumber", track_number)
        .on(el(ids::TRACK_UID), "TrackUID", track_uid)
        .on(el(ids::TRACK_TYPE), "TrackType", track_type)
        .on(el(ids::FLAG_ENABLED), "FlagEnabled", flag_enabled)
        .on(el(ids::FLAG_DEFAULT), "FlagDefault", flag_default)
        .on(el(ids::DEFAULT_DURATION), "DefaultDuration", default_duration)
        .on(el(ids::NAME), "Name", name)
        .on(el(ids::LANGUAGE), "Language", language)
        .on(el(ids::CODEC_ID), "CodecID", codec_id)
        .on(el(ids::CODEC_PRIVATE), "CodecPrivate", codec_private)
        .on(el(ids::VIDEO), "Video", container)
        .on(el(ids::PIXEL_WIDTH), "PixelWidth", pixel_width)
        .on(el(ids::PIXEL_HEIGHT), "PixelHeight", pixel_height)
        .on(el(ids::DISPLAY_WIDTH), "DisplayWidth", display_width)
        .on(el(ids::DISPLAY_HEIGHT), "DisplayHeight", display_height)
        .on(el(ids::AUDIO), "Audio", container)
        .on(el(ids::SAMPLING_FREQUENCY), "SamplingFrequency", sampling_frequency)
        .on(el(ids::CHANNELS), "Channels", channels)
        .on(el(ids::BIT_DEPTH), "BitDepth", bit_depth)
        // Clusters
        .on(el(ids::CLUSTER), "Cluster", cluster)
        .on(el(ids::TIMECODE), "Timecode", timecode)
        .on(el(ids::SIMPLE_BLOCK), "SimpleBlock", simple_block)
        .on(el(ids::BLOCK_GROUP), "BlockGroup", block_group)
        .on(el(ids::BLOCK), "Block", block)
        .on(el(ids::REFERENCE_BLOCK), "ReferenceBlock", reference_block)
        .on(el(ids::BLOCK_DURATION), "BlockDuration", block_duration)
        // Cues
        .on(el(ids::CUES), "Cues", container)
        .on(el(ids::CUE_POINT), "CuePoint", cue_point)
        .on(el(ids::CUE_TIME), "CueTime", cue_time)
        .on(el(ids::CUE_TRACK_POSITIONS), "CueTrackPositions", container)
        .on(el(ids::CUE_TRACK), "CueTrack", cue_track)
        .on(el(ids::CUE_CLUSTER_POSITION), "CueClusterPosition", cue_cluster_position)
});

impl Format for Mkv {
    type Header = EbmlHeader;

    fn dispatch_table() -> &'static DispatchTable<Self> {
        &MKV_TABLE
    }

    fn closes_unknown_scope(parent: &Node, child: &Node) -> bool {
        parent.id == NodeId::Ebml(ids::CLUSTER) && top_level(&child.id)
    }
}

pub(crate) fn parse(walk: &mut Walk<'_>) -> Result<MediaFile> {
    let mut state = Mkv::new(walk.file_size());
    walk_root(&mut state, walk)?;
    Ok(state.finish(walk))
}

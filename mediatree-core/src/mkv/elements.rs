//! Element handlers.

use crate::codec::Codec;
use crate::error::{DemuxError, Result};
use crate::index;
use crate::media::{datetime_from_epoch, ContainerProfile, TrackKind};
use crate::node::{ByteRange, Node};
use crate::params;
use crate::riff::{BitmapInfo, WaveFormat};
use crate::walker::{walk_children, Walk};

use super::blocks::parse_block;
use super::ebml::{read_float, read_sint, read_string, read_uint};
use super::{Mkv, RawCue, TrackEntry};

/// Element IDs, length marker included.
pub(super) mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const VOID: u32 = 0xEC;
    pub const CRC32: u32 = 0xBF;
    pub const TAGS: u32 = 0x1254_C367;
    pub const CHAPTERS: u32 = 0x1043_A770;
    pub const ATTACHMENTS: u32 = 0x1941_A469;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const DATE_UTC: u32 = 0x4461;
    pub const TITLE: u32 = 0x7BA9;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_ENABLED: u32 = 0xB9;
    pub const FLAG_DEFAULT: u32 = 0x88;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const NAME: u32 = 0x536E;
    pub const LANGUAGE: u32 = 0x22_B59C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;

    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const DISPLAY_WIDTH: u32 = 0x54B0;
    pub const DISPLAY_HEIGHT: u32 = 0x54BA;

    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const REFERENCE_BLOCK: u32 = 0xFB;
    pub const BLOCK_DURATION: u32 = 0x9B;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;
}

type Handler = Result<()>;

pub(super) fn container(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    walk_children(s, w, n)
}

pub(super) fn doc_type(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let doc_type = read_string(w, n);
    w.field("doc_type", doc_type.as_str());
    if doc_type == "webm" {
        s.media.profile = ContainerProfile::WebM;
    }
    s.media.brand = Some(doc_type);
    Ok(())
}

pub(super) fn segment(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.segment_data = n.payload_offset();
    walk_children(s, w, n)
}

// ============================================================================
// Info
// ============================================================================

pub(super) fn timecode_scale(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let scale = read_uint(w, n)?;
    w.field("timecode_scale", scale);
    if scale == 0 {
        return Err(DemuxError::malformed("TimecodeScale", "zero scale"));
    }
    s.timecode_scale = scale;
    Ok(())
}

pub(super) fn duration(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let duration = read_float(w, n)?;
    w.field("duration", duration);
    s.duration = Some(duration);
    Ok(())
}

/// Nanoseconds since 2001-01-01T00:00:00 UTC.
pub(super) fn date_utc(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let ns = read_sint(w, n)?;
    w.field("date_utc", ns);
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = ns.rem_euclid(1_000_000_000) as u32;
    s.media.creation_time = datetime_from_epoch(2001, secs, nanos);
    Ok(())
}

pub(super) fn title(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let title = read_string(w, n);
    w.field("title", title.as_str());
    s.media.title = Some(title);
    Ok(())
}

pub(super) fn muxing_app(_s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let app = read_string(w, n);
    w.field("muxing_app", app);
    Ok(())
}

pub(super) fn writing_app(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let app = read_string(w, n);
    w.field("writing_app", app.as_str());
    s.media.writing_app = Some(app);
    Ok(())
}

// ============================================================================
// Tracks
// ============================================================================

pub(super) fn track_entry(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.entries.push(TrackEntry::new());
    walk_children(s, w, n)?;

    let entry = s.entry(n)?;
    if entry.number == 0 {
        tracing::warn!(offset = n.offset_start, "TrackEntry without TrackNumber");
    }
    let Some(private) = entry.track.codec_private else {
        return Ok(());
    };
    let data = w.cursor.slice(private.offset, private.size).unwrap_or_default();

    match entry.track.codec_tag.as_deref() {
        Some("V_MPEG4/ISO/AVC") => {
            if let Some(config) = params::locate_avcc(&data, private.offset) {
                index::attach_nal_config(w, &mut entry.track, config);
            }
        }
        Some("V_MPEGH/ISO/HEVC") => {
            if let Some(config) = params::locate_hvcc(&data, private.offset) {
                index::attach_nal_config(w, &mut entry.track, config);
            }
        }
        // Video for Windows / ACM compatibility modes carry RIFF headers.
        Some("V_MS/VFW/FOURCC") => {
            w.cursor.goto_byte_offset(private.offset)?;
            let info = BitmapInfo::read(&mut w.cursor, private.end())?;
            entry.track.codec = Codec::from_fourcc(info.compression);
            let video = entry.track.video_mut();
            video.bit_depth = (info.bit_count > 0).then_some(info.bit_count);
        }
        Some("A_MS/ACM") => {
            w.cursor.goto_byte_offset(private.offset)?;
            let format = WaveFormat::read(&mut w.cursor, private.end())?;
            entry.track.codec = format.codec();
            let audio = entry.track.audio_mut();
            audio.block_align = format.block_align;
            audio.avg_bytes_per_sec = format.avg_bytes_per_sec;
        }
        _ => {}
    }
    Ok(())
}

pub(super) fn track_number(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let number = read_uint(w, n)?;
    w.field("track_number", number);
    let entry = s.entry(n)?;
    entry.number = number;
    entry.track.id = number;
    Ok(())
}

pub(super) fn track_uid(_s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let uid = read_uint(w, n)?;
    w.field("track_uid", uid);
    Ok(())
}

pub(super) fn track_type(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let kind = read_uint(w, n)?;
    w.field("track_type", kind);
    s.entry(n)?.track.kind = match kind {
        1 => TrackKind::Video,
        2 => TrackKind::Audio,
        0x11 => TrackKind::Subtitle,
        _ => TrackKind::Other,
    };
    Ok(())
}

pub(super) fn flag_enabled(_s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let flag = read_uint(w, n)?;
    w.field("enabled", flag);
    Ok(())
}

pub(super) fn flag_default(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let flag = read_uint(w, n)?;
    w.field("default", flag);
    s.entry(n)?.track.default = flag != 0;
    Ok(())
}

pub(super) fn default_duration(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let ns = read_uint(w, n)?;
    w.field("default_duration", ns);
    let entry = s.entry(n)?;
    entry.default_duration = (ns > 0).then_some(ns);
    if ns > 0 && entry.track.kind == TrackKind::Video {
        entry.track.video_mut().frame_rate = Some(1e9 / ns as f64);
    }
    Ok(())
}

pub(super) fn name(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let name = read_string(w, n);
    w.field("name", name.as_str());
    s.entry(n)?.track.name = Some(name);
    Ok(())
}

pub(super) fn language(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let language = read_string(w, n);
    w.field("language", language.as_str());
    s.entry(n)?.track.language = Some(language);
    Ok(())
}

pub(super) fn codec_id(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let id = read_string(w, n);
    w.field("codec_id", id.as_str());
    let track = &mut s.entry(n)?.track;
    track.codec = Codec::from_matroska_id(&id);
    track.codec_tag = Some(id);
    Ok(())
}

pub(super) fn codec_private(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    w.field("size", n.payload_size());
    s.entry(n)?.track.codec_private = Some(ByteRange::new(n.payload_offset(), n.payload_size()));
    Ok(())
}

pub(super) fn pixel_width(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("pixel_width", v);
    s.entry(n)?.track.video_mut().width = v as u32;
    Ok(())
}

pub(super) fn pixel_height(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("pixel_height", v);
    s.entry(n)?.track.video_mut().height = v as u32;
    Ok(())
}

pub(super) fn display_width(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("display_width", v);
    s.entry(n)?.track.video_mut().display_width = Some(v as u32);
    Ok(())
}

pub(super) fn display_height(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("display_height", v);
    s.entry(n)?.track.video_mut().display_height = Some(v as u32);
    Ok(())
}

pub(super) fn sampling_frequency(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let rate = read_float(w, n)?;
    w.field("sampling_frequency", rate);
    s.entry(n)?.track.audio_mut().sample_rate = rate as u32;
    Ok(())
}

pub(super) fn channels(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("channels", v);
    s.entry(n)?.track.audio_mut().channels = v as u16;
    Ok(())
}

pub(super) fn bit_depth(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let v = read_uint(w, n)?;
    w.field("bit_depth", v);
    s.entry(n)?.track.audio_mut().bits_per_sample = v as u16;
    Ok(())
}

// ============================================================================
// Clusters
// ============================================================================

pub(super) fn cluster(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.clusters += 1;
    s.cluster_time = 0;
    walk_children(s, w, n)
}

pub(super) fn timecode(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let time = read_uint(w, n)?;
    w.field("timecode", time);
    s.cluster_time = time as i64;
    Ok(())
}

pub(super) fn simple_block(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let block = parse_block(w.payload(n), n.payload_offset())?;
    w.field("track", block.track);
    w.field("timecode", block.timecode as i64);
    w.field("frames", block.frames.len() as u64);
    s.add_block(&block, block.keyframe, w.options);
    Ok(())
}

/// A grouped block is a keyframe unless it references another block.
pub(super) fn block_group(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.group_block = None;
    s.group_referenced = false;
    let walked = walk_children(s, w, n);

    if let Some(block) = s.group_block.take() {
        let keyframe = !s.group_referenced;
        s.add_block(&block, keyframe, w.options);
    }
    walked
}

pub(super) fn block(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let block = parse_block(w.payload(n), n.payload_offset())?;
    w.field("track", block.track);
    w.field("timecode", block.timecode as i64);
    s.group_block = Some(block);
    Ok(())
}

pub(super) fn reference_block(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let reference = read_sint(w, n)?;
    w.field("reference", reference);
    s.group_referenced = true;
    Ok(())
}

pub(super) fn block_duration(_s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let duration = read_uint(w, n)?;
    w.field("duration", duration);
    Ok(())
}

// ============================================================================
// Cues
// ============================================================================

pub(super) fn cue_point(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.cues.push(RawCue::default());
    walk_children(s, w, n)
}

pub(super) fn cue_time(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let time = read_uint(w, n)?;
    w.field("cue_time", time);
    s.cue(n)?.time = time;
    Ok(())
}

/// Only the first CueTrackPositions of a point is kept.
pub(super) fn cue_track(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let track = read_uint(w, n)?;
    w.field("cue_track", track);
    s.cue(n)?.track.get_or_insert(track);
    Ok(())
}

pub(super) fn cue_cluster_position(s: &mut Mkv, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let position = read_uint(w, n)?;
    w.field("cluster_position", position);
    s.cue(n)?.cluster_position.get_or_insert(position);
    Ok(())
}

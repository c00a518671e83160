//! Box handlers. Each one decodes a payload into the current track or the
//! media record; composite boxes recurse through the walker.

use chrono::{DateTime, Utc};

use super::header::{read_full_header, BoxHeader};
use super::{movie_ticks, profile_from_brands, track_kind, Mp4, SampleTable, TrakBox};
use crate::codec::Codec;
use crate::error::{DemuxError, Result};
use crate::index;
use crate::jumpy::jumpy;
use crate::media::{datetime_from_epoch, ContainerProfile, EditEntry, Track, TrackKind};
use crate::node::{ByteRange, FourCc, Node};
use crate::params;
use crate::walker::{walk_children, HeaderCodec, Walk};

type Handler = Result<()>;

pub(super) fn container(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    walk_children(s, w, n)
}

// ============================================================================
// File and movie level
// ============================================================================

pub(super) fn ftyp(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let major = FourCc(w.cursor.read_array::<4>()?);
    let minor = w.cursor.read_u32()?;
    let mut compatible = Vec::new();
    while w.remaining_in(n) >= 4 {
        compatible.push(FourCc(w.cursor.read_array::<4>()?));
    }

    w.field("major_brand", major.to_string());
    w.field("minor_version", minor);
    s.media.brand = Some(major.to_string());
    s.media.profile = profile_from_brands(major, &compatible);
    Ok(())
}

pub(super) fn moov(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    walk_children(s, w, n)?;
    s.moov_seen = true;
    if s.mdat_seen {
        w.stop_if_indexed();
    }
    Ok(())
}

pub(super) fn mdat(s: &mut Mp4, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    s.mdat_seen = true;
    if s.moov_seen {
        w.stop_if_indexed();
    }
    Ok(())
}

fn mp4_time(seconds: u64) -> Option<DateTime<Utc>> {
    if seconds == 0 {
        return None;
    }
    datetime_from_epoch(1904, seconds as i64, 0)
}

pub(super) fn mvhd(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let fh = read_full_header(&mut w.cursor, n)?;
    let c = &mut w.cursor;
    let (created, modified, timescale, duration) = if fh.version == 1 {
        (c.read_u64()?, c.read_u64()?, c.read_u32()?, c.read_u64()?)
    } else {
        (
            c.read_u32()? as u64,
            c.read_u32()? as u64,
            c.read_u32()?,
            c.read_u32()? as u64,
        )
    };

    w.field("timescale", timescale);
    w.field("duration", duration);
    s.media.creation_time = mp4_time(created);
    s.media.modification_time = mp4_time(modified);
    s.media.duration_us = movie_ticks(duration, timescale);
    Ok(())
}

// ============================================================================
// Track level
// ============================================================================

pub(super) fn trak(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let id = s.traks.len() as u64 + 1;
    s.traks.push(TrakBox {
        track: Track::new(id, TrackKind::Other),
        timescale: 0,
        handler: None,
        presentation: None,
        table: SampleTable::default(),
    });
    walk_children(s, w, n)
}

pub(super) fn tkhd(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let fh = read_full_header(&mut w.cursor, n)?;
    let c = &mut w.cursor;
    let track_id = if fh.version == 1 {
        c.skip_bytes(16)?;
        let id = c.read_u32()?;
        c.skip_bytes(4 + 8)?;
        id
    } else {
        c.skip_bytes(8)?;
        let id = c.read_u32()?;
        c.skip_bytes(4 + 4)?;
        id
    };
    // reserved, layer, alternate group, volume, reserved, matrix
    c.skip_bytes(8 + 8 + 36)?;
    let width = c.read_u32()? >> 16;
    let height = c.read_u32()? >> 16;

    w.field("track_id", track_id);
    w.field("width", width);
    w.field("height", height);

    let trak = s.current(n)?;
    trak.track.id = track_id as u64;
    trak.track.default = fh.flags & 0x1 != 0;
    if width > 0 && height > 0 {
        trak.presentation = Some((width, height));
    }
    Ok(())
}

/// Entries that fit in what is left of the box.
fn clamp_entries(declared: u32, available: u64, entry_size: u64, table: &'static str) -> u32 {
    let fits = available / entry_size;
    if declared as u64 > fits {
        tracing::warn!(table, declared, fits, "entry count exceeds box payload");
        return fits as u32;
    }
    declared
}

pub(super) fn elst(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let fh = read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let entry_size = if fh.version == 1 { 20 } else { 12 };
    let count = clamp_entries(declared, w.remaining_in(n), entry_size, "elst");

    let mut edits = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let c = &mut w.cursor;
        let (segment_duration, media_time) = if fh.version == 1 {
            (c.read_u64()?, c.read_u64()? as i64)
        } else {
            (c.read_u32()? as u64, c.read_i32()? as i64)
        };
        edits.push(EditEntry {
            segment_duration,
            media_time,
            rate: c.read_i32()?,
        });
    }

    w.field("entry_count", count);
    s.current(n)?.track.edits = edits;
    Ok(())
}

pub(super) fn mdhd(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let fh = read_full_header(&mut w.cursor, n)?;
    let c = &mut w.cursor;
    let (timescale, duration) = if fh.version == 1 {
        c.skip_bytes(16)?;
        (c.read_u32()?, c.read_u64()?)
    } else {
        c.skip_bytes(8)?;
        (c.read_u32()?, c.read_u32()? as u64)
    };

    // Packed ISO-639-2/T: pad bit + three 5-bit letters offset by 0x60.
    let _pad = c.read_bit()?;
    let packed = c.read_bits(15)?;
    let language = if packed >= 0x400 {
        let letters: String = [10, 5, 0]
            .iter()
            .map(|shift| (((packed >> shift) & 0x1F) as u8 + 0x60) as char)
            .collect();
        Some(letters)
    } else {
        // Macintosh language code.
        None
    };

    w.field("timescale", timescale);
    w.field("duration", duration);
    if let Some(lang) = &language {
        w.field("language", lang.as_str());
    }

    let trak = s.current(n)?;
    trak.timescale = timescale;
    trak.track.duration_us = movie_ticks(duration, timescale);
    trak.track.language = language;
    Ok(())
}

pub(super) fn hdlr(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let _component_type = w.cursor.read_u32()?;
    let handler = FourCc(w.cursor.read_array::<4>()?);
    w.cursor.skip_bytes(12)?;
    let rest = w.cursor.read_bytes(w.remaining_in(n))?;

    // QuickTime writes a Pascal string, ISO a C string.
    let name = match rest.first() {
        Some(&len) if len as usize + 1 == rest.len() && len > 0 => {
            String::from_utf8_lossy(&rest[1..]).to_string()
        }
        _ => crate::riff::fixed_string(&rest),
    };

    w.field("handler_type", handler.to_string());
    let trak = s.current(n)?;
    trak.handler = Some(handler);
    trak.track.kind = track_kind(handler);
    if !name.is_empty() {
        trak.track.name = Some(name);
    }
    Ok(())
}

// ============================================================================
// Sample descriptions
// ============================================================================

pub(super) fn stsd(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let count = w.cursor.read_u32()?;
    let kind = s.current(n)?.handler.map(track_kind).unwrap_or(TrackKind::Other);
    w.field("entry_count", count);

    for i in 0..count {
        if w.remaining_in(n) < BoxHeader::MIN_HEADER_SIZE {
            break;
        }
        let mut entry = BoxHeader::read_header(&mut w.cursor, n)?;
        entry.depth = n.depth + 1;
        let name = entry.id.to_string();
        // Only the first description feeds the track.
        w.trace_node(&entry, &name, i == 0);

        if i == 0 {
            if let Err(e) = sample_entry(s, w, &mut entry, kind) {
                if !e.is_recoverable() {
                    return Err(e);
                }
                tracing::warn!(entry = %name, error = %e, "bad sample entry");
            }
        }
        jumpy(&mut w.cursor, n, &entry)?;
    }
    Ok(())
}

fn sample_entry(s: &mut Mp4, w: &mut Walk<'_>, entry: &mut Node, kind: TrackKind) -> Handler {
    let format = entry.fourcc().unwrap_or_default();
    {
        let trak = s.current(entry)?;
        trak.track.codec = Codec::from_fourcc(format);
        trak.track.codec_tag = Some(format.to_string());
    }

    // SampleEntry: reserved[6], data_reference_index
    w.cursor.skip_bytes(6)?;
    let _data_reference = w.cursor.read_u16()?;

    match kind {
        TrackKind::Video => {
            visual_entry(s, w, entry)?;
            walk_children(s, w, entry)
        }
        TrackKind::Audio => {
            audio_entry(s, w, entry)?;
            walk_children(s, w, entry)
        }
        _ => Ok(()),
    }
}

fn visual_entry(s: &mut Mp4, w: &mut Walk<'_>, entry: &Node) -> Handler {
    let c = &mut w.cursor;
    c.skip_bytes(16)?;
    let width = c.read_u16()? as u32;
    let height = c.read_u16()? as u32;
    // resolutions, reserved, frame_count, compressorname
    c.skip_bytes(4 + 4 + 4 + 2 + 32)?;
    let depth = c.read_u16()?;
    let _pre_defined = c.read_i16()?;

    w.field("width", width);
    w.field("height", height);

    let video = s.current(entry)?.track.video_mut();
    video.width = width;
    video.height = height;
    if depth != 0 {
        video.bit_depth = Some(depth);
    }
    Ok(())
}

fn audio_entry(s: &mut Mp4, w: &mut Walk<'_>, entry: &Node) -> Handler {
    let quicktime = s.media.profile == ContainerProfile::QuickTime;
    let c = &mut w.cursor;
    let version = c.read_u16()?;
    c.skip_bytes(2 + 4)?;
    let mut channels = c.read_u16()?;
    let mut bits = c.read_u16()?;
    c.skip_bytes(2 + 2)?;
    let mut rate = c.read_u32()? >> 16;

    if quicktime && version == 1 {
        // samples per packet, bytes per packet/frame/sample
        c.skip_bytes(16)?;
    } else if quicktime && version == 2 {
        let _struct_size = c.read_u32()?;
        rate = c.read_f64()? as u32;
        channels = c.read_u32()? as u16;
        let _always_7f000000 = c.read_u32()?;
        bits = c.read_u32()? as u16;
        // format flags, bytes per packet, frames per packet
        c.skip_bytes(12)?;
    }

    w.field("channels", channels);
    w.field("sample_rate", rate);

    let audio = s.current(entry)?.track.audio_mut();
    audio.channels = channels;
    audio.sample_rate = rate;
    audio.bits_per_sample = bits;
    Ok(())
}

pub(super) fn avcc(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let payload = w.payload(n);
    let config = params::locate_avcc(&payload, n.payload_offset())
        .ok_or_else(|| DemuxError::malformed("avcC", "truncated decoder configuration record"))?;
    nal_config(s, w, n, config, Codec::H264)
}

pub(super) fn hvcc(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let payload = w.payload(n);
    let config = params::locate_hvcc(&payload, n.payload_offset())
        .ok_or_else(|| DemuxError::malformed("hvcC", "truncated decoder configuration record"))?;
    nal_config(s, w, n, config, Codec::H265)
}

fn nal_config(s: &mut Mp4, w: &mut Walk<'_>, n: &Node, config: params::NalConfig, codec: Codec) -> Handler {
    w.field("profile", config.profile);
    w.field("level", config.level);
    w.field("nal_length_size", config.nal_length_size);
    w.field("parameter_sets", config.sets.len() as u64);

    let trak = s.current(n)?;
    if trak.track.codec == Codec::Unknown {
        trak.track.codec = codec;
    }
    trak.track.codec_private = Some(ByteRange::new(n.payload_offset(), n.payload_size()));
    index::attach_nal_config(w, &mut trak.track, config);
    Ok(())
}

/// Boxes whose payload is kept as an opaque codec configuration.
pub(super) fn codec_private(s: &mut Mp4, _w: &mut Walk<'_>, n: &mut Node) -> Handler {
    s.current(n)?.track.codec_private = Some(ByteRange::new(n.payload_offset(), n.payload_size()));
    Ok(())
}

/// Expandable-class size: 7 bits per byte, high bit continues.
fn descriptor_header(w: &mut Walk<'_>) -> Result<(u8, u64)> {
    let tag = w.cursor.read_u8()?;
    let mut len = 0u64;
    for _ in 0..4 {
        let b = w.cursor.read_u8()?;
        len = (len << 7) | (b & 0x7F) as u64;
        if b & 0x80 == 0 {
            break;
        }
    }
    Ok((tag, len))
}

const ES_DESCRIPTOR: u8 = 0x03;
const DECODER_CONFIG: u8 = 0x04;
const DECODER_SPECIFIC_INFO: u8 = 0x05;

pub(super) fn esds(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let mut object_type = None;
    let mut specific = None;

    while w.remaining_in(n) >= 2 {
        let (tag, len) = descriptor_header(w)?;
        match tag {
            // ES and decoder config descriptors nest the next descriptors.
            ES_DESCRIPTOR => {
                let _es_id = w.cursor.read_u16()?;
                let flags = w.cursor.read_u8()?;
                if flags & 0x80 != 0 {
                    w.cursor.skip_bytes(2)?;
                }
                if flags & 0x40 != 0 {
                    let url_len = w.cursor.read_u8()? as u64;
                    w.cursor.skip_bytes(url_len)?;
                }
                if flags & 0x20 != 0 {
                    w.cursor.skip_bytes(2)?;
                }
            }
            DECODER_CONFIG => {
                object_type = Some(w.cursor.read_u8()?);
                // stream type, buffer size, max and average bitrate
                w.cursor.skip_bytes(1 + 3 + 4 + 4)?;
            }
            DECODER_SPECIFIC_INFO => {
                let len = len.min(w.remaining_in(n));
                specific = Some(ByteRange::new(w.cursor.absolute_byte_offset(), len));
                w.cursor.skip_bytes(len)?;
            }
            _ => w.cursor.skip_bytes(len.min(w.remaining_in(n)))?,
        }
    }

    if let Some(oti) = object_type {
        w.field("object_type", oti);
    }
    let trak = s.current(n)?;
    if let Some(codec) = object_type.map(Codec::from_mp4_object_type) {
        if codec != Codec::Unknown {
            trak.track.codec = codec;
        }
    }
    if specific.is_some() {
        trak.track.codec_private = specific;
    }
    Ok(())
}

pub(super) fn pasp(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let h_spacing = w.cursor.read_u32()?;
    let v_spacing = w.cursor.read_u32()?;
    if h_spacing == 0 || v_spacing == 0 {
        return Ok(());
    }
    let video = s.current(n)?.track.video_mut();
    if h_spacing != v_spacing {
        video.display_width = Some((video.width as u64 * h_spacing as u64 / v_spacing as u64) as u32);
        video.display_height = Some(video.height);
    }
    Ok(())
}

// ============================================================================
// Sample tables
// ============================================================================

pub(super) fn stts(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 8, "stts");
    let mut runs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        runs.push((w.cursor.read_u32()?, w.cursor.read_u32()?));
    }
    w.field("entry_count", count);
    s.current(n)?.table.time_to_sample = runs;
    Ok(())
}

pub(super) fn ctts(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 8, "ctts");
    let mut runs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        // Version 0 offsets are unsigned on paper; writers use them signed.
        runs.push((w.cursor.read_u32()?, w.cursor.read_i32()?));
    }
    w.field("entry_count", count);
    s.current(n)?.table.composition_offsets = runs;
    Ok(())
}

pub(super) fn stsc(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 12, "stsc");
    let mut runs = Vec::with_capacity(count as usize);
    for _ in 0..count {
        runs.push((w.cursor.read_u32()?, w.cursor.read_u32()?, w.cursor.read_u32()?));
    }
    w.field("entry_count", count);
    s.current(n)?.table.sample_to_chunk = runs;
    Ok(())
}

pub(super) fn stsz(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let sample_size = w.cursor.read_u32()?;
    let declared = w.cursor.read_u32()?;
    w.field("sample_size", sample_size);
    w.field("sample_count", declared);

    let mut sizes = Vec::new();
    let mut count = declared;
    if sample_size == 0 {
        count = clamp_entries(declared, w.remaining_in(n), 4, "stsz");
        sizes.reserve_exact(count as usize);
        for _ in 0..count {
            sizes.push(w.cursor.read_u32()?);
        }
    }

    let table = &mut s.current(n)?.table;
    table.sample_size = sample_size;
    table.sample_count = count;
    table.sample_sizes = sizes;
    table.has_sizes = true;
    Ok(())
}

pub(super) fn stz2(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    w.cursor.skip_bytes(3)?;
    let field_size = w.cursor.read_u8()? as u32;
    let declared = w.cursor.read_u32()?;
    if !matches!(field_size, 4 | 8 | 16) {
        return Err(DemuxError::malformed("stz2", format!("field size {}", field_size)));
    }
    w.field("field_size", field_size);
    w.field("sample_count", declared);

    let count = clamp_entries(declared, w.remaining_in(n) * 8, field_size as u64, "stz2");
    let mut sizes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        sizes.push(w.cursor.read_bits(field_size)?);
    }

    let table = &mut s.current(n)?.table;
    table.sample_size = 0;
    table.sample_count = count;
    table.sample_sizes = sizes;
    table.has_sizes = true;
    Ok(())
}

pub(super) fn stco(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 4, "stco");
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(w.cursor.read_u32()? as u64);
    }
    w.field("entry_count", count);
    s.current(n)?.table.chunk_offsets = offsets;
    Ok(())
}

pub(super) fn co64(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 8, "co64");
    let mut offsets = Vec::with_capacity(count as usize);
    for _ in 0..count {
        offsets.push(w.cursor.read_u64()?);
    }
    w.field("entry_count", count);
    s.current(n)?.table.chunk_offsets = offsets;
    Ok(())
}

pub(super) fn stss(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let declared = w.cursor.read_u32()?;
    let count = clamp_entries(declared, w.remaining_in(n), 4, "stss");
    let mut sync = Vec::with_capacity(count as usize);
    for _ in 0..count {
        sync.push(w.cursor.read_u32()?);
    }
    w.field("entry_count", count);
    s.current(n)?.table.sync_samples = Some(sync);
    Ok(())
}

pub(super) fn sdtp(s: &mut Mp4, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    read_full_header(&mut w.cursor, n)?;
    let flags = w.cursor.read_bytes(w.remaining_in(n))?;
    // is_leading(2) sample_depends_on(2) sample_is_depended_on(2) has_redundancy(2)
    let depends_on = flags.iter().map(|b| (b >> 4) & 0x3).collect();
    w.field("entry_count", flags.len() as u64);
    s.current(n)?.table.dependencies = Some(depends_on);
    Ok(())
}

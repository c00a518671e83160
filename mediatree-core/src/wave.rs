//! RIFF/WAVE and RF64.
//!
//! ```text
//! RIFF|RF64 WAVE
//! ├── ds64        RF64 64-bit sizes
//! ├── fmt         WAVEFORMATEX / WAVEFORMATEXTENSIBLE
//! ├── fact        sample length of compressed data
//! ├── bext        broadcast extension
//! ├── cue         cue points
//! ├── LIST INFO
//! └── data
//! ```
//! The data chunk has no index of its own; it is cut into fixed-size frames.

use once_cell::sync::Lazy;

use crate::config::ParseOptions;
use crate::error::{IndexError, Result};
use crate::index;
use crate::media::{
    native_to_ticks, BroadcastExtension, ContainerFormat, ContainerProfile, CuePoint, MediaFile,
    Sample, TimeBase, Track, TrackKind,
};
use crate::node::{ByteRange, Node, NodeId};
use crate::riff::{self, fixed_string, RiffForm, RiffHeader, WaveFormat};
use crate::walker::{walk_children, walk_root, DispatchTable, Format, Walk};

/// Chunk size field value that defers to `ds64`.
const RF64_SIZE: u64 = 0xFFFF_FFFF;

/// Fixed part of the `bext` chunk.
const BEXT_FIXED_SIZE: u64 = 602;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Ds64 {
    riff_size: u64,
    data_size: u64,
    sample_count: u64,
}

/// `cue ` entry before the sample rate is known.
#[derive(Debug, Clone, Copy)]
struct RawCue {
    id: u32,
    sample_offset: u32,
}

pub(crate) struct Wave {
    media: MediaFile,
    format: Option<WaveFormat>,
    fact_samples: Option<u64>,
    ds64: Option<Ds64>,
    data: Option<ByteRange>,
    cues: Vec<RawCue>,
}

impl Wave {
    fn new(profile: ContainerProfile, file_size: u64) -> Self {
        Self {
            media: MediaFile::new(ContainerFormat::Wave, profile, file_size),
            format: None,
            fact_samples: None,
            ds64: None,
            data: None,
            cues: Vec::new(),
        }
    }

    fn finish(self, walk: &Walk<'_>) -> MediaFile {
        let Wave {
            mut media,
            format,
            fact_samples,
            ds64,
            data,
            cues,
        } = self;

        let mut track = Track::new(1, TrackKind::Audio);
        track.default = true;

        let built = match (&format, data) {
            (None, _) => Err(IndexError::MissingTable("fmt ")),
            (_, None) => Err(IndexError::MissingTable("data")),
            (Some(format), Some(data)) => {
                let data = clamp_to_file(data, media.file_size);
                track.codec = format.codec();
                track.codec_tag = Some(format!("0x{:04X}", format.effective_tag()));
                track.audio = Some(format.audio_params());
                track.codec_private = format.extra;
                track.time_base = TimeBase::new(1, format.samples_per_sec as u64);

                let sample_frames = fact_samples
                    .or_else(|| ds64.map(|d| d.sample_count).filter(|&n| n > 0))
                    .or_else(|| (format.block_align > 0).then(|| data.size / format.block_align as u64));
                track.declared_sample_count = sample_frames;
                track.duration_us = match sample_frames {
                    Some(frames) if format.samples_per_sec > 0 => {
                        Some(native_to_ticks(frames as i64, format.samples_per_sec as u64) as u64)
                    }
                    _ if format.avg_bytes_per_sec > 0 => {
                        Some(native_to_ticks(data.size as i64, format.avg_bytes_per_sec as u64) as u64)
                    }
                    _ => None,
                };

                media.cue_points = cues
                    .iter()
                    .map(|cue| CuePoint {
                        id: cue.id as u64,
                        time_us: (format.samples_per_sec > 0)
                            .then(|| native_to_ticks(cue.sample_offset as i64, format.samples_per_sec as u64)),
                        track: Some(track.id),
                        byte_offset: (format.block_align > 0)
                            .then(|| data.offset + cue.sample_offset as u64 * format.block_align as u64),
                    })
                    .collect();

                build_index(format, data, walk.options)
            }
        };

        track.finalize(built, media.file_size);
        tracing::debug!(
            codec = ?track.codec,
            samples = track.sample_count(),
            "wave data indexed"
        );
        media.duration_us = track.duration_us;
        media.tracks.push(track);
        media
    }
}

fn clamp_to_file(data: ByteRange, file_size: u64) -> ByteRange {
    let end = data.end().min(file_size);
    ByteRange::new(data.offset, end.saturating_sub(data.offset))
}

/// Bytes per index entry: `pcm_frame_samples` sample frames for PCM, one
/// block for block-based codecs.
fn frame_bytes(format: &WaveFormat, options: &ParseOptions) -> std::result::Result<u64, IndexError> {
    let block_align = format.block_align as u64;
    if format.codec().is_pcm() {
        if block_align == 0 {
            return Err(IndexError::Inconsistent("PCM format with zero block align".into()));
        }
        let step = options.pcm_frame_samples as u64 * block_align;
        if step > u32::MAX as u64 {
            return Err(IndexError::Inconsistent(format!(
                "{} frames of {} bytes do not fit one sample",
                options.pcm_frame_samples, block_align
            )));
        }
        return Ok(step);
    }
    if block_align > 1 {
        Ok(block_align)
    } else {
        Ok(options.pcm_frame_samples as u64)
    }
}

/// Cut the data chunk into equal frames; the last one may be short.
fn build_index(
    format: &WaveFormat,
    data: ByteRange,
    options: &ParseOptions,
) -> std::result::Result<Vec<Sample>, IndexError> {
    let step = frame_bytes(format, options)?;
    let count = data.size.div_ceil(step);
    let mut samples = index::allocate(count, options)?;

    let pcm = format.codec().is_pcm();
    let mut consumed = 0u64;
    while consumed < data.size {
        let size = step.min(data.size - consumed);
        let time = if pcm {
            native_to_ticks(
                (consumed / format.block_align as u64) as i64,
                format.samples_per_sec as u64,
            )
        } else {
            native_to_ticks(consumed as i64, format.avg_bytes_per_sec as u64)
        };
        let size32 = u32::try_from(size)
            .map_err(|_| IndexError::Inconsistent(format!("{}-byte PCM frame", size)))?;
        samples.push(Sample::frame(data.offset + consumed, size32, true, time, time));
        consumed += size;
    }
    Ok(samples)
}

// ============================================================================
// Handlers
// ============================================================================

type Handler = Result<()>;

fn container(s: &mut Wave, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    walk_children(s, w, n)
}

fn ds64(s: &mut Wave, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let c = &mut w.cursor;
    let ds64 = Ds64 {
        riff_size: c.read_u64_le()?,
        data_size: c.read_u64_le()?,
        sample_count: c.read_u64_le()?,
    };
    w.field("riff_size", ds64.riff_size);
    w.field("data_size", ds64.data_size);
    w.field("sample_count", ds64.sample_count);
    s.ds64 = Some(ds64);
    s.media.profile = ContainerProfile::Rf64;
    Ok(())
}

fn fmt(s: &mut Wave, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let end = n.offset_end.min(w.file_size());
    let format = WaveFormat::read(&mut w.cursor, end)?;
    w.field("format_tag", format.format_tag);
    w.field("channels", format.channels);
    w.field("samples_per_sec", format.samples_per_sec);
    w.field("avg_bytes_per_sec", format.avg_bytes_per_sec);
    w.field("block_align", format.block_align);
    w.field("bits_per_sample", format.bits_per_sample);
    s.format = Some(format);
    Ok(())
}

fn fact(s: &mut Wave, w: &mut Walk<'_>, _n: &mut Node) -> Handler {
    let samples = w.cursor.read_u32_le()?;
    w.field("sample_length", samples);
    // RF64 writers put the real count in ds64.
    if samples as u64 != RF64_SIZE {
        s.fact_samples = Some(samples as u64);
    }
    Ok(())
}

fn cue(s: &mut Wave, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let declared = w.cursor.read_u32_le()? as u64;
    let count = declared.min(w.remaining_in(n) / 24);
    w.field("cue_points", count);

    for _ in 0..count {
        let c = &mut w.cursor;
        let id = c.read_u32_le()?;
        let _position = c.read_u32_le()?;
        let _chunk = c.read_array::<4>()?;
        let _chunk_start = c.read_u32_le()?;
        let _block_start = c.read_u32_le()?;
        let sample_offset = c.read_u32_le()?;
        s.cues.push(RawCue { id, sample_offset });
    }
    Ok(())
}

fn text(w: &mut Walk<'_>, len: u64) -> Result<String> {
    Ok(fixed_string(&w.cursor.read_bytes(len)?))
}

fn bext(s: &mut Wave, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    if w.remaining_in(n) < BEXT_FIXED_SIZE {
        return Err(crate::error::DemuxError::malformed("bext", "chunk shorter than its fixed part"));
    }
    let description = text(w, 256)?;
    let originator = text(w, 32)?;
    let originator_reference = text(w, 32)?;
    let origination_date = text(w, 10)?;
    let origination_time = text(w, 8)?;
    let c = &mut w.cursor;
    let low = c.read_u32_le()? as u64;
    let high = c.read_u32_le()? as u64;
    let version = c.read_u16_le()?;
    let umid = c.read_bytes(64)?.to_vec();
    let mut loudness = [0i16; 5];
    for value in loudness.iter_mut() {
        *value = c.read_u16_le()? as i16;
    }
    c.skip_bytes(180)?;
    let history = w.cursor.read_bytes(w.remaining_in(n))?;

    let v2 = |v: i16| (version >= 2).then_some(v);
    let broadcast = BroadcastExtension {
        description,
        originator,
        originator_reference,
        origination_date,
        origination_time,
        time_reference: (high << 32) | low,
        version,
        umid,
        loudness_value: v2(loudness[0]),
        loudness_range: v2(loudness[1]),
        max_true_peak_level: v2(loudness[2]),
        max_momentary_loudness: v2(loudness[3]),
        max_short_term_loudness: v2(loudness[4]),
        coding_history: fixed_string(&history),
    };
    w.field("version", version);
    w.field("originator", broadcast.originator.as_str());
    w.field("time_reference", broadcast.time_reference);
    s.media.broadcast = Some(broadcast);
    Ok(())
}

fn data(s: &mut Wave, w: &mut Walk<'_>, n: &mut Node) -> Handler {
    let declared = n.payload_size();
    if declared == RF64_SIZE {
        if let Some(ds64) = s.ds64 {
            // Let the resync guard land after the real payload.
            n.offset_end = n.payload_offset().saturating_add(ds64.data_size);
        }
    }
    w.field("data_size", n.payload_size());
    s.data = Some(ByteRange::new(n.payload_offset(), n.payload_size()));
    Ok(())
}

static WAVE_TABLE: Lazy<DispatchTable<Wave>> = Lazy::new(|| {
    DispatchTable::new()
        .on(NodeId::list(b"WAVE"), "RIFF WAVE", container)
        .on(NodeId::tag(b"ds64"), "ds64", ds64)
        .on(NodeId::tag(b"fmt "), "fmt", fmt)
        .on(NodeId::tag(b"fact"), "fact", fact)
        .on(NodeId::tag(b"cue "), "cue", cue)
        .on(NodeId::tag(b"bext"), "bext", bext)
        .on(NodeId::tag(b"data"), "data", data)
        .on(NodeId::list(b"INFO"), "INFO", riff::info_list)
        .on(NodeId::tag(b"INAM"), "INAM", riff::info_title)
        .on(NodeId::tag(b"ISFT"), "ISFT", riff::info_software)
        .skip(NodeId::tag(b"JUNK"), "JUNK")
        .skip(NodeId::tag(b"PAD "), "PAD")
        .skip(NodeId::tag(b"iXML"), "iXML")
        .skip(NodeId::tag(b"smpl"), "smpl")
});

impl Format for Wave {
    type Header = RiffHeader;

    fn dispatch_table() -> &'static DispatchTable<Self> {
        &WAVE_TABLE
    }
}

impl RiffForm for Wave {
    fn media_mut(&mut self) -> &mut MediaFile {
        &mut self.media
    }
}

pub(crate) fn parse(walk: &mut Walk<'_>, profile: ContainerProfile) -> Result<MediaFile> {
    let mut state = Wave::new(profile, walk.file_size());
    walk_root(&mut state, walk)?;
    Ok(state.finish(walk))
}

//! ISO Base Media File Format (MP4, QuickTime, 3GP, HEIF).
//!
//! ```text
//! ftyp
//! moov
//! ├── mvhd
//! └── trak*
//!     ├── tkhd, edts/elst
//!     └── mdia
//!         ├── mdhd, hdlr
//!         └── minf/stbl
//!             ├── stsd (sample entries -> avcC, hvcC, esds, ...)
//!             └── stts ctts stsc stsz|stz2 stco|co64 stss sdtp
//! mdat
//! ```
//! Box payloads fill a [`SampleTable`] per track; the index is built once
//! the walk is over.

pub mod header;
pub mod sample_table;

mod boxes;

use once_cell::sync::Lazy;

pub use header::BoxHeader;
pub use sample_table::SampleTable;

use crate::error::{DemuxError, Result};
use crate::index;
use crate::media::{
    native_to_ticks, ContainerFormat, ContainerProfile, MediaFile, TimeBase, Track, TrackKind,
};
use crate::node::{FourCc, Node, NodeId};
use crate::walker::{walk_root, DispatchTable, Format, Walk};

/// Track under construction: metadata plus its raw tables.
pub(crate) struct TrakBox {
    track: Track,
    timescale: u32,
    handler: Option<FourCc>,
    /// `tkhd` width/height, 16.16 fixed point already shifted.
    presentation: Option<(u32, u32)>,
    table: SampleTable,
}

pub(crate) struct Mp4 {
    media: MediaFile,
    traks: Vec<TrakBox>,
    moov_seen: bool,
    mdat_seen: bool,
}

impl Mp4 {
    fn new(profile: ContainerProfile, file_size: u64) -> Self {
        Self {
            media: MediaFile::new(ContainerFormat::Mp4, profile, file_size),
            traks: Vec::new(),
            moov_seen: false,
            mdat_seen: false,
        }
    }

    /// The `trak` whose children are being walked.
    fn current(&mut self, node: &Node) -> Result<&mut TrakBox> {
        self.traks
            .last_mut()
            .ok_or_else(|| DemuxError::malformed(node.id.to_string(), "box outside of a trak"))
    }

    fn finish(self, walk: &Walk<'_>) -> MediaFile {
        let mut media = self.media;
        let options = walk.options;

        for trak in self.traks {
            let TrakBox {
                mut track,
                timescale,
                table,
                presentation,
                ..
            } = trak;
            if let (Some(video), Some((width, height))) = (track.video.as_mut(), presentation) {
                video.display_width.get_or_insert(width);
                video.display_height.get_or_insert(height);
            }
            track.time_base = TimeBase::new(1, timescale as u64);
            track.declared_sample_count = Some(table.sample_count as u64);

            let built = table
                .build(timescale, options)
                .and_then(|samples| index::with_parameter_sets(&track, samples, options));
            track.finalize(built, media.file_size);
            tracing::debug!(
                track = track.id,
                codec = ?track.codec,
                samples = track.sample_count(),
                "mp4 track indexed"
            );
            media.tracks.push(track);
        }

        if !self.moov_seen {
            tracing::warn!("no moov box found");
        }
        if media.duration_us.is_none() {
            media.duration_us = media.tracks.iter().filter_map(|t| t.duration_us).max();
        }
        media
    }
}

static MP4_TABLE: Lazy<DispatchTable<Mp4>> = Lazy::new(|| {
    use boxes::*;

    DispatchTable::new()
        .on(NodeId::tag(b"ftyp"), "ftyp", ftyp)
        .on(NodeId::tag(b"moov"), "moov", moov)
        .on(NodeId::tag(b"mvhd"), "mvhd", mvhd)
        .on(NodeId::tag(b"trak"), "trak", trak)
        .on(NodeId::tag(b"tkhd"), "tkhd", tkhd)
        .on(NodeId::tag(b"edts"), "edts", container)
        .on(NodeId::tag(b"elst"), "elst", elst)
        .on(NodeId::tag(b"mdia"), "mdia", container)
        .on(NodeId::tag(b"mdhd"), "mdhd", mdhd)
        .on(NodeId::tag(b"hdlr"), "hdlr", hdlr)
        .on(NodeId::tag(b"minf"), "minf", container)
        .on(NodeId::tag(b"stbl"), "stbl", container)
        .on(NodeId::tag(b"stsd"), "stsd", stsd)
        .on(NodeId::tag(b"avcC"), "avcC", avcc)
        .on(NodeId::tag(b"hvcC"), "hvcC", hvcc)
        .on(NodeId::tag(b"av1C"), "av1C", codec_private)
        .on(NodeId::tag(b"vpcC"), "vpcC", codec_private)
        .on(NodeId::tag(b"dOps"), "dOps", codec_private)
        .on(NodeId::tag(b"dfLa"), "dfLa", codec_private)
        .on(NodeId::tag(b"esds"), "esds", esds)
        .on(NodeId::tag(b"wave"), "wave", container)
        .on(NodeId::tag(b"pasp"), "pasp", pasp)
        .on(NodeId::tag(b"stts"), "stts", stts)
        .on(NodeId::tag(b"ctts"), "ctts", ctts)
        .on(NodeId::tag(b"stsc"), "stsc", stsc)
        .on(NodeId::tag(b"stsz"), "stsz", stsz)
        .on(NodeId::tag(b"stz2"), "stz2", stz2)
        .on(NodeId::tag(b"stco"), "stco", stco)
        .on(NodeId::tag(b"co64"), "co64", co64)
        .on(NodeId::tag(b"stss"), "stss", stss)
        .on(NodeId::tag(b"sdtp"), "sdtp", sdtp)
        .on(NodeId::tag(b"mdat"), "mdat", mdat)
        .skip(NodeId::tag(b"free"), "free")
        .skip(NodeId::tag(b"skip"), "skip")
        .skip(NodeId::tag(b"wide"), "wide")
        .skip(NodeId::tag(b"udta"), "udta")
        .skip(NodeId::tag(b"dinf"), "dinf")
        .skip(NodeId::tag(b"vmhd"), "vmhd")
        .skip(NodeId::tag(b"smhd"), "smhd")
        .skip(NodeId::tag(b"btrt"), "btrt")
});

impl Format for Mp4 {
    type Header = BoxHeader;

    fn dispatch_table() -> &'static DispatchTable<Self> {
        &MP4_TABLE
    }
}

pub(crate) fn parse(walk: &mut Walk<'_>, profile: ContainerProfile) -> Result<MediaFile> {
    let mut state = Mp4::new(profile, walk.file_size());
    walk_root(&mut state, walk)?;
    Ok(state.finish(walk))
}

/// Handler types that produce a track of the given kind.
pub(crate) fn track_kind(handler: FourCc) -> TrackKind {
    match &handler.0 {
        b"vide" => TrackKind::Video,
        b"soun" => TrackKind::Audio,
        b"text" | b"subt" | b"sbtl" | b"clcp" => TrackKind::Subtitle,
        _ => TrackKind::Other,
    }
}

/// Profile implied by the `ftyp` brands.
pub(crate) fn profile_from_brands(major: FourCc, compatible: &[FourCc]) -> ContainerProfile {
    let brand_profile = |b: &FourCc| match &b.0 {
        b"qt  " => Some(ContainerProfile::QuickTime),
        b"heic" | b"heix" | b"mif1" | b"msf1" | b"avif" | b"heim" | b"heis" => {
            Some(ContainerProfile::Heif)
        }
        [b'3', b'g', ..] => Some(ContainerProfile::ThreeGpp),
        _ => None,
    };
    brand_profile(&major)
        .or_else(|| compatible.iter().find_map(brand_profile))
        .unwrap_or(ContainerProfile::Mp4)
}

fn movie_ticks(value: u64, timescale: u32) -> Option<u64> {
    // All ones means "unknown".
    if value == u64::MAX || value == u32::MAX as u64 || timescale == 0 {
        return None;
    }
    Some(native_to_ticks(value as i64, timescale as u64) as u64)
}

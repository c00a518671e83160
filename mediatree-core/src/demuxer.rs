//! Demuxer facade: sniff the container, run its walker, hand back the
//! media record.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use crate::bitstream::BitCursor;
use crate::config::ParseOptions;
use crate::error::{DemuxError, Result};
use crate::media::{ContainerFormat, ContainerProfile, MediaFile};
use crate::params::ParameterSetDecoder;
use crate::trace::{NullTrace, TraceSink};
use crate::walker::Walk;
use crate::{asf, avi, mkv, mp4, wave};

/// Anything shorter cannot hold a top-level header of any format.
pub const MIN_FILE_SIZE: usize = 12;

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

/// Top-level ISO-BMFF box types a file may start with.
const BMFF_LEADING_BOXES: [&[u8; 4]; 9] = [
    b"ftyp", b"moov", b"mdat", b"free", b"skip", b"wide", b"pnot", b"uuid", b"styp",
];

/// Identify the container from its first bytes.
pub fn probe(data: &[u8]) -> Option<ContainerFormat> {
    if data.len() < MIN_FILE_SIZE {
        return None;
    }

    let head = &data[..4];
    let form = &data[8..12];
    if head == b"RIFF" || head == b"RF64" {
        return match form {
            b"AVI " | b"AVIX" => Some(ContainerFormat::Avi),
            b"WAVE" => Some(ContainerFormat::Wave),
            _ => None,
        };
    }
    if head == EBML_MAGIC {
        return Some(ContainerFormat::Matroska);
    }
    if data.len() >= 16 && data[..16] == asf::guids::header_object_bytes() {
        return Some(ContainerFormat::Asf);
    }
    if BMFF_LEADING_BOXES.iter().any(|b| &data[4..8] == b.as_slice()) {
        return Some(ContainerFormat::Mp4);
    }
    None
}

#[derive(Default, Clone)]
pub struct Demuxer {
    options: ParseOptions,
    decoder: Option<Arc<dyn ParameterSetDecoder>>,
}

impl Demuxer {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            decoder: None,
        }
    }

    /// Hand every SPS found in a decoder configuration to `decoder`.
    pub fn with_parameter_decoder(mut self, decoder: Arc<dyn ParameterSetDecoder>) -> Self {
        self.decoder = Some(decoder);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn parse(&self, data: impl Into<Bytes>) -> Result<MediaFile> {
        self.parse_traced(data, &mut NullTrace)
    }

    /// Parse while reporting every node to `sink`, in traversal order.
    pub fn parse_traced(&self, data: impl Into<Bytes>, sink: &mut dyn TraceSink) -> Result<MediaFile> {
        self.options.validate()?;
        let data: Bytes = data.into();
        let size = data.len() as u64;
        if data.len() < MIN_FILE_SIZE {
            return Err(DemuxError::TooShort { size });
        }
        let format = probe(&data).ok_or(DemuxError::UnsupportedFormat)?;
        let rf64 = data.starts_with(b"RF64");

        let span = tracing::debug_span!("parse", %format, size);
        let _enter = span.enter();

        let mut walk = Walk::new(BitCursor::new(data), &self.options, sink, self.decoder.as_deref());
        let media = match format {
            ContainerFormat::Mp4 => mp4::parse(&mut walk, ContainerProfile::Mp4)?,
            ContainerFormat::Avi => avi::parse(&mut walk)?,
            ContainerFormat::Matroska => mkv::parse(&mut walk)?,
            ContainerFormat::Wave if rf64 => wave::parse(&mut walk, ContainerProfile::Rf64)?,
            ContainerFormat::Wave => wave::parse(&mut walk, ContainerProfile::Wave)?,
            ContainerFormat::Asf => asf::parse(&mut walk)?,
        };

        tracing::info!(
            profile = ?media.profile,
            tracks = media.tracks.len(),
            duration_us = ?media.duration_us,
            "container parsed"
        );
        Ok(media)
    }

    pub fn open(&self, path: impl AsRef<Path>) -> Result<MediaFile> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        tracing::debug!(path = %path.display(), size = data.len(), "file read");
        self.parse(data)
    }
}

impl std::fmt::Debug for Demuxer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Demuxer")
            .field("options", &self.options)
            .field("decoder", &self.decoder.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(head: &[u8]) -> Vec<u8> {
        let mut v = head.to_vec();
        v.resize(32, 0);
        v
    }

    #[test]
    fn sniffs_every_container() {
        assert_eq!(probe(&padded(b"RIFF\0\0\0\0AVI LIST")), Some(ContainerFormat::Avi));
        assert_eq!(probe(&padded(b"RIFF\0\0\0\0AVIX")), Some(ContainerFormat::Avi));
        assert_eq!(probe(&padded(b"RIFF\0\0\0\0WAVE")), Some(ContainerFormat::Wave));
        assert_eq!(probe(&padded(b"RF64\xFF\xFF\xFF\xFFWAVE")), Some(ContainerFormat::Wave));
        assert_eq!(probe(&padded(&[0x1A, 0x45, 0xDF, 0xA3, 0x9F])), Some(ContainerFormat::Matroska));
        assert_eq!(probe(&padded(&asf::guids::header_object_bytes())), Some(ContainerFormat::Asf));
        assert_eq!(probe(&padded(b"\0\0\0\x20ftypisom")), Some(ContainerFormat::Mp4));
        assert_eq!(probe(&padded(b"\0\0\0\x08wide")), Some(ContainerFormat::Mp4));
        assert_eq!(probe(&padded(b"RIFF\0\0\0\0CDXA")), None);
        assert_eq!(probe(&padded(b"GIF89a")), None);
    }

    #[test]
    fn short_and_unknown_input() {
        let demuxer = Demuxer::default();
        assert!(matches!(
            demuxer.parse(b"RIFF".to_vec()),
            Err(DemuxError::TooShort { size: 4 })
        ));
        assert!(matches!(
            demuxer.parse(vec![0xEEu8; 64]),
            Err(DemuxError::UnsupportedFormat)
        ));
    }

    #[test]
    fn invalid_options_are_rejected_before_parsing() {
        let demuxer = Demuxer::new(ParseOptions {
            pcm_frame_samples: u32::MAX,
            ..ParseOptions::default()
        });
        assert!(matches!(
            demuxer.parse(vec![0u8; 64]),
            Err(DemuxError::Config(_))
        ));
    }

    #[test]
    fn open_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let mut wav = b"RIFF\x24\x00\x00\x00WAVEfmt \x10\x00\x00\x00".to_vec();
        wav.extend_from_slice(&[1, 0, 1, 0, 0x40, 0x1F, 0, 0, 0x80, 0x3E, 0, 0, 2, 0, 16, 0]);
        wav.extend_from_slice(b"data\x00\x00\x00\x00");
        std::fs::write(&path, &wav).unwrap();

        let media = Demuxer::default().open(&path).unwrap();
        assert_eq!(media.format, ContainerFormat::Wave);
        assert_eq!(media.tracks.len(), 1);
        assert_eq!(media.tracks[0].sample_count(), 0);

        assert!(matches!(
            Demuxer::default().open(dir.path().join("missing.wav")),
            Err(DemuxError::Io(_))
        ));
    }
}

//! Externally visible records: the parsed file, its tracks and their sample
//! index.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::codec::Codec;
use crate::error::IndexError;
use crate::node::ByteRange;
use crate::params::ParameterSet;

/// Timestamps in the sample index are expressed in microseconds.
pub const TICKS_PER_SECOND: i64 = 1_000_000;

/// Convert `value` native ticks of a `timescale` Hz clock to microseconds.
pub fn native_to_ticks(value: i64, timescale: u64) -> i64 {
    if timescale == 0 {
        return 0;
    }
    saturate((value as i128) * (TICKS_PER_SECOND as i128) / (timescale as i128))
}

fn saturate(v: i128) -> i64 {
    v.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerFormat {
    Mp4,
    Avi,
    Matroska,
    Wave,
    Asf,
}

impl std::fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ContainerFormat::Mp4 => "ISO-BMFF",
            ContainerFormat::Avi => "AVI",
            ContainerFormat::Matroska => "Matroska",
            ContainerFormat::Wave => "WAVE",
            ContainerFormat::Asf => "ASF",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ContainerProfile {
    Mp4,
    QuickTime,
    ThreeGpp,
    Heif,
    Avi,
    OpenDml,
    Matroska,
    WebM,
    Wave,
    Rf64,
    Asf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackKind {
    Video,
    Audio,
    Subtitle,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SampleKind {
    Frame,
    /// Random access point.
    SyncFrame,
    /// Codec configuration injected ahead of the media samples.
    ParameterSet,
}

/// One entry of a track's sample index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Sample {
    pub kind: SampleKind,
    pub offset: u64,
    pub size: u32,
    /// Decode time in microseconds, unset for parameter sets.
    pub dts: Option<i64>,
    /// Presentation time in microseconds, unset for parameter sets.
    pub pts: Option<i64>,
}

impl Sample {
    pub fn frame(offset: u64, size: u32, sync: bool, dts: i64, pts: i64) -> Self {
        Self {
            kind: if sync {
                SampleKind::SyncFrame
            } else {
                SampleKind::Frame
            },
            offset,
            size,
            dts: Some(dts),
            pts: Some(pts),
        }
    }

    pub fn parameter_set(range: ByteRange) -> Result<Self, IndexError> {
        let size = u32::try_from(range.size)
            .map_err(|_| IndexError::Inconsistent(format!("{}-byte parameter set", range.size)))?;
        Ok(Self {
            kind: SampleKind::ParameterSet,
            offset: range.offset,
            size,
            dts: None,
            pts: None,
        })
    }

    pub fn is_sync(&self) -> bool {
        self.kind == SampleKind::SyncFrame
    }

    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size as u64)
    }
}

/// Seconds per native tick, as `num / den`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeBase {
    pub num: u64,
    pub den: u64,
}

impl TimeBase {
    pub fn new(num: u64, den: u64) -> Self {
        Self { num, den }
    }

    /// Native ticks to microseconds.
    pub fn to_ticks(&self, value: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        saturate(
            (value as i128)
                .saturating_mul(self.num as i128)
                .saturating_mul(TICKS_PER_SECOND as i128)
                / (self.den as i128),
        )
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(1, TICKS_PER_SECOND as u64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoParams {
    pub width: u32,
    pub height: u32,
    pub display_width: Option<u32>,
    pub display_height: Option<u32>,
    pub bit_depth: Option<u16>,
    pub frame_rate: Option<f64>,
    pub profile: Option<u8>,
    pub level: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AudioParams {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub block_align: u16,
    pub avg_bytes_per_sec: u32,
}

/// ISO-BMFF edit list entry, in movie / media timescale units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EditEntry {
    pub segment_duration: u64,
    pub media_time: i64,
    pub rate: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum IndexStatus {
    Complete,
    /// Samples after `resolved` pointed outside the file.
    Truncated { resolved: u64, declared: u64 },
    Failed(IndexError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub id: u64,
    pub kind: TrackKind,
    pub codec: Codec,
    /// Raw codec discriminant as found in the file.
    pub codec_tag: Option<String>,
    pub name: Option<String>,
    pub language: Option<String>,
    pub default: bool,
    pub time_base: TimeBase,
    pub duration_us: Option<u64>,
    /// Sample count announced by the container, if any.
    pub declared_sample_count: Option<u64>,
    pub video: Option<VideoParams>,
    pub audio: Option<AudioParams>,
    pub codec_private: Option<ByteRange>,
    pub parameter_sets: Vec<ParameterSet>,
    pub edits: Vec<EditEntry>,
    pub samples: Vec<Sample>,
    pub index_status: IndexStatus,
}

impl Track {
    pub fn new(id: u64, kind: TrackKind) -> Self {
        Self {
            id,
            kind,
            codec: Codec::Unknown,
            codec_tag: None,
            name: None,
            language: None,
            default: false,
            time_base: TimeBase::default(),
            duration_us: None,
            declared_sample_count: None,
            video: None,
            audio: None,
            codec_private: None,
            parameter_sets: Vec::new(),
            edits: Vec::new(),
            samples: Vec::new(),
            index_status: IndexStatus::Complete,
        }
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Samples that carry media, i.e. not injected parameter sets.
    pub fn frames(&self) -> impl Iterator<Item = &Sample> {
        self.samples
            .iter()
            .filter(|s| s.kind != SampleKind::ParameterSet)
    }

    pub fn sync_sample_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_sync()).count()
    }

    pub fn total_frame_bytes(&self) -> u64 {
        self.frames().map(|s| s.size as u64).sum()
    }

    pub fn video_mut(&mut self) -> &mut VideoParams {
        self.video.get_or_insert_with(VideoParams::default)
    }

    pub fn audio_mut(&mut self) -> &mut AudioParams {
        self.audio.get_or_insert_with(AudioParams::default)
    }

    /// Install a finished index, or record why there is none. Samples
    /// extending past `file_size` end the index at that point.
    pub fn finalize(&mut self, built: Result<Vec<Sample>, IndexError>, file_size: u64) {
        match built {
            Ok(mut samples) => {
                let declared = samples.len() as u64;
                if let Some(bad) = samples.iter().position(|s| s.end() > file_size) {
                    tracing::warn!(
                        track = self.id,
                        resolved = bad,
                        declared,
                        "sample index truncated at end of file"
                    );
                    samples.truncate(bad);
                    self.index_status = IndexStatus::Truncated {
                        resolved: bad as u64,
                        declared,
                    };
                } else {
                    self.index_status = IndexStatus::Complete;
                }
                self.samples = samples;
            }
            Err(e) => {
                tracing::warn!(track = self.id, error = %e, "sample index not built");
                self.samples = Vec::new();
                self.index_status = IndexStatus::Failed(e);
            }
        }
    }
}

/// Cue / marker point: WAVE `cue ` chunks and Matroska `Cues`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CuePoint {
    pub id: u64,
    pub time_us: Option<i64>,
    pub track: Option<u64>,
    pub byte_offset: Option<u64>,
}

/// RIFF WAVE `bext` broadcast extension.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastExtension {
    pub description: String,
    pub originator: String,
    pub originator_reference: String,
    pub origination_date: String,
    pub origination_time: String,
    pub time_reference: u64,
    pub version: u16,
    pub umid: Vec<u8>,
    pub loudness_value: Option<i16>,
    pub loudness_range: Option<i16>,
    pub max_true_peak_level: Option<i16>,
    pub max_momentary_loudness: Option<i16>,
    pub max_short_term_loudness: Option<i16>,
    pub coding_history: String,
}

/// Everything known about one parsed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaFile {
    pub format: ContainerFormat,
    pub profile: ContainerProfile,
    /// ISO-BMFF major brand, Matroska DocType, RIFF form type.
    pub brand: Option<String>,
    pub file_size: u64,
    pub duration_us: Option<u64>,
    pub creation_time: Option<DateTime<Utc>>,
    pub modification_time: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub writing_app: Option<String>,
    pub tracks: Vec<Track>,
    pub cue_points: Vec<CuePoint>,
    pub broadcast: Option<BroadcastExtension>,
}

impl MediaFile {
    pub fn new(format: ContainerFormat, profile: ContainerProfile, file_size: u64) -> Self {
        Self {
            format,
            profile,
            brand: None,
            file_size,
            duration_us: None,
            creation_time: None,
            modification_time: None,
            title: None,
            writing_app: None,
            tracks: Vec::new(),
            cue_points: Vec::new(),
            broadcast: None,
        }
    }

    pub fn track(&self, id: u64) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn tracks_of(&self, kind: TrackKind) -> impl Iterator<Item = &Track> {
        self.tracks.iter().filter(move |t| t.kind == kind)
    }
}

/// Seconds since `epoch_year`-01-01T00:00:00Z to a UTC timestamp.
pub(crate) fn datetime_from_epoch(epoch_year: i32, seconds: i64, nanos: u32) -> Option<DateTime<Utc>> {
    let epoch = chrono::NaiveDate::from_ymd_opt(epoch_year, 1, 1)?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    epoch
        .checked_add_signed(chrono::TimeDelta::try_seconds(seconds)?)?
        .checked_add_signed(chrono::TimeDelta::nanoseconds(nanos as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_conversion() {
        assert_eq!(native_to_ticks(90_000, 90_000), 1_000_000);
        assert_eq!(native_to_ticks(1001, 30_000), 33_366);
        assert_eq!(native_to_ticks(5, 0), 0);
        assert_eq!(TimeBase::new(1001, 30_000).to_ticks(30), 1_001_000);
    }

    #[test]
    fn finalize_truncates_at_eof() {
        let mut t = Track::new(1, TrackKind::Audio);
        let samples = vec![
            Sample::frame(0, 10, true, 0, 0),
            Sample::frame(10, 10, true, 1, 1),
            Sample::frame(20, 10, true, 2, 2),
        ];
        t.finalize(Ok(samples), 25);
        assert_eq!(t.sample_count(), 2);
        assert_eq!(
            t.index_status,
            IndexStatus::Truncated {
                resolved: 2,
                declared: 3
            }
        );
    }

    #[test]
    fn finalize_failure_zeroes_samples() {
        let mut t = Track::new(1, TrackKind::Video);
        t.samples.push(Sample::frame(0, 1, true, 0, 0));
        t.finalize(Err(IndexError::MissingTable("stsz")), 100);
        assert!(t.samples.is_empty());
        assert!(matches!(t.index_status, IndexStatus::Failed(_)));
    }

    #[test]
    fn epoch_conversion() {
        let t = datetime_from_epoch(1904, 0, 0).unwrap();
        assert_eq!(t.to_rfc3339(), "1904-01-01T00:00:00+00:00");
        let t = datetime_from_epoch(1970, 86_400, 0).unwrap();
        assert_eq!(t.timestamp(), 86_400);
    }
}

//! # mediatree core
//!
//! Container tree walker and per-track sample indexer for ISO-BMFF, RIFF
//! (AVI, WAVE), Matroska/WebM and ASF.

// ============================================================================
// Walking
// ============================================================================
pub mod bitstream;
pub mod error;
pub mod jumpy;
pub mod node;
pub mod trace;
pub mod walker;

// ============================================================================
// Media model
// ============================================================================
pub mod codec;
pub mod config;
pub mod media;
pub mod params;

mod index;

// ============================================================================
// Containers
// ============================================================================
pub mod asf;
pub mod avi;
pub mod mkv;
pub mod mp4;
pub mod riff;
pub mod wave;

pub mod demuxer;

pub use config::ParseOptions;
pub use demuxer::{probe, Demuxer};
pub use error::{DemuxError, IndexError, Result};
pub use media::{ContainerFormat, ContainerProfile, MediaFile, Sample, SampleKind, Track, TrackKind};
pub use trace::{StructureDump, TraceSink};

/// Parse an in-memory file with default options.
pub fn parse_bytes(data: impl Into<bytes::Bytes>) -> Result<MediaFile> {
    Demuxer::default().parse(data)
}

// ============================================================================
// Version
// ============================================================================
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

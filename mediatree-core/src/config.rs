//! Parser configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::DemuxError;

/// Largest accepted `pcm_frame_samples`.
pub const MAX_PCM_FRAME_SAMPLES: u32 = 1 << 20;
/// Largest accepted `max_depth`.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Let handlers end the walk once no further node can add index data.
    pub stop_when_indexed: bool,
    /// Deeper nodes are treated as unknown and skipped.
    pub max_depth: usize,
    /// Per-track ceiling on sample index entries.
    pub max_samples_per_track: u64,
    /// Sample frames per WAVE PCM index entry.
    pub pcm_frame_samples: u32,
    /// Emit SPS/PPS/VPS as leading `ParameterSet` samples.
    pub inject_parameter_sets: bool,
    /// Build AVI indexes from the `movi` list when no index chunk exists.
    pub scan_unindexed_movi: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            stop_when_indexed: true,
            max_depth: 32,
            max_samples_per_track: 1 << 24,
            pcm_frame_samples: 1024,
            inject_parameter_sets: true,
            scan_unindexed_movi: true,
        }
    }
}

impl ParseOptions {
    pub fn from_json(text: &str) -> Result<Self, DemuxError> {
        let options: ParseOptions = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DemuxError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> Result<(), DemuxError> {
        if !(1..=MAX_PCM_FRAME_SAMPLES).contains(&self.pcm_frame_samples) {
            return Err(DemuxError::Config(format!(
                "pcm_frame_samples must be in 1..={}",
                MAX_PCM_FRAME_SAMPLES
            )));
        }
        if !(1..=MAX_DEPTH).contains(&self.max_depth) {
            return Err(DemuxError::Config(format!("max_depth must be in 1..={}", MAX_DEPTH)));
        }
        Ok(())
    }
}

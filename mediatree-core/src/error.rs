//! Error types shared by every container parser.

use serde::Serialize;
use thiserror::Error;

/// Failure of a single cursor operation. The cursor position after a failed
/// read is unspecified; callers abandon the current node and resync.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("read of {bits} bits at bit {bit_offset} runs past end of data ({size} bytes)")]
    OutOfRange { bits: u64, bit_offset: u64, size: u64 },
    #[error("rewind of {bits} bits from bit {bit_offset} runs before start of data")]
    BeforeStart { bits: u64, bit_offset: u64 },
    #[error("seek to byte {target} outside data of {size} bytes")]
    SeekOutOfRange { target: u64, size: u64 },
    #[error("unsupported read width: {0} bits")]
    Width(u32),
}

#[derive(Debug, Error)]
pub enum DemuxError {
    #[error("Unsupported container format")]
    UnsupportedFormat,
    #[error("File too short: {size} bytes")]
    TooShort { size: u64 },
    #[error(transparent)]
    Cursor(#[from] CursorError),
    #[error("Malformed {node}: {reason}")]
    Malformed { node: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DemuxError {
    pub fn malformed(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Structural errors are repaired by the resync guard; everything else
    /// ends the parse.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Cursor(_) | Self::Malformed { .. })
    }
}

impl From<serde_json::Error> for DemuxError {
    fn from(e: serde_json::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Reason a track's sample index could not be built. Recorded on the track,
/// never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum IndexError {
    #[error("missing required table: {0}")]
    MissingTable(&'static str),
    #[error("{count} samples exceeds the per-track limit of {limit}")]
    TooManySamples { count: u64, limit: u64 },
    #[error("could not allocate {0} sample entries")]
    Allocation(u64),
    #[error("inconsistent tables: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, DemuxError>;

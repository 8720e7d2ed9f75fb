use std::io;

use thiserror::Error;

/// Unified error type for the storage engine.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error from disk operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Positional access past the end of an ordered structure.
    #[error("index {index} out of range for length {len}")]
    OutOfRange { index: usize, len: usize },

    /// A line of a sorted run does not have the expected shape.
    #[error("malformed {kind} record: {line:?}")]
    MalformedRecord { kind: &'static str, line: String },

    /// Structural damage: bad offsets, missing runs, unreadable sections.
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Range delete with an empty or inverted interval.
    #[error("invalid range [{start}, {end})")]
    InvalidRange { start: i32, end: i32 },

    /// Rejected configuration value.
    #[error("invalid option: {0}")]
    InvalidOption(String),
}

impl Error {
    pub(crate) fn malformed(kind: &'static str, line: &str) -> Self {
        Error::MalformedRecord {
            kind,
            line: line.to_string(),
        }
    }
}

/// Result type alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

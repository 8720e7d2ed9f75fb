//! Sorted runs: immutable, key-sorted files of entries and range tombstones.
//!
//! ```text
//! ┌──────────────────────┐
//! │ header               │ counts, key bounds, section offsets
//! ├──────────────────────┤
//! │ entry section        │ key ASC, sequence DESC
//! ├──────────────────────┤
//! │ tombstone section    │ start ASC, sequence DESC
//! ├──────────────────────┤
//! │ [bloom filter]       │ one line of '0'/'1'
//! ├──────────────────────┤
//! │ key index            │ newest version of each key → byte offset
//! └──────────────────────┘
//! ```

pub mod builder;
pub mod header;
pub mod reader;
pub mod record;

pub use builder::SSTableBuilder;
pub use reader::{SSTable, SSTableIterator, TombstoneIter};

use crate::types::{Key, RunId, SeqNum};

/// Summary of a written or opened run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMeta {
    pub id: RunId,
    pub min_key: Key,
    pub max_key: Key,
    /// Entries plus range tombstones. This is the run's logical size.
    pub record_count: u64,
    pub tombstone_count: u64,
    pub sequence_start: SeqNum,
    pub file_size: u64,
}

impl RunMeta {
    /// Logical size charged against a level's budget.
    pub fn size(&self) -> u64 {
        self.record_count
    }

    /// Whether `[min_key, max_key]` intersects the other run's bounds.
    pub fn overlaps(&self, min_key: Key, max_key: Key) -> bool {
        self.min_key <= max_key && min_key <= self.max_key
    }
}

/// A part of a run that is read from disk on first use.
#[derive(Debug)]
pub enum Section<T> {
    Unloaded,
    Loaded(T),
}

impl<T> Section<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Section::Loaded(value) => Some(value),
            Section::Unloaded => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Section::Loaded(_))
    }
}

impl<T> Default for Section<T> {
    fn default() -> Self {
        Section::Unloaded
    }
}

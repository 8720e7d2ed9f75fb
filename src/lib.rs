//! # LSM-Tree Storage Engine
//!
//! An embedded key-value engine over integer keys using the Log-Structured
//! Merge-Tree design.
//!
//! ## Core idea
//! Instead of updating data in place (B-Tree), buffer writes in memory,
//! flush them as sorted runs, and merge those runs level by level.
//! Deletes are markers that travel with the data: point tombstones for one
//! key, range tombstones for `[start, end)`. Every write carries a sequence
//! number and the highest sequence that applies to a key decides what a
//! reader sees.
//!
//! ```no_run
//! use lsm_engine::{DB, Options, Value};
//!
//! # fn main() -> lsm_engine::Result<()> {
//! let mut db = DB::open("/tmp/lsm-demo", Options::default())?;
//! db.put(7, vec![1, 2, 3])?;
//! db.delete_range(0, 5)?;
//! assert_eq!(db.get(7)?, Value::Visible(vec![1, 2, 3]));
//! # Ok(())
//! # }
//! ```

pub mod bloom;
pub mod cache;
pub mod compaction;
pub mod db;
pub mod error;
pub mod fragment;
pub mod iterator;
pub mod manifest;
pub mod memtable;
pub mod sstable;
pub mod types;

// Public re-exports for the top-level API
pub use db::{DB, LevelStats, Options, OptionsBuilder, Stats};
pub use error::{Error, Result};
pub use types::{Entry, Key, RangeTombstone, SeqNum, Value};

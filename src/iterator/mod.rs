pub mod merge;

pub use merge::{MergeIterator, TombstonePolicy};

use crate::error::Result;
use crate::types::{Entry, Key};

/// The central iteration abstraction for the storage engine.
///
/// Every sorted data source (skip list, sorted run, merged view) implements
/// this trait. Sources yield entries in (key ASC, sequence DESC) order.
/// MergeIterator takes `Vec<Box<dyn StorageIterator>>` and merges them.
pub trait StorageIterator {
    /// The entry the iterator is positioned at, or None once exhausted.
    fn entry(&self) -> Option<&Entry>;

    /// Returns true if the iterator is positioned at a valid entry.
    fn is_valid(&self) -> bool {
        self.entry().is_some()
    }

    /// Advances to the next entry. Returns error on IO failure.
    fn next(&mut self) -> Result<()>;

    /// Positions the iterator at the first entry with key >= target.
    fn seek(&mut self, key: Key) -> Result<()>;

    /// Restart from the first entry.
    fn rewind(&mut self) -> Result<()> {
        self.seek(Key::MIN)
    }
}

/// Boxed source handed to [`MergeIterator`].
pub type BoxedIterator<'a> = Box<dyn StorageIterator + 'a>;

/// Drain an iterator from its current position into a vector.
pub fn collect_entries(iter: &mut dyn StorageIterator) -> Result<Vec<Entry>> {
    let mut out = Vec::new();
    while let Some(entry) = iter.entry() {
        out.push(entry.clone());
        iter.next()?;
    }
    Ok(out)
}

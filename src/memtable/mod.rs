pub mod skiplist;

use std::path::Path;

use skiplist::{Entries, SkipList, SkipListIterator};
use tracing::debug;

use crate::error::{Error, Result};
use crate::fragment::Fragments;
use crate::sstable::{RunMeta, SSTableBuilder};
use crate::types::{Entry, Key, RangeTombstone, RunId, SeqNum, Value};

/// In-memory sorted buffer for writes. Wraps a SkipList.
///
/// Every write goes here first. When the number of buffered operations
/// reaches the flush threshold, the memtable is written out as a level-0
/// sorted run and cleared.
///
/// Deletes are recorded, never applied: a point delete is a tombstone
/// entry in the skip list, a range delete is appended to
/// `range_tombstones`. Older versions may exist in runs on disk, so the
/// marker has to travel down with the data.
#[derive(Default)]
pub struct MemTable {
    data: SkipList,
    /// Append order. Sorted lazily before a flush.
    range_tombstones: Vec<RangeTombstone>,
    tombstones_sorted: bool,
    /// Operations applied since the last clear (not distinct keys).
    size: usize,
    /// Inclusive key bounds, tombstone ends included.
    bounds: Option<(Key, Key)>,
    /// First sequence since the last clear. Not handed to the run builder:
    /// a run's header takes the lowest sequence among the records it
    /// actually writes, which is this value unless an older version was
    /// shadowed in the skip list.
    sequence_start: Option<SeqNum>,
}

impl MemTable {
    pub fn new() -> Self {
        MemTable {
            tombstones_sorted: true,
            ..Default::default()
        }
    }

    /// Insert or update a key.
    pub fn put(&mut self, key: Key, value: Vec<i32>, sequence: SeqNum) {
        self.record(key, key, sequence);
        self.data.insert(Entry::put(key, value, sequence));
    }

    /// Mark a key as deleted by writing a tombstone entry.
    pub fn delete(&mut self, key: Key, sequence: SeqNum) {
        self.record(key, key, sequence);
        self.data.insert(Entry::tombstone(key, sequence));
    }

    /// Delete every key in `[start, end)` written before `sequence`.
    pub fn delete_range(&mut self, start: Key, end: Key, sequence: SeqNum) -> Result<()> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        self.record(start, end, sequence);
        self.range_tombstones
            .push(RangeTombstone::new(start, end, sequence));
        self.tombstones_sorted = false;
        Ok(())
    }

    fn record(&mut self, lo: Key, hi: Key, sequence: SeqNum) {
        self.size += 1;
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(lo), max.max(hi)),
            None => (lo, hi),
        });
        self.sequence_start.get_or_insert(sequence);
    }

    /// Look up a key.
    ///
    /// `None` means the memtable knows nothing about the key and the read
    /// must go on to the runs. `Some(Hidden)` means it is deleted here.
    pub fn get(&self, key: Key) -> Option<Value> {
        let (min, max) = self.bounds?;
        if key < min || key > max {
            return None;
        }

        // A handful of tombstones at most; no need to fragment them.
        let covering = self
            .range_tombstones
            .iter()
            .filter(|t| t.contains(key))
            .map(|t| t.sequence)
            .max();

        match (self.data.get(key), covering) {
            (Some(entry), Some(seq)) if seq > entry.sequence => Some(Value::Hidden),
            (Some(entry), _) => Some(entry.to_value()),
            (None, Some(_)) => Some(Value::Hidden),
            (None, None) => None,
        }
    }

    /// Seekable cursor over all entries, tombstones included.
    pub fn iter(&self) -> SkipListIterator<'_> {
        self.data.iter()
    }

    /// Plain iterator over all entries in key order.
    pub fn entries(&self) -> Entries<'_> {
        self.data.entries()
    }

    /// Range tombstones, in storage order once [`sort_tombstones`] has run.
    ///
    /// [`sort_tombstones`]: MemTable::sort_tombstones
    pub fn tombstones(&self) -> &[RangeTombstone] {
        &self.range_tombstones
    }

    /// Sort tombstones into storage order (start ASC, sequence DESC) if a
    /// range delete arrived since the last sort.
    pub fn sort_tombstones(&mut self) {
        if !self.tombstones_sorted {
            self.range_tombstones.sort_by(|a, b| a.storage_order(b));
            self.tombstones_sorted = true;
        }
    }

    /// Coverage fragments of the buffered range tombstones.
    pub fn fragments(&self) -> Fragments {
        Fragments::build(&self.range_tombstones)
    }

    /// Write the memtable out as a sorted run at `path`.
    ///
    /// The memtable is left untouched; the caller clears it once the new
    /// run is registered.
    pub fn flush(&mut self, path: &Path, id: RunId, bloom_bits_per_key: Option<usize>) -> Result<RunMeta> {
        self.sort_tombstones();
        let mut builder = SSTableBuilder::new(path, id, bloom_bits_per_key);
        for entry in self.data.entries() {
            builder.add(entry)?;
        }
        for tombstone in &self.range_tombstones {
            builder.add_tombstone(*tombstone);
        }
        let meta = builder.finish()?;
        debug!(run_id = id, ops = self.size, records = meta.record_count, "memtable written");
        Ok(meta)
    }

    /// Reset to empty.
    pub fn clear(&mut self) {
        self.data.clear();
        self.range_tombstones.clear();
        self.tombstones_sorted = true;
        self.size = 0;
        self.bounds = None;
        self.sequence_start = None;
    }

    /// Operations applied since the last clear.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Distinct keys held in the skip list.
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn min_key(&self) -> Option<Key> {
        self.bounds.map(|(min, _)| min)
    }

    pub fn max_key(&self) -> Option<Key> {
        self.bounds.map(|(_, max)| max)
    }

    /// Sequence of the first operation since the last clear.
    pub fn sequence_start(&self) -> Option<SeqNum> {
        self.sequence_start
    }
}

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::fragment::Fragments;
use crate::iterator::{BoxedIterator, StorageIterator};
use crate::types::{Entry, InternalKey, Key};

/// What to do with a winning point tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TombstonePolicy {
    /// Yield it. Compaction into a non-bottom level must keep deletions
    /// around to shadow older levels.
    Keep,
    /// Skip it. Scans, and garbage collection at the bottom level.
    Drop,
}

/// Heap slot: the current position of one source.
///
/// Ordered by internal key, then by source index so that ties break the
/// same way on every run.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct HeapItem {
    ikey: InternalKey,
    source: usize,
}

/// Merges multiple sorted iterators into a single sorted stream.
///
/// Used for:
/// - Range scans across memtable + all sorted runs
/// - Compaction (merging runs)
///
/// For every key only one entry comes out: the version with the highest
/// sequence among all sources. Winners covered by a newer range tombstone
/// (per `fragments`) are suppressed; point tombstones follow the
/// [`TombstonePolicy`].
///
/// This is the same algorithm as external merge sort, with a min-heap keyed
/// by (key, -sequence).
pub struct MergeIterator<'a> {
    sources: Vec<BoxedIterator<'a>>,
    heap: BinaryHeap<Reverse<HeapItem>>,
    fragments: Fragments,
    policy: TombstonePolicy,
    current: Option<Entry>,
}

impl<'a> MergeIterator<'a> {
    /// Create a MergeIterator positioned at the first surviving entry.
    ///
    /// `fragments` must be built from the tombstones of all `sources`.
    pub fn new(
        sources: Vec<BoxedIterator<'a>>,
        fragments: Fragments,
        policy: TombstonePolicy,
    ) -> Result<Self> {
        let mut iter = MergeIterator {
            sources,
            heap: BinaryHeap::new(),
            fragments,
            policy,
            current: None,
        };
        iter.rebuild_heap();
        iter.advance()?;
        Ok(iter)
    }

    pub fn fragments(&self) -> &Fragments {
        &self.fragments
    }

    fn rebuild_heap(&mut self) {
        self.heap.clear();
        for (source, iter) in self.sources.iter().enumerate() {
            if let Some(entry) = iter.entry() {
                self.heap.push(Reverse(HeapItem {
                    ikey: entry.internal_key(),
                    source,
                }));
            }
        }
    }

    /// Step a source and put it back on the heap if it has more.
    fn step(&mut self, source: usize) -> Result<()> {
        let iter = &mut self.sources[source];
        iter.next()?;
        if let Some(entry) = iter.entry() {
            self.heap.push(Reverse(HeapItem {
                ikey: entry.internal_key(),
                source,
            }));
        }
        Ok(())
    }

    /// Pop every version of the smallest key and keep the newest.
    fn pop_key(&mut self) -> Result<Option<Entry>> {
        let Some(Reverse(top)) = self.heap.pop() else {
            return Ok(None);
        };
        let key = top.ikey.key;
        let mut winner = self.sources[top.source].entry().cloned();
        self.step(top.source)?;

        while let Some(Reverse(peek)) = self.heap.peek() {
            if peek.ikey.key != key {
                break;
            }
            let source = peek.source;
            self.heap.pop();
            if let Some(candidate) = self.sources[source].entry() {
                let newer = winner
                    .as_ref()
                    .is_none_or(|w| candidate.sequence > w.sequence);
                if newer {
                    winner = Some(candidate.clone());
                }
            }
            self.step(source)?;
        }
        Ok(winner)
    }

    /// Move `current` to the next surviving entry.
    fn advance(&mut self) -> Result<()> {
        loop {
            let Some(entry) = self.pop_key()? else {
                self.current = None;
                return Ok(());
            };
            if self.fragments.covers(entry.key, Some(entry.sequence)) {
                continue;
            }
            if entry.is_tombstone() && self.policy == TombstonePolicy::Drop {
                continue;
            }
            self.current = Some(entry);
            return Ok(());
        }
    }
}

impl StorageIterator for MergeIterator<'_> {
    fn entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<()> {
        self.advance()
    }

    fn seek(&mut self, key: Key) -> Result<()> {
        for iter in self.sources.iter_mut() {
            iter.seek(key)?;
        }
        self.rebuild_heap();
        self.advance()
    }
}

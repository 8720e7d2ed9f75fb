use std::collections::BTreeMap;

use crate::types::{Entry, Fragment, Key, RangeTombstone, SeqNum};

/// The canonical, binary-searchable form of a set of range tombstones.
///
/// Overlapping tombstones are cut at every boundary into disjoint pieces;
/// each piece remembers the highest sequence of the tombstones covering it.
///
/// ```text
/// tombstones:   [15 ─────────── 35)@7
///                         [25 ─────────── 45)@8
/// fragments:    [15 ── 25)@7 [25 ─────────── 45)@8
/// ```
///
/// Adjacent pieces with the same sequence are coalesced, so every fragment is
/// a maximal run of constant coverage. Uncovered gaps produce no fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragments {
    fragments: Vec<Fragment>,
}

impl Fragments {
    /// Build fragments from tombstones given in any order.
    ///
    /// Sweep over the sorted boundaries keeping a multiset of the sequences
    /// of tombstones active at the current boundary.
    pub fn build<'a, I>(tombstones: I) -> Self
    where
        I: IntoIterator<Item = &'a RangeTombstone>,
    {
        let mut starts: BTreeMap<Key, Vec<SeqNum>> = BTreeMap::new();
        let mut ends: BTreeMap<Key, Vec<SeqNum>> = BTreeMap::new();
        for t in tombstones {
            if t.start >= t.end {
                continue;
            }
            starts.entry(t.start).or_default().push(t.sequence);
            ends.entry(t.end).or_default().push(t.sequence);
        }

        let mut bounds: Vec<Key> = starts.keys().chain(ends.keys()).copied().collect();
        bounds.sort_unstable();
        bounds.dedup();

        let mut active: BTreeMap<SeqNum, usize> = BTreeMap::new();
        let mut fragments: Vec<Fragment> = Vec::new();

        for pair in bounds.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            for seq in ends.get(&a).into_iter().flatten() {
                if let Some(count) = active.get_mut(seq) {
                    *count -= 1;
                    if *count == 0 {
                        active.remove(seq);
                    }
                }
            }
            for seq in starts.get(&a).into_iter().flatten() {
                *active.entry(*seq).or_insert(0) += 1;
            }

            let max_sequence = match active.last_key_value() {
                Some((seq, _)) => *seq,
                None => continue,
            };
            if max_sequence == 0 {
                continue;
            }
            match fragments.last_mut() {
                Some(last) if last.end == a && last.max_sequence == max_sequence => last.end = b,
                _ => fragments.push(Fragment {
                    start: a,
                    end: b,
                    max_sequence,
                }),
            }
        }

        Fragments { fragments }
    }

    /// Highest sequence of any tombstone covering `key`.
    pub fn covering_sequence(&self, key: Key) -> Option<SeqNum> {
        let idx = self.fragments.partition_point(|f| f.end <= key);
        match self.fragments.get(idx) {
            Some(f) if f.start <= key => Some(f.max_sequence),
            _ => None,
        }
    }

    /// Whether a version of `key` written at `sequence` is deleted by a range
    /// tombstone. With no version at all (`None`) any coverage counts.
    pub fn covers(&self, key: Key, sequence: Option<SeqNum>) -> bool {
        match (self.covering_sequence(key), sequence) {
            (Some(max), Some(seq)) => max > seq,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// The visibility rule: a candidate is deleted when it is a point
    /// tombstone or a newer range tombstone covers it.
    pub fn is_deleted(&self, key: Key, candidate: Option<&Entry>) -> bool {
        match candidate {
            Some(entry) => entry.is_tombstone() || self.covers(key, Some(entry.sequence)),
            None => self.covers(key, None),
        }
    }

    pub fn as_slice(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

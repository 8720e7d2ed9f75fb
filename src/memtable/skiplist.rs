use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};
use crate::iterator::StorageIterator;
use crate::types::{Entry, Key};

/// Maximum height of the skip list. LevelDB uses 12.
pub const MAX_HEIGHT: usize = 12;

/// Probability of promoting a node one more level (LevelDB uses 1/4).
const BRANCHING: u32 = 4;

/// A single node in the skip list arena.
///
/// Each node has `height` forward links. Level 0 contains all nodes
/// (a regular linked list). Higher levels skip over nodes, enabling
/// O(log n) average-case search.
///
/// ```text
/// Level 3:  HEAD ──────────────────────────────► 50 ──────────► NIL
/// Level 2:  HEAD ──────────► 20 ────────────────► 50 ──────────► NIL
/// Level 1:  HEAD ──► 10 ──► 20 ────► 35 ────────► 50 ──► 60 ──► NIL
/// Level 0:  HEAD ──► 10 ──► 20 ──► 25 ──► 35 ──► 50 ──► 60 ──► 70 ► NIL
/// ```
///
/// Links are indices into `SkipList::nodes`; removed slots go on a free list
/// and are reused by later inserts.
struct SkipNode {
    entry: Entry,
    forward: Vec<Option<usize>>,
}

/// A probabilistic ordered map from key to the newest known entry.
///
/// Average case: O(log n) insert, O(log n) lookup, O(n) iteration.
/// Index-based access walks level 0 and is O(n).
pub struct SkipList {
    nodes: Vec<SkipNode>,
    free: Vec<usize>,
    /// Forward links of the head sentinel, one per level.
    head: [Option<usize>; MAX_HEIGHT],
    /// Number of levels currently in use (at least 1).
    height: usize,
    len: usize,
    rng: StdRng,
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

impl SkipList {
    /// Create a new empty skip list.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a skip list whose tower heights are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        SkipList {
            nodes: Vec::new(),
            free: Vec::new(),
            head: [None; MAX_HEIGHT],
            height: 1,
            len: 0,
            rng,
        }
    }

    fn link(&self, from: Option<usize>, level: usize) -> Option<usize> {
        match from {
            None => self.head[level],
            Some(idx) => self.nodes[idx].forward[level],
        }
    }

    fn set_link(&mut self, from: Option<usize>, level: usize, to: Option<usize>) {
        match from {
            None => self.head[level] = to,
            Some(idx) => self.nodes[idx].forward[level] = to,
        }
    }

    /// Predecessor at every level of the first node with key >= `key`.
    /// `None` stands for the head sentinel.
    fn find_predecessors(&self, key: Key) -> [Option<usize>; MAX_HEIGHT] {
        let mut update = [None; MAX_HEIGHT];
        let mut cur: Option<usize> = None;
        for level in (0..self.height).rev() {
            while let Some(next) = self.link(cur, level) {
                if self.nodes[next].entry.key < key {
                    cur = Some(next);
                } else {
                    break;
                }
            }
            update[level] = cur;
        }
        update
    }

    /// First node with key >= `key`.
    fn lower_bound(&self, key: Key) -> Option<usize> {
        let update = self.find_predecessors(key);
        self.link(update[0], 0)
    }

    /// Insert an entry under its key.
    ///
    /// If the key is already present, the entry with the greater sequence
    /// wins; the older one is discarded. Returns true if the key was new.
    pub fn insert(&mut self, entry: Entry) -> bool {
        let update = self.find_predecessors(entry.key);

        if let Some(existing) = self.link(update[0], 0) {
            if self.nodes[existing].entry.key == entry.key {
                if entry.sequence > self.nodes[existing].entry.sequence {
                    self.nodes[existing].entry = entry;
                }
                return false;
            }
        }

        let height = self.random_height();
        if height > self.height {
            // update[] already holds None (head) for the new levels
            self.height = height;
        }

        let forward: Vec<Option<usize>> = (0..height).map(|l| self.link(update[l], l)).collect();
        let node = SkipNode { entry, forward };
        let idx = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        for (level, pred) in update.iter().enumerate().take(height) {
            self.set_link(*pred, level, Some(idx));
        }

        self.len += 1;
        true
    }

    /// Look up a key.
    pub fn get(&self, key: Key) -> Option<&Entry> {
        let idx = self.lower_bound(key)?;
        let entry = &self.nodes[idx].entry;
        (entry.key == key).then_some(entry)
    }

    pub fn contains(&self, key: Key) -> bool {
        self.get(key).is_some()
    }

    /// The `index`-th entry in key order.
    pub fn get_index(&self, index: usize) -> Result<&Entry> {
        let idx = self.node_at(index)?;
        Ok(&self.nodes[idx].entry)
    }

    fn node_at(&self, index: usize) -> Result<usize> {
        if index >= self.len {
            return Err(Error::OutOfRange {
                index,
                len: self.len,
            });
        }
        let mut cur = self.head[0];
        for _ in 0..index {
            cur = cur.and_then(|i| self.nodes[i].forward[0]);
        }
        cur.ok_or(Error::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Remove a key. Returns the removed entry, if any.
    pub fn remove(&mut self, key: Key) -> Option<Entry> {
        let update = self.find_predecessors(key);
        let target = self.link(update[0], 0)?;
        if self.nodes[target].entry.key != key {
            return None;
        }

        let height = self.nodes[target].forward.len();
        for (level, pred) in update.iter().enumerate().take(height) {
            if self.link(*pred, level) == Some(target) {
                let next = self.nodes[target].forward[level];
                self.set_link(*pred, level, next);
            }
        }
        while self.height > 1 && self.head[self.height - 1].is_none() {
            self.height -= 1;
        }

        self.free.push(target);
        self.len -= 1;
        let node = &mut self.nodes[target];
        node.forward.clear();
        Some(std::mem::replace(&mut node.entry, Entry::tombstone(key, 0)))
    }

    /// Remove the `index`-th entry in key order.
    pub fn remove_index(&mut self, index: usize) -> Result<Entry> {
        let key = self.get_index(index)?.key;
        self.remove(key).ok_or(Error::OutOfRange {
            index,
            len: self.len,
        })
    }

    /// Number of entries in the skip list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop every entry, keeping the allocation.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = [None; MAX_HEIGHT];
        self.height = 1;
        self.len = 0;
    }

    /// Create a seekable cursor over all entries in sorted order.
    pub fn iter(&self) -> SkipListIterator<'_> {
        SkipListIterator {
            list: self,
            current: self.head[0],
        }
    }

    /// Plain iterator over all entries in sorted order.
    pub fn entries(&self) -> Entries<'_> {
        Entries {
            list: self,
            current: self.head[0],
        }
    }

    /// Generate a random level for a new node.
    /// Each extra level has a 1/4 probability.
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < MAX_HEIGHT && self.rng.gen_ratio(1, BRANCHING) {
            height += 1;
        }
        height
    }
}

/// Cursor over skip list entries in sorted order.
///
/// Follows level 0 links; level 0 is a sorted linked list holding every
/// entry. `seek` uses the upper levels.
pub struct SkipListIterator<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

/// Borrowing iterator returned by [`SkipList::entries`].
pub struct Entries<'a> {
    list: &'a SkipList,
    current: Option<usize>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = &'a Entry;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.current?;
        let node = &self.list.nodes[idx];
        self.current = node.forward[0];
        Some(&node.entry)
    }
}

impl StorageIterator for SkipListIterator<'_> {
    fn entry(&self) -> Option<&Entry> {
        self.current.map(|idx| &self.list.nodes[idx].entry)
    }

    fn next(&mut self) -> Result<()> {
        if let Some(idx) = self.current {
            self.current = self.list.nodes[idx].forward[0];
        }
        Ok(())
    }

    fn seek(&mut self, key: Key) -> Result<()> {
        self.current = self.list.lower_bound(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: Key, seq: u64) -> Entry {
        Entry::put(key, vec![key, seq as i32], seq)
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut sl = SkipList::with_seed(7);
        for k in 0..10 {
            sl.insert(put(k, k as u64 + 1));
        }
        sl.remove(3);
        sl.remove(4);
        let arena = sl.nodes.len();
        sl.insert(put(100, 50));
        sl.insert(put(101, 51));
        assert_eq!(sl.nodes.len(), arena);
        assert_eq!(sl.len(), 10);
    }

    #[test]
    fn height_shrinks_after_removing_everything() {
        let mut sl = SkipList::with_seed(1);
        for k in 0..500 {
            sl.insert(put(k, 1));
        }
        assert!(sl.height > 1);
        for k in 0..500 {
            assert!(sl.remove(k).is_some());
        }
        assert_eq!(sl.height, 1);
        assert!(sl.is_empty());
    }
}

// Skip List Iterator tests
// Tests for iterating over skip list entries in sorted order.

use lsm_engine::iterator::{StorageIterator, collect_entries};
use lsm_engine::memtable::skiplist::SkipList;
use lsm_engine::types::Entry;

fn keys(iter: &mut dyn StorageIterator) -> Vec<i32> {
    collect_entries(iter).unwrap().into_iter().map(|e| e.key).collect()
}

// =============================================================================
// Test 1: Empty iterator
// =============================================================================
// An iterator over an empty skip list should immediately be invalid.
#[test]
fn iterator_empty_skiplist_is_invalid() {
    let sl = SkipList::new();
    let iter = sl.iter();
    assert!(!iter.is_valid());
    assert!(iter.entry().is_none());
}

// =============================================================================
// Test 2: Single entry iteration
// =============================================================================
#[test]
fn iterator_single_entry() {
    let mut sl = SkipList::new();
    sl.insert(Entry::put(1, vec![9], 1));

    let mut iter = sl.iter();
    assert!(iter.is_valid());
    assert_eq!(iter.entry().unwrap().value, vec![9]);

    // Move to next: no more entries
    iter.next().unwrap();
    assert!(!iter.is_valid());

    // next() past the end stays invalid
    iter.next().unwrap();
    assert!(!iter.is_valid());
}

// =============================================================================
// Test 3: Entries come out sorted
// =============================================================================
#[test]
fn iterator_returns_sorted_order() {
    let mut sl = SkipList::new();
    for (seq, key) in [30, -4, 12, 0, 7].into_iter().enumerate() {
        sl.insert(Entry::put(key, vec![], seq as u64 + 1));
    }
    assert_eq!(keys(&mut sl.iter()), vec![-4, 0, 7, 12, 30]);
}

// =============================================================================
// Test 4: Seek
// =============================================================================
// seek(k) lands on the first key >= k.
#[test]
fn iterator_seek_lands_on_lower_bound() {
    let mut sl = SkipList::new();
    for key in (0..100).step_by(10) {
        sl.insert(Entry::put(key, vec![], 1));
    }

    let mut iter = sl.iter();
    iter.seek(35).unwrap();
    assert_eq!(iter.entry().unwrap().key, 40);

    iter.seek(40).unwrap();
    assert_eq!(iter.entry().unwrap().key, 40);

    iter.seek(91).unwrap();
    assert!(!iter.is_valid());

    iter.rewind().unwrap();
    assert_eq!(iter.entry().unwrap().key, 0);
}

// =============================================================================
// Test 5: Tombstones are iterated too
// =============================================================================
#[test]
fn iterator_includes_tombstones() {
    let mut sl = SkipList::new();
    sl.insert(Entry::put(1, vec![1], 1));
    sl.insert(Entry::tombstone(2, 2));

    let entries = collect_entries(&mut sl.iter()).unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries[1].is_tombstone());
}

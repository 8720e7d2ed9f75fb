use std::cmp::Ordering;

/// User key. The engine stores integer keys.
pub type Key = i32;

/// Global write counter. Every put / delete / range delete gets the next one.
pub type SeqNum = u64;

/// Identifier of a sorted run file. Allocated monotonically by the manifest.
pub type RunId = u64;

/// The result of a read: either the stored integers or "not visible".
///
/// `Hidden` is returned both for deleted keys and for keys that were never
/// written. Internally, lookups return `Option<Value>` so a source can say
/// "I don't know this key" (`None`) apart from "this key is deleted here"
/// (`Some(Value::Hidden)`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Value {
    Visible(Vec<i32>),
    #[default]
    Hidden,
}

impl Value {
    pub fn is_visible(&self) -> bool {
        matches!(self, Value::Visible(_))
    }

    /// The stored integers, or an empty slice when hidden.
    pub fn items(&self) -> &[i32] {
        match self {
            Value::Visible(items) => items,
            Value::Hidden => &[],
        }
    }
}

impl From<Vec<i32>> for Value {
    fn from(items: Vec<i32>) -> Self {
        Value::Visible(items)
    }
}

/// Distinguishes puts from deletes in the storage engine.
/// A Delete writes a tombstone: the key isn't removed, it's marked as deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A normal put operation.
    Put = 0,
    /// A delete (tombstone marker).
    Delete = 1,
}

/// Ordering key of an entry: (key ASC, sequence DESC).
///
/// This ensures the newest version of a key always comes first during merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalKey {
    pub key: Key,
    pub sequence: SeqNum,
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One version of one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Key,
    pub sequence: SeqNum,
    pub value_type: ValueType,
    /// Payload. Always empty for tombstones.
    pub value: Vec<i32>,
}

impl Entry {
    pub fn put(key: Key, value: Vec<i32>, sequence: SeqNum) -> Self {
        Entry {
            key,
            sequence,
            value_type: ValueType::Put,
            value,
        }
    }

    pub fn tombstone(key: Key, sequence: SeqNum) -> Self {
        Entry {
            key,
            sequence,
            value_type: ValueType::Delete,
            value: Vec::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.value_type == ValueType::Delete
    }

    pub fn internal_key(&self) -> InternalKey {
        InternalKey {
            key: self.key,
            sequence: self.sequence,
        }
    }

    /// What a reader sees for this entry, ignoring range tombstones.
    pub fn to_value(&self) -> Value {
        match self.value_type {
            ValueType::Put => Value::Visible(self.value.clone()),
            ValueType::Delete => Value::Hidden,
        }
    }
}

/// Deletes every key in `[start, end)` written before `sequence`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeTombstone {
    pub start: Key,
    pub end: Key,
    pub sequence: SeqNum,
}

impl RangeTombstone {
    pub fn new(start: Key, end: Key, sequence: SeqNum) -> Self {
        RangeTombstone {
            start,
            end,
            sequence,
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        self.start <= key && key < self.end
    }

    /// Storage order: start ASC, sequence DESC.
    pub fn storage_order(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// A disjoint slice `[start, end)` of range-tombstone coverage, annotated
/// with the highest sequence of any tombstone covering all of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub start: Key,
    pub end: Key,
    pub max_sequence: SeqNum,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_key_orders_newest_first_within_key() {
        let mut keys = vec![
            InternalKey { key: 2, sequence: 1 },
            InternalKey { key: 1, sequence: 3 },
            InternalKey { key: 1, sequence: 9 },
        ];
        keys.sort();
        assert_eq!(keys[0], InternalKey { key: 1, sequence: 9 });
        assert_eq!(keys[1], InternalKey { key: 1, sequence: 3 });
        assert_eq!(keys[2], InternalKey { key: 2, sequence: 1 });
    }

    #[test]
    fn tombstone_entry_reads_hidden() {
        assert_eq!(Entry::tombstone(4, 2).to_value(), Value::Hidden);
        assert_eq!(Entry::put(4, vec![1], 2).to_value(), Value::Visible(vec![1]));
    }

    #[test]
    fn range_tombstone_is_half_open() {
        let t = RangeTombstone::new(4, 6, 1);
        assert!(t.contains(4));
        assert!(t.contains(5));
        assert!(!t.contains(6));
        assert!(!t.contains(3));
    }
}

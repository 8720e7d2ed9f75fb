use crate::bloom::BloomFilter;
use crate::types::Key;

/// Convenience builder for constructing a bloom filter during run creation.
///
/// Usage while writing a sorted run:
/// 1. Create BloomFilterBuilder with the configured bits per key
/// 2. Call add_key() for every distinct key written to the run
/// 3. Call build() to get the final BloomFilter for serialization
///
/// Keys are buffered because the final size depends on the distinct-key
/// count, which is only known once the run is complete.
pub struct BloomFilterBuilder {
    keys: Vec<Key>,
    bits_per_key: usize,
}

impl BloomFilterBuilder {
    pub fn new(bits_per_key: usize) -> Self {
        BloomFilterBuilder {
            keys: Vec::new(),
            bits_per_key,
        }
    }

    /// Add a key to the bloom filter being built.
    pub fn add_key(&mut self, key: Key) {
        self.keys.push(key);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Finalize and return the bloom filter. None if no key was added.
    pub fn build(self) -> Option<BloomFilter> {
        if self.keys.is_empty() {
            return None;
        }
        let mut filter = BloomFilter::new(self.keys.len(), self.bits_per_key);
        for key in self.keys {
            filter.insert(key);
        }
        Some(filter)
    }
}

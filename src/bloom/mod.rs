pub mod builder;

use xxhash_rust::xxh3::xxh3_128;

use crate::error::{Error, Result};
use crate::types::Key;

/// Lower bound on filter size so tiny runs still get a useful filter.
const MIN_BITS: usize = 64;

/// Upper bound on hash probes.
const MAX_HASHES: u32 = 30;

/// Probabilistic data structure: "is this key in the set?"
///
/// - If any bit is 0 → key is DEFINITELY NOT in the set
/// - If all bits are 1 → key is PROBABLY in the set (false positive possible)
///
/// Used in sorted-run reads to skip the key-index search for keys the run
/// definitely doesn't contain. A negative never decides visibility on its
/// own: range tombstones in the run may still cover the key.
///
/// Sizing is a fixed number of bits per distinct key:
///   num_bits = max(64, elements * bits_per_key)
///   num_hashes = ceil((num_bits / elements) * ln(2))
///
/// The hash count is derived from the persisted sizes alone, so a reader
/// needs only the element count and the bit string.
///
/// Hash trick: don't need k independent hash functions.
/// Use double hashing: h_i(key) = h1(key) + i * h2(key) (mod m)
/// where h1, h2 come from splitting a 128-bit hash into two 64-bit halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
    elements: usize,
}

impl BloomFilter {
    /// Create an empty filter sized for `elements` keys.
    pub fn new(elements: usize, bits_per_key: usize) -> Self {
        let num_bits = (elements.saturating_mul(bits_per_key)).max(MIN_BITS);
        Self::empty(num_bits, elements)
    }

    fn empty(num_bits: usize, elements: usize) -> Self {
        BloomFilter {
            bits: vec![0u64; num_bits.div_ceil(64)],
            num_bits,
            num_hashes: Self::hashes_for(num_bits, elements),
            elements,
        }
    }

    fn hashes_for(num_bits: usize, elements: usize) -> u32 {
        let bits_per_key = num_bits as f64 / elements.max(1) as f64;
        ((bits_per_key * std::f64::consts::LN_2).ceil() as u32).clamp(1, MAX_HASHES)
    }

    /// Add a key to the bloom filter.
    pub fn insert(&mut self, key: Key) {
        let (h1, h2) = Self::hash_key(key);
        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            self.bits[pos / 64] |= 1 << (pos % 64);
        }
    }

    /// Check if a key MIGHT be in the set.
    /// false → definitely not here. true → probably here.
    pub fn may_contain(&self, key: Key) -> bool {
        let (h1, h2) = Self::hash_key(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            (self.bits[pos / 64] >> (pos % 64)) & 1 == 1
        })
    }

    /// Serialize the bit array as one line of '0' / '1' characters.
    pub fn encode(&self) -> String {
        (0..self.num_bits)
            .map(|pos| {
                if (self.bits[pos / 64] >> (pos % 64)) & 1 == 1 {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }

    /// Rebuild a filter from its bit line and the element count it was
    /// sized for.
    pub fn decode(line: &str, elements: usize) -> Result<Self> {
        let line = line.trim_end();
        if line.is_empty() {
            return Err(Error::malformed("bloom filter", line));
        }
        let mut filter = Self::empty(line.len(), elements);
        for (pos, c) in line.bytes().enumerate() {
            match c {
                b'0' => {}
                b'1' => filter.bits[pos / 64] |= 1 << (pos % 64),
                _ => return Err(Error::malformed("bloom filter", line)),
            }
        }
        Ok(filter)
    }

    /// Number of distinct keys the filter was sized for.
    pub fn elements(&self) -> usize {
        self.elements
    }

    /// Get the number of hash functions used.
    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    /// Get the total number of bits in the filter.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Hash a key and return two 64-bit hashes (h1, h2) for double hashing.
    fn hash_key(key: Key) -> (u64, u64) {
        let hash128 = xxh3_128(&key.to_le_bytes());
        (hash128 as u64, (hash128 >> 64) as u64)
    }

    /// h_i = (h1 + i * h2) mod num_bits
    fn position(&self, h1: u64, h2: u64, i: u32) -> usize {
        let pos = h1.wrapping_add((i as u64).wrapping_mul(h2)) % (self.num_bits as u64);
        pos as usize
    }
}

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::bloom::builder::BloomFilterBuilder;
use crate::error::{Error, Result};
use crate::sstable::RunMeta;
use crate::sstable::header::{BloomHandle, Header, IndexEntry};
use crate::sstable::record::{encode_entry, encode_tombstone};
use crate::types::{Entry, InternalKey, Key, RangeTombstone, RunId, SeqNum};

/// Builds a sorted run file from a sorted stream of entries plus a set of
/// range tombstones.
///
/// Used during:
/// - Memtable flush (sorted memtable → run)
/// - Compaction (merged iterators → new run)
///
/// Build process:
/// 1. Add entries one by one (must be in key ASC, sequence DESC order)
/// 2. Add range tombstones in any order
/// 3. finish() lays out the sections, writes the header once every offset
///    is known, fsyncs a temp file and renames it into place
///
/// The body is buffered in memory. Runs are bounded by the flush threshold
/// and level sizes, so this stays small.
pub struct SSTableBuilder {
    path: PathBuf,
    id: RunId,
    /// Entry section text, offsets relative to its first byte.
    entries: String,
    /// First (newest) occurrence of every key.
    index: Vec<IndexEntry>,
    tombstones: Vec<RangeTombstone>,
    bloom: Option<BloomFilterBuilder>,
    entry_count: u64,
    bounds: Option<(Key, Key)>,
    sequence_start: Option<SeqNum>,
    last: Option<InternalKey>,
}

impl SSTableBuilder {
    /// Create a builder for the run at `path`. Nothing touches the disk
    /// until [`finish`](Self::finish).
    pub fn new(path: &Path, id: RunId, bloom_bits_per_key: Option<usize>) -> Self {
        SSTableBuilder {
            path: path.to_path_buf(),
            id,
            entries: String::new(),
            index: Vec::new(),
            tombstones: Vec::new(),
            bloom: bloom_bits_per_key.map(BloomFilterBuilder::new),
            entry_count: 0,
            bounds: None,
            sequence_start: None,
            last: None,
        }
    }

    /// Add an entry. MUST be called in (key ASC, sequence DESC) order.
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        let ikey = entry.internal_key();
        if let Some(last) = self.last {
            if ikey <= last {
                return Err(Error::Corruption(format!(
                    "entry {}@{} added after {}@{}",
                    ikey.key, ikey.sequence, last.key, last.sequence
                )));
            }
        }

        if self.last.is_none_or(|last| last.key != entry.key) {
            self.index.push(IndexEntry {
                key: entry.key,
                offset: self.entries.len() as u64,
            });
            if let Some(bloom) = self.bloom.as_mut() {
                bloom.add_key(entry.key);
            }
        }
        encode_entry(entry, &mut self.entries);

        self.track(entry.key, entry.key, entry.sequence);
        self.entry_count += 1;
        self.last = Some(ikey);
        Ok(())
    }

    /// Add a range tombstone. Order does not matter.
    pub fn add_tombstone(&mut self, tombstone: RangeTombstone) {
        self.track(tombstone.start, tombstone.end, tombstone.sequence);
        self.tombstones.push(tombstone);
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0 && self.tombstones.is_empty()
    }

    /// Entries plus tombstones added so far.
    pub fn record_count(&self) -> u64 {
        self.entry_count + self.tombstones.len() as u64
    }

    fn track(&mut self, lo: Key, hi: Key, sequence: SeqNum) {
        self.bounds = Some(match self.bounds {
            Some((min, max)) => (min.min(lo), max.max(hi)),
            None => (lo, hi),
        });
        self.sequence_start = Some(self.sequence_start.map_or(sequence, |s| s.min(sequence)));
    }

    /// Finalize the run: lay out the sections, write the header, fsync and
    /// rename into place.
    pub fn finish(mut self) -> Result<RunMeta> {
        let Some((min_key, max_key)) = self.bounds else {
            return Err(Error::Corruption(format!("run {} has no records", self.id)));
        };
        self.tombstones.sort_by(|a, b| a.storage_order(b));

        let mut tomb_section = String::new();
        for tombstone in &self.tombstones {
            encode_tombstone(tombstone, &mut tomb_section);
        }
        let bloom = self.bloom.take().and_then(|b| b.build());
        let bloom_section = bloom.as_ref().map(|b| {
            let mut line = b.encode();
            line.push('\n');
            line
        });

        // The header length depends only on whether the bloom pair exists.
        let mut header = Header {
            record_count: self.record_count(),
            tombstone_count: self.tombstones.len() as u64,
            min_key,
            max_key,
            sequence_start: self.sequence_start.unwrap_or_default(),
            entry_offset: 0,
            tombstone_offset: 0,
            index_offset: 0,
            bloom: bloom.as_ref().map(|b| BloomHandle {
                elements: b.elements() as u64,
                offset: 0,
            }),
        };
        let header_len = header.encode()?.len() as u64;

        header.entry_offset = header_len;
        header.tombstone_offset = header.entry_offset + self.entries.len() as u64;
        let bloom_offset = header.tombstone_offset + tomb_section.len() as u64;
        if let Some(handle) = header.bloom.as_mut() {
            handle.offset = bloom_offset;
        }
        header.index_offset =
            bloom_offset + bloom_section.as_ref().map_or(0, |s| s.len()) as u64;

        let mut index_section = String::new();
        for entry in &self.index {
            IndexEntry {
                key: entry.key,
                offset: header.entry_offset + entry.offset,
            }
            .encode(&mut index_section);
        }

        let encoded_header = header.encode()?;
        let file_size = header.index_offset + index_section.len() as u64;

        let tmp_path = self.path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(encoded_header.as_bytes())?;
        writer.write_all(self.entries.as_bytes())?;
        writer.write_all(tomb_section.as_bytes())?;
        if let Some(section) = &bloom_section {
            writer.write_all(section.as_bytes())?;
        }
        writer.write_all(index_section.as_bytes())?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);
        fs::rename(&tmp_path, &self.path)?;

        trace!(run_id = self.id, records = header.record_count, file_size, "run written");

        Ok(RunMeta {
            id: self.id,
            min_key,
            max_key,
            record_count: header.record_count,
            tombstone_count: header.tombstone_count,
            sequence_start: header.sequence_start,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::header::Header;
    use std::io::{BufReader, Read};
    use tempfile::tempdir;

    #[test]
    fn build_run_from_sorted_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut builder = SSTableBuilder::new(&path, 1, Some(10));
        for i in 0..100 {
            builder.add(&Entry::put(i, vec![i * 2], i as u64 + 1)).unwrap();
        }
        let meta = builder.finish().unwrap();

        assert_eq!(meta.id, 1);
        assert_eq!(meta.record_count, 100);
        assert_eq!(meta.min_key, 0);
        assert_eq!(meta.max_key, 99);
        assert_eq!(meta.sequence_start, 1);
        assert_eq!(meta.file_size, std::fs::metadata(&path).unwrap().len());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn bounds_include_tombstones() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut builder = SSTableBuilder::new(&path, 42, None);
        builder.add(&Entry::put(10, vec![1], 5)).unwrap();
        builder.add_tombstone(RangeTombstone::new(-4, 30, 2));
        let meta = builder.finish().unwrap();

        assert_eq!(meta.min_key, -4);
        assert_eq!(meta.max_key, 30);
        assert_eq!(meta.record_count, 2);
        assert_eq!(meta.tombstone_count, 1);
        assert_eq!(meta.sequence_start, 2);
    }

    #[test]
    fn offsets_point_at_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut builder = SSTableBuilder::new(&path, 1, Some(10));
        builder.add(&Entry::put(1, vec![7, 8], 3)).unwrap();
        builder.add(&Entry::tombstone(2, 4)).unwrap();
        builder.add_tombstone(RangeTombstone::new(5, 9, 6));
        builder.finish().unwrap();

        let mut text = String::new();
        File::open(&path).unwrap().read_to_string(&mut text).unwrap();
        let (header, _) = Header::decode(&mut BufReader::new(text.as_bytes())).unwrap();

        let at = |offset: u64| text[offset as usize..].lines().next().unwrap().to_string();
        assert_eq!(at(header.entry_offset), "3 0 1 7 8");
        assert_eq!(at(header.tombstone_offset), "6 5 9");
        assert_eq!(at(header.index_offset), format!("1 {}", header.entry_offset));
        let bloom = header.bloom.unwrap();
        assert_eq!(bloom.elements, 2);
        assert!(at(bloom.offset).chars().all(|c| c == '0' || c == '1'));
    }

    #[test]
    fn only_newest_version_is_indexed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut builder = SSTableBuilder::new(&path, 1, None);
        builder.add(&Entry::put(1, vec![2], 9)).unwrap();
        builder.add(&Entry::put(1, vec![1], 4)).unwrap();
        builder.add(&Entry::put(3, vec![3], 5)).unwrap();
        builder.finish().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let (header, _) = Header::decode(&mut BufReader::new(text.as_bytes())).unwrap();
        assert!(header.bloom.is_none());
        let index: Vec<&str> = text[header.index_offset as usize..].lines().collect();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn rejects_unsorted_entries() {
        let dir = tempdir().unwrap();
        let mut builder = SSTableBuilder::new(&dir.path().join("t.sst"), 1, None);
        builder.add(&Entry::put(5, vec![], 1)).unwrap();
        assert!(builder.add(&Entry::put(4, vec![], 2)).is_err());
        assert!(builder.add(&Entry::put(5, vec![], 3)).is_err());
    }

    #[test]
    fn empty_run_is_an_error() {
        let dir = tempdir().unwrap();
        let builder = SSTableBuilder::new(&dir.path().join("t.sst"), 1, None);
        assert!(builder.finish().is_err());
    }
}

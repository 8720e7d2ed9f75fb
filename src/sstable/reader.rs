use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::trace;

use crate::bloom::BloomFilter;
use crate::error::{Error, Result};
use crate::fragment::Fragments;
use crate::iterator::StorageIterator;
use crate::sstable::header::{Header, IndexEntry};
use crate::sstable::record::{decode_entry, decode_tombstone};
use crate::sstable::{RunMeta, Section};
use crate::types::{Entry, Key, RangeTombstone, RunId, Value};

/// An opened sorted run. Supports point lookups and sequential iteration.
///
/// On open:
/// 1. Read the header → section offsets, optional bloom handle
/// 2. Read the bloom filter line, if any
/// 3. Read and parse the key index → Vec<IndexEntry>
/// 4. Ready for queries (entry lines read on demand)
///
/// Tombstones and the fragments built from them are loaded the first time
/// a lookup needs them, then cached for the life of the handle.
pub struct SSTable {
    path: PathBuf,
    meta: RunMeta,
    header: Header,
    index: Vec<IndexEntry>,
    bloom: Option<BloomFilter>,
    /// Handle for point lookups. Iterators open their own.
    file: RefCell<BufReader<File>>,
    tombstones: RefCell<Section<Rc<Vec<RangeTombstone>>>>,
    fragments: RefCell<Section<Rc<Fragments>>>,
}

impl SSTable {
    /// Open a run file written by [`SSTableBuilder`](super::SSTableBuilder).
    pub fn open(path: &Path, id: RunId) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        let mut reader = BufReader::new(file);

        let (header, _) = Header::decode(&mut reader)?;
        if header.index_offset > file_size {
            return Err(Error::Corruption(format!(
                "key index at {} past end of {}",
                header.index_offset,
                path.display()
            )));
        }

        let bloom = match header.bloom {
            Some(handle) => {
                reader.seek(SeekFrom::Start(handle.offset))?;
                let mut line = String::new();
                reader.read_line(&mut line)?;
                Some(BloomFilter::decode(&line, handle.elements as usize)?)
            }
            None => None,
        };

        reader.seek(SeekFrom::Start(header.index_offset))?;
        let mut index = Vec::new();
        for line in (&mut reader).lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            index.push(IndexEntry::decode(&line)?);
        }
        if index.windows(2).any(|w| w[0].key >= w[1].key) {
            return Err(Error::Corruption(format!(
                "key index of {} is not strictly sorted",
                path.display()
            )));
        }

        let meta = RunMeta {
            id,
            min_key: header.min_key,
            max_key: header.max_key,
            record_count: header.record_count,
            tombstone_count: header.tombstone_count,
            sequence_start: header.sequence_start,
            file_size,
        };

        Ok(SSTable {
            path: path.to_path_buf(),
            meta,
            header,
            index,
            bloom,
            file: RefCell::new(reader),
            tombstones: RefCell::new(Section::Unloaded),
            fragments: RefCell::new(Section::Unloaded),
        })
    }

    pub fn meta(&self) -> &RunMeta {
        &self.meta
    }

    pub fn id(&self) -> RunId {
        self.meta.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct keys (key index length).
    pub fn key_count(&self) -> usize {
        self.index.len()
    }

    pub fn has_bloom(&self) -> bool {
        self.bloom.is_some()
    }

    /// Point lookup.
    ///
    /// - `None`: the run says nothing about `key`
    /// - `Some(Hidden)`: deleted here, by a point or range tombstone
    /// - `Some(Visible(..))`: the newest version in this run
    pub fn get(&self, key: Key) -> Result<Option<Value>> {
        if key < self.meta.min_key || key > self.meta.max_key {
            return Ok(None);
        }

        let skip = self.bloom.as_ref().is_some_and(|b| !b.may_contain(key));
        let candidate = if skip { None } else { self.lookup(key)? };
        trace!(run_id = self.meta.id, key, bloom_skip = skip, found = candidate.is_some(), "run lookup");

        if self.header.tombstone_count == 0 {
            return Ok(candidate.map(|entry| entry.to_value()));
        }
        let fragments = self.fragments()?;
        match candidate {
            Some(entry) if fragments.is_deleted(key, Some(&entry)) => Ok(Some(Value::Hidden)),
            Some(entry) => Ok(Some(entry.to_value())),
            None if fragments.covers(key, None) => Ok(Some(Value::Hidden)),
            None => Ok(None),
        }
    }

    /// Binary search the key index and parse the one entry line it points at.
    fn lookup(&self, key: Key) -> Result<Option<Entry>> {
        let Ok(pos) = self.index.binary_search_by_key(&key, |e| e.key) else {
            return Ok(None);
        };
        let offset = self.index[pos].offset;

        let mut file = self.file.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        let mut line = String::new();
        file.read_line(&mut line)?;
        let entry = decode_entry(&line)?;
        if entry.key != key {
            return Err(Error::Corruption(format!(
                "index of run {} points key {} at a line for key {}",
                self.meta.id, key, entry.key
            )));
        }
        Ok(Some(entry))
    }

    /// All range tombstones of this run in storage order. Loaded on first use.
    pub fn tombstones(&self) -> Result<Rc<Vec<RangeTombstone>>> {
        if let Some(tombstones) = self.tombstones.borrow().loaded() {
            return Ok(Rc::clone(tombstones));
        }
        let loaded = Rc::new(self.tombstone_iter()?.collect::<Result<Vec<_>>>()?);
        *self.tombstones.borrow_mut() = Section::Loaded(Rc::clone(&loaded));
        Ok(loaded)
    }

    /// Coverage fragments of this run's tombstones. Built once, then cached.
    pub fn fragments(&self) -> Result<Rc<Fragments>> {
        if let Some(fragments) = self.fragments.borrow().loaded() {
            return Ok(Rc::clone(fragments));
        }
        let built = Rc::new(Fragments::build(self.tombstones()?.iter()));
        *self.fragments.borrow_mut() = Section::Loaded(Rc::clone(&built));
        Ok(built)
    }

    /// Whether the tombstone section has been read yet.
    pub fn tombstones_loaded(&self) -> bool {
        self.tombstones.borrow().is_loaded()
    }

    /// Iterate every entry line in (key ASC, sequence DESC) order.
    pub fn iter(&self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(self)
    }

    /// Iterate the tombstone section in storage order.
    pub fn tombstone_iter(&self) -> Result<TombstoneIter> {
        TombstoneIter::new(&self.path, self.header.tombstone_offset, self.header.tombstone_count)
    }
}

/// Sequential reader over a run's entry section.
///
/// Owns its own file handle, so several can be live over one run.
pub struct SSTableIterator<'a> {
    table: &'a SSTable,
    reader: BufReader<File>,
    /// Byte position of the next line to read.
    pos: u64,
    current: Option<Entry>,
}

impl<'a> SSTableIterator<'a> {
    fn new(table: &'a SSTable) -> Result<Self> {
        let reader = BufReader::new(File::open(&table.path)?);
        let mut iter = SSTableIterator {
            table,
            reader,
            pos: table.header.entry_offset,
            current: None,
        };
        iter.seek_to(table.header.entry_offset)?;
        Ok(iter)
    }

    fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.pos = offset;
        self.reader.seek(SeekFrom::Start(offset))?;
        self.read_next()
    }

    fn read_next(&mut self) -> Result<()> {
        if self.pos >= self.table.header.tombstone_offset {
            self.current = None;
            return Ok(());
        }
        let mut line = String::new();
        let n = self.reader.read_line(&mut line)?;
        if n == 0 {
            return Err(Error::Corruption(format!(
                "entry section of run {} ends early",
                self.table.meta.id
            )));
        }
        self.pos += n as u64;
        self.current = Some(decode_entry(&line)?);
        Ok(())
    }
}

impl StorageIterator for SSTableIterator<'_> {
    fn entry(&self) -> Option<&Entry> {
        self.current.as_ref()
    }

    fn next(&mut self) -> Result<()> {
        self.read_next()
    }

    /// Jump through the key index to the first key >= target.
    fn seek(&mut self, key: Key) -> Result<()> {
        let index = &self.table.index;
        let pos = index.partition_point(|e| e.key < key);
        let offset = index
            .get(pos)
            .map_or(self.table.header.tombstone_offset, |e| e.offset);
        self.seek_to(offset)
    }
}

/// Sequential reader over a run's tombstone section, on its own file handle.
pub struct TombstoneIter {
    reader: BufReader<File>,
    start: u64,
    count: u64,
    read: u64,
}

impl TombstoneIter {
    fn new(path: &Path, start: u64, count: u64) -> Result<Self> {
        let mut reader = BufReader::new(File::open(path)?);
        reader.seek(SeekFrom::Start(start))?;
        Ok(TombstoneIter {
            reader,
            start,
            count,
            read: 0,
        })
    }

    /// Restart from the first tombstone.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.start))?;
        self.read = 0;
        Ok(())
    }
}

impl Iterator for TombstoneIter {
    type Item = Result<RangeTombstone>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.read >= self.count {
            return None;
        }
        self.read += 1;
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Some(Err(Error::Corruption("tombstone section ends early".into()))),
            Ok(_) => Some(decode_tombstone(&line)),
            Err(e) => Some(Err(e.into())),
        }
    }
}

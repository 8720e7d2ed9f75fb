//! Engine facade: the public entry point.
//!
//! Writes:  DB::put / delete / delete_range
//!          → MemTable
//!          → (operation count ≥ flush_threshold) flush to a level-0 run
//!          → compaction while any level is over budget
//!
//! Reads:   DB::get → MemTable → L0 newest..oldest → L1 → ... (first hit wins)
//!          DB::scan → MergeIterator over the MemTable and every run

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::cache::TableCache;
use crate::compaction::{self, CompactionTask};
use crate::error::{Error, Result};
use crate::fragment::Fragments;
use crate::iterator::{BoxedIterator, MergeIterator, StorageIterator, TombstonePolicy};
use crate::manifest::{Manifest, parse_run_file_name};
use crate::memtable::MemTable;
use crate::types::{Key, RangeTombstone, RunId, SeqNum, Value};

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Buffered operations (puts, deletes, range deletes) before the
    /// memtable is flushed to level 0.
    pub flush_threshold: usize,
    /// Size budget of level 0, in records.
    pub level_size_base: u64,
    /// Each level may hold this many times more than the one above.
    pub level_size_multiplier: u64,
    /// Bloom filter density for new runs. None writes runs without one.
    pub bloom_bits_per_key: Option<usize>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            flush_threshold: 10,
            level_size_base: 20,
            level_size_multiplier: 4,
            bloom_bits_per_key: Some(10),
        }
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Reject values that would stall flushing or compaction.
    pub fn validate(&self) -> Result<()> {
        if self.flush_threshold == 0 {
            return Err(Error::InvalidOption("flush_threshold must be positive".into()));
        }
        if self.level_size_base == 0 {
            return Err(Error::InvalidOption("level_size_base must be positive".into()));
        }
        if self.level_size_multiplier == 0 {
            return Err(Error::InvalidOption(
                "level_size_multiplier must be positive".into(),
            ));
        }
        if self.bloom_bits_per_key == Some(0) {
            return Err(Error::InvalidOption(
                "bloom_bits_per_key must be positive; use None to disable".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`Options`].
#[derive(Debug, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    pub fn flush_threshold(mut self, ops: usize) -> Self {
        self.options.flush_threshold = ops;
        self
    }

    pub fn level_size_base(mut self, records: u64) -> Self {
        self.options.level_size_base = records;
        self
    }

    pub fn level_size_multiplier(mut self, factor: u64) -> Self {
        self.options.level_size_multiplier = factor;
        self
    }

    pub fn bloom_bits_per_key(mut self, bits: Option<usize>) -> Self {
        self.options.bloom_bits_per_key = bits;
        self
    }

    pub fn build(self) -> Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Per-level snapshot for [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelStats {
    pub runs: usize,
    pub size: u64,
}

/// Counters describing what the engine has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stats {
    pub flushes: u64,
    pub promotions: u64,
    pub merges: u64,
    pub collections: u64,
    pub levels: Vec<LevelStats>,
}

/// The storage engine.
///
/// Single writer: every method runs to completion, including any flush and
/// compaction it triggers.
pub struct DB {
    dir: PathBuf,
    options: Options,
    memtable: MemTable,
    manifest: Manifest,
    tables: TableCache,
    /// Sequence of the next write. Starts at 1.
    next_sequence: SeqNum,
    /// Operations applied over the engine's lifetime.
    ops: u64,
    stats: Stats,
}

impl DB {
    /// Open an engine over `dir`, creating the directory if needed.
    ///
    /// Existing run files are left alone and never read back; new run ids
    /// start past the highest one found.
    pub fn open(dir: impl AsRef<Path>, options: Options) -> Result<Self> {
        options.validate()?;
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut highest: Option<RunId> = None;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if let Some(id) = parse_run_file_name(&path) {
                warn!(path = %path.display(), "ignoring run file from a previous session");
                highest = Some(highest.map_or(id, |h| h.max(id)));
            }
        }
        let first_run_id = highest.map_or(1, |h| h + 1);
        debug!(dir = %dir.display(), first_run_id, ?options, "engine opened");

        Ok(DB {
            tables: TableCache::new(&dir),
            dir,
            options,
            memtable: MemTable::new(),
            manifest: Manifest::new(first_run_id),
            next_sequence: 1,
            ops: 0,
            stats: Stats::default(),
        })
    }

    /// Point read. Deleted and never-written keys both read as `Hidden`.
    pub fn get(&self, key: Key) -> Result<Value> {
        if let Some(value) = self.memtable.get(key) {
            return Ok(value);
        }
        for (level, id) in self.manifest.runs_newest_first() {
            if let Some(value) = self.tables.get(id)?.get(key)? {
                debug!(key, level, run_id = id, visible = value.is_visible(), "read hit");
                return Ok(value);
            }
        }
        Ok(Value::Hidden)
    }

    pub fn put(&mut self, key: Key, value: Vec<i32>) -> Result<()> {
        let sequence = self.next_sequence();
        self.memtable.put(key, value, sequence);
        self.after_write()
    }

    /// Point delete.
    pub fn delete(&mut self, key: Key) -> Result<()> {
        let sequence = self.next_sequence();
        self.memtable.delete(key, sequence);
        self.after_write()
    }

    /// Delete every key in `[start, end)`. Requires `start < end`.
    pub fn delete_range(&mut self, start: Key, end: Key) -> Result<()> {
        if start >= end {
            return Err(Error::InvalidRange { start, end });
        }
        let sequence = self.next_sequence();
        self.memtable.delete_range(start, end, sequence)?;
        self.after_write()
    }

    /// Every visible value in ascending key order.
    pub fn scan(&self) -> Result<Vec<Value>> {
        Ok(self
            .range(None, None)?
            .into_iter()
            .map(|(_, items)| Value::Visible(items))
            .collect())
    }

    /// Visible values with keys in `[start, end)`, ascending.
    pub fn scan_range(&self, start: Key, end: Key) -> Result<Vec<Value>> {
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(self
            .range(Some(start), Some(end))?
            .into_iter()
            .map(|(_, items)| Value::Visible(items))
            .collect())
    }

    /// Visible `(key, items)` pairs in `[start, end)`; an open bound is
    /// unbounded on that side.
    pub fn range(&self, start: Option<Key>, end: Option<Key>) -> Result<Vec<(Key, Vec<i32>)>> {
        let mut pooled: Vec<RangeTombstone> = self.memtable.tombstones().to_vec();
        let mut sources: Vec<BoxedIterator<'_>> = vec![Box::new(self.memtable.iter())];
        for (_, id) in self.manifest.runs_newest_first() {
            let table = self.tables.get(id)?;
            pooled.extend(table.tombstones()?.iter().copied());
            sources.push(Box::new(table.iter()?));
        }

        let mut merged = MergeIterator::new(sources, Fragments::build(&pooled), TombstonePolicy::Drop)?;
        if let Some(start) = start {
            merged.seek(start)?;
        }

        let mut out = Vec::new();
        while let Some(entry) = merged.entry() {
            if end.is_some_and(|end| entry.key >= end) {
                break;
            }
            out.push((entry.key, entry.value.clone()));
            merged.next()?;
        }
        Ok(out)
    }

    /// Number of operations applied (puts, deletes, range deletes), not
    /// distinct keys.
    pub fn size(&self) -> u64 {
        self.ops
    }

    /// Flush the memtable now, if it holds anything.
    pub fn flush(&mut self) -> Result<()> {
        if self.memtable.is_empty() {
            return Ok(());
        }
        self.flush_memtable()
    }

    pub fn set_flush_threshold(&mut self, ops: usize) -> Result<()> {
        self.update_options(|o| o.flush_threshold = ops)
    }

    pub fn set_level_size_base(&mut self, records: u64) -> Result<()> {
        self.update_options(|o| o.level_size_base = records)
    }

    pub fn set_level_size_multiplier(&mut self, factor: u64) -> Result<()> {
        self.update_options(|o| o.level_size_multiplier = factor)
    }

    fn update_options(&mut self, change: impl FnOnce(&mut Options)) -> Result<()> {
        let mut options = self.options.clone();
        change(&mut options);
        options.validate()?;
        self.options = options;
        Ok(())
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn stats(&self) -> Stats {
        let mut stats = self.stats.clone();
        stats.levels = self
            .manifest
            .levels()
            .iter()
            .map(|l| LevelStats {
                runs: l.runs.len(),
                size: l.size,
            })
            .collect();
        stats
    }

    fn next_sequence(&mut self) -> SeqNum {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn after_write(&mut self) -> Result<()> {
        self.ops += 1;
        if self.memtable.size() >= self.options.flush_threshold {
            self.flush_memtable()?;
        }
        Ok(())
    }

    /// Write the memtable out as a new level-0 run, then compact.
    fn flush_memtable(&mut self) -> Result<()> {
        let id = self.manifest.allocate_run_id();
        let path = self.tables.path_for(id);
        let meta = self
            .memtable
            .flush(&path, id, self.options.bloom_bits_per_key)?;
        self.tables.open(id)?;
        self.manifest.push_run(0, id, meta.size());
        self.memtable.clear();
        self.stats.flushes += 1;
        info!(run_id = id, records = meta.record_count, file_size = meta.file_size, "memtable flushed");

        let tasks = compaction::compact(&mut self.manifest, &mut self.tables, &self.options)?;
        for task in &tasks {
            match task {
                CompactionTask::Promote { .. } => self.stats.promotions += 1,
                CompactionTask::Merge { .. } => self.stats.merges += 1,
                CompactionTask::Collect { .. } => self.stats.collections += 1,
            }
        }
        Ok(())
    }
}

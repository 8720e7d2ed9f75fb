//! Leveled compaction with overlap-based promotion.
//!
//! Whenever a level's logical size reaches `base * multiplier^level`, its
//! oldest run is pushed one level down:
//!
//! ```text
//!   L is the deepest level ──► Collect: rewrite the run into a new level
//!                              L+1, dropping everything its own tombstones
//!                              delete, and the tombstones themselves
//!
//!   no L+1 run overlaps    ──► Promote: move the run to L+1 untouched
//!
//!   otherwise              ──► Merge: merge the run with every overlapping
//!                              L+1 run into one new L+1 run, keeping
//!                              tombstones for the levels below
//! ```
//!
//! The new run is always written and opened before any source file is
//! deleted. Levels other than 0 never contain overlapping runs: a merge absorbs
//! every L+1 run that intersects the growing key range.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use crate::cache::TableCache;
use crate::db::Options;
use crate::error::Result;
use crate::fragment::Fragments;
use crate::iterator::{BoxedIterator, MergeIterator, StorageIterator, TombstonePolicy};
use crate::manifest::{Manifest, level_threshold};
use crate::sstable::{RunMeta, SSTableBuilder};
use crate::types::{Key, RangeTombstone, RunId, SeqNum};

/// One compaction step on the oldest run of `level`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompactionTask {
    Promote {
        level: usize,
        run: RunId,
    },
    Merge {
        level: usize,
        run: RunId,
        /// Runs of `level + 1` absorbed by the merge, in level order.
        overlaps: Vec<RunId>,
    },
    Collect {
        level: usize,
        run: RunId,
    },
}

impl CompactionTask {
    pub fn level(&self) -> usize {
        match self {
            CompactionTask::Promote { level, .. }
            | CompactionTask::Merge { level, .. }
            | CompactionTask::Collect { level, .. } => *level,
        }
    }

    pub fn run(&self) -> RunId {
        match self {
            CompactionTask::Promote { run, .. }
            | CompactionTask::Merge { run, .. }
            | CompactionTask::Collect { run, .. } => *run,
        }
    }
}

/// Compact every level that is over budget, top to bottom.
///
/// A level keeps giving up its oldest run until it is under its threshold,
/// then the level below is checked, which is how compaction cascades.
/// A level created by a `Collect` is not checked again in the same pass:
/// a collected run keeps its size, so with a multiplier of 1 it would be
/// collected into yet another level forever.
/// Returns the tasks that ran, in order.
pub fn compact(
    manifest: &mut Manifest,
    tables: &mut TableCache,
    options: &Options,
) -> Result<Vec<CompactionTask>> {
    let mut done = Vec::new();
    let depth = manifest.depth();
    let mut level = 0;
    while level < depth.min(manifest.depth()) {
        let threshold = level_threshold(
            options.level_size_base,
            options.level_size_multiplier,
            level,
        );
        loop {
            let over = manifest
                .level(level)
                .is_some_and(|l| l.size >= threshold && !l.runs.is_empty());
            if !over {
                break;
            }
            let Some(task) = pick(manifest, tables, level)? else {
                break;
            };
            debug!(level, threshold, ?task, "level over threshold");
            execute(&task, manifest, tables, options.bloom_bits_per_key)?;
            done.push(task);
        }
        level += 1;
    }
    Ok(done)
}

/// Decide what to do with the oldest run of `level`.
pub fn pick(manifest: &Manifest, tables: &TableCache, level: usize) -> Result<Option<CompactionTask>> {
    let Some(&run) = manifest.level(level).and_then(|l| l.runs.first()) else {
        return Ok(None);
    };
    if manifest.is_bottom(level) {
        return Ok(Some(CompactionTask::Collect { level, run }));
    }

    let meta = tables.get(run)?.meta();
    let (mut lo, mut hi) = (meta.min_key, meta.max_key);
    let mut candidates: Vec<&RunMeta> = Vec::new();
    if let Some(next) = manifest.level(level + 1) {
        for id in &next.runs {
            candidates.push(tables.get(*id)?.meta());
        }
    }

    let mut absorbed = vec![false; candidates.len()];
    loop {
        let mut grew = false;
        for (i, candidate) in candidates.iter().enumerate() {
            if !absorbed[i] && candidate.overlaps(lo, hi) {
                absorbed[i] = true;
                lo = lo.min(candidate.min_key);
                hi = hi.max(candidate.max_key);
                grew = true;
            }
        }
        if !grew {
            break;
        }
    }

    let overlaps: Vec<RunId> = candidates
        .iter()
        .zip(&absorbed)
        .filter(|(_, taken)| **taken)
        .map(|(meta, _)| meta.id)
        .collect();

    if overlaps.is_empty() {
        Ok(Some(CompactionTask::Promote { level, run }))
    } else {
        Ok(Some(CompactionTask::Merge {
            level,
            run,
            overlaps,
        }))
    }
}

/// Carry out one task. On error nothing has been deleted.
pub fn execute(
    task: &CompactionTask,
    manifest: &mut Manifest,
    tables: &mut TableCache,
    bloom_bits_per_key: Option<usize>,
) -> Result<()> {
    match task {
        CompactionTask::Promote { level, run } => {
            let size = tables.get(*run)?.meta().size();
            manifest.remove_run(*level, *run);
            let from = manifest.level_mut(*level);
            from.size = from.size.saturating_sub(size);
            manifest.push_run(level + 1, *run, size);
            info!(level, run_id = run, size, "run promoted");
        }

        CompactionTask::Merge {
            level,
            run,
            overlaps,
        } => {
            let run_size = tables.get(*run)?.meta().size();
            let mut absorbed = 0;
            for id in overlaps {
                absorbed += tables.get(*id)?.meta().size();
            }

            let mut sources = Vec::with_capacity(overlaps.len() + 1);
            sources.push(*run);
            sources.extend_from_slice(overlaps);

            let id = manifest.allocate_run_id();
            let written = write_merged(
                tables,
                &sources,
                Rewrite::Merge,
                &tables.path_for(id),
                id,
                bloom_bits_per_key,
            )?;
            if written.is_some() {
                tables.open(id)?;
            }
            let new_size = written.as_ref().map_or(0, RunMeta::size);

            manifest.remove_run(*level, *run);
            let from = manifest.level_mut(*level);
            from.size = from.size.saturating_sub(run_size);
            for old in overlaps {
                manifest.remove_run(level + 1, *old);
            }
            let to = manifest.level_mut(level + 1);
            to.size = (to.size + new_size).saturating_sub(absorbed);
            if written.is_some() {
                to.runs.push(id);
            }

            for old in &sources {
                tables.remove(*old)?;
            }
            info!(
                level,
                run_id = run,
                ?overlaps,
                new_run_id = written.as_ref().map(|m| m.id),
                new_size,
                "runs merged"
            );
        }

        CompactionTask::Collect { level, run } => {
            let run_size = tables.get(*run)?.meta().size();
            let id = manifest.allocate_run_id();
            let written = write_merged(
                tables,
                &[*run],
                Rewrite::Collect,
                &tables.path_for(id),
                id,
                bloom_bits_per_key,
            )?;
            if let Some(meta) = &written {
                tables.open(id)?;
                manifest.push_run(level + 1, id, meta.size());
            }

            manifest.remove_run(*level, *run);
            let from = manifest.level_mut(*level);
            from.size = from.size.saturating_sub(run_size);
            tables.remove(*run)?;
            manifest.trim();
            info!(
                level,
                run_id = run,
                new_run_id = written.as_ref().map(|m| m.id),
                survivors = written.as_ref().map_or(0, RunMeta::size),
                "bottom run collected"
            );
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rewrite {
    /// Keep point and range tombstones; older levels still need them.
    Merge,
    /// Nothing older exists: drop every tombstone.
    Collect,
}

/// Stream `sources` through a merge into a new run at `path`.
///
/// Returns None, and writes nothing, when no record survives.
fn write_merged(
    tables: &TableCache,
    sources: &[RunId],
    mode: Rewrite,
    path: &Path,
    id: RunId,
    bloom_bits_per_key: Option<usize>,
) -> Result<Option<RunMeta>> {
    let mut pooled: Vec<RangeTombstone> = Vec::new();
    let mut iters: Vec<BoxedIterator<'_>> = Vec::with_capacity(sources.len());
    for source in sources {
        let table = tables.get(*source)?;
        pooled.extend(table.tombstones()?.iter().copied());
        iters.push(Box::new(table.iter()?));
    }

    let policy = match mode {
        Rewrite::Merge => TombstonePolicy::Keep,
        Rewrite::Collect => TombstonePolicy::Drop,
    };
    let mut merged = MergeIterator::new(iters, Fragments::build(&pooled), policy)?;

    let mut builder = SSTableBuilder::new(path, id, bloom_bits_per_key);
    while let Some(entry) = merged.entry() {
        builder.add(entry)?;
        merged.next()?;
    }
    if mode == Rewrite::Merge {
        for tombstone in dedup_tombstones(&pooled) {
            builder.add_tombstone(tombstone);
        }
    }

    if builder.is_empty() {
        debug!(?sources, "nothing survived the rewrite");
        return Ok(None);
    }
    builder.finish().map(Some)
}

/// One tombstone per distinct `[start, end)`, keeping the highest sequence.
fn dedup_tombstones(tombstones: &[RangeTombstone]) -> Vec<RangeTombstone> {
    let mut best: BTreeMap<(Key, Key), SeqNum> = BTreeMap::new();
    for t in tombstones {
        let seq = best.entry((t.start, t.end)).or_insert(t.sequence);
        *seq = (*seq).max(t.sequence);
    }
    best.into_iter()
        .map(|((start, end), sequence)| RangeTombstone::new(start, end, sequence))
        .collect()
}

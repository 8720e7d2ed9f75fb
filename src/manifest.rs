//! The level manifest: which runs live at which level.
//!
//! ```text
//! L0: [run 7, run 9, run 12]     ← every flush lands here (may overlap)
//! L1: [run 4, run 11]            ← non-overlapping key ranges
//! L2: [run 2]
//! ```
//!
//! Append order within a level is recency: the last id is the newest run.
//! Level L always holds newer data than level L+1.

use std::path::Path;

use crate::types::RunId;

const RUN_PREFIX: &str = "run_";
const RUN_SUFFIX: &str = ".sst";

/// Runs of one level plus the level's logical size (records).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Level {
    pub runs: Vec<RunId>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    levels: Vec<Level>,
    next_run_id: RunId,
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Manifest {
    /// An empty manifest with a single empty level 0. Run ids start at
    /// `first_run_id`.
    pub fn new(first_run_id: RunId) -> Self {
        Manifest {
            levels: vec![Level::default()],
            next_run_id: first_run_id,
        }
    }

    /// Hand out the next run id. Ids are never reused.
    pub fn allocate_run_id(&mut self) -> RunId {
        let id = self.next_run_id;
        self.next_run_id += 1;
        id
    }

    /// Number of levels, including empty ones.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    pub fn level(&self, level: usize) -> Option<&Level> {
        self.levels.get(level)
    }

    /// Mutable access, creating empty levels up to `level` if needed.
    pub fn level_mut(&mut self, level: usize) -> &mut Level {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Level::default);
        }
        &mut self.levels[level]
    }

    /// Whether `level` is the deepest one in use.
    pub fn is_bottom(&self, level: usize) -> bool {
        level + 1 >= self.levels.len()
    }

    /// Register a new run as the newest of `level`.
    pub fn push_run(&mut self, level: usize, id: RunId, size: u64) {
        let level = self.level_mut(level);
        level.runs.push(id);
        level.size += size;
    }

    /// Remove a run id from `level`. Returns false if it was not there.
    /// Size bookkeeping is left to the caller.
    pub fn remove_run(&mut self, level: usize, id: RunId) -> bool {
        let Some(level) = self.levels.get_mut(level) else {
            return false;
        };
        match level.runs.iter().position(|r| *r == id) {
            Some(pos) => {
                level.runs.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop empty levels at the bottom, keeping at least level 0.
    pub fn trim(&mut self) {
        while self.levels.len() > 1 && self.levels.last().is_some_and(|l| l.runs.is_empty()) {
            self.levels.pop();
        }
    }

    /// Every run id, level 0 first, newest first within a level.
    /// This is the order reads consult runs in.
    pub fn runs_newest_first(&self) -> impl Iterator<Item = (usize, RunId)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(n, level)| level.runs.iter().rev().map(move |id| (n, *id)))
    }

    pub fn run_count(&self) -> usize {
        self.levels.iter().map(|l| l.runs.len()).sum()
    }
}

/// Size budget of a level: `base * multiplier^level`.
pub fn level_threshold(base: u64, multiplier: u64, level: usize) -> u64 {
    let exp = u32::try_from(level).unwrap_or(u32::MAX);
    base.saturating_mul(multiplier.saturating_pow(exp))
}

/// File name of a run: `run_000042.sst`.
pub fn run_file_name(id: RunId) -> String {
    format!("{RUN_PREFIX}{id:06}{RUN_SUFFIX}")
}

/// Inverse of [`run_file_name`]. None for anything else in the directory.
pub fn parse_run_file_name(path: &Path) -> Option<RunId> {
    let name = path.file_name()?.to_str()?;
    name.strip_prefix(RUN_PREFIX)?
        .strip_suffix(RUN_SUFFIX)?
        .parse()
        .ok()
}

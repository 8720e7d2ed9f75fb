use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::error::{Error, Result};
use crate::manifest::run_file_name;
use crate::sstable::SSTable;
use crate::types::RunId;

/// Open handles for every live run, keyed by run id.
///
/// Runs are opened once, when they are created, and dropped together with
/// their file when compaction retires them. The key index and bloom filter
/// of each run therefore stay resident.
pub struct TableCache {
    dir: PathBuf,
    tables: HashMap<RunId, SSTable>,
}

impl TableCache {
    pub fn new(dir: &Path) -> Self {
        TableCache {
            dir: dir.to_path_buf(),
            tables: HashMap::new(),
        }
    }

    /// Where the file of run `id` lives.
    pub fn path_for(&self, id: RunId) -> PathBuf {
        self.dir.join(run_file_name(id))
    }

    /// Open the freshly written run `id` and keep its handle.
    pub fn open(&mut self, id: RunId) -> Result<&SSTable> {
        let table = SSTable::open(&self.path_for(id), id)?;
        self.tables.insert(id, table);
        self.get(id)
    }

    /// Handle of a live run. A missing handle means the manifest and the
    /// cache disagree.
    pub fn get(&self, id: RunId) -> Result<&SSTable> {
        self.tables
            .get(&id)
            .ok_or_else(|| Error::Corruption(format!("run {id} is not open")))
    }

    /// Drop the handle of run `id` and delete its file.
    pub fn remove(&mut self, id: RunId) -> Result<()> {
        let path = match self.tables.remove(&id) {
            Some(table) => table.path().to_path_buf(),
            None => self.path_for(id),
        };
        trace!(run_id = id, path = %path.display(), "removing run file");
        fs::remove_file(&path)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

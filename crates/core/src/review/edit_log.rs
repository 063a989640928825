//! Persistent record of edited cells.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::ReviewError;
use crate::fsio;
use crate::pairs::{PairColumn, PairRow};

/// One cell of a batch file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub row: usize,
    pub column: PairColumn,
}

impl CellRef {
    pub fn new(row: usize, column: PairColumn) -> Self {
        Self { row, column }
    }
}

/// Every cell that has ever differed from its previously saved value.
///
/// The set only grows while the file is checked out. It is stored as JSON
/// under the edit-state directory, named by the MD5 of the batch file path,
/// and removed when the file is archived.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditLog {
    cells: BTreeSet<CellRef>,
}

impl EditLog {
    /// Location of the edit log for `file`.
    pub fn path_for(edit_state_dir: &Path, file: &Path) -> PathBuf {
        let digest = md5::compute(file.to_string_lossy().as_bytes());
        edit_state_dir.join(format!("{:x}.json", digest))
    }

    /// Loads a log, treating a missing file as empty.
    pub fn load(path: &Path) -> Result<Self, ReviewError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| ReviewError::edit_log(path, e))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ReviewError::edit_log(path, e)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ReviewError> {
        let bytes = serde_json::to_vec(self).map_err(|e| ReviewError::edit_log(path, e))?;
        fsio::write_atomic(path, &bytes).map_err(|e| ReviewError::edit_log(path, e))
    }

    /// Deletes the stored log. Returns whether one existed.
    pub fn remove(path: &Path) -> Result<bool, ReviewError> {
        fsio::remove_if_exists(path).map_err(|e| ReviewError::edit_log(path, e))
    }

    /// Cells whose values differ between two versions of a file.
    ///
    /// Rows present in only one version count as changed in every column.
    pub fn diff(before: &[PairRow], after: &[PairRow]) -> BTreeSet<CellRef> {
        let rows = before.len().max(after.len());
        let mut changed = BTreeSet::new();
        for row in 0..rows {
            for column in PairColumn::ALL {
                let old = before.get(row).map(|r| r.get(column));
                let new = after.get(row).map(|r| r.get(column));
                if old != new {
                    changed.insert(CellRef::new(row, column));
                }
            }
        }
        changed
    }

    /// Adds cells, returning how many were not already present.
    pub fn extend(&mut self, cells: impl IntoIterator<Item = CellRef>) -> usize {
        cells
            .into_iter()
            .filter(|cell| self.cells.insert(*cell))
            .count()
    }

    pub fn contains(&self, row: usize, column: PairColumn) -> bool {
        self.cells.contains(&CellRef::new(row, column))
    }

    pub fn cells(&self) -> impl Iterator<Item = &CellRef> {
        self.cells.iter()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

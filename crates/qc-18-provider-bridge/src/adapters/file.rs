//! JSON file permission persistence.
//!
//! The whole table is rewritten on every change: serialized to a sibling
//! temporary file, fsynced, then renamed over the target. A crash leaves
//! either the old or the new table, never a torn one.
//!
//! File layout:
//!
//! ```json
//! { "version": 1, "records": [ { "origin": "...", "state": "allowed", ... } ] }
//! ```

use crate::domain::error::StoreError;
use crate::domain::origin::Origin;
use crate::domain::permission::PermissionRecord;
use crate::ports::outbound::PermissionPersistence;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Current on-disk format version
pub const FILE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PermissionFile {
    version: u32,
    records: Vec<PermissionRecord>,
}

/// Permission persistence backed by a single JSON file.
pub struct JsonFilePermissionPersistence {
    path: PathBuf,
    /// Authoritative copy; writes serialize on this lock.
    table: Mutex<HashMap<Origin, PermissionRecord>>,
}

impl JsonFilePermissionPersistence {
    /// Open (or lazily create) the file at `path`.
    ///
    /// A missing file is an empty table. An unreadable or malformed one is an
    /// error: silently starting empty would forget every decision.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let table = read_table(&path)?;
        info!(
            path = %path.display(),
            records = table.len(),
            "Opened permission file"
        );
        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, table: &HashMap<Origin, PermissionRecord>) -> Result<(), StoreError> {
        let mut records: Vec<PermissionRecord> = table.values().cloned().collect();
        records.sort_by(|a, b| a.origin.as_str().cmp(b.origin.as_str()));
        let file = PermissionFile {
            version: FILE_FORMAT_VERSION,
            records,
        };
        let bytes = serde_json::to_vec_pretty(&file)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
        }

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
            f.write_all(&bytes).map_err(|e| io_error(&tmp, e))?;
            f.sync_all().map_err(|e| io_error(&tmp, e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))?;

        debug!(path = %self.path.display(), records = table.len(), "Flushed permission file");
        Ok(())
    }
}

impl PermissionPersistence for JsonFilePermissionPersistence {
    fn load(&self) -> Result<HashMap<Origin, PermissionRecord>, StoreError> {
        Ok(self.table.lock().clone())
    }

    fn save(&self, record: &PermissionRecord) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        let previous = table.insert(record.origin.clone(), record.clone());
        if let Err(e) = self.flush(&table) {
            // Keep memory and disk in step
            match previous {
                Some(prev) => table.insert(prev.origin.clone(), prev),
                None => table.remove(&record.origin),
            };
            return Err(e);
        }
        Ok(())
    }

    fn save_new(&self, record: &PermissionRecord) -> Result<bool, StoreError> {
        let mut table = self.table.lock();
        if table.contains_key(&record.origin) {
            return Ok(false);
        }
        table.insert(record.origin.clone(), record.clone());
        if let Err(e) = self.flush(&table) {
            table.remove(&record.origin);
            return Err(e);
        }
        Ok(true)
    }

    fn remove(&self, origin: &Origin) -> Result<(), StoreError> {
        let mut table = self.table.lock();
        let Some(previous) = table.remove(origin) else {
            return Ok(());
        };
        if let Err(e) = self.flush(&table) {
            table.insert(previous.origin.clone(), previous);
            return Err(e);
        }
        Ok(())
    }
}

fn read_table(path: &Path) -> Result<HashMap<Origin, PermissionRecord>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let file: PermissionFile = serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    if file.version != FILE_FORMAT_VERSION {
        return Err(StoreError::Corrupt {
            path: path.display().to_string(),
            message: format!("unsupported version {}", file.version),
        });
    }

    Ok(file
        .records
        .into_iter()
        .map(|r| (r.origin.clone(), r))
        .collect())
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

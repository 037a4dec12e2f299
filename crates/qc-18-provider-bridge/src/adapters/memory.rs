//! In-memory permission persistence (no durability across restarts).

use crate::domain::error::StoreError;
use crate::domain::origin::Origin;
use crate::domain::permission::PermissionRecord;
use crate::ports::outbound::PermissionPersistence;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Keeps records in a map. Used when no `permissions_path` is configured.
#[derive(Debug, Default)]
pub struct InMemoryPermissionPersistence {
    records: Mutex<HashMap<Origin, PermissionRecord>>,
}

impl InMemoryPermissionPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records
    pub fn with_records(records: impl IntoIterator<Item = PermissionRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|r| (r.origin.clone(), r))
            .collect();
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl PermissionPersistence for InMemoryPermissionPersistence {
    fn load(&self) -> Result<HashMap<Origin, PermissionRecord>, StoreError> {
        Ok(self.records.lock().clone())
    }

    fn save(&self, record: &PermissionRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .insert(record.origin.clone(), record.clone());
        Ok(())
    }

    fn save_new(&self, record: &PermissionRecord) -> Result<bool, StoreError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.origin) {
            return Ok(false);
        }
        records.insert(record.origin.clone(), record.clone());
        Ok(true)
    }

    fn remove(&self, origin: &Origin) -> Result<(), StoreError> {
        self.records.lock().remove(origin);
        Ok(())
    }
}

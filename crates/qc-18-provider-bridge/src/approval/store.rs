//! Permission Store: durable per-origin decision table.
//!
//! Reads are served from an in-memory `DashMap`. Every mutation updates the
//! origin's entry first and is written through to [`PermissionPersistence`]
//! after the entry guard is dropped, so no disk write ever holds a shard lock.
//! New `requested` records are persisted on the blocking pool with
//! insert-if-absent semantics and never overwrite a decision.

use crate::domain::error::StoreError;
use crate::domain::origin::{DisplayHint, Origin};
use crate::domain::permission::{Decision, PermissionRecord, PermissionState};
use crate::ports::outbound::{PermissionPersistence, TimeSource};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct PermissionStore {
    records: DashMap<Origin, PermissionRecord>,
    persistence: Arc<dyn PermissionPersistence>,
    clock: Arc<dyn TimeSource>,
}

impl PermissionStore {
    /// Build the store and load every persisted record.
    pub fn new(
        persistence: Arc<dyn PermissionPersistence>,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, StoreError> {
        let loaded = persistence.load()?;
        info!(records = loaded.len(), "Loaded permission records");
        Ok(Self {
            records: loaded.into_iter().collect(),
            persistence,
            clock,
        })
    }

    pub fn get(&self, origin: &Origin) -> Option<PermissionRecord> {
        self.records.get(origin).map(|r| r.value().clone())
    }

    pub fn state(&self, origin: &Origin) -> Option<PermissionState> {
        self.records.get(origin).map(|r| r.state)
    }

    pub fn is_allowed(&self, origin: &Origin) -> bool {
        self.state(origin).is_some_and(PermissionState::is_allowed)
    }

    /// Create a `requested` record for a never-seen origin, in memory only.
    ///
    /// Existing records are left alone: an `allowed` or `denied` origin is
    /// never pushed back to `requested` by a new round. Returns the created
    /// record; hand it to [`persist_created`](Self::persist_created).
    pub fn mark_requested(&self, origin: &Origin, hint: Option<DisplayHint>) -> Option<PermissionRecord> {
        match self.records.entry(origin.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(vacant) => {
                let record = PermissionRecord::requested(origin.clone(), hint, self.clock.now());
                vacant.insert(record.clone());
                debug!(origin = %origin, "Permission record created");
                Some(record)
            }
        }
    }

    /// Write a record created by `mark_requested` on the blocking pool.
    ///
    /// Returns whether it reached persistence. Failures are logged; the
    /// in-memory record stands either way.
    pub async fn persist_created(&self, record: PermissionRecord) -> bool {
        let persistence = Arc::clone(&self.persistence);
        let origin = record.origin.clone();
        match tokio::task::spawn_blocking(move || persistence.save_new(&record)).await {
            Ok(Ok(written)) => written,
            Ok(Err(e)) => {
                error!(origin = %origin, error = %e, "Failed to persist requested record");
                false
            }
            Err(e) => {
                error!(origin = %origin, error = %e, "Persistence task failed");
                false
            }
        }
    }

    /// Overwrite the origin's record with a human decision.
    ///
    /// The in-memory record is updated even if persistence fails, so this
    /// process still honours the decision. Callers serialize decisions per
    /// origin (the ledger entry is held), which keeps disk order equal to
    /// decision order.
    pub fn record_decision(
        &self,
        origin: &Origin,
        hint: Option<DisplayHint>,
        decision: Decision,
    ) -> PermissionRecord {
        let next = {
            let mut entry = self.records.entry(origin.clone()).or_insert_with(|| {
                PermissionRecord::requested(origin.clone(), None, self.clock.now())
            });
            let favicon_hint = hint.or_else(|| entry.favicon_hint.clone());
            let next =
                PermissionRecord::decided(origin.clone(), favicon_hint, decision, self.clock.now());
            debug_assert!(entry.state.can_transition_to(next.state));
            *entry = next.clone();
            next
        };

        if let Err(e) = self.persistence.save(&next) {
            error!(
                origin = %origin,
                state = ?next.state,
                error = %e,
                "Failed to persist permission decision"
            );
        }

        info!(origin = %origin, state = ?next.state, "Permission decision recorded");
        next
    }

    /// Remove an origin's record. The next privileged call opens a fresh round.
    pub fn revoke(&self, origin: &Origin) -> Result<Option<PermissionRecord>, StoreError> {
        match self.records.entry(origin.clone()) {
            Entry::Vacant(_) => Ok(None),
            Entry::Occupied(occupied) => {
                self.persistence.remove(origin)?;
                let record = occupied.remove();
                info!(origin = %origin, "Permission revoked");
                Ok(Some(record))
            }
        }
    }

    /// All records, sorted by origin
    pub fn snapshot(&self) -> Vec<PermissionRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.origin.cmp(&b.origin));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

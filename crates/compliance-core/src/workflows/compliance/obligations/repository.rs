use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::super::domain::OrgId;
use super::domain::{Obligation, ObligationKey};

/// Storage abstraction for obligations with optimistic versioned writes.
pub trait ObligationStore: Send + Sync {
    /// Store a new obligation at version 1.
    fn insert(&self, obligation: Obligation) -> Result<Obligation, StoreError>;
    fn fetch(&self, org: &OrgId, key: &ObligationKey) -> Result<Option<Obligation>, StoreError>;
    /// Replace the stored obligation only if it is still at `expected_version`;
    /// the written record carries `expected_version + 1`.
    fn compare_and_set(
        &self,
        expected_version: u64,
        obligation: Obligation,
    ) -> Result<Obligation, StoreError>;
    fn list(&self, org: &OrgId) -> Result<Vec<Obligation>, StoreError>;
    fn list_all(&self) -> Result<Vec<Obligation>, StoreError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("obligation already exists")]
    Conflict,
    #[error("obligation not found")]
    NotFound,
    #[error("obligation '{key}' changed concurrently (expected version {expected}, found {actual})")]
    VersionConflict {
        key: ObligationKey,
        expected: u64,
        actual: u64,
    },
    #[error("obligation store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryObligationStore {
    records: Arc<Mutex<HashMap<(OrgId, ObligationKey), Obligation>>>,
}

impl InMemoryObligationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store, e.g. from a configuration snapshot. Versions are kept.
    pub fn with_obligations(obligations: impl IntoIterator<Item = Obligation>) -> Self {
        let records = obligations
            .into_iter()
            .map(|obligation| ((obligation.org_id, obligation.key.clone()), obligation))
            .collect();
        Self {
            records: Arc::new(Mutex::new(records)),
        }
    }
}

impl ObligationStore for InMemoryObligationStore {
    fn insert(&self, mut obligation: Obligation) -> Result<Obligation, StoreError> {
        let mut guard = self.records.lock().expect("obligation store mutex poisoned");
        let slot = (obligation.org_id, obligation.key.clone());
        if guard.contains_key(&slot) {
            return Err(StoreError::Conflict);
        }
        obligation.version = 1;
        guard.insert(slot, obligation.clone());
        Ok(obligation)
    }

    fn fetch(&self, org: &OrgId, key: &ObligationKey) -> Result<Option<Obligation>, StoreError> {
        let guard = self.records.lock().expect("obligation store mutex poisoned");
        Ok(guard.get(&(*org, key.clone())).cloned())
    }

    fn compare_and_set(
        &self,
        expected_version: u64,
        mut obligation: Obligation,
    ) -> Result<Obligation, StoreError> {
        let mut guard = self.records.lock().expect("obligation store mutex poisoned");
        let slot = (obligation.org_id, obligation.key.clone());
        let current = guard.get(&slot).ok_or(StoreError::NotFound)?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                key: obligation.key,
                expected: expected_version,
                actual: current.version,
            });
        }

        obligation.version = expected_version + 1;
        guard.insert(slot, obligation.clone());
        Ok(obligation)
    }

    fn list(&self, org: &OrgId) -> Result<Vec<Obligation>, StoreError> {
        let guard = self.records.lock().expect("obligation store mutex poisoned");
        let mut obligations: Vec<Obligation> = guard
            .values()
            .filter(|obligation| obligation.org_id == *org)
            .cloned()
            .collect();
        obligations.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(obligations)
    }

    fn list_all(&self) -> Result<Vec<Obligation>, StoreError> {
        let guard = self.records.lock().expect("obligation store mutex poisoned");
        let mut obligations: Vec<Obligation> = guard.values().cloned().collect();
        obligations.sort_by(|a, b| (a.org_id, &a.key).cmp(&(b.org_id, &b.key)));
        Ok(obligations)
    }
}

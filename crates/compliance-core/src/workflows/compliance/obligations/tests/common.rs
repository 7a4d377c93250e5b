use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use uuid::Uuid;

use crate::config::{RecurrenceConfig, SchedulerConfig};
use crate::workflows::compliance::audit::{Actor, InMemoryAuditSink};
use crate::workflows::compliance::domain::{OrgId, RecordId};
use crate::workflows::compliance::obligations::{
    InMemoryObligationStore, Obligation, ObligationKey, ObligationScheduler, ObligationStore,
    RiskLevel, StoreError,
};
use crate::workflows::compliance::recurrence::{Frequency, RecurrenceBook, RecurrenceExpander};
use crate::workflows::compliance::rules::{ObligationCandidate, ObligationTemplate};

pub(super) type Scheduler<S = InMemoryObligationStore> = ObligationScheduler<S, InMemoryAuditSink>;

pub(super) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(super) fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

pub(super) fn org() -> OrgId {
    OrgId(Uuid::from_u128(0xC0DE))
}

pub(super) fn analyst() -> Actor {
    Actor::User("analyst@riverside.org".to_string())
}

pub(super) fn key(value: &str) -> ObligationKey {
    ObligationKey::new(value)
}

pub(super) fn harness() -> (Scheduler, Arc<InMemoryObligationStore>, Arc<InMemoryAuditSink>) {
    harness_with(InMemoryObligationStore::new(), SchedulerConfig::default())
}

pub(super) fn harness_with<S: ObligationStore + 'static>(
    store: S,
    config: SchedulerConfig,
) -> (Scheduler<S>, Arc<S>, Arc<InMemoryAuditSink>) {
    let store = Arc::new(store);
    let audit = Arc::new(InMemoryAuditSink::new());
    let scheduler = ObligationScheduler::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        RecurrenceExpander::new(RecurrenceConfig::default()),
        RecurrenceBook::default(),
        config,
    );
    (scheduler, store, audit)
}

pub(super) fn candidate(key_value: &str, frequency: Frequency) -> ObligationCandidate {
    ObligationCandidate {
        template: ObligationTemplate {
            key: key(key_value),
            title: key_value.replace('_', " "),
            section: Some("Section 6.2".to_string()),
            frequency,
            due_rule: None,
            recurrence_rule: None,
            responsible_party: None,
            risk: Some(RiskLevel::High),
            dependencies: BTreeSet::new(),
        },
        rule_id: RecordId(Uuid::from_u128(0xA11)),
    }
}

pub(super) fn dependent_candidate(key_value: &str, depends_on: &str) -> ObligationCandidate {
    let mut candidate = candidate(key_value, Frequency::Quarterly);
    candidate.template.dependencies.insert(key(depends_on));
    candidate
}

/// Track an obligation anchored on 2025-01-15, created that same day.
pub(super) fn track<S: ObligationStore + 'static>(
    scheduler: &Scheduler<S>,
    candidate: &ObligationCandidate,
) -> Obligation {
    scheduler
        .create_from_candidate(org(), None, candidate, date(2025, 1, 15), &analyst(), at(2025, 1, 15))
        .expect("obligation created")
}

/// Store that reports a concurrent writer for the first `conflicts` writes.
pub(super) struct ContendedStore {
    inner: InMemoryObligationStore,
    conflicts: AtomicU32,
}

impl ContendedStore {
    pub(super) fn new(conflicts: u32) -> Self {
        Self {
            inner: InMemoryObligationStore::new(),
            conflicts: AtomicU32::new(conflicts),
        }
    }
}

impl ObligationStore for ContendedStore {
    fn insert(&self, obligation: Obligation) -> Result<Obligation, StoreError> {
        self.inner.insert(obligation)
    }

    fn fetch(&self, org: &OrgId, key: &ObligationKey) -> Result<Option<Obligation>, StoreError> {
        self.inner.fetch(org, key)
    }

    fn compare_and_set(
        &self,
        expected_version: u64,
        obligation: Obligation,
    ) -> Result<Obligation, StoreError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::VersionConflict {
                key: obligation.key,
                expected: expected_version,
                actual: expected_version + 1,
            });
        }
        self.inner.compare_and_set(expected_version, obligation)
    }

    fn list(&self, org: &OrgId) -> Result<Vec<Obligation>, StoreError> {
        self.inner.list(org)
    }

    fn list_all(&self) -> Result<Vec<Obligation>, StoreError> {
        self.inner.list_all()
    }
}

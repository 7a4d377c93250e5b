use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Months, NaiveDate, Utc};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::super::audit::{Actor, AuditError, AuditEvent, AuditSink};
use super::super::domain::{OrgId, RecordId, Scope};
use super::super::recurrence::{RecurrenceBook, RecurrenceError, RecurrenceExpander};
use super::super::rules::ObligationCandidate;
use super::domain::{DueDateState, Obligation, ObligationKey, ObligationStatus};
use super::repository::{ObligationStore, StoreError};
use super::schedule::{self, Transition};
use crate::config::SchedulerConfig;

/// Owns every obligation write: schedule reconciliation, explicit status
/// changes and the time-driven overdue sweep. Writes are compare-and-set on
/// the obligation version and retried on conflict.
pub struct ObligationScheduler<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    expander: RecurrenceExpander,
    recurrence: RecurrenceBook,
    config: SchedulerConfig,
}

/// Filter for obligation listings.
#[derive(Debug, Clone, Default)]
pub struct ObligationFilter {
    pub status: Option<ObligationStatus>,
    /// Only obligations whose next due date falls before this date.
    pub due_before: Option<NaiveDate>,
}

impl ObligationFilter {
    fn accepts(&self, obligation: &Obligation) -> bool {
        let status_ok = self
            .status
            .map(|status| obligation.status == status)
            .unwrap_or(true);
        let due_ok = match self.due_before {
            Some(limit) => obligation
                .next_due_date
                .map(|due| due < limit)
                .unwrap_or(false),
            None => true,
        };
        status_ok && due_ok
    }
}

/// Outcome of one overdue sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    /// Obligations flipped to overdue.
    pub flipped: Vec<ObligationRef>,
    /// Past due but held open by unsatisfied dependencies.
    pub held: Vec<ObligationRef>,
    /// Obligations whose next due date moved forward.
    pub refreshed: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ObligationRef {
    pub org_id: OrgId,
    pub key: ObligationKey,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub obligation: ObligationRef,
    pub error: String,
}

enum SweepOutcome {
    Flipped,
    Held,
    Refreshed,
    Unchanged,
}

impl<S, A> ObligationScheduler<S, A>
where
    S: ObligationStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        audit: Arc<A>,
        expander: RecurrenceExpander,
        recurrence: RecurrenceBook,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            audit,
            expander,
            recurrence,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Track an obligation implied by a rule match. Creating an obligation that
    /// already exists reconciles the existing one instead.
    pub fn create_from_candidate(
        &self,
        org: OrgId,
        document_id: Option<RecordId>,
        candidate: &ObligationCandidate,
        anchor: NaiveDate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        let template = &candidate.template;
        let obligation = Obligation {
            id: RecordId::new(),
            org_id: org,
            document_id,
            key: template.key.clone(),
            title: template.title.clone(),
            section: template.section.clone(),
            frequency: template.frequency,
            due_rule: template.due_rule.clone(),
            recurrence_rule: template.recurrence_rule.clone(),
            anchor_date: anchor,
            next_due_date: None,
            computed_due_dates: Vec::new(),
            dependencies: template.dependencies.clone(),
            status: ObligationStatus::Open,
            acted_on: None,
            responsible_party: template.responsible_party,
            risk: template.risk,
            source_rule: Some(candidate.rule_id),
            notes: None,
            version: 0,
            updated_at: now,
        };
        self.create(obligation, actor, now)
    }

    /// Expand the schedule of a new obligation and store it.
    pub fn create(
        &self,
        obligation: Obligation,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        let today = now.date_naive();
        let dates = self.expand(&obligation, today)?;
        let mut scheduled = schedule::reconcile(&obligation, &dates, today);
        scheduled.updated_at = now;
        let (org, key) = (scheduled.org_id, scheduled.key.clone());

        match self.store.insert(scheduled) {
            Ok(stored) => {
                info!(%org, key = %stored.key, next_due = ?stored.next_due_date, "obligation created");
                self.record(actor, "create", None, &stored, now)?;
                Ok(stored)
            }
            Err(StoreError::Conflict) => {
                debug!(%org, %key, "obligation exists, reconciling instead");
                self.reconcile(org, &key, actor, now)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Re-expand the obligation's recurrence and merge it into its history.
    pub fn reconcile(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        let today = now.date_naive();
        self.update_with_retry(org, key, actor, "reconcile", now, |current| {
            let dates = self.expand(current, today)?;
            Ok(schedule::reconcile(current, &dates, today))
        })
    }

    /// Move the anchor date and recompute the schedule.
    pub fn reschedule(
        &self,
        org: OrgId,
        key: &ObligationKey,
        anchor: NaiveDate,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        let today = now.date_naive();
        self.update_with_retry(org, key, actor, "reschedule", now, |current| {
            let mut moved = current.clone();
            moved.anchor_date = anchor;
            let dates = self.expand(&moved, today)?;
            Ok(schedule::reconcile(&moved, &dates, today))
        })
    }

    pub fn start(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        self.transition(org, key, Transition::Start, actor, now)
    }

    pub fn complete(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        self.transition(org, key, Transition::Complete, actor, now)
    }

    pub fn waive(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        self.transition(org, key, Transition::Waive, actor, now)
    }

    pub fn reopen(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        self.transition(org, key, Transition::Reopen, actor, now)
    }

    /// Mark one due date satisfied or waived. An overdue obligation with no
    /// missed dates left goes back to in progress, which counts as acting on it.
    pub fn resolve_date(
        &self,
        org: OrgId,
        key: &ObligationKey,
        due: NaiveDate,
        state: DueDateState,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        if state == DueDateState::Pending {
            return Err(SchedulerError::UnknownDueDate {
                key: key.clone(),
                due,
            });
        }

        let today = now.date_naive();
        self.update_with_retry(org, key, actor, "resolve_date", now, |current| {
            let mut updated = current.clone();
            if !schedule::resolve_date(&mut updated, due, state, today) {
                return Err(SchedulerError::UnknownDueDate {
                    key: key.clone(),
                    due,
                });
            }
            if updated.status == ObligationStatus::Overdue && !updated.has_missed_dates(today) {
                updated.status = ObligationStatus::InProgress;
                updated.acted_on = Some(today);
            }
            Ok(updated)
        })
    }

    /// Time-driven pass: flip open/in-progress obligations with a due date
    /// missed since their last explicit action to overdue, and move every next
    /// due date forward. Obligations are
    /// processed in parallel; each write is individually versioned.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SchedulerError> {
        let today = now.date_naive();
        let obligations = self.store.list_all()?;

        let mut statuses: HashMap<OrgId, HashMap<ObligationKey, ObligationStatus>> =
            HashMap::new();
        for obligation in &obligations {
            statuses
                .entry(obligation.org_id)
                .or_default()
                .insert(obligation.key.clone(), obligation.status);
        }
        let empty = HashMap::new();

        let outcomes: Vec<(ObligationRef, Result<SweepOutcome, SchedulerError>)> = obligations
            .par_iter()
            .filter(|obligation| !obligation.status.is_closed())
            .map(|obligation| {
                let peers = statuses.get(&obligation.org_id).unwrap_or(&empty);
                let gated = schedule::is_gated(obligation, peers);
                let reference = ObligationRef {
                    org_id: obligation.org_id,
                    key: obligation.key.clone(),
                };
                (reference, self.sweep_one(obligation, gated, today, now))
            })
            .collect();

        let mut report = SweepReport {
            examined: obligations.len(),
            ..SweepReport::default()
        };
        for (reference, outcome) in outcomes {
            match outcome {
                Ok(SweepOutcome::Flipped) => report.flipped.push(reference),
                Ok(SweepOutcome::Held) => report.held.push(reference),
                Ok(SweepOutcome::Refreshed) => report.refreshed += 1,
                Ok(SweepOutcome::Unchanged) => {}
                Err(err) => {
                    warn!(org = %reference.org_id, key = %reference.key, error = %err, "sweep failed for obligation");
                    report.failures.push(SweepFailure {
                        obligation: reference,
                        error: err.to_string(),
                    });
                }
            }
        }
        report.flipped.sort();
        report.held.sort();

        info!(
            %today,
            examined = report.examined,
            flipped = report.flipped.len(),
            held = report.held.len(),
            refreshed = report.refreshed,
            failures = report.failures.len(),
            "overdue sweep finished"
        );
        Ok(report)
    }

    fn sweep_one(
        &self,
        obligation: &Obligation,
        gated: bool,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<SweepOutcome, SchedulerError> {
        let before = obligation.clone();
        let updated = self.update_with_retry(
            obligation.org_id,
            &obligation.key,
            &Actor::System,
            "sweep",
            now,
            |current| {
                let mut updated = current.clone();
                if schedule::is_overdue(current, today, gated) {
                    updated.status = ObligationStatus::Overdue;
                }
                updated.next_due_date = schedule::next_due(&updated.computed_due_dates, today);
                Ok(updated)
            },
        )?;

        let past_due = before.has_missed_dates(today);
        Ok(if updated.status == ObligationStatus::Overdue && before.status != ObligationStatus::Overdue {
            SweepOutcome::Flipped
        } else if gated && past_due {
            SweepOutcome::Held
        } else if updated.next_due_date != before.next_due_date {
            SweepOutcome::Refreshed
        } else {
            SweepOutcome::Unchanged
        })
    }

    /// Open work for an organization, excluding obligations waiting on dependencies.
    pub fn actionable(&self, org: &OrgId) -> Result<Vec<Obligation>, SchedulerError> {
        Ok(schedule::actionable(&self.store.list(org)?))
    }

    pub fn list(
        &self,
        org: &OrgId,
        filter: &ObligationFilter,
    ) -> Result<Vec<Obligation>, SchedulerError> {
        Ok(self
            .store
            .list(org)?
            .into_iter()
            .filter(|obligation| filter.accepts(obligation))
            .collect())
    }

    pub fn overdue(&self, org: &OrgId) -> Result<Vec<Obligation>, SchedulerError> {
        self.list(
            org,
            &ObligationFilter {
                status: Some(ObligationStatus::Overdue),
                due_before: None,
            },
        )
    }

    fn transition(
        &self,
        org: OrgId,
        key: &ObligationKey,
        transition: Transition,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Obligation, SchedulerError> {
        let today = now.date_naive();
        self.update_with_retry(org, key, actor, transition.label(), now, |current| {
            let status = schedule::next_status(current.status, transition).ok_or_else(|| {
                SchedulerError::InvalidTransition {
                    key: key.clone(),
                    from: current.status,
                    action: transition.label(),
                }
            })?;
            let mut updated = current.clone();
            updated.status = status;
            updated.acted_on = Some(today);
            updated.next_due_date = schedule::next_due(&updated.computed_due_dates, today);
            Ok(updated)
        })
    }

    fn expand(&self, obligation: &Obligation, today: NaiveDate) -> Result<Vec<NaiveDate>, SchedulerError> {
        let rule = self
            .recurrence
            .lookup(obligation.recurrence_rule.as_deref(), obligation.frequency);
        let horizon = today
            .checked_add_months(Months::new(self.config.horizon_months))
            .unwrap_or(NaiveDate::MAX);

        Ok(self
            .expander
            .expand_with(
                &rule,
                obligation.anchor_date,
                horizon,
                obligation.due_rule.as_deref(),
            )?
            .collect())
    }

    /// Fetch, apply `change`, compare-and-set. A conflicting write re-reads
    /// fresh state and retries up to the configured bound. Unchanged results
    /// are not written.
    fn update_with_retry<F>(
        &self,
        org: OrgId,
        key: &ObligationKey,
        actor: &Actor,
        action: &str,
        now: DateTime<Utc>,
        change: F,
    ) -> Result<Obligation, SchedulerError>
    where
        F: Fn(&Obligation) -> Result<Obligation, SchedulerError>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let current = self
                .store
                .fetch(&org, key)?
                .ok_or_else(|| SchedulerError::NotFound {
                    org,
                    key: key.clone(),
                })?;

            let mut updated = change(&current)?;
            if updated == current {
                return Ok(current);
            }
            updated.updated_at = now;

            match self.store.compare_and_set(current.version, updated) {
                Ok(stored) => {
                    self.record(actor, action, Some(&current), &stored, now)?;
                    return Ok(stored);
                }
                Err(StoreError::VersionConflict {
                    expected, actual, ..
                }) if attempts <= self.config.max_reconcile_retries => {
                    warn!(
                        %org,
                        %key,
                        action,
                        expected,
                        actual,
                        attempt = attempts,
                        "obligation version conflict, retrying"
                    );
                }
                Err(StoreError::VersionConflict { .. }) => {
                    return Err(SchedulerError::VersionConflict {
                        key: key.clone(),
                        attempts,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn record(
        &self,
        actor: &Actor,
        action: &str,
        before: Option<&Obligation>,
        after: &Obligation,
        now: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        self.audit.record(AuditEvent {
            actor: actor.clone(),
            org_id: after.org_id,
            scope: Scope::Org(after.org_id),
            record_id: after.id,
            action: action.to_string(),
            diff: obligation_diff(before, after),
            at: now,
        })?;
        Ok(())
    }
}

/// Changed top-level fields as `{field: {from, to}}`; bookkeeping fields are skipped.
fn obligation_diff(before: Option<&Obligation>, after: &Obligation) -> Value {
    let after_value = serde_json::to_value(after).unwrap_or(Value::Null);
    let before_value = before
        .and_then(|obligation| serde_json::to_value(obligation).ok())
        .unwrap_or(Value::Null);

    let (Value::Object(after_map), before_map) = (after_value, before_value) else {
        return Value::Null;
    };
    let before_map = match before_map {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    let skipped: BTreeSet<&str> = ["version", "updated_at"].into_iter().collect();
    let mut diff = Map::new();
    for (field, to) in after_map {
        if skipped.contains(field.as_str()) {
            continue;
        }
        let from = before_map.get(&field).cloned().unwrap_or(Value::Null);
        if from != to {
            diff.insert(field, serde_json::json!({ "from": from, "to": to }));
        }
    }
    Value::Object(diff)
}

/// Error raised by the obligation scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("obligation '{key}' not found for organization {org}")]
    NotFound { org: OrgId, key: ObligationKey },
    #[error("cannot {action} obligation '{key}' while it is {from}")]
    InvalidTransition {
        key: ObligationKey,
        from: ObligationStatus,
        action: &'static str,
    },
    #[error("obligation '{key}' has no pending due date {due}")]
    UnknownDueDate { key: ObligationKey, due: NaiveDate },
    #[error("obligation '{key}' kept changing concurrently; gave up after {attempts} attempts")]
    VersionConflict { key: ObligationKey, attempts: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Recurrence(#[from] RecurrenceError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

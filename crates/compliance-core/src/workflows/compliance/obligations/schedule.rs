//! Pure obligation scheduling: merging expanded due dates, the status state
//! machine, the overdue check and the dependency gate. Nothing here touches a
//! store; the scheduler service wraps these in versioned writes.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;

use super::domain::{
    DueDateState, Obligation, ObligationKey, ObligationStatus, ScheduledDate,
};

/// Explicit status changes. `MarkOverdue` is reserved for the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Start,
    Complete,
    MarkOverdue,
    Waive,
    Reopen,
}

impl Transition {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Complete => "complete",
            Self::MarkOverdue => "mark_overdue",
            Self::Waive => "waive",
            Self::Reopen => "reopen",
        }
    }
}

/// Target status of `transition` from `from`, or `None` when the state machine forbids it.
pub fn next_status(from: ObligationStatus, transition: Transition) -> Option<ObligationStatus> {
    use ObligationStatus::*;

    match (transition, from) {
        (Transition::Start, Open | Overdue) => Some(InProgress),
        (Transition::Complete, InProgress) => Some(Satisfied),
        (Transition::MarkOverdue, Open | InProgress) => Some(Overdue),
        (Transition::Waive, Open | InProgress | Overdue | Satisfied) => Some(Waived),
        (Transition::Reopen, Waived | Satisfied) => Some(Open),
        _ => None,
    }
}

/// Merge freshly expanded `due_dates` into the obligation's history.
///
/// Satisfied and waived dates are kept whatever the new expansion says, as are
/// pending dates already in the past. Future pending dates are replaced by the
/// new expansion. `next_due_date` becomes the earliest pending date on or after
/// `today`.
pub fn reconcile(obligation: &Obligation, due_dates: &[NaiveDate], today: NaiveDate) -> Obligation {
    let mut merged: BTreeMap<NaiveDate, ScheduledDate> = obligation
        .computed_due_dates
        .iter()
        .filter(|date| date.state.is_resolved() || date.due < today)
        .map(|date| (date.due, date.clone()))
        .collect();

    for due in due_dates {
        merged
            .entry(*due)
            .or_insert_with(|| ScheduledDate::pending(*due));
    }

    let mut updated = obligation.clone();
    updated.computed_due_dates = merged.into_values().collect();
    updated.next_due_date = next_due(&updated.computed_due_dates, today);
    updated
}

pub fn next_due(dates: &[ScheduledDate], today: NaiveDate) -> Option<NaiveDate> {
    dates
        .iter()
        .filter(|date| date.state == DueDateState::Pending && date.due >= today)
        .map(|date| date.due)
        .min()
}

/// Mark one computed date satisfied or waived. Returns `false` when the
/// obligation has no pending date `due`.
pub fn resolve_date(
    obligation: &mut Obligation,
    due: NaiveDate,
    state: DueDateState,
    resolved_on: NaiveDate,
) -> bool {
    let Some(entry) = obligation
        .computed_due_dates
        .iter_mut()
        .find(|date| date.due == due && date.state == DueDateState::Pending)
    else {
        return false;
    };

    entry.state = state;
    entry.resolved_on = Some(resolved_on);
    obligation.next_due_date = next_due(&obligation.computed_due_dates, resolved_on);
    true
}

/// Whether the time-driven pass should flip this obligation to overdue: a
/// pending date passed since the last explicit action. A stale
/// `next_due_date` is always one of those pending dates. Gated obligations are
/// held where they are.
pub fn is_overdue(obligation: &Obligation, today: NaiveDate, gated: bool) -> bool {
    if gated || next_status(obligation.status, Transition::MarkOverdue).is_none() {
        return false;
    }

    obligation.has_missed_dates(today)
}

/// An obligation is gated while any dependency is missing or not yet satisfied.
pub fn is_gated(obligation: &Obligation, statuses: &HashMap<ObligationKey, ObligationStatus>) -> bool {
    obligation
        .dependencies
        .iter()
        .any(|dependency| statuses.get(dependency) != Some(&ObligationStatus::Satisfied))
}

pub fn status_index(obligations: &[Obligation]) -> HashMap<ObligationKey, ObligationStatus> {
    obligations
        .iter()
        .map(|obligation| (obligation.key.clone(), obligation.status))
        .collect()
}

/// Obligations needing action now: not closed, not gated, soonest due first.
pub fn actionable(obligations: &[Obligation]) -> Vec<Obligation> {
    let statuses = status_index(obligations);
    let mut visible: Vec<Obligation> = obligations
        .iter()
        .filter(|obligation| !obligation.status.is_closed() && !is_gated(obligation, &statuses))
        .cloned()
        .collect();

    visible.sort_by(|a, b| {
        let a_due = a.next_due_date.unwrap_or(NaiveDate::MAX);
        let b_due = b.next_due_date.unwrap_or(NaiveDate::MAX);
        a_due.cmp(&b_due).then_with(|| a.key.cmp(&b.key))
    });
    visible
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::super::domain::{OrgId, RecordId};
use super::super::recurrence::Frequency;

/// Stable business key of an obligation within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObligationKey(pub String);

impl ObligationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObligationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObligationStatus {
    Open,
    InProgress,
    Satisfied,
    Overdue,
    Waived,
}

impl ObligationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Satisfied => "satisfied",
            Self::Overdue => "overdue",
            Self::Waived => "waived",
        }
    }

    /// Satisfied and waived obligations need no further action.
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Satisfied | Self::Waived)
    }
}

impl fmt::Display for ObligationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsibleParty {
    Cde,
    Qalicb,
    Investor,
    ThirdParty,
}

impl ResponsibleParty {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cde => "CDE",
            Self::Qalicb => "QALICB",
            Self::Investor => "Investor",
            Self::ThirdParty => "Third Party",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDateState {
    Pending,
    Satisfied,
    Waived,
}

impl DueDateState {
    /// Resolved dates are history and survive every reconciliation.
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Satisfied | Self::Waived)
    }
}

/// One computed due date with its own resolution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledDate {
    pub due: NaiveDate,
    pub state: DueDateState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_on: Option<NaiveDate>,
}

impl ScheduledDate {
    pub fn pending(due: NaiveDate) -> Self {
        Self {
            due,
            state: DueDateState::Pending,
            resolved_on: None,
        }
    }
}

/// A tracked compliance duty owned by an organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obligation {
    pub id: RecordId,
    pub org_id: OrgId,
    #[serde(default)]
    pub document_id: Option<RecordId>,
    pub key: ObligationKey,
    pub title: String,
    #[serde(default)]
    pub section: Option<String>,
    pub frequency: Frequency,
    /// Free-form due rule, e.g. "45 days after quarter end".
    #[serde(default)]
    pub due_rule: Option<String>,
    /// Key of the recurrence rule driving the schedule.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    pub anchor_date: NaiveDate,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub computed_due_dates: Vec<ScheduledDate>,
    #[serde(default)]
    pub dependencies: BTreeSet<ObligationKey>,
    pub status: ObligationStatus,
    /// Day of the last explicit status change. Due dates missed before it
    /// were acknowledged by that action and never flip the obligation again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acted_on: Option<NaiveDate>,
    #[serde(default)]
    pub responsible_party: Option<ResponsibleParty>,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    /// Business rule that created the obligation, when it came from a match.
    #[serde(default)]
    pub source_rule: Option<RecordId>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Optimistic concurrency counter, bumped on every stored write.
    #[serde(default)]
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl Obligation {
    pub fn pending_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.computed_due_dates
            .iter()
            .filter(|date| date.state == DueDateState::Pending)
            .map(|date| date.due)
    }

    /// Pending dates that passed after the last explicit action.
    pub fn missed_dates(&self, today: NaiveDate) -> impl Iterator<Item = NaiveDate> + '_ {
        self.pending_dates().filter(move |due| {
            *due < today && self.acted_on.map(|acted| *due >= acted).unwrap_or(true)
        })
    }

    pub fn has_missed_dates(&self, today: NaiveDate) -> bool {
        self.missed_dates(today).next().is_some()
    }
}

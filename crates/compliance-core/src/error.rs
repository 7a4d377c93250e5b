use crate::config::ConfigError;
use crate::snapshot::SnapshotError;
use crate::telemetry::TelemetryError;
use crate::workflows::compliance::audit::AuditError;
use crate::workflows::compliance::obligations::{SchedulerError, StoreError};
use crate::workflows::compliance::recurrence::RecurrenceError;
use crate::workflows::compliance::rules::{ConditionParseError, MatchError};
use crate::workflows::compliance::scope::ScopeError;
use std::fmt;

#[derive(Debug)]
pub enum ComplianceError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Snapshot(SnapshotError),
    Scope(ScopeError),
    Match(MatchError),
    Condition(ConditionParseError),
    Recurrence(RecurrenceError),
    Scheduler(SchedulerError),
    Store(StoreError),
    Audit(AuditError),
}

impl ComplianceError {
    /// Stable machine-readable code for callers that branch on error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ComplianceError::Config(_) => "CONFIG_ERROR",
            ComplianceError::Telemetry(_) => "TELEMETRY_ERROR",
            ComplianceError::Io(_) => "IO_ERROR",
            ComplianceError::Snapshot(err) => snapshot_code(err),
            ComplianceError::Scope(err) => scope_code(err),
            ComplianceError::Match(MatchError::AmbiguousRuleMatch { .. }) => "AMBIGUOUS_RULE_MATCH",
            ComplianceError::Condition(_) => "INVALID_CONDITION",
            ComplianceError::Recurrence(err) => recurrence_code(err),
            ComplianceError::Scheduler(err) => scheduler_code(err),
            ComplianceError::Store(err) => store_code(err),
            ComplianceError::Audit(_) => "AUDIT_FAILURE",
        }
    }
}

fn scope_code(err: &ScopeError) -> &'static str {
    match err {
        ScopeError::NotFound { .. } => "NOT_FOUND",
        ScopeError::InvalidHierarchy { .. } => "INVALID_HIERARCHY",
        ScopeError::UnknownOrganization { .. } => "UNKNOWN_ORGANIZATION",
        ScopeError::DuplicateDefinition { .. } | ScopeError::InvalidRecord { .. } => {
            "SNAPSHOT_ERROR"
        }
    }
}

fn recurrence_code(err: &RecurrenceError) -> &'static str {
    match err {
        RecurrenceError::InconsistentFrequency { .. } => "INCONSISTENT_FREQUENCY",
        RecurrenceError::InvalidRule { .. } | RecurrenceError::HorizonTooLong { .. } => {
            "INVALID_RECURRENCE"
        }
    }
}

fn store_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::VersionConflict { .. } | StoreError::Conflict => "VERSION_CONFLICT",
        StoreError::NotFound => "OBLIGATION_NOT_FOUND",
        StoreError::Unavailable(_) => "IO_ERROR",
    }
}

fn scheduler_code(err: &SchedulerError) -> &'static str {
    match err {
        SchedulerError::NotFound { .. } => "OBLIGATION_NOT_FOUND",
        SchedulerError::InvalidTransition { .. } | SchedulerError::UnknownDueDate { .. } => {
            "INVALID_TRANSITION"
        }
        SchedulerError::VersionConflict { .. } => "VERSION_CONFLICT",
        SchedulerError::Store(err) => store_code(err),
        SchedulerError::Recurrence(err) => recurrence_code(err),
        SchedulerError::Audit(_) => "AUDIT_FAILURE",
    }
}

fn snapshot_code(err: &SnapshotError) -> &'static str {
    match err {
        SnapshotError::Read { .. } => "IO_ERROR",
        SnapshotError::Parse { .. } => "SNAPSHOT_ERROR",
        SnapshotError::Scope(err) => scope_code(err),
        SnapshotError::Recurrence(err) => recurrence_code(err),
    }
}

impl fmt::Display for ComplianceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComplianceError::Config(err) => write!(f, "configuration error: {}", err),
            ComplianceError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            ComplianceError::Io(err) => write!(f, "io error: {}", err),
            ComplianceError::Snapshot(err) => write!(f, "snapshot error: {}", err),
            ComplianceError::Scope(err) => write!(f, "scope resolution error: {}", err),
            ComplianceError::Match(err) => write!(f, "rule match error: {}", err),
            ComplianceError::Condition(err) => write!(f, "condition error: {}", err),
            ComplianceError::Recurrence(err) => write!(f, "recurrence error: {}", err),
            ComplianceError::Scheduler(err) => write!(f, "obligation error: {}", err),
            ComplianceError::Store(err) => write!(f, "obligation store error: {}", err),
            ComplianceError::Audit(err) => write!(f, "audit error: {}", err),
        }
    }
}

impl std::error::Error for ComplianceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComplianceError::Config(err) => Some(err),
            ComplianceError::Telemetry(err) => Some(err),
            ComplianceError::Io(err) => Some(err),
            ComplianceError::Snapshot(err) => Some(err),
            ComplianceError::Scope(err) => Some(err),
            ComplianceError::Match(err) => Some(err),
            ComplianceError::Condition(err) => Some(err),
            ComplianceError::Recurrence(err) => Some(err),
            ComplianceError::Scheduler(err) => Some(err),
            ComplianceError::Store(err) => Some(err),
            ComplianceError::Audit(err) => Some(err),
        }
    }
}

impl From<ConfigError> for ComplianceError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for ComplianceError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for ComplianceError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<SnapshotError> for ComplianceError {
    fn from(value: SnapshotError) -> Self {
        Self::Snapshot(value)
    }
}

impl From<ScopeError> for ComplianceError {
    fn from(value: ScopeError) -> Self {
        Self::Scope(value)
    }
}

impl From<MatchError> for ComplianceError {
    fn from(value: MatchError) -> Self {
        Self::Match(value)
    }
}

impl From<ConditionParseError> for ComplianceError {
    fn from(value: ConditionParseError) -> Self {
        Self::Condition(value)
    }
}

impl From<RecurrenceError> for ComplianceError {
    fn from(value: RecurrenceError) -> Self {
        Self::Recurrence(value)
    }
}

impl From<SchedulerError> for ComplianceError {
    fn from(value: SchedulerError) -> Self {
        Self::Scheduler(value)
    }
}

impl From<StoreError> for ComplianceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<AuditError> for ComplianceError {
    fn from(value: AuditError) -> Self {
        Self::Audit(value)
    }
}

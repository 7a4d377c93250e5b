//! Scope resolution, rule matching, recurrence expansion and the obligation
//! lifecycle for compliance documents.

pub mod audit;
pub mod domain;
pub mod obligations;
pub mod recurrence;
pub mod rules;
pub mod scope;

pub use audit::{Actor, AuditError, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use domain::{
    DocumentType, EntityKind, ExtractedField, FieldValues, LifecycleStatus, OrgId, Organization,
    RecordId, ReportDefinition, Scope,
};
pub use obligations::{
    InMemoryObligationStore, Obligation, ObligationKey, ObligationScheduler, ObligationStatus,
    ObligationStore, SchedulerError,
};
pub use recurrence::{Frequency, RecurrenceBook, RecurrenceError, RecurrenceExpander, RecurrenceRule};
pub use rules::{
    BusinessRule, ConflictPolicy, MatchError, NormalizationRule, RuleMatcher, RuleRegistry,
    RuleSnapshot,
};
pub use scope::{Catalog, DefinitionCatalogs, OrganizationRegistry, ScopeError, ScopeResolver};

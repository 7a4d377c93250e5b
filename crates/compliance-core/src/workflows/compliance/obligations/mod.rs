//! Tracked compliance obligations: per-date schedules, the status state
//! machine, versioned storage and the scheduler service that owns writes.

pub mod domain;
pub mod repository;
pub(crate) mod schedule;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    DueDateState, Obligation, ObligationKey, ObligationStatus, ResponsibleParty, RiskLevel,
    ScheduledDate,
};
pub use repository::{InMemoryObligationStore, ObligationStore, StoreError};
pub use schedule::Transition;
pub use service::{
    ObligationFilter, ObligationRef, ObligationScheduler, SchedulerError, SweepFailure,
    SweepReport,
};

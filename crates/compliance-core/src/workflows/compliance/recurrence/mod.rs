//! Recurrence definitions and their expansion into due dates.

mod book;
mod due_rule;
mod expander;
mod rule;

pub use book::RecurrenceBook;
pub use due_rule::{DueConvention, Endpoint, Offset, Period};
pub use expander::{DueDateSchedule, RecurrenceExpander};
pub use rule::{ExplicitDate, Frequency, RecurrenceRule, SchedulerLogic};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecurrenceError {
    #[error(
        "{frequency} schedule yields {observed} periods per year but the rule declares {periods_per_year}"
    )]
    InconsistentFrequency {
        frequency: Frequency,
        periods_per_year: u32,
        observed: u32,
    },
    #[error("recurrence rule '{rule}' is invalid: {reason}")]
    InvalidRule { rule: String, reason: String },
    #[error("expansion would exceed {limit} occurrences")]
    HorizonTooLong { limit: usize },
}

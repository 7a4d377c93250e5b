//! Compliance configuration resolution and obligation scheduling.
//!
//! The crate is a library-level engine: it resolves template and
//! organization-scoped definitions, matches extracted document fields against
//! business and normalization rules, expands recurrence rules into due dates,
//! and owns the obligation lifecycle. Persistence, extraction, and
//! notification live behind the traits exposed here.

pub mod config;
pub mod error;
pub mod snapshot;
pub mod telemetry;
pub mod workflows;

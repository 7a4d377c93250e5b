//! Business and normalization rules: conditions, outputs, conflict policies
//! and the matcher that selects winning rules per field.

mod action;
mod condition;
mod matcher;
mod normalizer;
mod policy;
mod records;
mod registry;

pub use action::{ObligationTemplate, RuleAction};
pub use condition::{CompareOp, Comparison, Condition, ConditionParseError};
pub use matcher::{
    DocumentFields, MatchError, MatchOutcome, ObligationCandidate, ResolvedValue, RuleMatcher,
    ValueSource,
};
pub use normalizer::NormalizationKind;
pub use policy::{ConflictPolicy, PrecedenceCriterion, ResolutionAction};
pub use records::{BusinessRule, NormalizationRule, DEFAULT_PRIORITY};
pub use registry::{CompiledRule, RuleOrigin, RuleRegistry, RuleSnapshot};

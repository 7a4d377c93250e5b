use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::super::domain::{LifecycleStatus, OrgId, RecordId, Scope};
use super::registry::CompiledRule;

/// What to do when several active rules match the same field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    /// Take the highest-precedence candidate.
    #[default]
    FirstMatch,
    /// Fold lower-precedence outputs into unset keys of higher ones.
    Merge,
    /// Fail when the top candidates cannot be separated.
    RejectAmbiguous,
}

impl ResolutionAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::FirstMatch => "first_match",
            Self::Merge => "merge",
            Self::RejectAmbiguous => "reject_ambiguous",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceCriterion {
    /// Lower priority value first.
    Priority,
    /// Org scope before template scope.
    Scope,
    /// Higher version first.
    Version,
    /// Earlier creation first.
    CreatedAt,
}

impl PrecedenceCriterion {
    pub const DEFAULT_ORDER: [Self; 4] = [Self::Priority, Self::Scope, Self::Version, Self::CreatedAt];

    fn compare(self, a: &CompiledRule, b: &CompiledRule) -> Ordering {
        match self {
            Self::Priority => a.priority.cmp(&b.priority),
            Self::Scope => b.scope.specificity().cmp(&a.scope.specificity()),
            Self::Version => b.version.cmp(&a.version),
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
        }
    }
}

/// Stored conflict policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictPolicy {
    pub id: RecordId,
    #[serde(default = "template_scope")]
    pub scope: Scope,
    #[serde(default)]
    pub precedence_order: Vec<PrecedenceCriterion>,
    #[serde(default)]
    pub resolution_action: ResolutionAction,
    #[serde(default = "default_version")]
    pub version: u32,
    pub status: LifecycleStatus,
    #[serde(default)]
    pub notes: Option<String>,
}

fn template_scope() -> Scope {
    Scope::Template
}

fn default_version() -> u32 {
    1
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            id: RecordId(uuid::Uuid::nil()),
            scope: Scope::Template,
            precedence_order: PrecedenceCriterion::DEFAULT_ORDER.to_vec(),
            resolution_action: ResolutionAction::FirstMatch,
            version: 1,
            status: LifecycleStatus::Active,
            notes: None,
        }
    }
}

impl ConflictPolicy {
    /// Active policy for `org`: org scope beats template, then highest version.
    /// Falls back to first-match with the default precedence order.
    pub fn applicable(policies: &[ConflictPolicy], org: &OrgId) -> ConflictPolicy {
        policies
            .iter()
            .filter(|policy| policy.status.is_active() && policy.scope.is_visible_to(org))
            .max_by(|a, b| {
                a.scope
                    .specificity()
                    .cmp(&b.scope.specificity())
                    .then(a.version.cmp(&b.version))
                    .then(b.id.cmp(&a.id))
            })
            .cloned()
            .unwrap_or_default()
    }

    pub fn with_action(resolution_action: ResolutionAction) -> Self {
        Self {
            resolution_action,
            ..Self::default()
        }
    }

    /// Policy criteria first, then any default criteria the policy omits.
    pub fn criteria(&self) -> Vec<PrecedenceCriterion> {
        let mut order: Vec<PrecedenceCriterion> = Vec::with_capacity(4);
        for criterion in self
            .precedence_order
            .iter()
            .chain(PrecedenceCriterion::DEFAULT_ORDER.iter())
        {
            if !order.contains(criterion) {
                order.push(*criterion);
            }
        }
        order
    }

    /// Total order over candidates; record id settles anything left equal.
    pub fn compare(&self, a: &CompiledRule, b: &CompiledRule) -> Ordering {
        self.criteria()
            .into_iter()
            .map(|criterion| criterion.compare(a, b))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.id.cmp(&b.id))
    }

    /// Candidates with no strict separation: same priority, scope and version.
    pub fn is_tie(a: &CompiledRule, b: &CompiledRule) -> bool {
        a.priority == b.priority
            && a.scope.specificity() == b.scope.specificity()
            && a.version == b.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn policy(scope: Scope, version: u32, action: ResolutionAction) -> ConflictPolicy {
        ConflictPolicy {
            id: RecordId::new(),
            scope,
            version,
            ..ConflictPolicy::with_action(action)
        }
    }

    #[test]
    fn org_policy_beats_newer_template_policy() {
        let org = OrgId(Uuid::from_u128(7));
        let policies = vec![
            policy(Scope::Template, 5, ResolutionAction::Merge),
            policy(Scope::Org(org), 1, ResolutionAction::RejectAmbiguous),
            policy(Scope::Org(OrgId(Uuid::from_u128(8))), 9, ResolutionAction::FirstMatch),
        ];
        assert_eq!(
            ConflictPolicy::applicable(&policies, &org).resolution_action,
            ResolutionAction::RejectAmbiguous
        );
    }

    #[test]
    fn archived_policies_are_ignored() {
        let org = OrgId(Uuid::from_u128(7));
        let mut archived = policy(Scope::Template, 3, ResolutionAction::Merge);
        archived.status = LifecycleStatus::Archived;
        let chosen = ConflictPolicy::applicable(&[archived], &org);
        assert_eq!(chosen.resolution_action, ResolutionAction::FirstMatch);
        assert_eq!(chosen.criteria(), PrecedenceCriterion::DEFAULT_ORDER.to_vec());
    }

    #[test]
    fn partial_precedence_order_is_completed_with_defaults() {
        let policy = ConflictPolicy {
            precedence_order: vec![PrecedenceCriterion::Scope, PrecedenceCriterion::Scope],
            ..ConflictPolicy::default()
        };
        assert_eq!(
            policy.criteria(),
            vec![
                PrecedenceCriterion::Scope,
                PrecedenceCriterion::Priority,
                PrecedenceCriterion::Version,
                PrecedenceCriterion::CreatedAt
            ]
        );
    }
}

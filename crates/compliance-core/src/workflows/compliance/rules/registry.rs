use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use super::super::domain::{OrgId, RecordId, Scope};
use super::super::scope::{DefinitionCatalogs, EffectiveDefinition, ScopeError, ScopeResolver};
use super::action::ObligationTemplate;
use super::condition::Condition;
use super::normalizer::NormalizationKind;
use super::policy::ConflictPolicy;
use super::records::{BusinessRule, NormalizationRule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "normalizer", rename_all = "snake_case")]
pub enum RuleOrigin {
    Business,
    Normalization(Option<NormalizationKind>),
}

/// A scope-resolved rule flattened into the shape the matcher consumes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledRule {
    pub id: RecordId,
    pub key: String,
    pub origin: RuleOrigin,
    pub scope: Scope,
    pub document_type_id: Option<RecordId>,
    pub condition: Condition,
    /// Target field to structured output.
    pub outputs: BTreeMap<String, Value>,
    pub obligations: Vec<ObligationTemplate>,
    pub priority: i32,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl CompiledRule {
    pub fn from_business(effective: EffectiveDefinition<BusinessRule>) -> Self {
        let priority = effective.definition.effective_priority();
        let rule = effective.definition;
        let action = rule.action.unwrap_or_default();
        Self {
            id: effective.source_id,
            key: rule.key,
            origin: RuleOrigin::Business,
            scope: effective.source_scope,
            document_type_id: rule.document_type_id,
            condition: rule.condition.unwrap_or(Condition::Always),
            outputs: action.set,
            obligations: action.obligations,
            priority,
            version: rule.version,
            created_at: rule.created_at,
        }
    }

    pub fn from_normalization(effective: EffectiveDefinition<NormalizationRule>) -> Self {
        let priority = effective.definition.effective_priority();
        let rule = effective.definition;
        let mut outputs = BTreeMap::new();
        outputs.insert(rule.field, rule.normalized_value.unwrap_or(Value::Null));
        Self {
            id: effective.source_id,
            key: rule.key,
            origin: RuleOrigin::Normalization(rule.rule_type),
            scope: effective.source_scope,
            document_type_id: rule.document_type_id,
            condition: rule.pattern.unwrap_or(Condition::Always),
            outputs,
            obligations: Vec::new(),
            priority,
            version: rule.version,
            created_at: rule.created_at,
        }
    }

    /// Whether the rule belongs to one of the document types in `lineage`.
    pub fn applies_to(&self, lineage: &[RecordId]) -> bool {
        match self.document_type_id {
            Some(document_type) => lineage.contains(&document_type),
            None => true,
        }
    }
}

/// Immutable view of an organization's effective rules at one revision.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSnapshot {
    pub org: OrgId,
    pub revision: u64,
    pub policy: ConflictPolicy,
    pub rules: Vec<CompiledRule>,
}

impl RuleSnapshot {
    /// Resolve every business and normalization rule visible to `org`.
    pub fn compile(
        resolver: &ScopeResolver,
        catalogs: &DefinitionCatalogs,
        policies: &[ConflictPolicy],
        org: &OrgId,
        revision: u64,
    ) -> Result<Self, ScopeError> {
        let business = resolver
            .resolve_all(&catalogs.business_rules, org)?
            .into_iter()
            .map(CompiledRule::from_business);
        let normalization = resolver
            .resolve_all(&catalogs.normalization_rules, org)?
            .into_iter()
            .map(CompiledRule::from_normalization);

        Ok(Self {
            org: *org,
            revision,
            policy: ConflictPolicy::applicable(policies, org),
            rules: business.chain(normalization).collect(),
        })
    }
}

/// Publishes rule snapshots per organization. Readers hold an `Arc` to the
/// snapshot they started with, so a publish never changes an in-flight match.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    snapshots: RwLock<HashMap<OrgId, Arc<RuleSnapshot>>>,
    revision: AtomicU64,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(
        &self,
        resolver: &ScopeResolver,
        catalogs: &DefinitionCatalogs,
        policies: &[ConflictPolicy],
        org: &OrgId,
    ) -> Result<Arc<RuleSnapshot>, ScopeError> {
        let revision = self.revision.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(RuleSnapshot::compile(
            resolver, catalogs, policies, org, revision,
        )?);

        self.snapshots
            .write()
            .expect("rule registry lock poisoned")
            .insert(*org, Arc::clone(&snapshot));

        info!(
            %org,
            revision,
            rules = snapshot.rules.len(),
            policy = snapshot.policy.resolution_action.label(),
            "published rule snapshot"
        );
        Ok(snapshot)
    }

    pub fn snapshot(&self, org: &OrgId) -> Option<Arc<RuleSnapshot>> {
        self.snapshots
            .read()
            .expect("rule registry lock poisoned")
            .get(org)
            .cloned()
    }
}

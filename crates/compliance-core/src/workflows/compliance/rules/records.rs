use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::domain::{EntityKind, LifecycleStatus, RecordId, Scope};
use super::super::scope::{fill, ScopedRecord};
use super::action::RuleAction;
use super::condition::Condition;
use super::normalizer::NormalizationKind;

/// Precedence assumed when neither a rule nor its ancestors set one.
pub const DEFAULT_PRIORITY: i32 = 100;

/// Rule deriving field outputs and obligations from a classified document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusinessRule {
    pub id: RecordId,
    pub key: String,
    pub scope: Scope,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    /// Document type the rule belongs to; `None` applies to every type.
    #[serde(default)]
    pub document_type_id: Option<RecordId>,
    /// `None` matches every document.
    #[serde(default)]
    pub condition: Option<Condition>,
    #[serde(default)]
    pub action: Option<RuleAction>,
    /// Lower value wins.
    #[serde(default)]
    pub priority: Option<i32>,
    pub status: LifecycleStatus,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Rule normalizing one extracted field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationRule {
    pub id: RecordId,
    pub key: String,
    pub scope: Scope,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
    #[serde(default)]
    pub document_type_id: Option<RecordId>,
    /// Field key the rule normalizes.
    pub field: String,
    #[serde(default)]
    pub rule_type: Option<NormalizationKind>,
    /// Condition the raw values must satisfy for the rule to apply.
    #[serde(default)]
    pub pattern: Option<Condition>,
    #[serde(default)]
    pub normalized_value: Option<Value>,
    #[serde(default)]
    pub priority: Option<i32>,
    pub status: LifecycleStatus,
    #[serde(default = "default_version")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

impl BusinessRule {
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

impl NormalizationRule {
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(DEFAULT_PRIORITY)
    }
}

impl ScopedRecord for BusinessRule {
    const KIND: EntityKind = EntityKind::BusinessRule;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    fn status(&self) -> LifecycleStatus {
        self.status
    }

    fn inherit_from(&mut self, ancestor: &Self) {
        fill(&mut self.document_type_id, &ancestor.document_type_id);
        fill(&mut self.condition, &ancestor.condition);
        fill(&mut self.action, &ancestor.action);
        fill(&mut self.priority, &ancestor.priority);
        fill(&mut self.description, &ancestor.description);
    }
}

impl ScopedRecord for NormalizationRule {
    const KIND: EntityKind = EntityKind::NormalizationRule;

    fn id(&self) -> RecordId {
        self.id
    }

    fn key(&self) -> &str {
        &self.key
    }

    fn scope(&self) -> Scope {
        self.scope
    }

    fn parent_id(&self) -> Option<RecordId> {
        self.parent_id
    }

    fn status(&self) -> LifecycleStatus {
        self.status
    }

    fn inherit_from(&mut self, ancestor: &Self) {
        fill(&mut self.document_type_id, &ancestor.document_type_id);
        fill(&mut self.rule_type, &ancestor.rule_type);
        fill(&mut self.pattern, &ancestor.pattern);
        fill(&mut self.normalized_value, &ancestor.normalized_value);
        fill(&mut self.priority, &ancestor.priority);
    }

    fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("normalization rule has no target field".to_string());
        }
        Ok(())
    }
}

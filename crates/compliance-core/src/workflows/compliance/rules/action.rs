use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::super::obligations::{ObligationKey, ResponsibleParty, RiskLevel};
use super::super::recurrence::Frequency;

/// Structured output of a business rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    /// Field key to output value.
    #[serde(default)]
    pub set: BTreeMap<String, Value>,
    /// Compliance duties implied when the rule matches.
    #[serde(default)]
    pub obligations: Vec<ObligationTemplate>,
}

/// Obligation a matched rule asks the scheduler to track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObligationTemplate {
    pub key: ObligationKey,
    pub title: String,
    #[serde(default)]
    pub section: Option<String>,
    pub frequency: Frequency,
    #[serde(default)]
    pub due_rule: Option<String>,
    /// Key of a stored recurrence rule; the frequency's standard rule otherwise.
    #[serde(default)]
    pub recurrence_rule: Option<String>,
    #[serde(default)]
    pub responsible_party: Option<ResponsibleParty>,
    #[serde(default)]
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub dependencies: BTreeSet<ObligationKey>,
}

/// Shallow merge of a lower-precedence output into `target`: only keys that
/// are missing or null in `target` are taken from `later`.
pub(crate) fn merge_output(target: &mut Value, later: &Value) {
    if target.is_null() {
        *target = later.clone();
        return;
    }

    if let (Value::Object(current), Value::Object(incoming)) = (target, later) {
        for (key, value) in incoming {
            let slot = current.entry(key.clone()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = value.clone();
            }
        }
    }
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::super::audit::{Actor, AuditEvent};
use super::super::domain::{DocumentType, FieldValues, OrgId, RecordId, Scope};
use super::super::scope::EffectiveDefinition;
use super::action::{merge_output, ObligationTemplate};
use super::normalizer::fill_normalized;
use super::policy::{ConflictPolicy, ResolutionAction};
use super::registry::{CompiledRule, RuleOrigin, RuleSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("ambiguous rule match for field '{field}': rules {}", join_ids(.rule_ids))]
    AmbiguousRuleMatch {
        field: String,
        rule_ids: Vec<RecordId>,
    },
}

fn join_ids(ids: &[RecordId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValueSource {
    Rule {
        winning: RecordId,
        scope: Scope,
        /// Every rule whose output shaped the value, in precedence order.
        contributors: Vec<RecordId>,
    },
    /// No rule matched; the raw value is passed through.
    PassThrough,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedValue {
    pub field: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub source: ValueSource,
}

/// Obligation a matched business rule implies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObligationCandidate {
    pub template: ObligationTemplate,
    pub rule_id: RecordId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub snapshot_revision: u64,
    pub values: BTreeMap<String, ResolvedValue>,
    pub obligations: Vec<ObligationCandidate>,
}

impl MatchOutcome {
    /// One audit event per field decided by a rule.
    pub fn audit_events(
        &self,
        actor: &Actor,
        org: OrgId,
        document_id: Option<RecordId>,
        at: DateTime<Utc>,
    ) -> Vec<AuditEvent> {
        self.values
            .values()
            .filter_map(|resolved| match &resolved.source {
                ValueSource::Rule {
                    winning,
                    scope,
                    contributors,
                } => Some(AuditEvent {
                    actor: actor.clone(),
                    org_id: org,
                    scope: *scope,
                    record_id: document_id.unwrap_or(*winning),
                    action: "rule_match".to_string(),
                    diff: json!({
                        "field": resolved.field,
                        "raw": resolved.raw,
                        "value": resolved.value,
                        "winning_rule": winning,
                        "contributors": contributors,
                        "snapshot_revision": self.snapshot_revision,
                    }),
                    at,
                }),
                ValueSource::PassThrough => None,
            })
            .collect()
    }
}

/// One document in a batch match.
#[derive(Debug, Clone)]
pub struct DocumentFields {
    pub document_id: Option<RecordId>,
    /// Effective document type id followed by its ancestors.
    pub document_types: Vec<RecordId>,
    pub fields: FieldValues,
}

/// Evaluates extracted fields against one rule snapshot.
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    snapshot: Arc<RuleSnapshot>,
}

impl RuleMatcher {
    pub fn new(snapshot: Arc<RuleSnapshot>) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &RuleSnapshot {
        &self.snapshot
    }

    /// Match against the rules attached to a resolved document type or any
    /// of its ancestors.
    pub fn match_document(
        &self,
        document_type: &EffectiveDefinition<DocumentType>,
        fields: &FieldValues,
    ) -> Result<MatchOutcome, MatchError> {
        self.match_fields(&document_type.lineage, fields)
    }

    pub fn match_fields(
        &self,
        document_types: &[RecordId],
        fields: &FieldValues,
    ) -> Result<MatchOutcome, MatchError> {
        let policy = &self.snapshot.policy;

        let mut candidates: Vec<&CompiledRule> = self
            .snapshot
            .rules
            .iter()
            .filter(|rule| rule.applies_to(document_types) && rule.condition.evaluate(fields))
            .collect();
        candidates.sort_by(|a, b| policy.compare(a, b));

        let mut by_field: BTreeMap<&str, Vec<(&CompiledRule, &Value)>> = BTreeMap::new();
        for rule in candidates.iter().copied() {
            for (field, output) in &rule.outputs {
                by_field.entry(field.as_str()).or_default().push((rule, output));
            }
        }

        let mut values = BTreeMap::new();
        for (field, ranked) in &by_field {
            let resolved = resolve_field(policy, field, ranked, fields)?;
            values.insert(field.to_string(), resolved);
        }

        for (field, extracted) in fields {
            values
                .entry(field.clone())
                .or_insert_with(|| ResolvedValue {
                    field: field.clone(),
                    value: extracted.value.clone(),
                    raw: Some(extracted.value.clone()),
                    confidence: extracted.confidence,
                    source: ValueSource::PassThrough,
                });
        }

        let mut seen = BTreeSet::new();
        let obligations = candidates
            .iter()
            .filter(|rule| rule.origin == RuleOrigin::Business)
            .flat_map(|rule| {
                rule.obligations.iter().map(move |template| ObligationCandidate {
                    template: template.clone(),
                    rule_id: rule.id,
                })
            })
            .filter(|candidate| seen.insert(candidate.template.key.clone()))
            .collect();

        debug!(
            revision = self.snapshot.revision,
            matched = candidates.len(),
            fields = by_field.len(),
            "matched document fields"
        );

        Ok(MatchOutcome {
            snapshot_revision: self.snapshot.revision,
            values,
            obligations,
        })
    }

    /// Match many documents in parallel against the same snapshot.
    pub fn match_batch(&self, documents: &[DocumentFields]) -> Vec<Result<MatchOutcome, MatchError>> {
        documents
            .par_iter()
            .map(|document| self.match_fields(&document.document_types, &document.fields))
            .collect()
    }
}

fn resolve_field(
    policy: &ConflictPolicy,
    field: &str,
    ranked: &[(&CompiledRule, &Value)],
    fields: &FieldValues,
) -> Result<ResolvedValue, MatchError> {
    let extracted = fields.get(field);
    let raw = extracted.map(|extracted| &extracted.value);
    let output_of = |rule: &CompiledRule, output: &Value| {
        let mut output = output.clone();
        if let (RuleOrigin::Normalization(Some(kind)), Some(raw)) = (rule.origin, raw) {
            fill_normalized(kind, raw, &mut output);
        }
        output
    };

    let (winner, first_output) = ranked[0];
    let mut contributors = vec![winner.id];

    let value = match policy.resolution_action {
        ResolutionAction::FirstMatch => output_of(winner, first_output),
        ResolutionAction::Merge => {
            let mut merged = output_of(winner, first_output);
            for &(rule, output) in &ranked[1..] {
                merge_output(&mut merged, &output_of(rule, output));
                contributors.push(rule.id);
            }
            merged
        }
        ResolutionAction::RejectAmbiguous => {
            let tied: Vec<RecordId> = ranked
                .iter()
                .filter(|(rule, _)| ConflictPolicy::is_tie(winner, rule))
                .map(|(rule, _)| rule.id)
                .collect();
            if tied.len() > 1 {
                warn!(field, rules = %join_ids(&tied), "ambiguous rule match rejected");
                return Err(MatchError::AmbiguousRuleMatch {
                    field: field.to_string(),
                    rule_ids: tied,
                });
            }
            output_of(winner, first_output)
        }
    };

    Ok(ResolvedValue {
        field: field.to_string(),
        value,
        raw: raw.cloned(),
        confidence: extracted.and_then(|extracted| extracted.confidence),
        source: ValueSource::Rule {
            winning: winner.id,
            scope: winner.scope,
            contributors,
        },
    })
}

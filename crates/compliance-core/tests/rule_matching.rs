use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use compliance_core::config::ResolverConfig;
use compliance_core::workflows::compliance::audit::Actor;
use compliance_core::workflows::compliance::domain::{
    DocumentType, ExtractedField, FieldValues, LifecycleStatus, OrgId, Organization, RecordId,
    Scope,
};
use compliance_core::workflows::compliance::rules::{
    BusinessRule, CompareOp, Comparison, Condition, ConflictPolicy, MatchError, NormalizationKind,
    NormalizationRule, ResolutionAction, RuleAction, RuleRegistry, RuleMatcher, ValueSource,
};
use compliance_core::workflows::compliance::scope::{
    Catalog, DefinitionCatalogs, OrganizationRegistry, ScopeResolver,
};
use serde_json::json;
use uuid::Uuid;

fn org() -> OrgId {
    OrgId(Uuid::from_u128(0x0A))
}

fn id(n: u128) -> RecordId {
    RecordId(Uuid::from_u128(n))
}

fn directory() -> OrganizationRegistry {
    OrganizationRegistry::new([Organization {
        id: org(),
        name: "Riverside CDE".to_string(),
        active: true,
    }])
}

fn resolver() -> ScopeResolver {
    ScopeResolver::new(ResolverConfig::default(), Arc::new(directory()))
}

fn quarterly_report() -> DocumentType {
    DocumentType {
        id: id(100),
        key: "quarterly_report".to_string(),
        scope: Scope::Template,
        parent_id: None,
        display_name: Some("Quarterly Report".to_string()),
        version: Some("1.0".to_string()),
        status: LifecycleStatus::Active,
        category: None,
        workflow_state: None,
        notes: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn business_rule(n: u128, key: &str, scope: Scope, priority: i32, output: serde_json::Value) -> BusinessRule {
    let mut set = BTreeMap::new();
    set.insert("reporting_status".to_string(), output);
    BusinessRule {
        id: id(n),
        key: key.to_string(),
        scope,
        parent_id: None,
        document_type_id: Some(id(100)),
        condition: Some(Condition::Compare(Comparison {
            field: "total_qlici".to_string(),
            op: CompareOp::Gt,
            value: json!(1_000_000),
        })),
        action: Some(RuleAction {
            set,
            obligations: Vec::new(),
        }),
        priority: Some(priority),
        status: LifecycleStatus::Active,
        version: 1,
        description: None,
        created_at: Utc.with_ymd_and_hms(2025, 1, (n % 28) as u32 + 1, 0, 0, 0).unwrap(),
    }
}

fn date_rule() -> NormalizationRule {
    NormalizationRule {
        id: id(50),
        key: "closing_date_iso".to_string(),
        scope: Scope::Template,
        parent_id: None,
        document_type_id: None,
        field: "closing_date".to_string(),
        rule_type: Some(NormalizationKind::DateFormat),
        pattern: Some(Condition::Exists("closing_date".to_string())),
        normalized_value: None,
        priority: None,
        status: LifecycleStatus::Active,
        version: 1,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn catalogs(rules: Vec<BusinessRule>) -> DefinitionCatalogs {
    let directory = directory();
    DefinitionCatalogs {
        document_types: Catalog::build([quarterly_report()], &directory).unwrap(),
        business_rules: Catalog::build(rules, &directory).unwrap(),
        normalization_rules: Catalog::build([date_rule()], &directory).unwrap(),
        report_definitions: Catalog::default(),
    }
}

fn fields() -> FieldValues {
    let mut fields = FieldValues::new();
    fields.insert(
        "total_qlici".to_string(),
        ExtractedField::new(json!(2_500_000), Some(0.97)),
    );
    fields.insert(
        "closing_date".to_string(),
        ExtractedField::new(json!("03/31/2025"), Some(0.91)),
    );
    fields.insert(
        "borrower_name".to_string(),
        ExtractedField::new(json!("Maple Street Clinic"), Some(0.8)),
    );
    fields
}

fn matcher_for(rules: Vec<BusinessRule>, policy: ConflictPolicy) -> RuleMatcher {
    let registry = RuleRegistry::new();
    let snapshot = registry
        .publish(&resolver(), &catalogs(rules), &[policy], &org())
        .expect("snapshot publishes");
    RuleMatcher::new(snapshot)
}

fn policy(action: ResolutionAction) -> ConflictPolicy {
    ConflictPolicy {
        id: id(900),
        ..ConflictPolicy::with_action(action)
    }
}

#[test]
fn distinct_priorities_match_the_same_way_regardless_of_row_order() {
    let rules = vec![
        business_rule(1, "large_deal_template", Scope::Template, 20, json!("enhanced")),
        business_rule(2, "large_deal_riverside", Scope::Org(org()), 10, json!("riverside_enhanced")),
        business_rule(3, "large_deal_fallback", Scope::Template, 30, json!("standard")),
    ];
    let mut reversed = rules.clone();
    reversed.reverse();

    let forward = matcher_for(rules, policy(ResolutionAction::FirstMatch))
        .match_fields(&[id(100)], &fields())
        .unwrap();
    let backward = matcher_for(reversed, policy(ResolutionAction::FirstMatch))
        .match_fields(&[id(100)], &fields())
        .unwrap();

    assert_eq!(forward.values, backward.values);
    assert_eq!(forward.values["reporting_status"].value, json!("riverside_enhanced"));
}

#[test]
fn reject_ambiguous_names_every_tied_rule() {
    let rules = vec![
        business_rule(1, "large_deal_a", Scope::Template, 10, json!("enhanced")),
        business_rule(2, "large_deal_b", Scope::Template, 10, json!("standard")),
    ];
    let matcher = matcher_for(rules, policy(ResolutionAction::RejectAmbiguous));

    match matcher.match_fields(&[id(100)], &fields()) {
        Err(MatchError::AmbiguousRuleMatch { field, mut rule_ids }) => {
            assert_eq!(field, "reporting_status");
            rule_ids.sort();
            assert_eq!(rule_ids, vec![id(1), id(2)]);
        }
        other => panic!("expected ambiguous match, got {other:?}"),
    }
}

#[test]
fn unmatched_fields_pass_through_and_normalizers_apply() {
    let matcher = matcher_for(
        vec![business_rule(1, "large_deal", Scope::Template, 10, json!("enhanced"))],
        ConflictPolicy::default(),
    );
    let outcome = matcher.match_fields(&[id(100)], &fields()).unwrap();

    let borrower = &outcome.values["borrower_name"];
    assert_eq!(borrower.source, ValueSource::PassThrough);
    assert_eq!(borrower.value, json!("Maple Street Clinic"));

    let closing = &outcome.values["closing_date"];
    assert_eq!(closing.value, json!({ "value": "2025-03-31" }));
    assert_eq!(closing.raw, Some(json!("03/31/2025")));

    let events = outcome.audit_events(&Actor::System, org(), Some(id(7)), Utc::now());
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|event| event.action == "rule_match"));
}

#[test]
fn in_flight_matches_keep_their_snapshot() {
    let registry = RuleRegistry::new();
    let policies = [ConflictPolicy::default()];
    let first = registry
        .publish(
            &resolver(),
            &catalogs(vec![business_rule(1, "large_deal", Scope::Template, 10, json!("enhanced"))]),
            &policies,
            &org(),
        )
        .unwrap();
    let matcher = RuleMatcher::new(first);

    let mut edited = business_rule(1, "large_deal", Scope::Template, 10, json!("standard"));
    edited.version = 2;
    registry
        .publish(&resolver(), &catalogs(vec![edited]), &policies, &org())
        .unwrap();

    let outcome = matcher.match_fields(&[id(100)], &fields()).unwrap();
    assert_eq!(outcome.snapshot_revision, 1);
    assert_eq!(outcome.values["reporting_status"].value, json!("enhanced"));

    let latest = RuleMatcher::new(registry.snapshot(&org()).unwrap());
    let outcome = latest.match_fields(&[id(100)], &fields()).unwrap();
    assert_eq!(outcome.snapshot_revision, 2);
    assert_eq!(outcome.values["reporting_status"].value, json!("standard"));
}

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use compliance_core::config::{RecurrenceConfig, SchedulerConfig};
use compliance_core::workflows::compliance::audit::{Actor, InMemoryAuditSink};
use compliance_core::workflows::compliance::domain::{
    ExtractedField, FieldValues, LifecycleStatus, OrgId, RecordId, Scope,
};
use compliance_core::workflows::compliance::obligations::{
    DueDateState, InMemoryObligationStore, ObligationKey, ObligationScheduler, ObligationStatus,
    ObligationStore, ResponsibleParty, RiskLevel,
};
use compliance_core::workflows::compliance::recurrence::{
    Frequency, RecurrenceBook, RecurrenceExpander, RecurrenceRule,
};
use compliance_core::workflows::compliance::rules::{
    CompiledRule, Condition, ConflictPolicy, ObligationCandidate, ObligationTemplate, RuleMatcher,
    RuleOrigin, RuleSnapshot,
};
use serde_json::json;
use uuid::Uuid;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap()
}

fn org() -> OrgId {
    OrgId(Uuid::from_u128(0x0A))
}

fn quarterly_rule() -> RecurrenceRule {
    RecurrenceRule {
        id: RecordId(Uuid::from_u128(40)),
        key: "quarterly".to_string(),
        frequency: Frequency::Quarterly,
        periods_per_year: 4,
        scheduler_logic: "calendar".to_string(),
        default_period_endpoints: "end".to_string(),
        version: 1,
        status: LifecycleStatus::Active,
    }
}

fn template(key: &str, frequency: Frequency, dependencies: &[&str]) -> ObligationTemplate {
    ObligationTemplate {
        key: ObligationKey::new(key),
        title: key.replace('_', " "),
        section: None,
        frequency,
        due_rule: None,
        recurrence_rule: None,
        responsible_party: Some(ResponsibleParty::Cde),
        risk: Some(RiskLevel::Medium),
        dependencies: dependencies.iter().map(|d| ObligationKey::new(*d)).collect(),
    }
}

fn closing_rule(obligations: Vec<ObligationTemplate>) -> CompiledRule {
    CompiledRule {
        id: RecordId(Uuid::from_u128(1)),
        key: "qlici_closing".to_string(),
        origin: RuleOrigin::Business,
        scope: Scope::Template,
        document_type_id: None,
        condition: Condition::Exists("closing_date".to_string()),
        outputs: Default::default(),
        obligations,
        priority: 10,
        version: 1,
        created_at: at(2025, 1, 1),
    }
}

fn closing_fields() -> FieldValues {
    let mut fields = FieldValues::new();
    fields.insert(
        "closing_date".to_string(),
        ExtractedField::new(json!("2025-01-15"), Some(0.95)),
    );
    fields
}

fn scheduler(
    book: RecurrenceBook,
) -> (
    ObligationScheduler<InMemoryObligationStore, InMemoryAuditSink>,
    Arc<InMemoryObligationStore>,
    Arc<InMemoryAuditSink>,
) {
    let store = Arc::new(InMemoryObligationStore::new());
    let audit = Arc::new(InMemoryAuditSink::new());
    let scheduler = ObligationScheduler::new(
        Arc::clone(&store),
        Arc::clone(&audit),
        RecurrenceExpander::new(RecurrenceConfig::default()),
        book,
        SchedulerConfig::default(),
    );
    (scheduler, store, audit)
}

#[test]
fn quarterly_rule_over_one_year_yields_four_dates() {
    let expander = RecurrenceExpander::new(RecurrenceConfig::default());
    let rule = quarterly_rule();

    let first: Vec<_> = expander
        .expand(&rule, date(2025, 1, 15), date(2026, 1, 15))
        .unwrap()
        .collect();
    let second: Vec<_> = expander
        .expand(&rule, date(2025, 1, 15), date(2026, 1, 15))
        .unwrap()
        .collect();

    assert_eq!(first, second);
    assert_eq!(
        first,
        vec![date(2025, 3, 31), date(2025, 6, 30), date(2025, 9, 30), date(2025, 12, 31)]
    );
    assert!(first[0] >= date(2025, 1, 15));
}

#[test]
fn expansion_length_tracks_periods_per_year() {
    let expander = RecurrenceExpander::new(RecurrenceConfig::default());
    for (frequency, per_year) in [
        (Frequency::Annual, 1usize),
        (Frequency::SemiAnnual, 2),
        (Frequency::Quarterly, 4),
        (Frequency::Monthly, 12),
    ] {
        let rule = RecurrenceRule::standard(frequency);
        let count = expander
            .expand(&rule, date(2025, 2, 10), date(2028, 2, 10))
            .unwrap()
            .count();
        let expected = per_year * 3;
        assert!(
            count.abs_diff(expected) <= 1,
            "{frequency}: expected about {expected}, got {count}"
        );
    }
}

#[test]
fn matched_documents_become_scheduled_obligations() {
    let matcher = RuleMatcher::new(Arc::new(RuleSnapshot {
        org: org(),
        revision: 1,
        policy: ConflictPolicy::default(),
        rules: vec![closing_rule(vec![
            template("quarterly_compliance_report", Frequency::Quarterly, &[]),
            template("annual_audit", Frequency::Annual, &[]),
        ])],
    }));
    let outcome = matcher.match_fields(&[], &closing_fields()).unwrap();
    assert_eq!(outcome.obligations.len(), 2);

    let (scheduler, store, audit) = scheduler(RecurrenceBook::new([quarterly_rule()]));
    let document = RecordId(Uuid::from_u128(77));
    for candidate in &outcome.obligations {
        scheduler
            .create_from_candidate(
                org(),
                Some(document),
                candidate,
                date(2025, 1, 15),
                &Actor::User("closing-bot".to_string()),
                at(2025, 1, 15),
            )
            .unwrap();
    }

    let stored = store.list(&org()).unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|o| o.document_id == Some(document)));
    let quarterly = store
        .fetch(&org(), &ObligationKey::new("quarterly_compliance_report"))
        .unwrap()
        .unwrap();
    assert_eq!(quarterly.next_due_date, Some(date(2025, 3, 31)));
    assert_eq!(quarterly.source_rule, Some(RecordId(Uuid::from_u128(1))));
    assert_eq!(audit.len(), 2);
}

#[test]
fn past_due_obligations_waiting_on_dependencies_stay_hidden() {
    let (scheduler, store, _) = scheduler(RecurrenceBook::default());
    let rule_id = RecordId(Uuid::from_u128(1));
    for template in [
        template("annual_audit", Frequency::Annual, &[]),
        template("investor_certification", Frequency::Quarterly, &["annual_audit"]),
    ] {
        let candidate = ObligationCandidate {
            template,
            rule_id,
        };
        scheduler
            .create_from_candidate(org(), None, &candidate, date(2025, 1, 15), &Actor::System, at(2025, 1, 15))
            .unwrap();
    }

    let report = scheduler.sweep(at(2025, 4, 5)).unwrap();
    assert_eq!(report.held.len(), 1);

    let certification = store
        .fetch(&org(), &ObligationKey::new("investor_certification"))
        .unwrap()
        .unwrap();
    assert_eq!(certification.status, ObligationStatus::Open);
    assert!(certification.has_missed_dates(date(2025, 4, 5)));

    let visible: BTreeSet<_> = scheduler
        .actionable(&org())
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert!(visible.contains(&ObligationKey::new("annual_audit")));
    assert!(!visible.contains(&ObligationKey::new("investor_certification")));
}

#[test]
fn changing_the_recurrence_never_drops_resolved_dates() {
    let (scheduler, _, _) = scheduler(RecurrenceBook::default());
    let mut monthly = template("monthly_servicing_report", Frequency::Monthly, &[]);
    monthly.due_rule = Some("15 days after month end".to_string());
    let candidate = ObligationCandidate {
        template: monthly,
        rule_id: RecordId(Uuid::from_u128(1)),
    };
    let key = ObligationKey::new("monthly_servicing_report");
    let created = scheduler
        .create_from_candidate(org(), None, &candidate, date(2025, 1, 1), &Actor::System, at(2025, 1, 1))
        .unwrap();
    assert_eq!(created.next_due_date, Some(date(2025, 2, 15)));

    let analyst = Actor::User("analyst@riverside.org".to_string());
    scheduler
        .resolve_date(org(), &key, date(2025, 2, 15), DueDateState::Satisfied, &analyst, at(2025, 2, 10))
        .unwrap();
    scheduler
        .resolve_date(org(), &key, date(2025, 3, 15), DueDateState::Waived, &analyst, at(2025, 3, 1))
        .unwrap();

    let moved = scheduler
        .reschedule(org(), &key, date(2025, 6, 1), &analyst, at(2025, 3, 20))
        .unwrap();

    let resolved: Vec<_> = moved
        .computed_due_dates
        .iter()
        .filter(|d| d.state.is_resolved())
        .map(|d| (d.due, d.state))
        .collect();
    assert_eq!(
        resolved,
        vec![
            (date(2025, 2, 15), DueDateState::Satisfied),
            (date(2025, 3, 15), DueDateState::Waived)
        ]
    );
    assert_eq!(moved.next_due_date, Some(date(2025, 7, 15)));
}

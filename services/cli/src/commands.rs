use crate::infra::{instant, parse_date, parse_org, print_json};
use chrono::NaiveDate;
use clap::Args;
use compliance_core::config::EngineConfig;
use compliance_core::error::ComplianceError;
use compliance_core::snapshot::ConfigurationSnapshot;
use compliance_core::workflows::compliance::audit::{Actor, AuditSink, TracingAuditSink};
use compliance_core::workflows::compliance::domain::{
    EntityKind, FieldValues, LifecycleStatus, OrgId, RecordId,
};
use compliance_core::workflows::compliance::obligations::Obligation;
use compliance_core::workflows::compliance::recurrence::{
    Frequency, RecurrenceExpander, RecurrenceRule,
};
use compliance_core::workflows::compliance::rules::MatchOutcome;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Args, Debug)]
pub(crate) struct ResolveArgs {
    /// Configuration snapshot (JSON)
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Organization id
    #[arg(long, value_parser = parse_org)]
    pub(crate) org: OrgId,
    /// document_type, business_rule, normalization_rule or report_definition
    #[arg(long)]
    pub(crate) kind: EntityKind,
    #[arg(long)]
    pub(crate) key: String,
}

#[derive(Args, Debug)]
pub(crate) struct MatchArgs {
    /// Configuration snapshot (JSON)
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Organization id
    #[arg(long, value_parser = parse_org)]
    pub(crate) org: OrgId,
    /// Key of the document type the document was classified as
    #[arg(long)]
    pub(crate) document_type: String,
    /// Extracted fields (JSON object of field -> {value, confidence})
    #[arg(long)]
    pub(crate) fields: PathBuf,
    /// Anchor date (YYYY-MM-DD); when set, implied obligations are scheduled
    #[arg(long, value_parser = parse_date)]
    pub(crate) anchor: Option<NaiveDate>,
    /// Actor recorded on audit events
    #[arg(long, default_value = "cli")]
    pub(crate) actor: String,
}

#[derive(Args, Debug)]
pub(crate) struct ExpandArgs {
    #[arg(long)]
    pub(crate) frequency: Frequency,
    #[arg(long)]
    pub(crate) periods_per_year: u32,
    /// First date of the schedule (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) anchor: NaiveDate,
    /// Last date considered, inclusive (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) horizon: NaiveDate,
    /// calendar, anchor, fiscal_year_start=MM-DD or dates=...
    #[arg(long, default_value = "calendar")]
    pub(crate) logic: String,
    /// end, start, end+30d, start-1m, ...
    #[arg(long, default_value = "end")]
    pub(crate) endpoints: String,
    /// Free-form due rule such as "45 days after quarter end"
    #[arg(long)]
    pub(crate) due_rule: Option<String>,
}

pub(crate) fn run_resolve(args: ResolveArgs, config: &EngineConfig) -> Result<(), ComplianceError> {
    let ResolveArgs {
        snapshot,
        org,
        kind,
        key,
    } = args;

    let compiled = ConfigurationSnapshot::load(snapshot)?.compile(config)?;
    let resolved = compiled
        .catalogs
        .resolve(&compiled.resolver, &key, &org, kind)?;
    print_json(&resolved)
}

#[derive(Serialize)]
struct MatchReport<'a> {
    document_type: &'a str,
    outcome: &'a MatchOutcome,
    scheduled: Vec<Obligation>,
}

pub(crate) fn run_match(args: MatchArgs, config: &EngineConfig) -> Result<(), ComplianceError> {
    let MatchArgs {
        snapshot,
        org,
        document_type,
        fields,
        anchor,
        actor,
    } = args;

    let snapshot = ConfigurationSnapshot::load(snapshot)?;
    let compiled = snapshot.compile(config)?;
    let fields: FieldValues = serde_json::from_str(&fs::read_to_string(fields)?)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;

    let effective = compiled
        .resolver
        .resolve(&compiled.catalogs.document_types, &document_type, &org)?;
    let outcome = compiled.matcher(&org)?.match_document(&effective, &fields)?;

    let now = instant(None);
    let actor = Actor::User(actor);
    let document_id = RecordId::new();
    let audit = Arc::new(TracingAuditSink);
    for event in outcome.audit_events(&actor, org, Some(document_id), now) {
        audit.record(event)?;
    }

    let mut scheduled = Vec::new();
    if let Some(anchor) = anchor {
        let scheduler = compiled.scheduler(
            Arc::new(snapshot.obligation_store()),
            audit,
            config.scheduler.clone(),
        );
        for candidate in &outcome.obligations {
            scheduled.push(scheduler.create_from_candidate(
                org,
                Some(document_id),
                candidate,
                anchor,
                &actor,
                now,
            )?);
        }
    }

    print_json(&MatchReport {
        document_type: &document_type,
        outcome: &outcome,
        scheduled,
    })
}

pub(crate) fn run_expand(args: ExpandArgs, config: &EngineConfig) -> Result<(), ComplianceError> {
    let ExpandArgs {
        frequency,
        periods_per_year,
        anchor,
        horizon,
        logic,
        endpoints,
        due_rule,
    } = args;

    let rule = RecurrenceRule {
        id: RecordId(Uuid::nil()),
        key: frequency.label().to_string(),
        frequency,
        periods_per_year,
        scheduler_logic: logic,
        default_period_endpoints: endpoints,
        version: 1,
        status: LifecycleStatus::Active,
    };
    let expander = RecurrenceExpander::new(config.recurrence.clone());
    let dates: Vec<NaiveDate> = expander
        .expand_with(&rule, anchor, horizon, due_rule.as_deref())?
        .collect();
    print_json(&dates)
}

use crate::infra::{instant, parse_date, print_json};
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use compliance_core::config::EngineConfig;
use compliance_core::error::ComplianceError;
use compliance_core::snapshot::ConfigurationSnapshot;
use compliance_core::workflows::compliance::audit::{AuditSink, TracingAuditSink};
use compliance_core::workflows::compliance::domain::OrgId;
use compliance_core::workflows::compliance::obligations::{
    Obligation, ObligationScheduler, ObligationStore, SweepReport,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Args, Debug)]
pub(crate) struct SweepArgs {
    /// Configuration snapshot (JSON) holding the obligations to sweep
    #[arg(long)]
    pub(crate) snapshot: PathBuf,
    /// Sweep as of this date (YYYY-MM-DD). Defaults to now.
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Repeat the sweep every N seconds until interrupted
    #[arg(long)]
    pub(crate) every: Option<u64>,
}

#[derive(Serialize)]
struct SweepOutput {
    at: DateTime<Utc>,
    report: SweepReport,
    organizations: Vec<OrganizationView>,
}

#[derive(Serialize)]
struct OrganizationView {
    org_id: OrgId,
    obligations: Vec<Obligation>,
    actionable: Vec<Obligation>,
}

pub(crate) async fn run_sweep(args: SweepArgs, config: &EngineConfig) -> Result<(), ComplianceError> {
    let SweepArgs {
        snapshot,
        today,
        every,
    } = args;

    let snapshot = ConfigurationSnapshot::load(snapshot)?;
    let compiled = snapshot.compile(config)?;
    let scheduler = compiled.scheduler(
        Arc::new(snapshot.obligation_store()),
        Arc::new(TracingAuditSink),
        config.scheduler.clone(),
    );
    let organizations: Vec<OrgId> = snapshot
        .organizations
        .iter()
        .filter(|organization| organization.active)
        .map(|organization| organization.id)
        .collect();

    let Some(seconds) = every else {
        return sweep_once(&scheduler, &organizations, instant(today));
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(seconds.max(1)));
    info!(seconds, "running overdue sweep on an interval");
    loop {
        tokio::select! {
            _ = ticker.tick() => sweep_once(&scheduler, &organizations, instant(today))?,
            _ = tokio::signal::ctrl_c() => {
                info!("sweep interrupted, shutting down");
                return Ok(());
            }
        }
    }
}

fn sweep_once<S, A>(
    scheduler: &ObligationScheduler<S, A>,
    organizations: &[OrgId],
    now: DateTime<Utc>,
) -> Result<(), ComplianceError>
where
    S: ObligationStore + 'static,
    A: AuditSink + 'static,
{
    let report = scheduler.sweep(now)?;

    let mut views = Vec::with_capacity(organizations.len());
    for org in organizations {
        views.push(OrganizationView {
            org_id: *org,
            obligations: scheduler.store().list(org)?,
            actionable: scheduler.actionable(org)?,
        });
    }

    print_json(&SweepOutput {
        at: now,
        report,
        organizations: views,
    })
}

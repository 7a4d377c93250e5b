use crate::commands::{run_expand, run_match, run_resolve, ExpandArgs, MatchArgs, ResolveArgs};
use crate::sweep::{run_sweep, SweepArgs};
use clap::{Parser, Subcommand};
use compliance_core::config::EngineConfig;
use compliance_core::error::ComplianceError;
use compliance_core::telemetry;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(
    name = "compliance",
    about = "Resolve scoped configuration, match documents and schedule compliance obligations",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve the effective definition of a key for an organization
    Resolve(ResolveArgs),
    /// Match extracted document fields against an organization's rules
    Match(MatchArgs),
    /// Expand a recurrence rule into due dates
    Expand(ExpandArgs),
    /// Run the overdue sweep over the snapshot's obligations
    Sweep(SweepArgs),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Resolve(_) => "resolve",
            Command::Match(_) => "match",
            Command::Expand(_) => "expand",
            Command::Sweep(_) => "sweep",
        }
    }
}

pub(crate) async fn run() -> Result<(), ComplianceError> {
    let cli = Cli::parse();
    let config = EngineConfig::load()?;
    telemetry::init(&config.telemetry)?;
    debug!(?config.environment, command = cli.command.name(), "compliance engine configured");

    match cli.command {
        Command::Resolve(args) => run_resolve(args, &config),
        Command::Match(args) => run_match(args, &config),
        Command::Expand(args) => run_expand(args, &config),
        Command::Sweep(args) => run_sweep(args, &config).await,
    }
}

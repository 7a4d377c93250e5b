mod cli;
mod commands;
mod infra;
mod sweep;

use compliance_core::error::ComplianceError;

pub async fn run() -> Result<(), ComplianceError> {
    cli::run().await
}

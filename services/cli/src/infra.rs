use chrono::{DateTime, NaiveDate, Utc};
use compliance_core::error::ComplianceError;
use compliance_core::workflows::compliance::domain::OrgId;
use serde::Serialize;
use std::io;
use uuid::Uuid;

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn parse_org(raw: &str) -> Result<OrgId, String> {
    Uuid::parse_str(raw.trim())
        .map(OrgId)
        .map_err(|err| format!("failed to parse '{raw}' as an organization id ({err})"))
}

/// Start of `today` in UTC, or the current instant when no date was given.
pub(crate) fn instant(today: Option<NaiveDate>) -> DateTime<Utc> {
    match today.and_then(|date| date.and_hms_opt(0, 0, 0)) {
        Some(start) => start.and_utc(),
        None => Utc::now(),
    }
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), ComplianceError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    println!("{rendered}");
    Ok(())
}

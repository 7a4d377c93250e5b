use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::super::domain::{LifecycleStatus, RecordId};
use super::due_rule::DueConvention;
use super::RecurrenceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    OneTime,
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
    Weekly,
    Daily,
    /// Irregular calendar driven by an explicit date list.
    Custom,
}

impl Frequency {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OneTime => "one_time",
            Self::Annual => "annual",
            Self::SemiAnnual => "semi_annual",
            Self::Quarterly => "quarterly",
            Self::Monthly => "monthly",
            Self::Weekly => "weekly",
            Self::Daily => "daily",
            Self::Custom => "custom",
        }
    }

    /// Periods a regular year holds; `None` for one-time and custom schedules.
    pub const fn nominal_periods_per_year(self) -> Option<u32> {
        match self {
            Self::Annual => Some(1),
            Self::SemiAnnual => Some(2),
            Self::Quarterly => Some(4),
            Self::Monthly => Some(12),
            Self::Weekly => Some(52),
            Self::Daily => Some(365),
            Self::OneTime | Self::Custom => None,
        }
    }

    /// Whether a period count may drift with the calendar (53-week years, leap days).
    pub const fn is_day_based(self) -> bool {
        matches!(self, Self::Weekly | Self::Daily)
    }

    pub(crate) const fn step(self) -> Option<Step> {
        match self {
            Self::Annual => Some(Step::Months(12)),
            Self::SemiAnnual => Some(Step::Months(6)),
            Self::Quarterly => Some(Step::Months(3)),
            Self::Monthly => Some(Step::Months(1)),
            Self::Weekly => Some(Step::Days(7)),
            Self::Daily => Some(Step::Days(1)),
            Self::OneTime | Self::Custom => None,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "one_time" | "once" => Ok(Self::OneTime),
            "annual" | "annually" | "yearly" => Ok(Self::Annual),
            "semi_annual" | "semiannual" => Ok(Self::SemiAnnual),
            "quarterly" => Ok(Self::Quarterly),
            "monthly" => Ok(Self::Monthly),
            "weekly" => Ok(Self::Weekly),
            "daily" => Ok(Self::Daily),
            "custom" | "irregular" => Ok(Self::Custom),
            other => Err(format!("unknown frequency '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Months(u32),
    Days(i64),
}

/// Stored recurrence definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub id: RecordId,
    pub key: String,
    pub frequency: Frequency,
    pub periods_per_year: u32,
    /// `calendar`, `anchor`, `fiscal_year_start=MM-DD` or `dates=...`.
    #[serde(default = "default_scheduler_logic")]
    pub scheduler_logic: String,
    /// `end`, `start`, optionally with an offset such as `end+30d` or `start-1m`.
    #[serde(default = "default_period_endpoints")]
    pub default_period_endpoints: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub status: LifecycleStatus,
}

fn default_scheduler_logic() -> String {
    "calendar".to_string()
}

fn default_period_endpoints() -> String {
    "end".to_string()
}

fn default_version() -> u32 {
    1
}

impl RecurrenceRule {
    /// Calendar-aligned rule due at each period end, used when no stored rule applies.
    pub fn standard(frequency: Frequency) -> Self {
        Self {
            id: RecordId(uuid::Uuid::nil()),
            key: frequency.label().to_string(),
            frequency,
            periods_per_year: frequency.nominal_periods_per_year().unwrap_or(1),
            scheduler_logic: default_scheduler_logic(),
            default_period_endpoints: default_period_endpoints(),
            version: 1,
            status: LifecycleStatus::Active,
        }
    }

    pub fn logic(&self) -> Result<SchedulerLogic, RecurrenceError> {
        self.scheduler_logic
            .parse()
            .map_err(|reason| RecurrenceError::InvalidRule {
                rule: self.key.clone(),
                reason,
            })
    }

    pub fn endpoints(&self) -> Result<DueConvention, RecurrenceError> {
        self.default_period_endpoints
            .parse()
            .map_err(|reason| RecurrenceError::InvalidRule {
                rule: self.key.clone(),
                reason,
            })
    }
}

/// How periods are aligned, or the explicit calendar replacing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerLogic {
    /// Periods start on calendar boundaries (Jan 1, quarter starts, ISO weeks).
    Calendar,
    /// Periods start on the anchor date itself.
    Anchor,
    /// Periods start on the fiscal year start.
    FiscalYear { month: u32, day: u32 },
    /// Due dates come from an explicit list; no fixed interval.
    Explicit(Vec<ExplicitDate>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplicitDate {
    /// Recurs every year on this month/day.
    Annual { month: u32, day: u32 },
    Fixed(NaiveDate),
}

impl FromStr for SchedulerLogic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lowered = trimmed.to_ascii_lowercase();

        if lowered.is_empty() || lowered == "calendar" {
            return Ok(Self::Calendar);
        }
        if lowered == "anchor" {
            return Ok(Self::Anchor);
        }
        if let Some(rest) = lowered.strip_prefix("fiscal_year_start=") {
            let (month, day) = parse_month_day(rest)?;
            return Ok(Self::FiscalYear { month, day });
        }
        if let Some(rest) = lowered.strip_prefix("dates=") {
            let dates = rest
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(parse_explicit_date)
                .collect::<Result<Vec<_>, _>>()?;
            if dates.is_empty() {
                return Err("explicit date list is empty".to_string());
            }
            return Ok(Self::Explicit(dates));
        }

        Err(format!("unrecognized scheduler logic '{trimmed}'"))
    }
}

fn parse_explicit_date(raw: &str) -> Result<ExplicitDate, String> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(ExplicitDate::Fixed(date));
    }
    let (month, day) = parse_month_day(raw)?;
    Ok(ExplicitDate::Annual { month, day })
}

fn parse_month_day(raw: &str) -> Result<(u32, u32), String> {
    let (month, day) = raw
        .trim()
        .split_once('-')
        .ok_or_else(|| format!("expected MM-DD, found '{raw}'"))?;
    let month: u32 = month
        .parse()
        .map_err(|_| format!("invalid month in '{raw}'"))?;
    let day: u32 = day.parse().map_err(|_| format!("invalid day in '{raw}'"))?;

    // 2024 is a leap year, so Feb 29 is accepted here and skipped in other years.
    if NaiveDate::from_ymd_opt(2024, month, day).is_none() {
        return Err(format!("'{raw}' is not a calendar day"));
    }
    Ok((month, day))
}

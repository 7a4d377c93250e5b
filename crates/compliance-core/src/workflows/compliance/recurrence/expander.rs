use chrono::{Datelike, Duration, Months, NaiveDate};
use std::collections::BTreeSet;

use super::due_rule::{DueConvention, Period};
use super::rule::{ExplicitDate, Frequency, RecurrenceRule, SchedulerLogic, Step};
use super::RecurrenceError;
use crate::config::RecurrenceConfig;

/// Expands recurrence rules into due dates. Pure: the same inputs always
/// produce the same sequence.
#[derive(Debug, Clone, Default)]
pub struct RecurrenceExpander {
    config: RecurrenceConfig,
}

impl RecurrenceExpander {
    pub fn new(config: RecurrenceConfig) -> Self {
        Self { config }
    }

    /// Due dates of `rule` from the period containing `anchor` through
    /// `horizon_end` (inclusive), using the rule's endpoint convention.
    pub fn expand(
        &self,
        rule: &RecurrenceRule,
        anchor: NaiveDate,
        horizon_end: NaiveDate,
    ) -> Result<DueDateSchedule, RecurrenceError> {
        self.expand_with(rule, anchor, horizon_end, None)
    }

    /// Like [`expand`](Self::expand), but an obligation's due rule text
    /// replaces the endpoint convention when it can be interpreted.
    pub fn expand_with(
        &self,
        rule: &RecurrenceRule,
        anchor: NaiveDate,
        horizon_end: NaiveDate,
        due_rule: Option<&str>,
    ) -> Result<DueDateSchedule, RecurrenceError> {
        let logic = self.validate(rule)?;
        let convention = match due_rule.and_then(DueConvention::from_due_rule) {
            Some(convention) => convention,
            None => rule.endpoints()?,
        };

        if horizon_end < anchor {
            return Ok(DueDateSchedule::empty());
        }

        if let SchedulerLogic::Explicit(entries) = &logic {
            let dates = explicit_dates(entries, anchor, horizon_end);
            if dates.len() > self.config.max_occurrences {
                return Err(RecurrenceError::HorizonTooLong {
                    limit: self.config.max_occurrences,
                });
            }
            return Ok(DueDateSchedule::from_dates(dates));
        }

        let Some(step) = rule.frequency.step() else {
            let due = convention.apply(&Period {
                start: anchor,
                end: anchor,
            });
            let dates = due
                .into_iter()
                .filter(|date| *date >= anchor && *date <= horizon_end)
                .collect();
            return Ok(DueDateSchedule::from_dates(dates));
        };

        if estimated_occurrences(step, anchor, horizon_end) > self.config.max_occurrences {
            return Err(RecurrenceError::HorizonTooLong {
                limit: self.config.max_occurrences,
            });
        }

        let base = period_base(&logic, step, anchor);
        Ok(DueDateSchedule {
            source: Source::Periodic {
                base,
                step,
                convention,
                index: 0,
            },
            anchor,
            horizon_end,
            last: None,
        })
    }

    /// Check a rule's parameters and the declared period count against its frequency.
    pub fn validate(&self, rule: &RecurrenceRule) -> Result<SchedulerLogic, RecurrenceError> {
        let logic = rule.logic()?;
        rule.endpoints()?;

        let inconsistent = |observed: u32| RecurrenceError::InconsistentFrequency {
            frequency: rule.frequency,
            periods_per_year: rule.periods_per_year,
            observed,
        };

        if let SchedulerLogic::Explicit(entries) = &logic {
            // Declared count is advisory here; zero means "not declared".
            let observed = explicit_per_year(entries);
            if rule.periods_per_year > 0
                && observed.abs_diff(rule.periods_per_year) > self.config.frequency_tolerance
            {
                return Err(inconsistent(observed));
            }
            return Ok(logic);
        }

        match (rule.frequency, rule.frequency.nominal_periods_per_year()) {
            (Frequency::Custom, _) => Err(RecurrenceError::InvalidRule {
                rule: rule.key.clone(),
                reason: "custom frequency needs an explicit `dates=` list".to_string(),
            }),
            (Frequency::OneTime, _) if rule.periods_per_year > 1 => Err(inconsistent(1)),
            (frequency, Some(nominal)) => {
                let tolerance = if frequency.is_day_based() {
                    self.config.frequency_tolerance
                } else {
                    0
                };
                if nominal.abs_diff(rule.periods_per_year) > tolerance {
                    Err(inconsistent(nominal))
                } else {
                    Ok(logic)
                }
            }
            (_, None) => Ok(logic),
        }
    }
}

/// Lazy, finite sequence of due dates in ascending order.
#[derive(Debug, Clone)]
pub struct DueDateSchedule {
    source: Source,
    anchor: NaiveDate,
    horizon_end: NaiveDate,
    last: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
enum Source {
    Periodic {
        base: NaiveDate,
        step: Step,
        convention: DueConvention,
        index: u32,
    },
    Listed(std::vec::IntoIter<NaiveDate>),
    Exhausted,
}

impl DueDateSchedule {
    fn empty() -> Self {
        Self {
            source: Source::Exhausted,
            anchor: NaiveDate::MIN,
            horizon_end: NaiveDate::MIN,
            last: None,
        }
    }

    fn from_dates(dates: Vec<NaiveDate>) -> Self {
        Self {
            source: Source::Listed(dates.into_iter()),
            anchor: NaiveDate::MIN,
            horizon_end: NaiveDate::MAX,
            last: None,
        }
    }

    fn next_periodic(&mut self) -> Option<NaiveDate> {
        loop {
            let Source::Periodic {
                base,
                step,
                convention,
                index,
            } = &mut self.source
            else {
                return None;
            };

            let period = period_at(*base, *step, *index)?;
            *index += 1;
            let due = convention.apply(&period)?;

            if due > self.horizon_end {
                return None;
            }
            if due < self.anchor || self.last == Some(due) {
                continue;
            }
            return Some(due);
        }
    }
}

impl Iterator for DueDateSchedule {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<Self::Item> {
        let next = if matches!(self.source, Source::Periodic { .. }) {
            self.next_periodic()
        } else if let Source::Listed(dates) = &mut self.source {
            dates.next()
        } else {
            None
        };

        match next {
            Some(date) => {
                self.last = Some(date);
                Some(date)
            }
            None => {
                self.source = Source::Exhausted;
                None
            }
        }
    }
}

/// Period `index` counted from `base`. Offsets are computed from the base, not
/// chained, so month-end clamping never drifts.
fn period_at(base: NaiveDate, step: Step, index: u32) -> Option<Period> {
    let start_of = |k: u32| -> Option<NaiveDate> {
        match step {
            Step::Months(months) => base.checked_add_months(Months::new(months.checked_mul(k)?)),
            Step::Days(days) => {
                base.checked_add_signed(Duration::try_days(days.checked_mul(i64::from(k))?)?)
            }
        }
    };

    let start = start_of(index)?;
    let end = start_of(index.checked_add(1)?)?.pred_opt()?;
    Some(Period { start, end })
}

/// Start of the period containing `anchor`.
fn period_base(logic: &SchedulerLogic, step: Step, anchor: NaiveDate) -> NaiveDate {
    match (logic, step) {
        (SchedulerLogic::Anchor, _) | (_, Step::Days(1)) => anchor,
        (SchedulerLogic::FiscalYear { month, day }, step) => {
            let fiscal_start = fiscal_year_start(anchor, *month, *day);
            advance_to_anchor(fiscal_start, step, anchor)
        }
        (_, Step::Months(months)) => {
            let zero_based = anchor.month0() / months * months;
            NaiveDate::from_ymd_opt(anchor.year(), zero_based + 1, 1).unwrap_or(anchor)
        }
        (_, Step::Days(_)) => {
            anchor - Duration::days(i64::from(anchor.weekday().num_days_from_monday()))
        }
    }
}

fn fiscal_year_start(anchor: NaiveDate, month: u32, day: u32) -> NaiveDate {
    let in_year = |year: i32| {
        NaiveDate::from_ymd_opt(year, month, day)
            .or_else(|| NaiveDate::from_ymd_opt(year, month, day - 1))
            .unwrap_or(anchor)
    };
    let this_year = in_year(anchor.year());
    if this_year <= anchor {
        this_year
    } else {
        in_year(anchor.year() - 1)
    }
}

/// Last period boundary on or before `anchor`, walking from `origin`.
fn advance_to_anchor(origin: NaiveDate, step: Step, anchor: NaiveDate) -> NaiveDate {
    let mut index = 0u32;
    let mut current = origin;
    while let Some(period) = period_at(origin, step, index) {
        if period.start > anchor {
            break;
        }
        current = period.start;
        index += 1;
    }
    current
}

fn estimated_occurrences(step: Step, anchor: NaiveDate, horizon_end: NaiveDate) -> usize {
    let span = match step {
        Step::Months(months) => {
            let elapsed = (horizon_end.year() - anchor.year()) * 12
                + horizon_end.month() as i32
                - anchor.month() as i32;
            elapsed.max(0) as i64 / i64::from(months)
        }
        Step::Days(days) => (horizon_end - anchor).num_days() / days,
    };
    usize::try_from(span).unwrap_or(usize::MAX).saturating_add(2)
}

fn explicit_dates(
    entries: &[ExplicitDate],
    anchor: NaiveDate,
    horizon_end: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates = BTreeSet::new();
    for entry in entries {
        match *entry {
            ExplicitDate::Fixed(date) => {
                dates.insert(date);
            }
            ExplicitDate::Annual { month, day } => {
                // Feb 29 only occurs in leap years.
                dates.extend(
                    (anchor.year()..=horizon_end.year())
                        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day)),
                );
            }
        }
    }

    dates
        .into_iter()
        .filter(|date| *date >= anchor && *date <= horizon_end)
        .collect()
}

/// Occurrences per year an explicit list implies: every annual entry plus the
/// busiest year of fixed dates.
fn explicit_per_year(entries: &[ExplicitDate]) -> u32 {
    let mut annual = 0u32;
    let mut fixed_by_year = std::collections::BTreeMap::<i32, u32>::new();
    for entry in entries {
        match entry {
            ExplicitDate::Annual { .. } => annual += 1,
            ExplicitDate::Fixed(date) => *fixed_by_year.entry(date.year()).or_default() += 1,
        }
    }
    annual + fixed_by_year.values().copied().max().unwrap_or(0)
}

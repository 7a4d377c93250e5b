use chrono::{Duration, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// Boundary of a period a due date is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offset {
    Days(i64),
    Months(i32),
}

/// Largest offset either grammar accepts, about ten years either way.
pub const MAX_OFFSET_DAYS: i64 = 3660;
pub const MAX_OFFSET_MONTHS: i64 = 120;

impl Offset {
    /// `sign * count` units, or `None` when it overflows or exceeds the bounds above.
    fn scaled(sign: i64, count: i64, unit: char) -> Option<Self> {
        let (per_unit, months) = match unit {
            'd' => (1, false),
            'w' => (7, false),
            'm' => (1, true),
            'y' => (12, true),
            _ => return None,
        };
        let amount = count.checked_mul(per_unit)?.checked_mul(sign)?;
        if months {
            if amount.abs() > MAX_OFFSET_MONTHS {
                return None;
            }
            i32::try_from(amount).ok().map(Offset::Months)
        } else if amount.abs() > MAX_OFFSET_DAYS {
            None
        } else {
            Some(Offset::Days(amount))
        }
    }
}

/// Inclusive bounds of one recurrence period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// "Due N units after/before the period start/end".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueConvention {
    pub from: Endpoint,
    pub offset: Offset,
}

impl DueConvention {
    pub const PERIOD_END: Self = Self {
        from: Endpoint::End,
        offset: Offset::Days(0),
    };

    pub fn apply(&self, period: &Period) -> Option<NaiveDate> {
        let base = match self.from {
            Endpoint::Start => period.start,
            Endpoint::End => period.end,
        };

        match self.offset {
            Offset::Days(days) => base.checked_add_signed(Duration::try_days(days)?),
            Offset::Months(months) if months >= 0 => {
                base.checked_add_months(Months::new(months.unsigned_abs()))
            }
            Offset::Months(months) => base.checked_sub_months(Months::new(months.unsigned_abs())),
        }
    }

    /// Interpret an obligation's free-form due rule, e.g. "45 days after quarter end".
    ///
    /// Returns `None` when the text does not describe an offset from a period
    /// boundary; callers then keep the recurrence rule's own convention.
    pub fn from_due_rule(text: &str) -> Option<Self> {
        if let Ok(convention) = text.parse::<Self>() {
            return Some(convention);
        }

        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .collect();

        let has_any = |words: &[&str]| tokens.iter().any(|token| words.contains(token));
        let from = if has_any(&["start", "beginning", "begin", "commencement"]) {
            Endpoint::Start
        } else {
            Endpoint::End
        };
        let sign = if has_any(&["before", "prior"]) { -1 } else { 1 };

        let amount = tokens
            .iter()
            .position(|token| token.parse::<u32>().is_ok())
            .and_then(|index| {
                let count = tokens[index].parse::<i64>().ok()?;
                let unit = tokens.get(index + 1)?;
                Some((count, *unit))
            });

        match amount {
            Some((count, unit)) => {
                let unit = ["day", "week", "month", "year"]
                    .into_iter()
                    .find(|name| unit.starts_with(name))
                    .and_then(|name| name.chars().next())?;
                let offset = Offset::scaled(sign, count, unit)?;
                Some(Self { from, offset })
            }
            None if has_any(&["end", "start", "beginning"]) => Some(Self {
                from,
                offset: Offset::Days(0),
            }),
            None => None,
        }
    }
}

impl Default for DueConvention {
    fn default() -> Self {
        Self::PERIOD_END
    }
}

impl FromStr for DueConvention {
    type Err = String;

    /// Structured form: `end`, `start`, `end+30d`, `start-2w`, `end+1m`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        let lowered = lowered.strip_prefix("period_").unwrap_or(&lowered);

        let split_at = lowered.find(['+', '-']);
        let (endpoint, offset) = match split_at {
            Some(index) => lowered.split_at(index),
            None => (lowered, ""),
        };

        let from = match endpoint.trim() {
            "end" => Endpoint::End,
            "start" => Endpoint::Start,
            other => return Err(format!("unknown period endpoint '{other}'")),
        };

        if offset.is_empty() {
            return Ok(Self {
                from,
                offset: Offset::Days(0),
            });
        }

        let sign: i64 = if offset.starts_with('-') { -1 } else { 1 };
        let body = offset[1..].trim();
        let digits_end = body
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(body.len());
        let (digits, unit) = body.split_at(digits_end);
        let count: i64 = digits
            .parse()
            .map_err(|_| format!("invalid offset '{offset}'"))?;

        let unit = match unit.trim() {
            "" | "d" => 'd',
            "w" => 'w',
            "m" => 'm',
            other => return Err(format!("unknown offset unit '{other}'")),
        };
        let offset = Offset::scaled(sign, count, unit).ok_or_else(|| {
            format!(
                "offset '{offset}' exceeds {MAX_OFFSET_DAYS} days or {MAX_OFFSET_MONTHS} months"
            )
        })?;

        Ok(Self { from, offset })
    }
}

impl fmt::Display for DueConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let endpoint = match self.from {
            Endpoint::Start => "start",
            Endpoint::End => "end",
        };
        match self.offset {
            Offset::Days(0) => write!(f, "{endpoint}"),
            Offset::Days(days) => write!(f, "{endpoint}{days:+}d"),
            Offset::Months(months) => write!(f, "{endpoint}{months:+}m"),
        }
    }
}

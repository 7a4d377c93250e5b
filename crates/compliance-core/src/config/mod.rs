use std::env;
use std::fmt;

/// Distinguishes runtime behavior for different stages of the engine host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

const DEFAULT_MAX_HIERARCHY_DEPTH: usize = 32;
const DEFAULT_MAX_RECONCILE_RETRIES: u32 = 5;
const DEFAULT_FREQUENCY_TOLERANCE: u32 = 1;
const DEFAULT_MAX_OCCURRENCES: usize = 1000;
const DEFAULT_SCHEDULE_HORIZON_MONTHS: u32 = 24;

/// Top-level configuration for the compliance engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub environment: AppEnvironment,
    pub resolver: ResolverConfig,
    pub recurrence: RecurrenceConfig,
    pub scheduler: SchedulerConfig,
    pub telemetry: TelemetryConfig,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("COMPLIANCE_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let max_hierarchy_depth = read_positive(
            "COMPLIANCE_MAX_HIERARCHY_DEPTH",
            DEFAULT_MAX_HIERARCHY_DEPTH,
        )?;
        let max_reconcile_retries = read_positive(
            "COMPLIANCE_MAX_RECONCILE_RETRIES",
            DEFAULT_MAX_RECONCILE_RETRIES,
        )?;
        let max_occurrences =
            read_positive("COMPLIANCE_MAX_OCCURRENCES", DEFAULT_MAX_OCCURRENCES)?;
        let horizon_months = read_positive(
            "COMPLIANCE_SCHEDULE_HORIZON_MONTHS",
            DEFAULT_SCHEDULE_HORIZON_MONTHS,
        )?;
        let frequency_tolerance = match env::var("COMPLIANCE_FREQUENCY_TOLERANCE") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .map_err(|_| ConfigError::InvalidNumber {
                    variable: "COMPLIANCE_FREQUENCY_TOLERANCE",
                    value: raw,
                })?,
            Err(_) => DEFAULT_FREQUENCY_TOLERANCE,
        };

        let log_level = env::var("COMPLIANCE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            environment,
            resolver: ResolverConfig {
                max_hierarchy_depth,
            },
            recurrence: RecurrenceConfig {
                frequency_tolerance,
                max_occurrences,
            },
            scheduler: SchedulerConfig {
                max_reconcile_retries,
                horizon_months,
            },
            telemetry: TelemetryConfig { log_level },
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            environment: AppEnvironment::Development,
            resolver: ResolverConfig::default(),
            recurrence: RecurrenceConfig::default(),
            scheduler: SchedulerConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

fn read_positive<T>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let raw = match env::var(variable) {
        Ok(raw) => raw,
        Err(_) => return Ok(default),
    };

    let value = raw
        .trim()
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber {
            variable,
            value: raw.clone(),
        })?;

    if value <= T::default() {
        return Err(ConfigError::MustBePositive { variable });
    }

    Ok(value)
}

/// Bounds applied while walking definition parent chains.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub max_hierarchy_depth: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_hierarchy_depth: DEFAULT_MAX_HIERARCHY_DEPTH,
        }
    }
}

/// Recurrence expansion limits.
#[derive(Debug, Clone)]
pub struct RecurrenceConfig {
    /// Allowed divergence between explicit date counts and `periods_per_year`.
    pub frequency_tolerance: u32,
    /// Upper bound on the number of due dates a single expansion may yield.
    pub max_occurrences: usize,
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            frequency_tolerance: DEFAULT_FREQUENCY_TOLERANCE,
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }
}

/// Obligation write controls.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub max_reconcile_retries: u32,
    /// How far past "today" obligation schedules are expanded.
    pub horizon_months: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_reconcile_retries: DEFAULT_MAX_RECONCILE_RETRIES,
            horizon_months: DEFAULT_SCHEDULE_HORIZON_MONTHS,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidNumber {
        variable: &'static str,
        value: String,
    },
    MustBePositive {
        variable: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidNumber { variable, value } => {
                write!(f, "{variable} must be a non-negative integer (found '{value}')")
            }
            ConfigError::MustBePositive { variable } => {
                write!(f, "{variable} must be greater than zero")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

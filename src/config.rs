//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to parse {var}: {value}")]
    ParseError { var: String, value: String },
}

/// What the scheduler does when a stage's dependency graph contains a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Append the unresolved checks in registration order and keep going
    Fallback,
    /// Refuse to run the stage
    Reject,
}

impl FromStr for CyclePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fallback" => Ok(CyclePolicy::Fallback),
            "reject" => Ok(CyclePolicy::Reject),
            other => Err(ConfigError::InvalidValue(format!(
                "GOV_CYCLE_POLICY must be 'fallback' or 'reject', got '{}'",
                other
            ))),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

/// Check execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionConfig {
    pub default_timeout_ms: u64,
    pub parallel_levels: bool,
    pub cycle_policy: CyclePolicy,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
            parallel_levels: false,
            cycle_policy: CyclePolicy::Fallback,
        }
    }
}

/// Compliance scoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Control/framework score at or above which the status is compliant
    pub compliant_threshold: f64,
    /// Score at or above which the status is partially compliant
    pub partial_threshold: f64,
    /// Framework scores (0-100) below this raise an alert on the gate decision
    pub alert_score_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            compliant_threshold: 0.9,
            partial_threshold: 0.7,
            alert_score_threshold: 70.0,
        }
    }
}

/// Catalog sources loaded at startup
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogConfig {
    pub frameworks_path: Option<PathBuf>,
    pub policy_rules_path: Option<PathBuf>,
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub execution: ExecutionConfig,
    pub scoring: ScoringConfig,
    pub catalog: CatalogConfig,
    pub history_capacity: usize,
    pub log_format: LogFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            execution: ExecutionConfig::default(),
            scoring: ScoringConfig::default(),
            catalog: CatalogConfig::default(),
            history_capacity: 100,
            log_format: LogFormat::Compact,
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup (environment, test maps)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Settings::default();

        let execution = ExecutionConfig {
            default_timeout_ms: parse_or(&lookup, "GOV_DEFAULT_CHECK_TIMEOUT_MS", defaults.execution.default_timeout_ms)?,
            parallel_levels: parse_or(&lookup, "GOV_PARALLEL_LEVELS", defaults.execution.parallel_levels)?,
            cycle_policy: match lookup("GOV_CYCLE_POLICY") {
                Some(v) => v.parse()?,
                None => defaults.execution.cycle_policy,
            },
        };

        let scoring = ScoringConfig {
            compliant_threshold: parse_or(&lookup, "GOV_COMPLIANT_THRESHOLD", defaults.scoring.compliant_threshold)?,
            partial_threshold: parse_or(&lookup, "GOV_PARTIAL_THRESHOLD", defaults.scoring.partial_threshold)?,
            alert_score_threshold: parse_or(&lookup, "GOV_ALERT_SCORE_THRESHOLD", defaults.scoring.alert_score_threshold)?,
        };

        let catalog = CatalogConfig {
            frameworks_path: lookup("GOV_FRAMEWORKS_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            policy_rules_path: lookup("GOV_POLICY_RULES_PATH")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        };

        let log_format = match lookup("LOG_FORMAT").map(|s| s.to_lowercase()) {
            Some(f) if f == "json" => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let settings = Self {
            execution,
            scoring,
            catalog,
            history_capacity: parse_or(&lookup, "GOV_HISTORY_CAPACITY", defaults.history_capacity)?,
            log_format,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Reject threshold combinations the scorer cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        if !(0.0..=1.0).contains(&s.partial_threshold) || !(0.0..=1.0).contains(&s.compliant_threshold) {
            return Err(ConfigError::InvalidValue(
                "compliance thresholds must lie in [0, 1]".to_string(),
            ));
        }
        if s.partial_threshold > s.compliant_threshold {
            return Err(ConfigError::InvalidValue(format!(
                "partial threshold {} exceeds compliant threshold {}",
                s.partial_threshold, s.compliant_threshold
            )));
        }
        if self.execution.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "GOV_DEFAULT_CHECK_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "GOV_HISTORY_CAPACITY must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, var: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::ParseError {
            var: var.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

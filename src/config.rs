//! Analysis Configuration
//!
//! Defines the TOML configuration for the analysis engine and scheduler:
//! scheduling intervals, batch limits, scoring weights, and the gap inference
//! lookup tables. Every section is optional and falls back to defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main analysis configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AnalysisConfig {
    pub basic: BasicConfig,
    pub schedule: ScheduleConfig,
    pub data_processing: DataProcessingConfig,
    pub analysis: ScoringConfig,
    pub gap_inference: GapInferenceConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    /// Enable/disable the analysis engine
    pub enabled: bool,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Job intervals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub analysis_interval_hours: u64,

    /// Deep analysis is only registered when this is set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_analysis_interval_days: Option<u64>,

    pub monthly_summary_interval_days: u64,
    pub quarterly_report_interval_days: u64,
    pub health_check_interval_minutes: u64,

    /// A firing later than this is dropped
    pub misfire_grace_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            analysis_interval_hours: 24,
            deep_analysis_interval_days: None,
            monthly_summary_interval_days: 30,
            quarterly_report_interval_days: 90,
            health_check_interval_minutes: 60,
            misfire_grace_secs: 300,
        }
    }
}

impl ScheduleConfig {
    /// Largest accepted hourly interval (one year)
    pub const MAX_INTERVAL_HOURS: u64 = 8760;
    /// Largest accepted daily interval (ten years)
    pub const MAX_INTERVAL_DAYS: u64 = 3650;
    /// Largest accepted health check interval (one year)
    pub const MAX_HEALTH_CHECK_MINUTES: u64 = 525_600;
    /// Largest accepted misfire grace (one day)
    pub const MAX_MISFIRE_GRACE_SECS: u64 = 86_400;

    pub fn analysis_interval(&self) -> Duration {
        scaled(self.analysis_interval_hours, 3600, 24)
    }

    pub fn deep_analysis_interval(&self) -> Option<Duration> {
        self.deep_analysis_interval_days
            .map(|days| scaled(days, 86400, 7))
    }

    pub fn monthly_summary_interval(&self) -> Duration {
        scaled(self.monthly_summary_interval_days, 86400, 30)
    }

    pub fn quarterly_report_interval(&self) -> Duration {
        scaled(self.quarterly_report_interval_days, 86400, 90)
    }

    pub fn health_check_interval(&self) -> Duration {
        scaled(self.health_check_interval_minutes, 60, 60)
    }

    pub fn misfire_grace(&self) -> Duration {
        Duration::from_secs(self.misfire_grace_secs)
    }
}

/// `value` units of `unit_secs`; `fallback` units when that overflows
fn scaled(value: u64, unit_secs: u64, fallback: u64) -> Duration {
    match value.checked_mul(unit_secs) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!(
                "Interval of {} x {}s overflows, using {} x {}s",
                value, unit_secs, fallback, unit_secs
            );
            Duration::from_secs(fallback * unit_secs)
        }
    }
}

/// Session selection limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataProcessingConfig {
    pub max_sessions_per_batch: usize,
    pub min_session_duration_minutes: u32,

    /// Lookback used when a user has no progress summary yet
    pub default_lookback_days: u32,

    /// Window for "all users" runs
    pub active_user_window_days: u32,

    /// Window used by the deep analysis job
    pub deep_analysis_active_days: u32,
}

impl Default for DataProcessingConfig {
    fn default() -> Self {
        Self {
            max_sessions_per_batch: 100,
            min_session_duration_minutes: 5,
            default_lookback_days: 30,
            active_user_window_days: 7,
            deep_analysis_active_days: 30,
        }
    }
}

/// Category weights and the proficiency formula parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// category -> weight in [0, 1]; unknown categories use 0.5
    pub tech_stack_weights: BTreeMap<String, f64>,
    pub proficiency_scoring: ProficiencyScoring,
}

impl ScoringConfig {
    pub const DEFAULT_CATEGORY_WEIGHT: f64 = 0.5;

    pub fn weight_for(&self, category: &str) -> f64 {
        self.tech_stack_weights
            .get(category)
            .copied()
            .unwrap_or(Self::DEFAULT_CATEGORY_WEIGHT)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let tech_stack_weights = [
            ("programming_language", 1.0),
            ("framework", 0.8),
            ("library", 0.6),
            ("tool", 0.4),
            ("database", 0.7),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            tech_stack_weights,
            proficiency_scoring: ProficiencyScoring::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProficiencyScoring {
    pub base_score: f64,
    pub duration_weight: f64,
    pub complexity_weight: f64,
    pub quality_weight: f64,
    pub max_single_increment: f64,
}

impl Default for ProficiencyScoring {
    fn default() -> Self {
        Self {
            base_score: 10.0,
            duration_weight: 0.3,
            complexity_weight: 0.4,
            quality_weight: 0.3,
            max_single_increment: 5.0,
        }
    }
}

/// Related-technology table and the defaults applied to inferred debts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GapInferenceConfig {
    pub enabled: bool,
    pub related_technologies: BTreeMap<String, Vec<String>>,
    pub technology_categories: BTreeMap<String, String>,
    pub debt_defaults: DebtDefaults,
}

impl Default for GapInferenceConfig {
    fn default() -> Self {
        let related = |techs: &[&str]| techs.iter().map(|t| t.to_string()).collect::<Vec<_>>();

        let related_technologies = BTreeMap::from([
            ("React".to_string(), related(&["JavaScript", "HTML", "CSS", "Node.js"])),
            ("Vue.js".to_string(), related(&["JavaScript", "HTML", "CSS"])),
            ("Django".to_string(), related(&["Python", "HTML", "CSS", "SQL"])),
            ("Flask".to_string(), related(&["Python", "HTML", "CSS"])),
            ("Spring Boot".to_string(), related(&["Java", "SQL", "Maven"])),
            ("Express.js".to_string(), related(&["Node.js", "JavaScript"])),
        ]);

        let technology_categories = [
            ("JavaScript", "programming_language"),
            ("Python", "programming_language"),
            ("Java", "programming_language"),
            ("HTML", "markup_language"),
            ("CSS", "stylesheet_language"),
            ("SQL", "query_language"),
            ("Node.js", "runtime"),
            ("Maven", "build_tool"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            enabled: true,
            related_technologies,
            technology_categories,
            debt_defaults: DebtDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtDefaults {
    pub urgency_level: crate::types::UrgencyLevel,
    pub importance_score: f64,
    pub career_impact: f64,
    pub project_relevance: f64,
    pub target_level: crate::types::ProficiencyLevel,
    pub estimated_learning_hours: f64,
    pub learning_priority: u8,
}

impl Default for DebtDefaults {
    fn default() -> Self {
        Self {
            urgency_level: crate::types::UrgencyLevel::Medium,
            importance_score: 70.0,
            career_impact: 60.0,
            project_relevance: 80.0,
            target_level: crate::types::ProficiencyLevel::Intermediate,
            estimated_learning_hours: 20.0,
            learning_priority: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match Self::from_file(path) {
            Ok(config) => {
                info!("Loaded analysis configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load configuration from {}: {}; using defaults",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let schedule = &self.schedule;
        let mut intervals = vec![
            (
                "schedule.analysis_interval_hours",
                schedule.analysis_interval_hours,
                ScheduleConfig::MAX_INTERVAL_HOURS,
            ),
            (
                "schedule.monthly_summary_interval_days",
                schedule.monthly_summary_interval_days,
                ScheduleConfig::MAX_INTERVAL_DAYS,
            ),
            (
                "schedule.quarterly_report_interval_days",
                schedule.quarterly_report_interval_days,
                ScheduleConfig::MAX_INTERVAL_DAYS,
            ),
            (
                "schedule.health_check_interval_minutes",
                schedule.health_check_interval_minutes,
                ScheduleConfig::MAX_HEALTH_CHECK_MINUTES,
            ),
        ];
        if let Some(days) = schedule.deep_analysis_interval_days {
            intervals.push((
                "schedule.deep_analysis_interval_days",
                days,
                ScheduleConfig::MAX_INTERVAL_DAYS,
            ));
        }
        for (name, value, max) in intervals {
            if value == 0 || value > max {
                return Err(invalid(&format!("{} must be between 1 and {}", name, max)));
            }
        }
        if schedule.misfire_grace_secs > ScheduleConfig::MAX_MISFIRE_GRACE_SECS {
            return Err(invalid(&format!(
                "schedule.misfire_grace_secs must be at most {}",
                ScheduleConfig::MAX_MISFIRE_GRACE_SECS
            )));
        }

        let data = &self.data_processing;
        if data.max_sessions_per_batch == 0 || data.max_sessions_per_batch > 10000 {
            return Err(invalid(
                "data_processing.max_sessions_per_batch must be between 1 and 10000",
            ));
        }
        let max_days = ScheduleConfig::MAX_INTERVAL_DAYS as u32;
        for (name, days) in [
            ("default_lookback_days", data.default_lookback_days),
            ("active_user_window_days", data.active_user_window_days),
            ("deep_analysis_active_days", data.deep_analysis_active_days),
        ] {
            if days == 0 || days > max_days {
                return Err(invalid(&format!(
                    "data_processing.{} must be between 1 and {}",
                    name, max_days
                )));
            }
        }

        for (category, weight) in &self.analysis.tech_stack_weights {
            if !weight.is_finite() || !(0.0..=1.0).contains(weight) {
                return Err(invalid(&format!(
                    "analysis.tech_stack_weights.{} must be between 0 and 1",
                    category
                )));
            }
        }

        let scoring = &self.analysis.proficiency_scoring;
        let parameters = [
            scoring.base_score,
            scoring.duration_weight,
            scoring.complexity_weight,
            scoring.quality_weight,
            scoring.max_single_increment,
        ];
        if parameters.iter().any(|p| !p.is_finite()) {
            return Err(invalid("analysis.proficiency_scoring values must be finite"));
        }
        if scoring.max_single_increment < 0.0 {
            return Err(invalid(
                "analysis.proficiency_scoring.max_single_increment must not be negative",
            ));
        }

        let defaults = &self.gap_inference.debt_defaults;
        for (name, value) in [
            ("importance_score", defaults.importance_score),
            ("career_impact", defaults.career_impact),
            ("project_relevance", defaults.project_relevance),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(invalid(&format!(
                    "gap_inference.debt_defaults.{} must be between 0 and 100",
                    name
                )));
            }
        }
        if !(1..=5).contains(&defaults.learning_priority) {
            return Err(invalid(
                "gap_inference.debt_defaults.learning_priority must be between 1 and 5",
            ));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
            other => Err(invalid(&format!("logging.level '{}' is not recognized", other))),
        }
    }

    /// Save configuration to TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

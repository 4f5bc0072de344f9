//! Health check for the analysis pipeline
//!
//! Verifies that the engine is enabled and the data access port answers.
//! Checks never return an error; problems downgrade the reported status.

use crate::analysis::AnalysisEngine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Window for the activity check
const ACTIVITY_WINDOW_DAYS: u32 = 1;

/// Individual check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl CheckResult {
    pub fn pass(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Pass, message)
    }

    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warn, message)
    }

    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Fail, message)
    }

    fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
        }
    }
}

/// Overall status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub checks: Vec<CheckResult>,
    pub engine_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_users_24h: Option<usize>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    fn from_checks(checks: Vec<CheckResult>, engine_enabled: bool, active_users_24h: Option<usize>) -> Self {
        let status = if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            HealthStatus::Unhealthy
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        };

        let issues = checks
            .iter()
            .filter(|c| c.status != CheckStatus::Pass)
            .map(|c| format!("{}: {}", c.name, c.message))
            .collect();

        Self {
            status,
            issues,
            checks,
            engine_enabled,
            active_users_24h,
            checked_at: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

pub async fn check_health(engine: &AnalysisEngine) -> HealthReport {
    let mut checks = Vec::new();

    let enabled = engine.is_enabled();
    checks.push(if enabled {
        CheckResult::pass("engine", "analysis engine enabled")
    } else {
        CheckResult::warn("engine", "analysis engine is disabled")
    });

    let port = engine.port();
    checks.push(match port.ping().await {
        Ok(()) => CheckResult::pass("data_access", "data access port reachable"),
        Err(e) => CheckResult::fail("data_access", format!("data access port unreachable: {}", e)),
    });

    let active_users = match port.list_active_users(ACTIVITY_WINDOW_DAYS).await {
        Ok(users) => {
            checks.push(CheckResult::pass(
                "activity",
                format!("{} users active in the last 24h", users.len()),
            ));
            Some(users.len())
        }
        Err(e) => {
            checks.push(CheckResult::fail(
                "activity",
                format!("failed to list active users: {}", e),
            ));
            None
        }
    };

    let report = HealthReport::from_checks(checks, enabled, active_users);
    if report.is_healthy() {
        debug!(
            "Health check passed. Engine enabled: {}, active users (24h): {}",
            enabled,
            active_users.unwrap_or(0)
        );
    } else {
        warn!("Health check degraded: {}", report.issues.join("; "));
    }
    report
}

//! Scheduled Jobs
//!
//! Job identities, their registration from configuration, and job bodies:
//! - main_analysis: all recently active users, only when due
//! - deep_analysis: every user active in the longer window, one pass each
//! - monthly_summary / quarterly_report: read-only rollups
//! - health_check: engine enabled and data access reachable

use crate::analysis::{AnalysisEngine, AnalysisResult, RunStatus, UserWindow};
use crate::config::AnalysisConfig;
use crate::error::StackwiseError;
use crate::health::{self, HealthStatus};
use crate::reports;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Job execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Job execution failed: {0}")]
    ExecutionError(String),

    #[error("Analysis error: {0}")]
    Analysis(#[from] StackwiseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobId {
    MainAnalysis,
    DeepAnalysis,
    MonthlySummary,
    QuarterlyReport,
    HealthCheck,
}

impl JobId {
    pub const ALL: [JobId; 5] = [
        JobId::MainAnalysis,
        JobId::DeepAnalysis,
        JobId::MonthlySummary,
        JobId::QuarterlyReport,
        JobId::HealthCheck,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobId::MainAnalysis => "main_analysis",
            JobId::DeepAnalysis => "deep_analysis",
            JobId::MonthlySummary => "monthly_summary",
            JobId::QuarterlyReport => "quarterly_report",
            JobId::HealthCheck => "health_check",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            JobId::MainAnalysis => "Main Analysis",
            JobId::DeepAnalysis => "Deep Analysis",
            JobId::MonthlySummary => "Monthly Summary",
            JobId::QuarterlyReport => "Quarterly Report",
            JobId::HealthCheck => "Health Check",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|job| job.as_str() == s)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job registered with the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefinition {
    pub id: JobId,
    pub interval: Duration,
}

/// Jobs to register for `config`; deep analysis only when its interval is set
pub fn definitions(config: &AnalysisConfig) -> Vec<JobDefinition> {
    let schedule = &config.schedule;
    let mut jobs = vec![JobDefinition {
        id: JobId::MainAnalysis,
        interval: schedule.analysis_interval(),
    }];
    if let Some(interval) = schedule.deep_analysis_interval() {
        jobs.push(JobDefinition {
            id: JobId::DeepAnalysis,
            interval,
        });
    }
    jobs.extend([
        JobDefinition {
            id: JobId::MonthlySummary,
            interval: schedule.monthly_summary_interval(),
        },
        JobDefinition {
            id: JobId::QuarterlyReport,
            interval: schedule.quarterly_report_interval(),
        },
        JobDefinition {
            id: JobId::HealthCheck,
            interval: schedule.health_check_interval(),
        },
    ]);
    jobs
}

/// Why a job body is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Timer firing; main analysis honours `should_run_analysis`
    Scheduled,
    /// Explicit request; always runs
    Manual,
}

/// Report generated after job execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReport {
    /// Users (or report subjects) covered
    pub users_processed: usize,

    /// Assets and debts written
    pub changes_made: usize,

    #[serde(with = "serde_duration_millis")]
    pub duration: Duration,

    /// Per-user failures or health issues
    pub errors: usize,

    pub error_message: Option<String>,
}

impl JobReport {
    fn new(users_processed: usize, changes_made: usize) -> Self {
        Self {
            users_processed,
            changes_made,
            duration: Duration::ZERO,
            errors: 0,
            error_message: None,
        }
    }
}

// Serialize Duration as milliseconds
mod serde_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Successful outcomes of a job body
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobReport),
    /// Not due or disabled
    Skipped(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Skipped,
    Failed,
}

/// Job execution record returned to manual callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: String,
    pub job: JobId,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<JobReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn analysis_outcome(result: AnalysisResult) -> Result<JobOutcome, JobError> {
    match result.status {
        RunStatus::Success => {
            let mut report = JobReport::new(
                result.analyzed_users + result.failed_users,
                result.assets_updated + result.debts_identified,
            );
            report.errors = result.failed_users;
            report.error_message = result.message;
            Ok(JobOutcome::Completed(report))
        }
        RunStatus::Skipped => Ok(JobOutcome::Skipped(
            result.message.unwrap_or_else(|| "skipped".to_string()),
        )),
        RunStatus::Error => Err(JobError::ExecutionError(
            result.message.unwrap_or_else(|| "analysis failed".to_string()),
        )),
    }
}

/// Run one job body to completion
///
/// `due_tolerance` lets a scheduled main analysis run when it becomes due
/// within that window, so timer jitter does not skip every other firing.
pub async fn execute(
    job: JobId,
    engine: &AnalysisEngine,
    trigger: Trigger,
    due_tolerance: chrono::Duration,
) -> Result<JobOutcome, JobError> {
    match job {
        JobId::MainAnalysis => {
            if trigger == Trigger::Scheduled
                && !engine.should_run_analysis_at(Utc::now() + due_tolerance)
            {
                return Ok(JobOutcome::Skipped("analysis not due".to_string()));
            }
            analysis_outcome(engine.run_analysis(None).await)
        }
        JobId::DeepAnalysis => {
            let result = engine
                .run_window(UserWindow::Deep, &CancellationToken::new())
                .await;
            analysis_outcome(result)
        }
        JobId::MonthlySummary => {
            let summary = reports::monthly_summary(engine.port().as_ref()).await?;
            Ok(JobOutcome::Completed(JobReport::new(summary.active_users, 0)))
        }
        JobId::QuarterlyReport => {
            let report = reports::quarterly_report(engine.port().as_ref()).await?;
            Ok(JobOutcome::Completed(JobReport::new(report.active_users, 0)))
        }
        JobId::HealthCheck => {
            let health = health::check_health(engine).await;
            let mut report = JobReport::new(health.active_users_24h.unwrap_or(0), 0);
            if health.status != HealthStatus::Healthy {
                report.errors = health.issues.len();
                report.error_message = Some(health.issues.join("; "));
            }
            Ok(JobOutcome::Completed(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_job_ids() {
        for job in JobId::ALL {
            assert_eq!(JobId::parse(job.as_str()), Some(job));
        }
        assert_eq!(JobId::parse("nightly"), None);
        assert_eq!(JobId::HealthCheck.index(), 4);
        assert_eq!(
            serde_json::to_string(&JobId::MainAnalysis).unwrap(),
            "\"main_analysis\""
        );
    }

    #[test]
    fn test_definitions_without_deep_analysis() {
        let config = AnalysisConfig::default();
        let jobs = definitions(&config);
        let ids: Vec<JobId> = jobs.iter().map(|j| j.id).collect();
        assert_eq!(
            ids,
            vec![
                JobId::MainAnalysis,
                JobId::MonthlySummary,
                JobId::QuarterlyReport,
                JobId::HealthCheck
            ]
        );
        assert_eq!(jobs[0].interval, Duration::from_secs(24 * 3600));
        assert_eq!(jobs[3].interval, Duration::from_secs(3600));
    }

    #[test]
    fn test_definitions_with_deep_analysis() {
        let mut config = AnalysisConfig::default();
        config.schedule.deep_analysis_interval_days = Some(7);
        let jobs = definitions(&config);
        assert_eq!(jobs[1].id, JobId::DeepAnalysis);
        assert_eq!(jobs[1].interval, Duration::from_secs(7 * 86400));
    }

    #[test]
    fn test_job_report_serialization() {
        let report = JobReport {
            users_processed: 12,
            changes_made: 30,
            duration: Duration::from_millis(500),
            errors: 1,
            error_message: Some("1 users failed".to_string()),
        };

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"duration\":500"));
        let deserialized: JobReport = serde_json::from_str(&json).unwrap();
        assert_eq!(report, deserialized);
    }

    #[tokio::test]
    async fn test_scheduled_main_analysis_skips_when_not_due() {
        let engine = AnalysisEngine::new(Arc::new(MemoryStore::new()), AnalysisConfig::default());
        engine.run_analysis(None).await;

        let outcome = execute(
            JobId::MainAnalysis,
            &engine,
            Trigger::Scheduled,
            chrono::Duration::seconds(300),
        )
        .await
        .unwrap();
        assert!(matches!(outcome, JobOutcome::Skipped(_)));

        let forced = execute(
            JobId::MainAnalysis,
            &engine,
            Trigger::Manual,
            chrono::Duration::seconds(300),
        )
        .await
        .unwrap();
        assert!(matches!(forced, JobOutcome::Completed(_)));
    }

    #[tokio::test]
    async fn test_health_job_reports_issues() {
        let mut config = AnalysisConfig::default();
        config.basic.enabled = false;
        let engine = AnalysisEngine::new(Arc::new(MemoryStore::new()), config);

        let outcome = execute(
            JobId::HealthCheck,
            &engine,
            Trigger::Scheduled,
            chrono::Duration::zero(),
        )
        .await
        .unwrap();
        match outcome {
            JobOutcome::Completed(report) => assert_eq!(report.errors, 1),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}

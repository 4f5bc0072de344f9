//! Scheduler
//!
//! Periodic and manual execution of analysis jobs:
//! - jobs: job identities, registration and bodies
//! - timing: interval slots, coalescing and misfire detection
//! - service: the running scheduler with single-instance jobs

pub mod jobs;
mod service;
pub mod timing;

pub use jobs::{JobDefinition, JobError, JobId, JobOutcome, JobReport, JobRun, JobStatus, Trigger};
pub use service::{AnalysisScheduler, JobRunStats, ScheduledJob, SchedulerStatus};

use crate::config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler is not running")]
    NotRunning,

    #[error("Job not registered: {0}")]
    JobNotRegistered(JobId),

    #[error("Job error: {0}")]
    JobError(#[from] JobError),

    #[error("Configuration rejected: {0}")]
    Config(#[from] ConfigError),
}

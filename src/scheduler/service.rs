//! Analysis Scheduler
//!
//! Runs each registered job on its own timer task. A per-job flag keeps at
//! most one instance of a job running; stop() cancels the timers and waits
//! for every in-flight job and trigger tracked by the task tracker.

use super::jobs::{self, JobDefinition, JobError, JobId, JobOutcome, JobRun, JobStatus, Trigger};
use super::timing::FireSchedule;
use super::SchedulerError;
use crate::analysis::{AnalysisEngine, AnalysisResult};
use crate::config::{AnalysisConfig, ScheduleConfig};
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Cumulative in-memory counters for one job
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobRunStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<JobStatus>,
    pub next_run_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub name: &'static str,
    pub interval_secs: u64,
    pub next_run_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub is_running: bool,
    pub job_stats: BTreeMap<JobId, JobRunStats>,
    pub scheduled_jobs: Vec<ScheduledJob>,
}

struct RunningState {
    shutdown: CancellationToken,
    tracker: TaskTracker,
    jobs: Vec<JobDefinition>,
}

struct Inner {
    engine: Arc<AnalysisEngine>,
    config_path: Option<PathBuf>,
    state: tokio::sync::Mutex<Option<RunningState>>,
    stats: Mutex<BTreeMap<JobId, JobRunStats>>,
    in_flight: [AtomicBool; JobId::ALL.len()],
}

/// Clears a job's in-flight flag when the run ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Inner {
    fn update_stats(&self, job: JobId, update: impl FnOnce(&mut JobRunStats)) {
        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        update(stats.entry(job).or_default());
    }

    fn stats_snapshot(&self) -> BTreeMap<JobId, JobRunStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn misfire_grace(&self) -> chrono::Duration {
        let secs = self
            .engine
            .config()
            .schedule
            .misfire_grace_secs
            .min(ScheduleConfig::MAX_MISFIRE_GRACE_SECS);
        chrono::Duration::seconds(secs as i64)
    }

    /// Run a job body unless an instance is already in flight
    async fn fire(&self, job: JobId, trigger: Trigger) -> JobRun {
        let flag = &self.in_flight[job.index()];
        let started_at = Utc::now();

        if flag.swap(true, Ordering::SeqCst) {
            info!("Job {} already running, skipping this firing", job);
            return JobRun {
                id: uuid::Uuid::new_v4().to_string(),
                job,
                started_at,
                completed_at: started_at,
                status: JobStatus::Skipped,
                report: None,
                message: Some("already running".to_string()),
            };
        }
        let _in_flight = InFlight(flag);

        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting job {} (id: {}, trigger: {:?})", job, run_id, trigger);
        let timer = Instant::now();
        let outcome = jobs::execute(job, &self.engine, trigger, self.misfire_grace()).await;
        let elapsed = timer.elapsed();

        let (status, report, message) = match outcome {
            Ok(JobOutcome::Completed(mut report)) => {
                report.duration = elapsed;
                info!(
                    "Job {} completed: {} users, {} changes in {:?}",
                    job, report.users_processed, report.changes_made, elapsed
                );
                (JobStatus::Success, Some(report), None)
            }
            Ok(JobOutcome::Skipped(reason)) => {
                info!("Job {} skipped: {}", job, reason);
                (JobStatus::Skipped, None, Some(reason))
            }
            Err(e) => {
                error!("Job {} failed: {}", job, e);
                (JobStatus::Failed, None, Some(e.to_string()))
            }
        };

        self.update_stats(job, |stats| {
            stats.total_runs += 1;
            match status {
                JobStatus::Success => stats.successful_runs += 1,
                JobStatus::Failed => stats.failed_runs += 1,
                JobStatus::Skipped => {}
            }
            stats.last_run_time = Some(started_at);
            stats.last_run_status = Some(status);
        });

        JobRun {
            id: run_id,
            job,
            started_at,
            completed_at: Utc::now(),
            status,
            report,
            message,
        }
    }

    async fn job_loop(self: Arc<Self>, definition: JobDefinition, shutdown: CancellationToken) {
        let job = definition.id;
        let mut schedule = FireSchedule::starting_at(Utc::now(), definition.interval);
        self.update_stats(job, |s| s.next_run_time = Some(schedule.next_fire()));

        loop {
            let wait = schedule.time_until(Utc::now());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }

            let now = Utc::now();
            let Some(due) = schedule.take_due(now) else {
                continue;
            };
            self.update_stats(job, |s| s.next_run_time = Some(schedule.next_fire()));

            if due.is_misfire(now, self.misfire_grace()) {
                warn!(
                    "Job {} missed its {} slot by {}s, dropping firing",
                    job,
                    due.scheduled_for,
                    due.lateness(now).num_seconds()
                );
                continue;
            }
            if due.coalesced > 0 {
                debug!("Job {}: coalesced {} missed firings", job, due.coalesced);
            }

            self.fire(job, Trigger::Scheduled).await;
        }

        debug!("Job loop {} stopped", job);
    }
}

/// Owns the job timers around one [`AnalysisEngine`]
#[derive(Clone)]
pub struct AnalysisScheduler {
    inner: Arc<Inner>,
}

impl AnalysisScheduler {
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self::build(engine, None)
    }

    /// Scheduler whose `reschedule` reloads configuration from `path`
    pub fn with_config_path(engine: Arc<AnalysisEngine>, path: impl Into<PathBuf>) -> Self {
        Self::build(engine, Some(path.into()))
    }

    fn build(engine: Arc<AnalysisEngine>, config_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                config_path,
                state: tokio::sync::Mutex::new(None),
                stats: Mutex::new(BTreeMap::new()),
                in_flight: Default::default(),
            }),
        }
    }

    pub fn engine(&self) -> Arc<AnalysisEngine> {
        Arc::clone(&self.inner.engine)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.is_some()
    }

    /// Register jobs from the engine's configuration and start their timers
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut state = self.inner.state.lock().await;
        if state.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let definitions = jobs::definitions(&self.inner.engine.config());
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();

        for definition in &definitions {
            tracker.spawn(
                Arc::clone(&self.inner).job_loop(*definition, shutdown.clone()),
            );
        }

        info!(
            "Analysis scheduler started with {} jobs: {}",
            definitions.len(),
            definitions
                .iter()
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        *state = Some(RunningState {
            shutdown,
            tracker,
            jobs: definitions,
        });
        Ok(())
    }

    /// Cancel the timers and wait for in-flight jobs and triggers to finish
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        let running = self
            .inner
            .state
            .lock()
            .await
            .take()
            .ok_or(SchedulerError::NotRunning)?;

        info!("Stopping analysis scheduler, waiting for in-flight jobs");
        running.shutdown.cancel();
        running.tracker.close();
        running.tracker.wait().await;

        for definition in &running.jobs {
            self.inner
                .update_stats(definition.id, |s| s.next_run_time = None);
        }
        info!("Analysis scheduler stopped");
        Ok(())
    }

    pub async fn restart(&self) -> Result<(), SchedulerError> {
        match self.stop().await {
            Ok(()) | Err(SchedulerError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.start().await
    }

    /// Reload configuration (from the attached file, if any) and re-register jobs
    pub async fn reschedule(&self) -> Result<(), SchedulerError> {
        let config = match &self.inner.config_path {
            Some(path) => AnalysisConfig::load_or_default(Some(path)),
            None => (*self.inner.engine.config()).clone(),
        };
        self.reconfigure(config).await
    }

    /// Apply a new configuration; a running scheduler re-registers its jobs
    ///
    /// An invalid configuration leaves the current jobs untouched.
    pub async fn reconfigure(&self, config: AnalysisConfig) -> Result<(), SchedulerError> {
        self.inner.engine.reconfigure(config)?;
        if self.is_running().await {
            self.restart().await?;
        }
        info!("Analysis scheduler rescheduled");
        Ok(())
    }

    /// Spawn on the tracker while holding the state lock, so stop() waits for it
    async fn spawn_tracked<F>(&self, future: F) -> Result<JoinHandle<F::Output>, SchedulerError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let state = self.inner.state.lock().await;
        let running = state.as_ref().ok_or(SchedulerError::NotRunning)?;
        Ok(running.tracker.spawn(future))
    }

    /// Run analysis now and wait for the result
    pub async fn trigger_manual(&self, user_id: Option<UserId>) -> Result<AnalysisResult, SchedulerError> {
        let engine = self.engine();
        let handle = self
            .spawn_tracked(async move { engine.run_analysis(user_id).await })
            .await?;
        handle
            .await
            .map_err(|e| SchedulerError::JobError(JobError::ExecutionError(e.to_string())))
    }

    /// Run analysis now, cancelling between users once `limit` elapses
    ///
    /// The user being analyzed when the limit hits is finished and committed.
    pub async fn trigger_manual_with_timeout(
        &self,
        user_id: Option<UserId>,
        limit: Duration,
    ) -> Result<AnalysisResult, SchedulerError> {
        let engine = self.engine();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let mut handle = self
            .spawn_tracked(async move {
                engine
                    .run_analysis_with_cancel(user_id, &task_cancel)
                    .await
            })
            .await?;

        let (joined, timed_out) = match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => (joined, false),
            Err(_) => {
                warn!("Manual analysis exceeded {:?}, cancelling after current user", limit);
                cancel.cancel();
                (handle.await, true)
            }
        };

        let mut result = joined
            .map_err(|e| SchedulerError::JobError(JobError::ExecutionError(e.to_string())))?;
        if timed_out && result.cancelled {
            result.message = Some(JobError::Timeout(limit).to_string());
        }
        Ok(result)
    }

    /// Start analysis in the background and return immediately
    pub async fn trigger_manual_async(&self, user_id: Option<UserId>) -> Result<(), SchedulerError> {
        let engine = self.engine();
        self.spawn_tracked(async move {
            let result = engine.run_analysis(user_id).await;
            info!(
                "Background analysis finished: {} ({} users, {} failed)",
                result.status.as_str(),
                result.analyzed_users,
                result.failed_users
            );
        })
        .await?;
        Ok(())
    }

    /// Run a registered job now, bypassing its timer
    pub async fn trigger_job(&self, job: JobId) -> Result<JobRun, SchedulerError> {
        let registered = {
            let state = self.inner.state.lock().await;
            let running = state.as_ref().ok_or(SchedulerError::NotRunning)?;
            running.jobs.iter().any(|d| d.id == job)
        };
        if !registered {
            return Err(SchedulerError::JobNotRegistered(job));
        }

        let inner = Arc::clone(&self.inner);
        let handle = self
            .spawn_tracked(async move { inner.fire(job, Trigger::Manual).await })
            .await?;
        handle
            .await
            .map_err(|e| SchedulerError::JobError(JobError::ExecutionError(e.to_string())))
    }

    pub async fn status(&self) -> SchedulerStatus {
        let job_stats = self.inner.stats_snapshot();
        let state = self.inner.state.lock().await;

        let scheduled_jobs = state
            .as_ref()
            .map(|running| {
                running
                    .jobs
                    .iter()
                    .map(|d| ScheduledJob {
                        id: d.id,
                        name: d.id.name(),
                        interval_secs: d.interval.as_secs(),
                        next_run_time: job_stats.get(&d.id).and_then(|s| s.next_run_time),
                    })
                    .collect()
            })
            .unwrap_or_default();

        SchedulerStatus {
            is_running: state.is_some(),
            job_stats,
            scheduled_jobs,
        }
    }

    pub fn job_statistics(&self) -> BTreeMap<JobId, JobRunStats> {
        self.inner.stats_snapshot()
    }
}

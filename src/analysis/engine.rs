//! Analysis engine
//!
//! Runs one analysis pass per user: window selection, aggregation, scoring,
//! gap inference and the progress checkpoint, committed as one unit of work.
//! Passes on the same user are serialized by a per-user lock regardless of
//! which job started them; failures stay contained to the user they hit.

use super::aggregator::{aggregate, TechnologyUsage};
use super::gaps::{GapInference, RelatedTechnologyLookup, StaticRelatedTechnologies};
use super::scoring;
use crate::config::{AnalysisConfig, ConfigError};
use crate::error::{Result, StackwiseError};
use crate::storage::{AssetEntry, DataAccessPort, UnitOfWork};
use crate::types::{Asset, Debt, DebtStatus, ProgressSummary, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// `report_period` of summaries written by analysis passes
pub const ANALYSIS_CYCLE_PERIOD: &str = "analysis_cycle";

/// Outcome of a run as reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Not due or disabled; not an error
    Skipped,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Skipped => "skipped",
            RunStatus::Error => "error",
        }
    }
}

/// Result of one user's pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAnalysisResult {
    pub user_id: UserId,
    pub sessions_processed: usize,
    pub sessions_skipped: usize,
    pub technologies_analyzed: usize,
    /// Assets touched this pass, including new ones
    pub assets_updated: usize,
    pub assets_created: usize,
    pub debts_identified: usize,
    pub summary_written: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UserAnalysisResult {
    fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            sessions_processed: 0,
            sessions_skipped: 0,
            technologies_analyzed: 0,
            assets_updated: 0,
            assets_created: 0,
            debts_identified: 0,
            summary_written: false,
            error: None,
        }
    }

    fn failed(user_id: UserId, error: String) -> Self {
        Self {
            error: Some(error),
            ..Self::empty(user_id)
        }
    }
}

/// Result of a run over one or more users
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub analyzed_users: usize,
    pub sessions_processed: usize,
    pub assets_updated: usize,
    pub debts_identified: usize,
    pub failed_users: usize,
    pub cancelled: bool,
    pub analysis_time: DateTime<Utc>,
    pub per_user_results: Vec<UserAnalysisResult>,
}

impl AnalysisResult {
    fn new(status: RunStatus, analysis_time: DateTime<Utc>) -> Self {
        Self {
            status,
            message: None,
            analyzed_users: 0,
            sessions_processed: 0,
            assets_updated: 0,
            debts_identified: 0,
            failed_users: 0,
            cancelled: false,
            analysis_time,
            per_user_results: Vec::new(),
        }
    }

    pub fn skipped(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(RunStatus::Skipped, Utc::now())
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::new(RunStatus::Error, Utc::now())
        }
    }

    fn record(&mut self, user: UserAnalysisResult) {
        if user.error.is_some() {
            self.failed_users += 1;
        } else {
            self.analyzed_users += 1;
            self.sessions_processed += user.sessions_processed;
            self.assets_updated += user.assets_updated;
            self.debts_identified += user.debts_identified;
        }
        self.per_user_results.push(user);
    }
}

/// Snapshot returned by [`AnalysisEngine::analysis_status`]
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisStatus {
    pub enabled: bool,
    pub last_run_time: Option<DateTime<Utc>>,
    pub should_run: bool,
    pub config: AnalysisConfig,
}

/// Which window a multi-user run enumerates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserWindow {
    /// `data_processing.active_user_window_days`
    Recent,
    /// `data_processing.deep_analysis_active_days`
    Deep,
}

pub struct AnalysisEngine {
    port: Arc<dyn DataAccessPort>,
    config: RwLock<Arc<AnalysisConfig>>,
    lookup: RwLock<Arc<dyn RelatedTechnologyLookup>>,
    lookup_from_config: bool,
    last_analysis_time: Mutex<Option<DateTime<Utc>>>,
    user_locks: Mutex<HashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(|e| e.into_inner()).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(|e| e.into_inner()) = value;
}

impl AnalysisEngine {
    /// Engine whose related-technology table comes from `config`
    pub fn new(port: Arc<dyn DataAccessPort>, config: AnalysisConfig) -> Self {
        let lookup: Arc<dyn RelatedTechnologyLookup> =
            Arc::new(StaticRelatedTechnologies::from_config(&config.gap_inference));
        let mut engine = Self::with_lookup(port, config, lookup);
        engine.lookup_from_config = true;
        engine
    }

    /// Engine with a caller-supplied lookup, kept across reconfiguration
    pub fn with_lookup(
        port: Arc<dyn DataAccessPort>,
        config: AnalysisConfig,
        lookup: Arc<dyn RelatedTechnologyLookup>,
    ) -> Self {
        Self {
            port,
            config: RwLock::new(Arc::new(config)),
            lookup: RwLock::new(lookup),
            lookup_from_config: false,
            last_analysis_time: Mutex::new(None),
            user_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Swap in a new configuration; passes already running keep the old one
    ///
    /// An invalid configuration is rejected and the current one stays active.
    pub fn reconfigure(&self, config: AnalysisConfig) -> std::result::Result<(), ConfigError> {
        if let Err(e) = config.validate() {
            warn!("Rejected analysis configuration, keeping current: {}", e);
            return Err(e);
        }
        if self.lookup_from_config {
            let lookup: Arc<dyn RelatedTechnologyLookup> =
                Arc::new(StaticRelatedTechnologies::from_config(&config.gap_inference));
            write(&self.lookup, lookup);
        }
        info!(
            "Analysis engine reconfigured (enabled: {}, interval: {}h)",
            config.basic.enabled, config.schedule.analysis_interval_hours
        );
        write(&self.config, Arc::new(config));
        Ok(())
    }

    pub fn config(&self) -> Arc<AnalysisConfig> {
        read(&self.config)
    }

    pub fn port(&self) -> Arc<dyn DataAccessPort> {
        Arc::clone(&self.port)
    }

    pub fn is_enabled(&self) -> bool {
        self.config().basic.enabled
    }

    pub fn last_run_time(&self) -> Option<DateTime<Utc>> {
        *self
            .last_analysis_time
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn set_last_run_time(&self, at: DateTime<Utc>) {
        *self
            .last_analysis_time
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(at);
    }

    pub fn should_run_analysis(&self) -> bool {
        self.should_run_analysis_at(Utc::now())
    }

    /// Disabled: never. Never run: always. Otherwise once the interval elapsed.
    pub fn should_run_analysis_at(&self, now: DateTime<Utc>) -> bool {
        let config = self.config();
        if !config.basic.enabled {
            return false;
        }
        match self.last_run_time() {
            None => true,
            Some(last) => match Duration::from_std(config.schedule.analysis_interval()) {
                Ok(interval) => now - last >= interval,
                Err(_) => false,
            },
        }
    }

    pub fn analysis_status(&self) -> AnalysisStatus {
        let config = self.config();
        AnalysisStatus {
            enabled: config.basic.enabled,
            last_run_time: self.last_run_time(),
            should_run: self.should_run_analysis(),
            config: (*config).clone(),
        }
    }

    /// Analyze one user, or every recently active user when `None`
    pub async fn run_analysis(&self, user_id: Option<UserId>) -> AnalysisResult {
        self.run_analysis_with_cancel(user_id, &CancellationToken::new())
            .await
    }

    /// Like [`run_analysis`](Self::run_analysis); `cancel` is checked between users
    pub async fn run_analysis_with_cancel(
        &self,
        user_id: Option<UserId>,
        cancel: &CancellationToken,
    ) -> AnalysisResult {
        match user_id {
            Some(user_id) => self.run_users(vec![user_id], cancel).await,
            None => self.run_window(UserWindow::Recent, cancel).await,
        }
    }

    /// Analyze every user active within `window`, one pass per user
    pub async fn run_window(&self, window: UserWindow, cancel: &CancellationToken) -> AnalysisResult {
        if !self.is_enabled() {
            info!("Analysis disabled, skipping run");
            return AnalysisResult::skipped("analysis is disabled");
        }

        let config = self.config();
        let days = match window {
            UserWindow::Recent => config.data_processing.active_user_window_days,
            UserWindow::Deep => config.data_processing.deep_analysis_active_days,
        };

        match self.port.list_active_users(days).await {
            Ok(users) => {
                info!("Found {} users active in the last {} days", users.len(), days);
                self.run_users(users, cancel).await
            }
            Err(e) => {
                error!("Failed to enumerate active users: {}", e);
                AnalysisResult::error(format!("failed to enumerate active users: {}", e))
            }
        }
    }

    async fn run_users(&self, users: Vec<UserId>, cancel: &CancellationToken) -> AnalysisResult {
        if !self.is_enabled() {
            info!("Analysis disabled, skipping run");
            return AnalysisResult::skipped("analysis is disabled");
        }

        let started = Utc::now();
        let mut result = AnalysisResult::new(RunStatus::Success, started);

        for user_id in users {
            if cancel.is_cancelled() {
                warn!("Analysis cancelled before user {}", user_id);
                result.cancelled = true;
                break;
            }

            match self.analyze_user(user_id).await {
                Ok(user_result) => result.record(user_result),
                Err(e) => {
                    if e.is_data_access() {
                        error!("Analysis failed for user {}: {}", user_id, e);
                    } else {
                        warn!("Analysis failed for user {}: {}", user_id, e);
                    }
                    result.record(UserAnalysisResult::failed(user_id, e.to_string()));
                }
            }
        }

        if result.analyzed_users == 0 && result.failed_users > 0 {
            result.status = RunStatus::Error;
            result.message = Some(format!("all {} users failed", result.failed_users));
        } else if result.cancelled {
            result.message = Some("cancelled".to_string());
        } else if result.failed_users > 0 {
            result.message = Some(format!("{} users failed", result.failed_users));
        }

        self.set_last_run_time(started);
        info!(
            "Analysis complete: {} users, {} sessions, {} assets, {} debts ({} failed)",
            result.analyzed_users,
            result.sessions_processed,
            result.assets_updated,
            result.debts_identified,
            result.failed_users
        );
        result
    }

    fn user_lock(&self, user_id: UserId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.user_locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(user_id).or_default())
    }

    /// One user's pass; nothing is written unless every step succeeds
    pub async fn analyze_user(&self, user_id: UserId) -> Result<UserAnalysisResult> {
        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let config = self.config();
        let lookup = read(&self.lookup);
        let started = Utc::now();
        let data = &config.data_processing;

        let cutoff = match self.port.get_last_analysis_cutoff(user_id).await? {
            Some(cutoff) => cutoff,
            None => started - Duration::days(i64::from(data.default_lookback_days)),
        };

        let sessions = self
            .port
            .get_recent_sessions(
                user_id,
                cutoff,
                data.max_sessions_per_batch,
                data.min_session_duration_minutes,
            )
            .await?;

        let mut result = UserAnalysisResult::empty(user_id);
        if sessions.is_empty() {
            debug!("No new sessions for user {} since {}", user_id, cutoff);
            return Ok(result);
        }

        let usage = aggregate(&sessions);
        result.sessions_processed = usage.sessions_accepted;
        result.sessions_skipped = usage.sessions_skipped;
        result.technologies_analyzed = usage.technologies.len();

        let mut uow = UnitOfWork::new(self.port.as_ref(), user_id);
        for tech in usage.technologies.values() {
            let entry = uow.get_or_create_asset(&tech.name, &tech.category).await?;
            let asset = score_asset(entry, tech, &config, started);
            debug!(
                "User {} {}: {:.1} ({})",
                user_id,
                asset.technology_name,
                asset.proficiency_score,
                asset.proficiency_level.as_str()
            );
            uow.save_asset(asset);
            result.assets_updated += 1;
        }
        result.assets_created = uow.assets_created();

        if config.gap_inference.enabled {
            let inference = GapInference::new(lookup.as_ref(), &config.gap_inference.debt_defaults);
            inference.infer(&mut uow, &usage).await?;
            result.debts_identified = uow.debts_created();
        }

        let period_start = sessions.iter().map(|s| s.completed_at).min().unwrap_or(started);
        let newest = sessions.iter().map(|s| s.completed_at).max().unwrap_or(started);
        let summary = ProgressSummary {
            user_id,
            report_period: ANALYSIS_CYCLE_PERIOD.to_string(),
            period_start,
            period_end: newest.max(started),
            total_assets: uow.count_assets().await?,
            new_assets_acquired: result.assets_created,
            new_debts_identified: result.debts_identified,
            total_debts: uow.count_active_debts().await?,
            total_learning_hours: usage.total_hours(),
            practice_sessions: usage.sessions_accepted,
            projects_completed: usage.projects.len(),
            generated_at: Utc::now(),
        };
        uow.create_progress_summary(summary);
        uow.commit().await?;
        result.summary_written = true;

        info!(
            "User {} analyzed: {} sessions, {} assets ({} new), {} debts",
            user_id,
            result.sessions_processed,
            result.assets_updated,
            result.assets_created,
            result.debts_identified
        );
        Ok(result)
    }

    /// Record learning time against a debt outside an analysis pass
    ///
    /// Identified or planned debts move to learning first; progress of 100
    /// completes the debt.
    pub async fn record_learning_progress(
        &self,
        user_id: UserId,
        technology: &str,
        progress: f64,
        hours_spent: f64,
    ) -> Result<Debt> {
        if !progress.is_finite() || !hours_spent.is_finite() {
            return Err(StackwiseError::Validation(
                "progress and hours must be finite".to_string(),
            ));
        }

        let lock = self.user_lock(user_id);
        let _guard = lock.lock().await;

        let mut uow = UnitOfWork::new(self.port.as_ref(), user_id);
        let mut debt = uow.get_debt(technology).await?.ok_or_else(|| {
            StackwiseError::Validation(format!(
                "no debt for {} recorded for user {}",
                technology, user_id
            ))
        })?;

        if matches!(debt.status, DebtStatus::Identified | DebtStatus::Planned) {
            debt.start_learning();
        }
        debt.update_progress(progress, hours_spent);
        uow.save_debt(debt.clone());
        uow.commit().await?;

        info!(
            "User {} {}: {:.0}% ({})",
            user_id,
            debt.technology_name,
            debt.learning_progress,
            debt.status.as_str()
        );
        Ok(debt)
    }
}

/// Apply one cycle's usage to a loaded or freshly created asset
fn score_asset(
    entry: AssetEntry,
    usage: &TechnologyUsage,
    config: &AnalysisConfig,
    now: DateTime<Utc>,
) -> Asset {
    let proficiency = &config.analysis.proficiency_scoring;
    let raw = scoring::raw_increment(usage, proficiency);
    let mut asset = entry.asset;

    if entry.created {
        asset.proficiency_score = scoring::initial_score_for(raw, &asset.category, &config.analysis);
        asset.confidence_level = scoring::initial_confidence(asset.proficiency_score);
        asset.first_learned_at = now;
    } else {
        asset.proficiency_score = scoring::apply_increment(asset.proficiency_score, raw, proficiency);
    }
    asset.proficiency_level = scoring::level_for(asset.proficiency_score);
    scoring::skill_deltas(usage).apply_to(&mut asset);

    asset.record_practice(usage.total_hours(), now);
    asset.project_count += usage.project_count() as u32;
    asset.updated_at = now;
    asset
}

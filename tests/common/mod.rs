//! Common test utilities and helpers

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use stackwise_core::storage::{ChangeSet, DataAccessPort, SessionStatistics};
use stackwise_core::{
    Asset, Debt, MemoryStore, ProgressSummary, Result, Session, StackwiseError, UserId,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Completed session `minutes_ago` old with one primary technology
pub fn session(id: &str, user: i64, primary: &str, minutes_ago: i64) -> Session {
    let mut s = Session::new(id, UserId(user), Utc::now() - Duration::minutes(minutes_ago));
    s.primary_technology = Some(primary.to_string());
    s.duration_minutes = 60.0;
    s.complexity_score = 5.0;
    s.quality_score = 70.0;
    s.project_name = Some("demo".to_string());
    s
}

/// Session carrying only framework entries
pub fn framework_session(id: &str, user: i64, frameworks: &[&str], completed_at: DateTime<Utc>) -> Session {
    let mut s = Session::new(id, UserId(user), completed_at);
    s.frameworks = frameworks.iter().map(|f| f.to_string()).collect();
    s.duration_minutes = 45.0;
    s.complexity_score = 4.0;
    s.quality_score = 60.0;
    s
}

/// Port wrapper that injects commit failures and latency
pub struct FlakyPort {
    pub inner: Arc<MemoryStore>,
    failing_users: BTreeSet<UserId>,
    delay: std::time::Duration,
    pub commits: AtomicUsize,
}

impl FlakyPort {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing_users: BTreeSet::new(),
            delay: std::time::Duration::ZERO,
            commits: AtomicUsize::new(0),
        }
    }

    /// Reject every commit for `user`
    pub fn failing_for(mut self, user: i64) -> Self {
        self.failing_users.insert(UserId(user));
        self
    }

    /// Sleep before returning sessions, so each user pass takes at least `delay`
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataAccessPort for FlakyPort {
    async fn get_recent_sessions(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
        max_batch: usize,
        min_duration_minutes: u32,
    ) -> Result<Vec<Session>> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.inner
            .get_recent_sessions(user_id, cutoff, max_batch, min_duration_minutes)
            .await
    }

    async fn get_last_analysis_cutoff(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        self.inner.get_last_analysis_cutoff(user_id).await
    }

    async fn get_asset(&self, user_id: UserId, technology: &str) -> Result<Option<Asset>> {
        self.inner.get_asset(user_id, technology).await
    }

    async fn get_debt(&self, user_id: UserId, technology: &str) -> Result<Option<Debt>> {
        self.inner.get_debt(user_id, technology).await
    }

    async fn count_assets(&self, user_id: UserId) -> Result<usize> {
        self.inner.count_assets(user_id).await
    }

    async fn count_active_debts(&self, user_id: UserId) -> Result<usize> {
        self.inner.count_active_debts(user_id).await
    }

    async fn list_assets(&self, user_id: UserId, active_only: bool) -> Result<Vec<Asset>> {
        self.inner.list_assets(user_id, active_only).await
    }

    async fn list_debts(&self, user_id: UserId, active_only: bool) -> Result<Vec<Debt>> {
        self.inner.list_debts(user_id, active_only).await
    }

    async fn list_active_users(&self, since_days: u32) -> Result<Vec<UserId>> {
        self.inner.list_active_users(since_days).await
    }

    async fn list_progress_summaries(
        &self,
        user_id: UserId,
        report_period: Option<String>,
        limit: usize,
    ) -> Result<Vec<ProgressSummary>> {
        self.inner
            .list_progress_summaries(user_id, report_period, limit)
            .await
    }

    async fn session_statistics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SessionStatistics> {
        self.inner.session_statistics(user_id, since).await
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        if self.failing_users.contains(&changes.user_id) {
            return Err(StackwiseError::DataAccess(format!(
                "injected commit failure for user {}",
                changes.user_id
            )));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(changes).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

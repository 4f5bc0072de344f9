//! In-memory data access adapter
//!
//! Used by tests and ephemeral runs. All state sits behind one tokio `RwLock`,
//! so a commit is applied under a single write guard.

use super::{ChangeSet, DataAccessPort, SessionStatistics};
use crate::error::{Result, StackwiseError};
use crate::types::{technology_key, Asset, Debt, ProgressSummary, Session, SessionStatus, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    assets: BTreeMap<(UserId, String), Asset>,
    debts: BTreeMap<(UserId, String), Debt>,
    summaries: Vec<ProgressSummary>,
}

impl State {
    fn last_period_end(&self, user_id: UserId) -> Option<DateTime<Utc>> {
        self.summaries
            .iter()
            .filter(|s| s.user_id == user_id)
            .map(|s| s.period_end)
            .max()
    }

    fn completed_sessions(&self, user_id: UserId) -> impl Iterator<Item = &Session> {
        self.sessions
            .iter()
            .filter(move |s| s.user_id == user_id && s.status == SessionStatus::Completed)
    }
}

/// Data access port backed by process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_session(&self, session: Session) {
        self.state.write().await.sessions.push(session);
    }

    pub async fn insert_sessions(&self, sessions: impl IntoIterator<Item = Session>) {
        self.state.write().await.sessions.extend(sessions);
    }

    /// Seed an asset, replacing any existing one for the same technology
    pub async fn insert_asset(&self, asset: Asset) {
        let key = (asset.user_id, asset.key());
        self.state.write().await.assets.insert(key, asset);
    }

    pub async fn insert_debt(&self, debt: Debt) {
        let key = (debt.user_id, debt.key());
        self.state.write().await.debts.insert(key, debt);
    }

    pub async fn assets(&self, user_id: UserId) -> Vec<Asset> {
        self.state
            .read()
            .await
            .assets
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect()
    }

    pub async fn debts(&self, user_id: UserId) -> Vec<Debt> {
        self.state
            .read()
            .await
            .debts
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Progress summaries for a user in commit order
    pub async fn summaries(&self, user_id: UserId) -> Vec<ProgressSummary> {
        self.state
            .read()
            .await
            .summaries
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl DataAccessPort for MemoryStore {
    async fn get_recent_sessions(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
        max_batch: usize,
        min_duration_minutes: u32,
    ) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state
            .completed_sessions(user_id)
            .filter(|s| s.completed_at > cutoff)
            .filter(|s| s.duration_minutes >= f64::from(min_duration_minutes))
            .cloned()
            .collect();

        sessions.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
        sessions.truncate(max_batch);
        Ok(sessions)
    }

    async fn get_last_analysis_cutoff(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        Ok(self.state.read().await.last_period_end(user_id))
    }

    async fn get_asset(&self, user_id: UserId, technology: &str) -> Result<Option<Asset>> {
        let key = (user_id, technology_key(technology));
        Ok(self.state.read().await.assets.get(&key).cloned())
    }

    async fn get_debt(&self, user_id: UserId, technology: &str) -> Result<Option<Debt>> {
        let key = (user_id, technology_key(technology));
        Ok(self.state.read().await.debts.get(&key).cloned())
    }

    async fn count_assets(&self, user_id: UserId) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state.assets.keys().filter(|(u, _)| *u == user_id).count())
    }

    async fn count_active_debts(&self, user_id: UserId) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .debts
            .values()
            .filter(|d| d.user_id == user_id && d.is_active)
            .count())
    }

    async fn list_assets(&self, user_id: UserId, active_only: bool) -> Result<Vec<Asset>> {
        let mut assets = self.assets(user_id).await;
        assets.retain(|a| !active_only || a.is_active);
        Ok(assets)
    }

    async fn list_debts(&self, user_id: UserId, active_only: bool) -> Result<Vec<Debt>> {
        let mut debts = self.debts(user_id).await;
        debts.retain(|d| !active_only || d.is_active);
        Ok(debts)
    }

    async fn list_active_users(&self, since_days: u32) -> Result<Vec<UserId>> {
        let since = Utc::now() - Duration::days(i64::from(since_days));
        let state = self.state.read().await;
        let users: BTreeSet<UserId> = state
            .sessions
            .iter()
            .filter(|s| s.status == SessionStatus::Completed && s.completed_at >= since)
            .map(|s| s.user_id)
            .collect();
        Ok(users.into_iter().collect())
    }

    async fn list_progress_summaries(
        &self,
        user_id: UserId,
        report_period: Option<String>,
        limit: usize,
    ) -> Result<Vec<ProgressSummary>> {
        let mut summaries: Vec<ProgressSummary> = self
            .summaries(user_id)
            .await
            .into_iter()
            .filter(|s| report_period.as_ref().map_or(true, |p| &s.report_period == p))
            .collect();
        // Stable sort keeps later commits ahead on equal timestamps
        summaries.reverse();
        summaries.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    async fn session_statistics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SessionStatistics> {
        let state = self.state.read().await;
        let sessions: Vec<Session> = state
            .completed_sessions(user_id)
            .filter(|s| s.completed_at >= since)
            .cloned()
            .collect();
        Ok(SessionStatistics::from_sessions(&sessions))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.check_consistency()?;
        let user_id = changes.user_id;
        let mut state = self.state.write().await;

        // Validate everything before touching state
        for staged in &changes.assets {
            let exists = state.assets.contains_key(&(user_id, staged.asset.key()));
            if staged.created && exists {
                return Err(StackwiseError::Conflict(format!(
                    "asset {} already exists for user {}",
                    staged.asset.technology_name, user_id
                )));
            }
            if !staged.created && !exists {
                return Err(StackwiseError::Conflict(format!(
                    "asset {} does not exist for user {}",
                    staged.asset.technology_name, user_id
                )));
            }
        }
        for staged in &changes.debts {
            let exists = state.debts.contains_key(&(user_id, staged.debt.key()));
            if staged.created && exists {
                return Err(StackwiseError::Conflict(format!(
                    "debt {} already exists for user {}",
                    staged.debt.technology_name, user_id
                )));
            }
            if !staged.created && !exists {
                return Err(StackwiseError::Conflict(format!(
                    "debt {} does not exist for user {}",
                    staged.debt.technology_name, user_id
                )));
            }
        }
        if let (Some(summary), Some(last)) = (&changes.summary, state.last_period_end(user_id)) {
            if summary.period_end < last {
                return Err(StackwiseError::Conflict(format!(
                    "period_end {} precedes checkpoint {} for user {}",
                    summary.period_end, last, user_id
                )));
            }
        }

        debug!(
            "Committing {} assets, {} debts for user {}",
            changes.assets.len(),
            changes.debts.len(),
            user_id
        );

        for staged in changes.assets {
            let key = (user_id, staged.asset.key());
            state.assets.insert(key, staged.asset);
        }
        for staged in changes.debts {
            let key = (user_id, staged.debt.key());
            state.debts.insert(key, staged.debt);
        }
        if let Some(summary) = changes.summary {
            state.summaries.push(summary);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

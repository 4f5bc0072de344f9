//! Storage layer for the Stackwise pipeline
//!
//! The analysis engine only talks to [`DataAccessPort`]. Writes for one user
//! pass are staged in a [`UnitOfWork`] and handed to the port as a single
//! [`ChangeSet`], which adapters apply atomically or not at all.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{Result, StackwiseError};
use crate::types::{technology_key, Asset, Debt, ProgressSummary, Session, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Narrow interface over session, asset, debt and summary storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DataAccessPort: Send + Sync {
    /// Completed sessions newer than `cutoff` and at least `min_duration_minutes`
    /// long, newest first, at most `max_batch`
    async fn get_recent_sessions(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
        max_batch: usize,
        min_duration_minutes: u32,
    ) -> Result<Vec<Session>>;

    /// `period_end` of the user's latest progress summary
    async fn get_last_analysis_cutoff(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>>;

    /// Case-insensitive asset lookup
    async fn get_asset(&self, user_id: UserId, technology: &str) -> Result<Option<Asset>>;

    /// Case-insensitive debt lookup
    async fn get_debt(&self, user_id: UserId, technology: &str) -> Result<Option<Debt>>;

    async fn count_assets(&self, user_id: UserId) -> Result<usize>;

    async fn count_active_debts(&self, user_id: UserId) -> Result<usize>;

    async fn list_assets(&self, user_id: UserId, active_only: bool) -> Result<Vec<Asset>>;

    async fn list_debts(&self, user_id: UserId, active_only: bool) -> Result<Vec<Debt>>;

    /// Users with a completed session in the last `since_days` days, ascending
    async fn list_active_users(&self, since_days: u32) -> Result<Vec<UserId>>;

    /// Latest progress summaries first, optionally for one report period
    async fn list_progress_summaries(
        &self,
        user_id: UserId,
        report_period: Option<String>,
        limit: usize,
    ) -> Result<Vec<ProgressSummary>>;

    /// Aggregate statistics over completed sessions since `since`
    async fn session_statistics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SessionStatistics>;

    /// Apply a change set atomically
    ///
    /// Rejects with [`StackwiseError::Conflict`] when the set would create a
    /// second asset or debt for a technology, update one that does not exist,
    /// or move `period_end` backwards.
    async fn commit(&self, changes: ChangeSet) -> Result<()>;

    /// Reachability check used by the health check
    async fn ping(&self) -> Result<()>;
}

/// Activity statistics for one user over a window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStatistics {
    pub total_sessions: usize,
    pub total_duration_hours: f64,
    pub average_quality_score: f64,
    /// (technology, sessions using it), most used first
    pub technologies_used: Vec<(String, usize)>,
    pub projects_worked_on: Vec<String>,
}

impl SessionStatistics {
    pub fn from_sessions(sessions: &[Session]) -> Self {
        if sessions.is_empty() {
            return Self::default();
        }

        let mut counts: BTreeMap<String, (String, usize)> = BTreeMap::new();
        let mut projects = BTreeSet::new();
        let mut total_minutes = 0.0;
        let mut total_quality = 0.0;

        for session in sessions {
            total_minutes += session.duration_minutes;
            total_quality += session.quality_score;

            let mut seen = BTreeSet::new();
            let names = session
                .primary_technology
                .iter()
                .chain(&session.frameworks)
                .chain(&session.libraries)
                .chain(&session.tools)
                .chain(&session.technologies);
            for name in names {
                let key = technology_key(name);
                if key.is_empty() || !seen.insert(key.clone()) {
                    continue;
                }
                counts
                    .entry(key)
                    .or_insert_with(|| (name.trim().to_string(), 0))
                    .1 += 1;
            }

            if let Some(project) = session.project_name.as_deref().map(str::trim) {
                if !project.is_empty() {
                    projects.insert(project.to_string());
                }
            }
        }

        let mut technologies_used: Vec<(String, usize)> = counts.into_values().collect();
        technologies_used.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total_sessions: sessions.len(),
            total_duration_hours: total_minutes / 60.0,
            average_quality_score: total_quality / sessions.len() as f64,
            technologies_used,
            projects_worked_on: projects.into_iter().collect(),
        }
    }
}

/// An asset write, flagged with whether it creates the row
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAsset {
    pub asset: Asset,
    pub created: bool,
}

/// A debt write, flagged the same way
#[derive(Debug, Clone, PartialEq)]
pub struct StagedDebt {
    pub debt: Debt,
    pub created: bool,
}

/// Every write produced by one user's analysis pass
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeSet {
    pub user_id: UserId,
    pub assets: Vec<StagedAsset>,
    pub debts: Vec<StagedDebt>,
    pub summary: Option<ProgressSummary>,
}

impl ChangeSet {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            assets: Vec::new(),
            debts: Vec::new(),
            summary: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty() && self.debts.is_empty() && self.summary.is_none()
    }

    /// Checks that only depend on the set itself
    pub(crate) fn check_consistency(&self) -> Result<()> {
        let mut asset_keys = BTreeSet::new();
        for staged in &self.assets {
            if staged.asset.user_id != self.user_id {
                return Err(StackwiseError::Conflict(format!(
                    "asset {} belongs to user {}, not {}",
                    staged.asset.technology_name, staged.asset.user_id, self.user_id
                )));
            }
            if !asset_keys.insert(staged.asset.key()) {
                return Err(StackwiseError::Conflict(format!(
                    "duplicate asset {} in change set",
                    staged.asset.technology_name
                )));
            }
        }

        let mut debt_keys = BTreeSet::new();
        for staged in &self.debts {
            let debt = &staged.debt;
            if debt.user_id != self.user_id || !debt_keys.insert(debt.key()) {
                return Err(StackwiseError::Conflict(format!(
                    "invalid debt {} in change set for user {}",
                    debt.technology_name, self.user_id
                )));
            }
        }

        if let Some(summary) = &self.summary {
            if summary.user_id != self.user_id {
                return Err(StackwiseError::Conflict(format!(
                    "summary for user {} in change set for user {}",
                    summary.user_id, self.user_id
                )));
            }
        }
        Ok(())
    }
}

/// Result of [`UnitOfWork::get_or_create_asset`]
#[derive(Debug, Clone)]
pub struct AssetEntry {
    pub asset: Asset,
    pub created: bool,
}

/// Staged writes for one user's pass
///
/// Reads consult staged state before the port, so later steps of a pass see
/// what earlier steps created. Dropping the unit without calling
/// [`UnitOfWork::commit`] discards every staged change.
pub struct UnitOfWork<'a> {
    port: &'a dyn DataAccessPort,
    user_id: UserId,
    assets: BTreeMap<String, StagedAsset>,
    debts: BTreeMap<String, StagedDebt>,
    summary: Option<ProgressSummary>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(port: &'a dyn DataAccessPort, user_id: UserId) -> Self {
        Self {
            port,
            user_id,
            assets: BTreeMap::new(),
            debts: BTreeMap::new(),
            summary: None,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Load the asset for `technology`, or stage a new zeroed one
    pub async fn get_or_create_asset(
        &mut self,
        technology: &str,
        category: &str,
    ) -> Result<AssetEntry> {
        let key = technology_key(technology);
        if let Some(staged) = self.assets.get(&key) {
            return Ok(AssetEntry {
                asset: staged.asset.clone(),
                created: staged.created,
            });
        }

        if let Some(asset) = self.port.get_asset(self.user_id, technology).await? {
            return Ok(AssetEntry {
                asset,
                created: false,
            });
        }

        let asset = Asset::new(self.user_id, technology, category);
        self.assets.insert(
            key,
            StagedAsset {
                asset: asset.clone(),
                created: true,
            },
        );
        Ok(AssetEntry {
            asset,
            created: true,
        })
    }

    pub fn save_asset(&mut self, asset: Asset) {
        let key = asset.key();
        let created = self.assets.get(&key).map(|s| s.created).unwrap_or(false);
        self.assets.insert(key, StagedAsset { asset, created });
    }

    pub async fn get_asset(&self, technology: &str) -> Result<Option<Asset>> {
        match self.assets.get(&technology_key(technology)) {
            Some(staged) => Ok(Some(staged.asset.clone())),
            None => self.port.get_asset(self.user_id, technology).await,
        }
    }

    pub async fn get_debt(&self, technology: &str) -> Result<Option<Debt>> {
        match self.debts.get(&technology_key(technology)) {
            Some(staged) => Ok(Some(staged.debt.clone())),
            None => self.port.get_debt(self.user_id, technology).await,
        }
    }

    pub fn create_debt(&mut self, debt: Debt) -> Result<()> {
        let key = debt.key();
        if self.debts.contains_key(&key) {
            return Err(StackwiseError::Conflict(format!(
                "debt {} already staged for user {}",
                debt.technology_name, self.user_id
            )));
        }
        self.debts.insert(
            key,
            StagedDebt {
                debt,
                created: true,
            },
        );
        Ok(())
    }

    /// Stage changes to a debt loaded through [`UnitOfWork::get_debt`]
    pub fn save_debt(&mut self, debt: Debt) {
        let key = debt.key();
        let created = self.debts.get(&key).map(|s| s.created).unwrap_or(false);
        self.debts.insert(key, StagedDebt { debt, created });
    }

    pub fn create_progress_summary(&mut self, summary: ProgressSummary) {
        self.summary = Some(summary);
    }

    /// Stored asset count plus assets created in this unit
    pub async fn count_assets(&self) -> Result<usize> {
        Ok(self.port.count_assets(self.user_id).await? + self.assets_created())
    }

    /// Stored active debt count plus active debts created in this unit
    pub async fn count_active_debts(&self) -> Result<usize> {
        let staged = self
            .debts
            .values()
            .filter(|s| s.created && s.debt.is_active)
            .count();
        Ok(self.port.count_active_debts(self.user_id).await? + staged)
    }

    pub fn assets_created(&self) -> usize {
        self.assets.values().filter(|s| s.created).count()
    }

    pub fn debts_created(&self) -> usize {
        self.debts.values().filter(|s| s.created).count()
    }

    pub fn into_change_set(self) -> ChangeSet {
        ChangeSet {
            user_id: self.user_id,
            assets: self.assets.into_values().collect(),
            debts: self.debts.into_values().collect(),
            summary: self.summary,
        }
    }

    pub async fn commit(self) -> Result<()> {
        let port = self.port;
        let changes = self.into_change_set();
        if changes.is_empty() {
            return Ok(());
        }
        port.commit(changes).await
    }
}

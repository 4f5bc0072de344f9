//! Read-only rollup reports
//!
//! Monthly and quarterly aggregates over stored sessions, assets and debts,
//! plus per-user views over a single user's records.
//! No report mutates any score.

use crate::error::Result;
use crate::storage::DataAccessPort;
use crate::types::{technology_key, Debt, DebtStatus, ProficiencyLevel, ProgressSummary, UserId};
use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Users counted by the monthly summary
pub const MONTHLY_WINDOW_DAYS: u32 = 30;

/// Users counted by the quarterly report
pub const QUARTERLY_WINDOW_DAYS: u32 = 90;

const TOP_TECHNOLOGIES: usize = 10;
const TOP_SKILLS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySummary {
    /// `YYYY-MM`
    pub period: String,
    pub active_users: usize,
    pub total_sessions: usize,
    pub total_learning_hours: f64,
    /// (technology, sessions), most used first
    pub top_technologies: Vec<(String, usize)>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSkillTrend {
    pub user_id: UserId,
    pub avg_proficiency: f64,
    pub total_assets: usize,
    pub active_debts: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarterlyReport {
    /// `Q{n}-{year}`
    pub period: String,
    pub active_users: usize,
    pub skill_growth_trends: Vec<UserSkillTrend>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkillEntry {
    pub name: String,
    pub category: String,
    pub proficiency_score: f64,
    pub proficiency_level: ProficiencyLevel,
    pub overall_score: f64,
}

/// Snapshot of one user's assets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetStatistics {
    pub user_id: UserId,
    pub total_assets: usize,
    pub active_assets: usize,
    pub average_proficiency: f64,
    /// Mean of the scored skill dimensions over all assets
    pub average_overall_score: f64,
    pub category_distribution: BTreeMap<String, usize>,
    /// Every level is present, zero when unused
    pub proficiency_distribution: BTreeMap<String, usize>,
    /// Highest proficiency first
    pub top_skills: Vec<SkillEntry>,
}

pub fn month_period(at: DateTime<Utc>) -> String {
    at.format("%Y-%m").to_string()
}

pub fn quarter_period(at: DateTime<Utc>) -> String {
    format!("Q{}-{}", (at.month() - 1) / 3 + 1, at.year())
}

pub async fn monthly_summary(port: &dyn DataAccessPort) -> Result<MonthlySummary> {
    let now = Utc::now();
    let since = now - Duration::days(i64::from(MONTHLY_WINDOW_DAYS));
    let users = port.list_active_users(MONTHLY_WINDOW_DAYS).await?;

    let mut total_sessions = 0;
    let mut total_learning_hours = 0.0;
    let mut technologies: BTreeMap<String, (String, usize)> = BTreeMap::new();

    for user_id in &users {
        let stats = port.session_statistics(*user_id, since).await?;
        total_sessions += stats.total_sessions;
        total_learning_hours += stats.total_duration_hours;
        for (tech, count) in stats.technologies_used {
            technologies
                .entry(technology_key(&tech))
                .or_insert_with(|| (tech, 0))
                .1 += count;
        }
    }

    let mut top_technologies: Vec<(String, usize)> = technologies.into_values().collect();
    top_technologies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_technologies.truncate(TOP_TECHNOLOGIES);

    let summary = MonthlySummary {
        period: month_period(now),
        active_users: users.len(),
        total_sessions,
        total_learning_hours,
        top_technologies,
        generated_at: now,
    };
    info!(
        "Monthly summary {}: {} active users, {} sessions, {:.1} learning hours",
        summary.period, summary.active_users, summary.total_sessions, summary.total_learning_hours
    );
    Ok(summary)
}

pub async fn quarterly_report(port: &dyn DataAccessPort) -> Result<QuarterlyReport> {
    let now = Utc::now();
    let users = port.list_active_users(QUARTERLY_WINDOW_DAYS).await?;

    let mut skill_growth_trends = Vec::with_capacity(users.len());
    for user_id in &users {
        let assets = port.list_assets(*user_id, true).await?;
        let debts = port.list_debts(*user_id, true).await?;

        let avg_proficiency = if assets.is_empty() {
            0.0
        } else {
            assets.iter().map(|a| a.proficiency_score).sum::<f64>() / assets.len() as f64
        };

        skill_growth_trends.push(UserSkillTrend {
            user_id: *user_id,
            avg_proficiency,
            total_assets: assets.len(),
            active_debts: debts.len(),
        });
    }

    info!(
        "Quarterly report {} completed for {} users",
        quarter_period(now),
        users.len()
    );
    Ok(QuarterlyReport {
        period: quarter_period(now),
        active_users: users.len(),
        skill_growth_trends,
        generated_at: now,
    })
}

/// Open debts (identified, planned or learning), highest priority first
pub async fn high_priority_debts(
    port: &dyn DataAccessPort,
    user_id: UserId,
    limit: usize,
) -> Result<Vec<Debt>> {
    let mut debts: Vec<Debt> = port
        .list_debts(user_id, true)
        .await?
        .into_iter()
        .filter(|d| {
            matches!(
                d.status,
                DebtStatus::Identified | DebtStatus::Planned | DebtStatus::Learning
            )
        })
        .collect();

    debts.sort_by(|a, b| {
        b.priority_score()
            .total_cmp(&a.priority_score())
            .then_with(|| b.learning_priority.cmp(&a.learning_priority))
            .then_with(|| a.key().cmp(&b.key()))
    });
    debts.truncate(limit);
    Ok(debts)
}

pub async fn asset_statistics(port: &dyn DataAccessPort, user_id: UserId) -> Result<AssetStatistics> {
    let mut assets = port.list_assets(user_id, false).await?;

    let mut proficiency_distribution: BTreeMap<String, usize> = [
        ProficiencyLevel::Beginner,
        ProficiencyLevel::Intermediate,
        ProficiencyLevel::Advanced,
        ProficiencyLevel::Expert,
    ]
    .iter()
    .map(|level| (level.as_str().to_string(), 0))
    .collect();
    let mut category_distribution = BTreeMap::new();
    for asset in &assets {
        *category_distribution.entry(asset.category.clone()).or_insert(0) += 1;
        *proficiency_distribution
            .entry(asset.proficiency_level.as_str().to_string())
            .or_insert(0) += 1;
    }

    let mean = |values: Vec<f64>| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let average_proficiency = mean(assets.iter().map(|a| a.proficiency_score).collect());
    let average_overall_score = mean(assets.iter().map(|a| a.overall_score()).collect());

    assets.sort_by(|a, b| {
        b.proficiency_score
            .total_cmp(&a.proficiency_score)
            .then_with(|| a.key().cmp(&b.key()))
    });
    let top_skills = assets
        .iter()
        .take(TOP_SKILLS)
        .map(|a| SkillEntry {
            name: a.technology_name.clone(),
            category: a.category.clone(),
            proficiency_score: a.proficiency_score,
            proficiency_level: a.proficiency_level,
            overall_score: a.overall_score(),
        })
        .collect();

    Ok(AssetStatistics {
        user_id,
        total_assets: assets.len(),
        active_assets: assets.iter().filter(|a| a.is_active).count(),
        average_proficiency,
        average_overall_score,
        category_distribution,
        proficiency_distribution,
        top_skills,
    })
}

/// Latest progress summaries, newest first
pub async fn learning_progress(
    port: &dyn DataAccessPort,
    user_id: UserId,
    report_period: Option<&str>,
    limit: usize,
) -> Result<Vec<ProgressSummary>> {
    port.list_progress_summaries(user_id, report_period.map(String::from), limit)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ChangeSet, MemoryStore};
    use crate::types::{Asset, Session, UrgencyLevel};
    use chrono::TimeZone;

    #[test]
    fn test_period_labels() {
        let at = Utc.with_ymd_and_hms(2026, 2, 14, 9, 0, 0).unwrap();
        assert_eq!(month_period(at), "2026-02");
        assert_eq!(quarter_period(at), "Q1-2026");

        let at = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(quarter_period(at), "Q4-2025");
    }

    #[tokio::test]
    async fn test_monthly_summary_merges_users() {
        let store = MemoryStore::new();
        for (id, user, techs) in [
            ("a", 1, vec!["Rust", "SQL"]),
            ("b", 1, vec!["rust"]),
            ("c", 2, vec!["Rust"]),
        ] {
            let mut s = Session::new(id, UserId(user), Utc::now() - Duration::hours(2));
            s.technologies = techs.into_iter().map(String::from).collect();
            s.duration_minutes = 30.0;
            store.insert_session(s).await;
        }

        let summary = monthly_summary(&store).await.unwrap();
        assert_eq!(summary.active_users, 2);
        assert_eq!(summary.total_sessions, 3);
        assert!((summary.total_learning_hours - 1.5).abs() < 1e-9);
        assert_eq!(summary.top_technologies[0].1, 3);
        assert_eq!(summary.top_technologies[1], ("SQL".to_string(), 1));
    }

    #[tokio::test]
    async fn test_quarterly_report_averages_active_assets() {
        let store = MemoryStore::new();
        store
            .insert_session(Session::new("a", UserId(1), Utc::now() - Duration::days(40)))
            .await;

        let mut go = Asset::new(UserId(1), "Go", "programming_language");
        go.proficiency_score = 40.0;
        let mut rust = Asset::new(UserId(1), "Rust", "programming_language");
        rust.proficiency_score = 60.0;
        let mut stale = Asset::new(UserId(1), "Perl", "programming_language");
        stale.proficiency_score = 90.0;
        stale.is_active = false;
        for asset in [go, rust, stale] {
            store.insert_asset(asset).await;
        }
        store.insert_debt(Debt::new(UserId(1), "SQL", "query_language")).await;

        let report = quarterly_report(&store).await.unwrap();
        assert_eq!(report.active_users, 1);
        let trend = &report.skill_growth_trends[0];
        assert!((trend.avg_proficiency - 50.0).abs() < 1e-9);
        assert_eq!(trend.total_assets, 2);
        assert_eq!(trend.active_debts, 1);
    }

    #[tokio::test]
    async fn test_high_priority_debts_ordering() {
        let store = MemoryStore::new();
        let mut sql = Debt::new(UserId(1), "SQL", "query_language");
        sql.importance_score = 90.0;
        sql.urgency_level = UrgencyLevel::Critical;
        let mut css = Debt::new(UserId(1), "CSS", "stylesheet_language");
        css.importance_score = 40.0;
        css.start_learning();
        let mut done = Debt::new(UserId(1), "HTML", "markup_language");
        done.importance_score = 100.0;
        done.update_progress(100.0, 8.0);
        let mut retired = Debt::new(UserId(1), "Perl", "programming_language");
        retired.is_active = false;
        let other_user = Debt::new(UserId(2), "Go", "programming_language");
        for debt in [sql, css, done, retired, other_user] {
            store.insert_debt(debt).await;
        }

        let debts = high_priority_debts(&store, UserId(1), 10).await.unwrap();
        let names: Vec<&str> = debts.iter().map(|d| d.technology_name.as_str()).collect();
        assert_eq!(names, vec!["SQL", "CSS"]);

        let top = high_priority_debts(&store, UserId(1), 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].technology_name, "SQL");
    }

    #[tokio::test]
    async fn test_asset_statistics() {
        let store = MemoryStore::new();
        let mut rust = Asset::new(UserId(3), "Rust", "programming_language");
        rust.proficiency_score = 70.0;
        rust.proficiency_level = ProficiencyLevel::Advanced;
        rust.practical_skills = 40.0;
        rust.problem_solving = 20.0;
        let mut docker = Asset::new(UserId(3), "Docker", "tool");
        docker.proficiency_score = 20.0;
        docker.is_active = false;
        store.insert_asset(rust).await;
        store.insert_asset(docker).await;

        let stats = asset_statistics(&store, UserId(3)).await.unwrap();
        assert_eq!(stats.total_assets, 2);
        assert_eq!(stats.active_assets, 1);
        assert!((stats.average_proficiency - 45.0).abs() < 1e-9);
        // Rust scores 30 across its two scored dimensions, Docker has none
        assert!((stats.average_overall_score - 15.0).abs() < 1e-9);
        assert_eq!(stats.category_distribution["tool"], 1);
        assert_eq!(stats.proficiency_distribution["advanced"], 1);
        assert_eq!(stats.proficiency_distribution["beginner"], 1);
        assert_eq!(stats.proficiency_distribution["expert"], 0);
        assert_eq!(stats.top_skills[0].name, "Rust");
        assert!((stats.top_skills[0].overall_score - 30.0).abs() < 1e-9);

        let empty = asset_statistics(&store, UserId(9)).await.unwrap();
        assert_eq!(empty.total_assets, 0);
        assert_eq!(empty.average_proficiency, 0.0);
        assert!(empty.top_skills.is_empty());
    }

    #[tokio::test]
    async fn test_learning_progress_filters_period() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (hours_ago, period) in [(3, "analysis_cycle"), (2, "monthly"), (1, "analysis_cycle")] {
            let end = now - Duration::hours(hours_ago);
            let mut changes = ChangeSet::new(UserId(1));
            changes.summary = Some(ProgressSummary {
                user_id: UserId(1),
                report_period: period.to_string(),
                period_start: end - Duration::days(1),
                period_end: end,
                total_assets: 0,
                new_assets_acquired: 0,
                new_debts_identified: 0,
                total_debts: 0,
                total_learning_hours: hours_ago as f64,
                practice_sessions: 0,
                projects_completed: 0,
                generated_at: end,
            });
            store.commit(changes).await.unwrap();
        }

        let all = learning_progress(&store, UserId(1), None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].total_learning_hours, 1.0);

        let cycles = learning_progress(&store, UserId(1), Some("analysis_cycle"), 10)
            .await
            .unwrap();
        let hours: Vec<f64> = cycles.iter().map(|s| s.total_learning_hours).collect();
        assert_eq!(hours, vec![1.0, 3.0]);
    }
}

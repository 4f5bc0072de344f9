//! End-to-end analysis passes against the in-memory store

mod common;

use chrono::{Duration, Utc};
use common::{framework_session, session, FlakyPort};
use stackwise_core::scheduler::JobStatus;
use stackwise_core::{
    reports, AnalysisConfig, AnalysisEngine, AnalysisScheduler, Asset, Debt, DebtStatus, JobId,
    MemoryStore, ProficiencyLevel, RunStatus, UrgencyLevel, UserId,
};
use std::sync::Arc;

fn engine(store: Arc<MemoryStore>) -> AnalysisEngine {
    AnalysisEngine::new(store, AnalysisConfig::default())
}

#[tokio::test]
async fn test_python_session_scores_new_asset() {
    let store = Arc::new(MemoryStore::new());
    let mut s = session("s1", 1, "Python", 30);
    s.duration_minutes = 120.0;
    s.complexity_score = 6.0;
    s.quality_score = 80.0;
    store.insert_session(s).await;

    let result = engine(store.clone()).run_analysis(Some(UserId(1))).await;
    assert_eq!(result.status, RunStatus::Success);

    let assets = store.assets(UserId(1)).await;
    assert_eq!(assets.len(), 1);
    // base 10 + duration 4 * 0.3 + complexity 6 * 0.4 + quality 16 * 0.3
    assert!((assets[0].proficiency_score - 18.4).abs() < 1e-9);
    assert_eq!(assets[0].proficiency_level, ProficiencyLevel::Beginner);
}

#[tokio::test]
async fn test_rerun_without_new_sessions_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_sessions(vec![
            session("s1", 1, "Rust", 90),
            session("s2", 1, "Rust", 60),
            session("s3", 1, "Go", 30),
        ])
        .await;
    let engine = engine(store.clone());

    let first = engine.run_analysis(Some(UserId(1))).await;
    assert_eq!(first.sessions_processed, 3);
    let scores: Vec<f64> = store
        .assets(UserId(1))
        .await
        .iter()
        .map(|a| a.proficiency_score)
        .collect();

    let second = engine.run_analysis(Some(UserId(1))).await;
    assert_eq!(second.status, RunStatus::Success);
    assert_eq!(second.sessions_processed, 0);
    assert_eq!(second.assets_updated, 0);

    let after: Vec<f64> = store
        .assets(UserId(1))
        .await
        .iter()
        .map(|a| a.proficiency_score)
        .collect();
    assert_eq!(scores, after);
    assert_eq!(store.summaries(UserId(1)).await.len(), 1);
}

#[tokio::test]
async fn test_new_sessions_after_checkpoint_are_picked_up() {
    let store = Arc::new(MemoryStore::new());
    store.insert_session(session("s1", 1, "Rust", 60)).await;
    let engine = engine(store.clone());
    engine.run_analysis(Some(UserId(1))).await;
    let before = store.assets(UserId(1)).await[0].proficiency_score;

    let mut later = session("s2", 1, "rust", 0);
    later.completed_at = Utc::now() + Duration::seconds(5);
    store.insert_session(later).await;

    let result = engine.run_analysis(Some(UserId(1))).await;
    assert_eq!(result.sessions_processed, 1);

    let assets = store.assets(UserId(1)).await;
    assert_eq!(assets.len(), 1, "case variants must not duplicate the asset");
    assert!(assets[0].proficiency_score > before);
    assert_eq!(store.summaries(UserId(1)).await.len(), 2);
}

#[tokio::test]
async fn test_react_infers_missing_related_technologies() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_asset(Asset::new(UserId(1), "Node.js", "runtime"))
        .await;
    store
        .insert_session(framework_session(
            "s1",
            1,
            &["React"],
            Utc::now() - Duration::hours(1),
        ))
        .await;

    let result = engine(store.clone()).run_analysis(Some(UserId(1))).await;
    assert_eq!(result.debts_identified, 3);

    let mut debts: Vec<String> = store
        .debts(UserId(1))
        .await
        .into_iter()
        .map(|d| d.technology_name)
        .collect();
    debts.sort();
    assert_eq!(debts, vec!["CSS", "HTML", "JavaScript"]);

    let javascript = store
        .debts(UserId(1))
        .await
        .into_iter()
        .find(|d| d.technology_name == "JavaScript")
        .unwrap();
    assert_eq!(javascript.category, "programming_language");
    assert_eq!(javascript.urgency_level, UrgencyLevel::Medium);
}

#[tokio::test]
async fn test_existing_debt_is_not_duplicated() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_debt(Debt::new(UserId(1), "javascript", "programming_language"))
        .await;
    store
        .insert_session(framework_session(
            "s1",
            1,
            &["Express.js"],
            Utc::now() - Duration::hours(1),
        ))
        .await;

    let result = engine(store.clone()).run_analysis(Some(UserId(1))).await;
    assert_eq!(result.debts_identified, 1);

    let debts = store.debts(UserId(1)).await;
    assert_eq!(debts.len(), 2);
    assert!(debts.iter().any(|d| d.technology_name == "Node.js"));
}

#[tokio::test]
async fn test_failing_user_does_not_block_others() {
    let store = Arc::new(MemoryStore::new());
    for user in 1..=3 {
        store
            .insert_session(session(&format!("s{}", user), user, "Kotlin", 20))
            .await;
    }
    let port = Arc::new(FlakyPort::new(store.clone()).failing_for(2));
    let engine = AnalysisEngine::new(port.clone(), AnalysisConfig::default());

    let result = engine.run_analysis(None).await;
    assert_eq!(result.status, RunStatus::Success);
    assert_eq!(result.analyzed_users, 2);
    assert_eq!(result.failed_users, 1);
    assert_eq!(port.commit_count(), 2);

    assert_eq!(store.assets(UserId(1)).await.len(), 1);
    assert!(store.assets(UserId(2)).await.is_empty());
    assert!(store.summaries(UserId(2)).await.is_empty());
    assert_eq!(store.assets(UserId(3)).await.len(), 1);

    let failed = result
        .per_user_results
        .iter()
        .find(|r| r.user_id == UserId(2))
        .unwrap();
    assert!(failed.error.as_ref().unwrap().contains("injected"));
}

#[tokio::test]
async fn test_single_failing_user_is_run_error() {
    let store = Arc::new(MemoryStore::new());
    store.insert_session(session("s1", 1, "Kotlin", 20)).await;
    let port = Arc::new(FlakyPort::new(store.clone()).failing_for(1));
    let engine = AnalysisEngine::new(port.clone(), AnalysisConfig::default());

    let result = engine.run_analysis(Some(UserId(1))).await;
    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.analyzed_users, 0);
    assert_eq!(result.failed_users, 1);
    assert_eq!(port.commit_count(), 0);
    assert!(store.assets(UserId(1)).await.is_empty());
}

#[tokio::test]
async fn test_all_users_failing_marks_job_failed() {
    let store = Arc::new(MemoryStore::new());
    store.insert_session(session("s1", 1, "Kotlin", 20)).await;
    let port = Arc::new(FlakyPort::new(store.clone()).failing_for(1));
    let engine = Arc::new(AnalysisEngine::new(port, AnalysisConfig::default()));
    let scheduler = AnalysisScheduler::new(engine);
    scheduler.start().await.unwrap();

    let run = scheduler.trigger_job(JobId::MainAnalysis).await.unwrap();
    assert_eq!(run.status, JobStatus::Failed);
    let stats = scheduler.job_statistics();
    assert_eq!(stats[&JobId::MainAnalysis].failed_runs, 1);

    scheduler.stop().await.unwrap();
}

#[tokio::test]
async fn test_inferred_debt_learning_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_session(framework_session(
            "s1",
            1,
            &["Flask"],
            Utc::now() - Duration::hours(1),
        ))
        .await;
    let engine = engine(store.clone());
    engine.run_analysis(Some(UserId(1))).await;

    let open = reports::high_priority_debts(store.as_ref(), UserId(1), 10)
        .await
        .unwrap();
    assert_eq!(open.len(), 3);

    engine
        .record_learning_progress(UserId(1), "python", 100.0, 20.0)
        .await
        .unwrap();
    let css = engine
        .record_learning_progress(UserId(1), "CSS", 25.0, 2.0)
        .await
        .unwrap();
    assert_eq!(css.status, DebtStatus::Learning);

    let open = reports::high_priority_debts(store.as_ref(), UserId(1), 10)
        .await
        .unwrap();
    let names: Vec<&str> = open.iter().map(|d| d.technology_name.as_str()).collect();
    assert_eq!(names.len(), 2);
    assert!(!names.contains(&"Python"));

    let history = reports::learning_progress(store.as_ref(), UserId(1), None, 10)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].new_debts_identified, 3);

    let stats = reports::asset_statistics(store.as_ref(), UserId(1)).await.unwrap();
    assert_eq!(stats.total_assets, 1);
    assert_eq!(stats.top_skills[0].name, "Flask");
}

#[tokio::test]
async fn test_short_sessions_are_ignored() {
    let store = Arc::new(MemoryStore::new());
    let mut short = session("s1", 1, "Zig", 10);
    short.duration_minutes = 2.0;
    store.insert_session(short).await;

    let result = engine(store.clone()).run_analysis(Some(UserId(1))).await;
    assert_eq!(result.sessions_processed, 0);
    assert!(store.assets(UserId(1)).await.is_empty());
}

#[tokio::test]
async fn test_disabled_engine_skips() {
    let store = Arc::new(MemoryStore::new());
    store.insert_session(session("s1", 1, "Rust", 10)).await;
    let mut config = AnalysisConfig::default();
    config.basic.enabled = false;
    let engine = AnalysisEngine::new(store.clone(), config);

    let result = engine.run_analysis(None).await;
    assert_eq!(result.status, RunStatus::Skipped);
    assert!(store.assets(UserId(1)).await.is_empty());
    assert!(engine.last_run_time().is_none());
}

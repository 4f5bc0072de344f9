//! SQLite data access adapter
//!
//! rusqlite connections behind a deadpool-sqlite pool. Blocking work runs in
//! `interact` closures; a [`ChangeSet`] is applied inside one SQL transaction.
//! Timestamps are stored as UTC milliseconds, list fields as JSON text.

use super::{ChangeSet, DataAccessPort, SessionStatistics, StagedAsset, StagedDebt};
use crate::error::{Result, StackwiseError};
use crate::types::{
    technology_key, Asset, Debt, DebtStatus, ProficiencyLevel, ProgressSummary, Session,
    SessionStatus, UrgencyLevel, UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use deadpool_sqlite::{Config, Pool, PoolConfig, Runtime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use tracing::{debug, info};

/// Default connection pool size
const DEFAULT_POOL_SIZE: usize = 8;

const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    technologies TEXT NOT NULL DEFAULT '[]',
    primary_technology TEXT,
    frameworks TEXT NOT NULL DEFAULT '[]',
    libraries TEXT NOT NULL DEFAULT '[]',
    tools TEXT NOT NULL DEFAULT '[]',
    duration_minutes REAL NOT NULL DEFAULT 0,
    complexity_score REAL NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL DEFAULT 0,
    project_name TEXT,
    completed_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user_completed ON sessions(user_id, completed_at);

CREATE TABLE IF NOT EXISTS assets (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    technology_name TEXT NOT NULL,
    technology_key TEXT NOT NULL,
    category TEXT NOT NULL,
    proficiency_score REAL NOT NULL,
    proficiency_level TEXT NOT NULL,
    confidence_level REAL NOT NULL,
    practical_skills REAL NOT NULL,
    problem_solving REAL NOT NULL,
    theoretical_knowledge REAL NOT NULL,
    total_practice_hours REAL NOT NULL,
    project_count INTEGER NOT NULL,
    is_active INTEGER NOT NULL,
    first_learned_at INTEGER NOT NULL,
    last_practiced_at INTEGER,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(user_id, technology_key)
);

CREATE TABLE IF NOT EXISTS debts (
    id TEXT PRIMARY KEY,
    user_id INTEGER NOT NULL,
    technology_name TEXT NOT NULL,
    technology_key TEXT NOT NULL,
    category TEXT NOT NULL,
    urgency_level TEXT NOT NULL,
    importance_score REAL NOT NULL,
    career_impact REAL NOT NULL,
    project_relevance REAL NOT NULL,
    target_level TEXT NOT NULL,
    estimated_learning_hours REAL NOT NULL,
    learning_priority INTEGER NOT NULL,
    learning_progress REAL NOT NULL,
    time_invested REAL NOT NULL,
    status TEXT NOT NULL,
    is_active INTEGER NOT NULL,
    auto_generated INTEGER NOT NULL,
    identified_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    UNIQUE(user_id, technology_key)
);

CREATE TABLE IF NOT EXISTS progress_summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    report_period TEXT NOT NULL,
    period_start INTEGER NOT NULL,
    period_end INTEGER NOT NULL,
    total_assets INTEGER NOT NULL,
    new_assets_acquired INTEGER NOT NULL,
    new_debts_identified INTEGER NOT NULL,
    total_debts INTEGER NOT NULL,
    total_learning_hours REAL NOT NULL,
    practice_sessions INTEGER NOT NULL,
    projects_completed INTEGER NOT NULL,
    generated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_summaries_user_end ON progress_summaries(user_id, period_end);
";

const SESSION_COLUMNS: &str = "id, user_id, status, technologies, primary_technology, frameworks, \
     libraries, tools, duration_minutes, complexity_score, quality_score, project_name, completed_at";

const ASSET_COLUMNS: &str = "id, user_id, technology_name, category, proficiency_score, \
     proficiency_level, confidence_level, practical_skills, problem_solving, theoretical_knowledge, \
     total_practice_hours, project_count, is_active, first_learned_at, last_practiced_at, \
     created_at, updated_at";

const DEBT_COLUMNS: &str = "id, user_id, technology_name, category, urgency_level, \
     importance_score, career_impact, project_relevance, target_level, estimated_learning_hours, \
     learning_priority, learning_progress, time_invested, status, is_active, auto_generated, \
     identified_at, updated_at";

/// Data access port backed by a SQLite file
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    /// Open (and create if missing) the database and apply the schema
    pub async fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        Self::with_pool_size(db_path, DEFAULT_POOL_SIZE).await
    }

    pub async fn with_pool_size<P: AsRef<Path>>(db_path: P, pool_size: usize) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();
        info!(
            "Opening SQLite store at: {} (pool_size: {})",
            path_str, pool_size
        );

        let mut config = Config::new(path_str);
        config.pool = Some(PoolConfig::new(pool_size));
        let pool = config.create_pool(Runtime::Tokio1).map_err(|e| {
            StackwiseError::DataAccess(format!("Failed to create connection pool: {}", e))
        })?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes; safe to call repeatedly
    pub async fn initialize_schema(&self) -> Result<()> {
        self.interact(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        debug!("SQLite schema ready");
        Ok(())
    }

    /// Insert sessions recorded elsewhere; rows with a known id are ignored
    pub async fn insert_sessions(&self, sessions: Vec<Session>) -> Result<usize> {
        let mut rows = Vec::with_capacity(sessions.len());
        for session in &sessions {
            session.validate()?;
            rows.push(SessionRow::encode(session)?);
        }

        self.interact(move |conn| {
            let tx = conn.transaction()?;
            let mut inserted = 0;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT OR IGNORE INTO sessions ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    SESSION_COLUMNS
                ))?;
                for (session, row) in sessions.iter().zip(&rows) {
                    inserted += stmt.execute(params![
                        session.id,
                        session.user_id.0,
                        session.status.as_str(),
                        row.technologies,
                        session.primary_technology,
                        row.frameworks,
                        row.libraries,
                        row.tools,
                        session.duration_minutes,
                        session.complexity_score,
                        session.quality_score,
                        session.project_name,
                        session.completed_at.timestamp_millis(),
                    ])?;
                }
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
    }

    async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(|e| {
            StackwiseError::DataAccess(format!("Failed to get connection from pool: {}", e))
        })?;

        conn.interact(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(conn)
        })
        .await
        .map_err(|e| StackwiseError::DataAccess(format!("Pool interaction failed: {}", e)))?
    }

    async fn query_sessions(
        &self,
        user_id: UserId,
        since_millis: i64,
        inclusive: bool,
        min_duration_minutes: u32,
        limit: Option<usize>,
    ) -> Result<Vec<Session>> {
        let op = if inclusive { ">=" } else { ">" };
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let sql = format!(
            "SELECT {} FROM sessions \
             WHERE user_id = ?1 AND status = 'completed' AND completed_at {} ?2 \
               AND duration_minutes >= ?3 \
             ORDER BY completed_at DESC LIMIT ?4",
            SESSION_COLUMNS, op
        );

        self.interact(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![user_id.0, since_millis, f64::from(min_duration_minutes), limit],
                session_from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }
}

struct SessionRow {
    technologies: String,
    frameworks: String,
    libraries: String,
    tools: String,
}

impl SessionRow {
    fn encode(session: &Session) -> Result<Self> {
        Ok(Self {
            technologies: serde_json::to_string(&session.technologies)?,
            frameworks: serde_json::to_string(&session.frameworks)?,
            libraries: serde_json::to_string(&session.libraries)?,
            tools: serde_json::to_string(&session.tools)?,
        })
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}

fn json_list(row: &Row, column: usize) -> rusqlite::Result<Vec<String>> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(column, e.to_string()))
}

fn parse_column<T>(row: &Row, column: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let text: String = row.get(column)?;
    parse(&text).ok_or_else(|| conversion_error(column, format!("unknown value '{}'", text)))
}

fn uuid_column(row: &Row, column: usize) -> rusqlite::Result<uuid::Uuid> {
    let text: String = row.get(column)?;
    uuid::Uuid::parse_str(&text).map_err(|e| conversion_error(column, e.to_string()))
}

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        user_id: UserId(row.get(1)?),
        status: parse_column(row, 2, SessionStatus::parse)?,
        technologies: json_list(row, 3)?,
        primary_technology: row.get(4)?,
        frameworks: json_list(row, 5)?,
        libraries: json_list(row, 6)?,
        tools: json_list(row, 7)?,
        duration_minutes: row.get(8)?,
        complexity_score: row.get(9)?,
        quality_score: row.get(10)?,
        project_name: row.get(11)?,
        completed_at: from_millis(row.get(12)?),
    })
}

fn asset_from_row(row: &Row) -> rusqlite::Result<Asset> {
    Ok(Asset {
        id: uuid_column(row, 0)?,
        user_id: UserId(row.get(1)?),
        technology_name: row.get(2)?,
        category: row.get(3)?,
        proficiency_score: row.get(4)?,
        proficiency_level: parse_column(row, 5, ProficiencyLevel::parse)?,
        confidence_level: row.get(6)?,
        practical_skills: row.get(7)?,
        problem_solving: row.get(8)?,
        theoretical_knowledge: row.get(9)?,
        total_practice_hours: row.get(10)?,
        project_count: row.get(11)?,
        is_active: row.get(12)?,
        first_learned_at: from_millis(row.get(13)?),
        last_practiced_at: row.get::<_, Option<i64>>(14)?.map(from_millis),
        created_at: from_millis(row.get(15)?),
        updated_at: from_millis(row.get(16)?),
    })
}

fn debt_from_row(row: &Row) -> rusqlite::Result<Debt> {
    Ok(Debt {
        id: uuid_column(row, 0)?,
        user_id: UserId(row.get(1)?),
        technology_name: row.get(2)?,
        category: row.get(3)?,
        urgency_level: parse_column(row, 4, UrgencyLevel::parse)?,
        importance_score: row.get(5)?,
        career_impact: row.get(6)?,
        project_relevance: row.get(7)?,
        target_level: parse_column(row, 8, ProficiencyLevel::parse)?,
        estimated_learning_hours: row.get(9)?,
        learning_priority: row.get(10)?,
        learning_progress: row.get(11)?,
        time_invested: row.get(12)?,
        status: parse_column(row, 13, DebtStatus::parse)?,
        is_active: row.get(14)?,
        auto_generated: row.get(15)?,
        identified_at: from_millis(row.get(16)?),
        updated_at: from_millis(row.get(17)?),
    })
}

/// Unique-constraint failures become conflicts, everything else data access
fn write_error(err: rusqlite::Error, what: &str) -> StackwiseError {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            StackwiseError::Conflict(format!("{} already exists", what))
        }
        other => StackwiseError::DataAccess(format!("Failed to write {}: {}", what, other)),
    }
}

fn write_asset(conn: &Connection, staged: &StagedAsset) -> Result<()> {
    let asset = &staged.asset;
    let what = format!("asset {} for user {}", asset.technology_name, asset.user_id);

    if staged.created {
        conn.execute(
            &format!(
                "INSERT INTO assets ({}, technology_key) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                ASSET_COLUMNS
            ),
            params![
                asset.id.to_string(),
                asset.user_id.0,
                asset.technology_name,
                asset.category,
                asset.proficiency_score,
                asset.proficiency_level.as_str(),
                asset.confidence_level,
                asset.practical_skills,
                asset.problem_solving,
                asset.theoretical_knowledge,
                asset.total_practice_hours,
                asset.project_count,
                asset.is_active,
                asset.first_learned_at.timestamp_millis(),
                asset.last_practiced_at.map(|t| t.timestamp_millis()),
                asset.created_at.timestamp_millis(),
                asset.updated_at.timestamp_millis(),
                asset.key(),
            ],
        )
        .map_err(|e| write_error(e, &what))?;
        return Ok(());
    }

    let updated = conn
        .execute(
            "UPDATE assets SET category = ?3, proficiency_score = ?4, proficiency_level = ?5, \
                 confidence_level = ?6, practical_skills = ?7, problem_solving = ?8, \
                 theoretical_knowledge = ?9, total_practice_hours = ?10, project_count = ?11, \
                 is_active = ?12, last_practiced_at = ?13, updated_at = ?14 \
             WHERE user_id = ?1 AND technology_key = ?2",
            params![
                asset.user_id.0,
                asset.key(),
                asset.category,
                asset.proficiency_score,
                asset.proficiency_level.as_str(),
                asset.confidence_level,
                asset.practical_skills,
                asset.problem_solving,
                asset.theoretical_knowledge,
                asset.total_practice_hours,
                asset.project_count,
                asset.is_active,
                asset.last_practiced_at.map(|t| t.timestamp_millis()),
                asset.updated_at.timestamp_millis(),
            ],
        )
        .map_err(|e| write_error(e, &what))?;

    if updated == 0 {
        return Err(StackwiseError::Conflict(format!("{} does not exist", what)));
    }
    Ok(())
}

fn write_debt(conn: &Connection, staged: &StagedDebt) -> Result<()> {
    let debt = &staged.debt;
    let what = format!("debt {} for user {}", debt.technology_name, debt.user_id);

    if staged.created {
        conn.execute(
            &format!(
                "INSERT INTO debts ({}, technology_key) VALUES \
                 (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
                DEBT_COLUMNS
            ),
            params![
                debt.id.to_string(),
                debt.user_id.0,
                debt.technology_name,
                debt.category,
                debt.urgency_level.as_str(),
                debt.importance_score,
                debt.career_impact,
                debt.project_relevance,
                debt.target_level.as_str(),
                debt.estimated_learning_hours,
                debt.learning_priority,
                debt.learning_progress,
                debt.time_invested,
                debt.status.as_str(),
                debt.is_active,
                debt.auto_generated,
                debt.identified_at.timestamp_millis(),
                debt.updated_at.timestamp_millis(),
                debt.key(),
            ],
        )
        .map_err(|e| write_error(e, &what))?;
        return Ok(());
    }

    let updated = conn
        .execute(
            "UPDATE debts SET urgency_level = ?3, importance_score = ?4, learning_priority = ?5, \
                 learning_progress = ?6, time_invested = ?7, status = ?8, is_active = ?9, \
                 updated_at = ?10 \
             WHERE user_id = ?1 AND technology_key = ?2",
            params![
                debt.user_id.0,
                debt.key(),
                debt.urgency_level.as_str(),
                debt.importance_score,
                debt.learning_priority,
                debt.learning_progress,
                debt.time_invested,
                debt.status.as_str(),
                debt.is_active,
                debt.updated_at.timestamp_millis(),
            ],
        )
        .map_err(|e| write_error(e, &what))?;

    if updated == 0 {
        return Err(StackwiseError::Conflict(format!("{} does not exist", what)));
    }
    Ok(())
}

fn summary_from_row(row: &Row) -> rusqlite::Result<ProgressSummary> {
    Ok(ProgressSummary {
        user_id: UserId(row.get(0)?),
        report_period: row.get(1)?,
        period_start: from_millis(row.get(2)?),
        period_end: from_millis(row.get(3)?),
        total_assets: row.get::<_, i64>(4)? as usize,
        new_assets_acquired: row.get::<_, i64>(5)? as usize,
        new_debts_identified: row.get::<_, i64>(6)? as usize,
        total_debts: row.get::<_, i64>(7)? as usize,
        total_learning_hours: row.get(8)?,
        practice_sessions: row.get::<_, i64>(9)? as usize,
        projects_completed: row.get::<_, i64>(10)? as usize,
        generated_at: from_millis(row.get(11)?),
    })
}

fn write_summary(conn: &Connection, summary: &ProgressSummary) -> Result<()> {
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(period_end) FROM progress_summaries WHERE user_id = ?1",
        params![summary.user_id.0],
        |row| row.get(0),
    )?;

    let period_end = summary.period_end.timestamp_millis();
    if let Some(last) = last.filter(|last| period_end < *last) {
        return Err(StackwiseError::Conflict(format!(
            "period_end {} precedes checkpoint {} for user {}",
            summary.period_end,
            from_millis(last),
            summary.user_id
        )));
    }

    conn.execute(
        "INSERT INTO progress_summaries (user_id, report_period, period_start, period_end, \
             total_assets, new_assets_acquired, new_debts_identified, total_debts, \
             total_learning_hours, practice_sessions, projects_completed, generated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            summary.user_id.0,
            summary.report_period,
            summary.period_start.timestamp_millis(),
            period_end,
            summary.total_assets as i64,
            summary.new_assets_acquired as i64,
            summary.new_debts_identified as i64,
            summary.total_debts as i64,
            summary.total_learning_hours,
            summary.practice_sessions as i64,
            summary.projects_completed as i64,
            summary.generated_at.timestamp_millis(),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl DataAccessPort for SqliteStore {
    async fn get_recent_sessions(
        &self,
        user_id: UserId,
        cutoff: DateTime<Utc>,
        max_batch: usize,
        min_duration_minutes: u32,
    ) -> Result<Vec<Session>> {
        self.query_sessions(
            user_id,
            cutoff.timestamp_millis(),
            false,
            min_duration_minutes,
            Some(max_batch),
        )
        .await
    }

    async fn get_last_analysis_cutoff(&self, user_id: UserId) -> Result<Option<DateTime<Utc>>> {
        let last: Option<i64> = self
            .interact(move |conn| {
                Ok(conn.query_row(
                    "SELECT MAX(period_end) FROM progress_summaries WHERE user_id = ?1",
                    params![user_id.0],
                    |row| row.get(0),
                )?)
            })
            .await?;
        Ok(last.map(from_millis))
    }

    async fn get_asset(&self, user_id: UserId, technology: &str) -> Result<Option<Asset>> {
        let key = technology_key(technology);
        let sql = format!(
            "SELECT {} FROM assets WHERE user_id = ?1 AND technology_key = ?2",
            ASSET_COLUMNS
        );
        self.interact(move |conn| {
            Ok(conn
                .query_row(&sql, params![user_id.0, key], asset_from_row)
                .optional()?)
        })
        .await
    }

    async fn get_debt(&self, user_id: UserId, technology: &str) -> Result<Option<Debt>> {
        let key = technology_key(technology);
        let sql = format!(
            "SELECT {} FROM debts WHERE user_id = ?1 AND technology_key = ?2",
            DEBT_COLUMNS
        );
        self.interact(move |conn| {
            Ok(conn
                .query_row(&sql, params![user_id.0, key], debt_from_row)
                .optional()?)
        })
        .await
    }

    async fn count_assets(&self, user_id: UserId) -> Result<usize> {
        self.interact(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM assets WHERE user_id = ?1",
                params![user_id.0],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn count_active_debts(&self, user_id: UserId) -> Result<usize> {
        self.interact(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM debts WHERE user_id = ?1 AND is_active = 1",
                params![user_id.0],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn list_assets(&self, user_id: UserId, active_only: bool) -> Result<Vec<Asset>> {
        let sql = format!(
            "SELECT {} FROM assets WHERE user_id = ?1 AND (?2 = 0 OR is_active = 1) \
             ORDER BY proficiency_score DESC, technology_key",
            ASSET_COLUMNS
        );
        self.interact(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id.0, active_only], asset_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_debts(&self, user_id: UserId, active_only: bool) -> Result<Vec<Debt>> {
        let sql = format!(
            "SELECT {} FROM debts WHERE user_id = ?1 AND (?2 = 0 OR is_active = 1) \
             ORDER BY learning_priority, technology_key",
            DEBT_COLUMNS
        );
        self.interact(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![user_id.0, active_only], debt_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_active_users(&self, since_days: u32) -> Result<Vec<UserId>> {
        let since = (Utc::now() - Duration::days(i64::from(since_days))).timestamp_millis();
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT user_id FROM sessions \
                 WHERE status = 'completed' AND completed_at >= ?1 ORDER BY user_id",
            )?;
            let rows = stmt.query_map(params![since], |row| row.get::<_, i64>(0).map(UserId))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn list_progress_summaries(
        &self,
        user_id: UserId,
        report_period: Option<String>,
        limit: usize,
    ) -> Result<Vec<ProgressSummary>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.interact(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, report_period, period_start, period_end, total_assets, \
                     new_assets_acquired, new_debts_identified, total_debts, \
                     total_learning_hours, practice_sessions, projects_completed, generated_at \
                 FROM progress_summaries \
                 WHERE user_id = ?1 AND (?2 IS NULL OR report_period = ?2) \
                 ORDER BY generated_at DESC, id DESC LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![user_id.0, report_period, limit], summary_from_row)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    async fn session_statistics(
        &self,
        user_id: UserId,
        since: DateTime<Utc>,
    ) -> Result<SessionStatistics> {
        let sessions = self
            .query_sessions(user_id, since.timestamp_millis(), true, 0, None)
            .await?;
        Ok(SessionStatistics::from_sessions(&sessions))
    }

    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.check_consistency()?;
        let user_id = changes.user_id;
        let asset_count = changes.assets.len();
        let debt_count = changes.debts.len();

        self.interact(move |conn| {
            let tx = conn.transaction()?;
            for staged in &changes.assets {
                write_asset(&tx, staged)?;
            }
            for staged in &changes.debts {
                write_debt(&tx, staged)?;
            }
            if let Some(summary) = &changes.summary {
                write_summary(&tx, summary)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await?;

        debug!(
            "Committed {} assets, {} debts for user {}",
            asset_count, debt_count, user_id
        );
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.interact(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

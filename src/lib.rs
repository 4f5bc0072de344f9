//! Stackwise - Skill Proficiency & Gap Analysis Pipeline
//!
//! Turns completed work sessions into per-user technology proficiency
//! records ("assets") and inferred learning gaps ("debts"):
//! - Aggregates technology usage per analysis batch
//! - Scores proficiency with diminishing returns and category weights
//! - Infers related technologies the user has not yet practiced
//! - Runs periodic analysis, rollup reports and health checks
//!
//! # Architecture
//!
//! - **Types**: Sessions, assets, debts and progress summaries
//! - **Storage**: The [`DataAccessPort`] and its unit of work, with in-memory
//!   and SQLite adapters
//! - **Analysis**: Aggregation, scoring, gap inference and the engine
//! - **Scheduler**: Interval jobs, manual triggers and statistics
//!
//! # Example
//!
//! ```ignore
//! use stackwise_core::{AnalysisConfig, AnalysisEngine, AnalysisScheduler, SqliteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::open("stackwise.db").await?;
//!     let engine = Arc::new(AnalysisEngine::new(Arc::new(store), AnalysisConfig::default()));
//!
//!     let scheduler = AnalysisScheduler::new(engine);
//!     scheduler.start().await?;
//!     let result = scheduler.trigger_manual(None).await?;
//!     println!("analyzed {} users", result.analyzed_users);
//!     scheduler.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod health;
pub mod reports;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use analysis::{AnalysisEngine, AnalysisResult, AnalysisStatus, RunStatus, UserAnalysisResult};
pub use config::{AnalysisConfig, ConfigError};
pub use error::{Result, StackwiseError};
pub use health::{HealthReport, HealthStatus};
pub use scheduler::{AnalysisScheduler, JobId, JobRun, SchedulerError, SchedulerStatus};
pub use storage::{ChangeSet, DataAccessPort, MemoryStore, SqliteStore, UnitOfWork};
pub use types::{
    Asset, Debt, DebtStatus, ProficiencyLevel, ProgressSummary, Session, SessionStatus,
    UrgencyLevel, UserId,
};

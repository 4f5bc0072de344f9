//! Stackwise - Skill Proficiency & Gap Analysis Pipeline
//!
//! Command-line entry point: one-off analysis runs, the scheduling daemon,
//! reports, health checks and session import against a SQLite database.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use stackwise_core::{
    health, reports, scheduler, AnalysisConfig, AnalysisEngine, AnalysisScheduler, Session,
    SqliteStore, UserId,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Get the default database path using XDG_DATA_HOME standard
fn get_default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stackwise")
        .join("stackwise.db")
}

fn get_default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("stackwise")
        .join("config.toml")
}

#[derive(Parser)]
#[command(name = "stackwise")]
#[command(about = "Skill proficiency and learning-gap analysis for recorded work sessions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Analysis configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path
    #[arg(long, global = true, env = "STACKWISE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Set log level (overrides logging.level from the config file)
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one analysis pass now
    Run {
        /// Analyze a single user instead of every recently active user
        #[arg(short, long)]
        user: Option<i64>,

        /// Stop between users once this many seconds have elapsed
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Run the scheduler until interrupted (SIGHUP reloads configuration)
    Daemon,

    /// Show engine status and the jobs the scheduler would register
    Status,

    /// Check engine and database health
    Health,

    /// Generate a rollup report
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// Record learning progress on a debt
    DebtProgress {
        #[arg(short, long)]
        user: i64,

        /// Technology the debt is for (case-insensitive)
        #[arg(short, long)]
        technology: String,

        /// Progress percentage, 0-100; 100 completes the debt
        #[arg(short, long)]
        progress: f64,

        /// Hours spent since the last update
        #[arg(long, default_value_t = 0.0)]
        hours: f64,
    },

    /// Import completed sessions from a JSON array file
    ImportSessions {
        /// JSON file containing an array of sessions
        file: PathBuf,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Last 30 days: sessions, hours and top technologies
    Monthly,
    /// Last 90 days: per-user proficiency trends
    Quarterly,
    /// Open debts for a user, highest priority first
    Debts {
        #[arg(short, long)]
        user: i64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Asset statistics and top skills for a user
    Assets {
        #[arg(short, long)]
        user: i64,
    },
    /// Latest progress summaries for a user
    Progress {
        #[arg(short, long)]
        user: i64,
        /// Only summaries for this report period (e.g. analysis_cycle)
        #[arg(long)]
        period: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,

    /// Validate the configuration file
    Validate,

    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_level(level: &str) -> Level {
    match level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

async fn open_engine(db_path: Option<PathBuf>, config: AnalysisConfig) -> Result<Arc<AnalysisEngine>> {
    let db_path = db_path.unwrap_or_else(get_default_db_path);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    debug!("Opening database at {}", db_path.display());
    let store = SqliteStore::open(&db_path)
        .await
        .with_context(|| format!("opening database {}", db_path.display()))?;
    Ok(Arc::new(AnalysisEngine::new(Arc::new(store), config)))
}

async fn run_daemon(scheduler: AnalysisScheduler) -> Result<()> {
    scheduler.start().await?;
    info!("Stackwise daemon running, press Ctrl-C to stop");

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut hangup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result?;
                    break;
                }
                _ = hangup.recv() => {
                    info!("SIGHUP received, reloading configuration");
                    if let Err(e) = scheduler.reschedule().await {
                        warn!("Reload failed, keeping current schedule: {}", e);
                    }
                }
            }
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    info!("Shutdown requested");
    scheduler.stop().await?;
    Ok(())
}

fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    AnalysisConfig::default().to_file(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = cli
        .config
        .as_deref()
        .map(AnalysisConfig::from_file)
        .transpose();

    // Initialize tracing
    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            loaded
                .as_ref()
                .ok()
                .and_then(|c| c.as_ref())
                .map(|c| c.logging.level.clone())
        })
        .unwrap_or_else(|| "info".to_string());
    let level = parse_level(&level).as_str().to_lowercase();
    let filter = EnvFilter::new(format!("stackwise={},stackwise_core={}", level, level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Stackwise v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Commands::Config { action } = &cli.command {
        return match action {
            ConfigAction::Validate => match loaded {
                Ok(Some(_)) => {
                    println!("Configuration is valid");
                    Ok(())
                }
                Ok(None) => bail!("no configuration file given (use --config)"),
                Err(e) => bail!("invalid configuration: {}", e),
            },
            ConfigAction::Show => {
                let config = AnalysisConfig::load_or_default(cli.config.as_deref());
                print!("{}", config.to_toml()?);
                Ok(())
            }
            ConfigAction::Init { force } => {
                let path = cli.config.clone().unwrap_or_else(get_default_config_path);
                init_config(&path, *force)
            }
        };
    }

    // Everything but `config validate` runs on defaults when the file is unusable
    let config = AnalysisConfig::load_or_default(cli.config.as_deref());

    match cli.command {
        Commands::Run { user, timeout_secs } => {
            let engine = open_engine(cli.db_path, config).await?;
            let user = user.map(UserId);
            let result = match timeout_secs {
                Some(secs) => {
                    let scheduler = AnalysisScheduler::new(engine);
                    scheduler.start().await?;
                    let result = scheduler
                        .trigger_manual_with_timeout(user, Duration::from_secs(secs))
                        .await;
                    scheduler.stop().await?;
                    result?
                }
                None => engine.run_analysis(user).await,
            };
            print_json(&result)
        }
        Commands::Daemon => {
            let engine = open_engine(cli.db_path, config).await?;
            let scheduler = match cli.config {
                Some(path) => AnalysisScheduler::with_config_path(engine, path),
                None => AnalysisScheduler::new(engine),
            };
            run_daemon(scheduler).await
        }
        Commands::Status => {
            let engine = open_engine(cli.db_path, config).await?;
            let jobs: Vec<_> = scheduler::jobs::definitions(&engine.config())
                .into_iter()
                .map(|d| {
                    serde_json::json!({
                        "id": d.id,
                        "name": d.id.name(),
                        "interval_secs": d.interval.as_secs(),
                    })
                })
                .collect();
            print_json(&serde_json::json!({
                "analysis": engine.analysis_status(),
                "jobs": jobs,
            }))
        }
        Commands::Health => {
            let engine = open_engine(cli.db_path, config).await?;
            let report = health::check_health(&engine).await;
            print_json(&report)?;
            if report.status == health::HealthStatus::Unhealthy {
                bail!("health check failed: {}", report.issues.join("; "));
            }
            Ok(())
        }
        Commands::Report { kind } => {
            let engine = open_engine(cli.db_path, config).await?;
            let port = engine.port();
            match kind {
                ReportKind::Monthly => print_json(&reports::monthly_summary(port.as_ref()).await?),
                ReportKind::Quarterly => {
                    print_json(&reports::quarterly_report(port.as_ref()).await?)
                }
                ReportKind::Debts { user, limit } => print_json(
                    &reports::high_priority_debts(port.as_ref(), UserId(user), limit).await?,
                ),
                ReportKind::Assets { user } => {
                    print_json(&reports::asset_statistics(port.as_ref(), UserId(user)).await?)
                }
                ReportKind::Progress {
                    user,
                    period,
                    limit,
                } => print_json(
                    &reports::learning_progress(
                        port.as_ref(),
                        UserId(user),
                        period.as_deref(),
                        limit,
                    )
                    .await?,
                ),
            }
        }
        Commands::DebtProgress {
            user,
            technology,
            progress,
            hours,
        } => {
            let engine = open_engine(cli.db_path, config).await?;
            let debt = engine
                .record_learning_progress(UserId(user), &technology, progress, hours)
                .await?;
            print_json(&debt)
        }
        Commands::ImportSessions { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let sessions: Vec<Session> = serde_json::from_str(&contents)
                .with_context(|| format!("parsing sessions from {}", file.display()))?;
            let total = sessions.len();

            let db_path = cli.db_path.unwrap_or_else(get_default_db_path);
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let store = SqliteStore::open(&db_path).await?;
            let inserted = store.insert_sessions(sessions).await?;
            println!("Imported {} of {} sessions", inserted, total);
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

//! Core data types for the Stackwise analysis pipeline
//!
//! Sessions are the read-only input recorded by an external collector. Assets,
//! debts and progress summaries are the artifacts the pipeline maintains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for users
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Normalize a technology name for case-insensitive matching
pub fn technology_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Category names used by the aggregator and the default configuration
pub mod category {
    pub const PROGRAMMING_LANGUAGE: &str = "programming_language";
    pub const FRAMEWORK: &str = "framework";
    pub const LIBRARY: &str = "library";
    pub const TOOL: &str = "tool";
    pub const GENERAL: &str = "general";
}

/// Lifecycle status of a recorded session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    #[default]
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "abandoned" => Some(SessionStatus::Abandoned),
            _ => None,
        }
    }
}

/// One immutable unit of recorded work
///
/// Numeric fields missing from the recorder default to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: UserId,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub primary_technology: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub duration_minutes: f64,
    /// 0-10
    #[serde(default)]
    pub complexity_score: f64,
    /// 0-100
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default)]
    pub project_name: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl Session {
    /// Create a completed session with no technologies attached
    pub fn new(id: impl Into<String>, user_id: UserId, completed_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            user_id,
            status: SessionStatus::Completed,
            technologies: Vec::new(),
            primary_technology: None,
            frameworks: Vec::new(),
            libraries: Vec::new(),
            tools: Vec::new(),
            duration_minutes: 0.0,
            complexity_score: 0.0,
            quality_score: 0.0,
            project_name: None,
            completed_at,
        }
    }

    /// Check that the numeric fields are usable by the scoring model
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |field: &str, value: f64| {
            Err(crate::StackwiseError::Validation(format!(
                "session {}: {} out of range ({})",
                self.id, field, value
            )))
        };

        if !self.duration_minutes.is_finite() || self.duration_minutes < 0.0 {
            return invalid("duration_minutes", self.duration_minutes);
        }
        if !self.complexity_score.is_finite() || !(0.0..=10.0).contains(&self.complexity_score) {
            return invalid("complexity_score", self.complexity_score);
        }
        if !self.quality_score.is_finite() || !(0.0..=100.0).contains(&self.quality_score) {
            return invalid("quality_score", self.quality_score);
        }
        Ok(())
    }
}

/// Proficiency level derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl ProficiencyLevel {
    /// Level thresholds: 80 expert, 60 advanced, 30 intermediate
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ProficiencyLevel::Expert
        } else if score >= 60.0 {
            ProficiencyLevel::Advanced
        } else if score >= 30.0 {
            ProficiencyLevel::Intermediate
        } else {
            ProficiencyLevel::Beginner
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProficiencyLevel::Beginner => "beginner",
            ProficiencyLevel::Intermediate => "intermediate",
            ProficiencyLevel::Advanced => "advanced",
            ProficiencyLevel::Expert => "expert",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "beginner" => Some(ProficiencyLevel::Beginner),
            "intermediate" => Some(ProficiencyLevel::Intermediate),
            "advanced" => Some(ProficiencyLevel::Advanced),
            "expert" => Some(ProficiencyLevel::Expert),
            _ => None,
        }
    }
}

/// A user's mastery of one technology
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub user_id: UserId,
    pub technology_name: String,
    pub category: String,
    /// 0-100, clamped
    pub proficiency_score: f64,
    pub proficiency_level: ProficiencyLevel,
    /// 0-1
    pub confidence_level: f64,
    pub practical_skills: f64,
    pub problem_solving: f64,
    pub theoretical_knowledge: f64,
    pub total_practice_hours: f64,
    pub project_count: u32,
    pub is_active: bool,
    pub first_learned_at: DateTime<Utc>,
    pub last_practiced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    /// Create an asset with every score explicitly zeroed
    pub fn new(user_id: UserId, technology_name: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            technology_name: technology_name.into().trim().to_string(),
            category: category.into(),
            proficiency_score: 0.0,
            proficiency_level: ProficiencyLevel::Beginner,
            confidence_level: 0.0,
            practical_skills: 0.0,
            problem_solving: 0.0,
            theoretical_knowledge: 0.0,
            total_practice_hours: 0.0,
            project_count: 0,
            is_active: true,
            first_learned_at: now,
            last_practiced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        technology_key(&self.technology_name)
    }

    /// Mean of the skill dimensions that have any score
    pub fn overall_score(&self) -> f64 {
        let dimensions = [
            self.theoretical_knowledge,
            self.practical_skills,
            self.problem_solving,
        ];
        let scored: Vec<f64> = dimensions.into_iter().filter(|s| *s > 0.0).collect();
        if scored.is_empty() {
            0.0
        } else {
            scored.iter().sum::<f64>() / scored.len() as f64
        }
    }

    /// Add practice time and mark the asset active as of `at`
    pub fn record_practice(&mut self, hours: f64, at: DateTime<Utc>) {
        self.total_practice_hours += hours.max(0.0);
        self.last_practiced_at = Some(at);
        self.is_active = true;
    }
}

/// Urgency of closing a learning gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UrgencyLevel {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl UrgencyLevel {
    /// Score used by [`Debt::priority_score`]
    pub fn score(&self) -> f64 {
        match self {
            UrgencyLevel::Low => 25.0,
            UrgencyLevel::Medium => 50.0,
            UrgencyLevel::High => 75.0,
            UrgencyLevel::Critical => 100.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UrgencyLevel::Low => "low",
            UrgencyLevel::Medium => "medium",
            UrgencyLevel::High => "high",
            UrgencyLevel::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(UrgencyLevel::Low),
            "medium" => Some(UrgencyLevel::Medium),
            "high" => Some(UrgencyLevel::High),
            "critical" => Some(UrgencyLevel::Critical),
            _ => None,
        }
    }
}

/// Lifecycle of a learning gap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    #[default]
    Identified,
    Planned,
    Learning,
    Paused,
    Completed,
    Cancelled,
}

impl DebtStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DebtStatus::Identified => "identified",
            DebtStatus::Planned => "planned",
            DebtStatus::Learning => "learning",
            DebtStatus::Paused => "paused",
            DebtStatus::Completed => "completed",
            DebtStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identified" => Some(DebtStatus::Identified),
            "planned" => Some(DebtStatus::Planned),
            "learning" => Some(DebtStatus::Learning),
            "paused" => Some(DebtStatus::Paused),
            "completed" => Some(DebtStatus::Completed),
            "cancelled" => Some(DebtStatus::Cancelled),
            _ => None,
        }
    }
}

/// A technology the user should learn but has not mastered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debt {
    pub id: Uuid,
    pub user_id: UserId,
    pub technology_name: String,
    pub category: String,
    pub urgency_level: UrgencyLevel,
    pub importance_score: f64,
    pub career_impact: f64,
    pub project_relevance: f64,
    pub target_level: ProficiencyLevel,
    pub estimated_learning_hours: f64,
    /// 1-5
    pub learning_priority: u8,
    /// 0-100
    pub learning_progress: f64,
    pub time_invested: f64,
    pub status: DebtStatus,
    pub is_active: bool,
    pub auto_generated: bool,
    pub identified_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Debt {
    pub fn new(user_id: UserId, technology_name: impl Into<String>, category: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            technology_name: technology_name.into().trim().to_string(),
            category: category.into(),
            urgency_level: UrgencyLevel::Medium,
            importance_score: 0.0,
            career_impact: 0.0,
            project_relevance: 0.0,
            target_level: ProficiencyLevel::Intermediate,
            estimated_learning_hours: 0.0,
            learning_priority: 3,
            learning_progress: 0.0,
            time_invested: 0.0,
            status: DebtStatus::Identified,
            is_active: true,
            auto_generated: false,
            identified_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> String {
        technology_key(&self.technology_name)
    }

    pub fn start_learning(&mut self) {
        self.status = DebtStatus::Learning;
        self.updated_at = Utc::now();
    }

    /// Set progress (clamped to 0-100); reaching 100 completes the debt
    pub fn update_progress(&mut self, progress: f64, hours_spent: f64) {
        self.learning_progress = progress.clamp(0.0, 100.0);
        self.time_invested += hours_spent.max(0.0);
        if self.learning_progress >= 100.0 {
            self.status = DebtStatus::Completed;
        }
        self.updated_at = Utc::now();
    }

    /// Weighted priority: importance 30%, career 25%, project 20%, urgency 10%
    pub fn priority_score(&self) -> f64 {
        self.importance_score * 0.3
            + self.career_impact * 0.25
            + self.project_relevance * 0.2
            + self.urgency_level.score() * 0.1
    }
}

/// Append-only checkpoint of one analysis cycle for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub user_id: UserId,
    pub report_period: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_assets: usize,
    pub new_assets_acquired: usize,
    pub new_debts_identified: usize,
    pub total_debts: usize,
    pub total_learning_hours: f64,
    pub practice_sessions: usize,
    pub projects_completed: usize,
    pub generated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(ProficiencyLevel::from_score(29.99), ProficiencyLevel::Beginner);
        assert_eq!(ProficiencyLevel::from_score(30.0), ProficiencyLevel::Intermediate);
        assert_eq!(ProficiencyLevel::from_score(59.99), ProficiencyLevel::Intermediate);
        assert_eq!(ProficiencyLevel::from_score(60.0), ProficiencyLevel::Advanced);
        assert_eq!(ProficiencyLevel::from_score(79.99), ProficiencyLevel::Advanced);
        assert_eq!(ProficiencyLevel::from_score(80.0), ProficiencyLevel::Expert);
        assert_eq!(ProficiencyLevel::from_score(0.0), ProficiencyLevel::Beginner);
        assert_eq!(ProficiencyLevel::from_score(100.0), ProficiencyLevel::Expert);
    }

    #[test]
    fn test_new_asset_is_zeroed() {
        let asset = Asset::new(UserId(1), "  Rust ", "programming_language");
        assert_eq!(asset.technology_name, "Rust");
        assert_eq!(asset.key(), "rust");
        assert_eq!(asset.practical_skills, 0.0);
        assert_eq!(asset.problem_solving, 0.0);
        assert_eq!(asset.theoretical_knowledge, 0.0);
        assert_eq!(asset.overall_score(), 0.0);
    }

    #[test]
    fn test_overall_score_ignores_unscored_dimensions() {
        let mut asset = Asset::new(UserId(1), "Go", "programming_language");
        asset.practical_skills = 40.0;
        asset.problem_solving = 20.0;
        assert!((asset.overall_score() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_record_practice_reactivates() {
        let mut asset = Asset::new(UserId(1), "Go", "programming_language");
        asset.is_active = false;
        let at = Utc::now();
        asset.record_practice(1.5, at);
        asset.record_practice(-3.0, at);
        assert!(asset.is_active);
        assert_eq!(asset.last_practiced_at, Some(at));
        assert!((asset.total_practice_hours - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_debt_progress_completes_at_100() {
        let mut debt = Debt::new(UserId(1), "CSS", "stylesheet_language");
        debt.start_learning();
        assert_eq!(debt.status, DebtStatus::Learning);

        debt.update_progress(60.0, 4.0);
        assert_eq!(debt.status, DebtStatus::Learning);

        debt.update_progress(140.0, 2.0);
        assert_eq!(debt.learning_progress, 100.0);
        assert_eq!(debt.status, DebtStatus::Completed);
        assert!((debt.time_invested - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_debt_priority_score() {
        let mut debt = Debt::new(UserId(1), "SQL", "query_language");
        debt.importance_score = 70.0;
        debt.career_impact = 60.0;
        debt.project_relevance = 80.0;
        // 21 + 15 + 16 + 5
        assert!((debt.priority_score() - 57.0).abs() < 1e-9);
    }

    #[test]
    fn test_session_validation() {
        let mut session = Session::new("s1", UserId(1), Utc::now());
        session.complexity_score = 6.0;
        session.quality_score = 80.0;
        assert!(session.validate().is_ok());

        session.quality_score = 120.0;
        assert!(session.validate().is_err());

        session.quality_score = 80.0;
        session.duration_minutes = f64::NAN;
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_session_defaults_from_json() {
        let json = r#"{"id":"s1","user_id":7,"completed_at":"2026-01-01T00:00:00Z"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.user_id, UserId(7));
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.duration_minutes, 0.0);
        assert!(session.technologies.is_empty());
    }
}

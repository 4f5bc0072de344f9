//! Usage aggregation
//!
//! Groups one user's session batch by normalized technology name. Each
//! technology counts once per session, under the highest-precedence field it
//! appears in:
//!
//! `primary_technology` (programming_language) > `frameworks` > `libraries` >
//! `tools` > `technologies` (general)
//!
//! Across sessions the highest-precedence category seen wins, so the result
//! does not depend on batch order. The display name is the first spelling seen.

use crate::types::{category, technology_key, Session};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// Per-technology statistics for one batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnologyUsage {
    pub name: String,
    pub category: String,
    pub usage_count: usize,
    /// Minutes
    pub total_duration: f64,
    pub total_complexity: f64,
    pub total_quality: f64,
    pub avg_duration: f64,
    pub avg_complexity: f64,
    pub avg_quality: f64,
    pub projects: BTreeSet<String>,
    pub session_ids: Vec<String>,
}

impl TechnologyUsage {
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            usage_count: 0,
            total_duration: 0.0,
            total_complexity: 0.0,
            total_quality: 0.0,
            avg_duration: 0.0,
            avg_complexity: 0.0,
            avg_quality: 0.0,
            projects: BTreeSet::new(),
            session_ids: Vec::new(),
        }
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn total_hours(&self) -> f64 {
        self.total_duration / 60.0
    }

    fn record(&mut self, session: &Session) {
        self.usage_count += 1;
        self.total_duration += session.duration_minutes;
        self.total_complexity += session.complexity_score;
        self.total_quality += session.quality_score;
        if let Some(project) = project_of(session) {
            self.projects.insert(project);
        }
        self.session_ids.push(session.id.clone());
    }

    /// Recompute averages from the running sums
    pub fn finalize(&mut self) {
        if self.usage_count == 0 {
            return;
        }
        let count = self.usage_count as f64;
        self.avg_duration = self.total_duration / count;
        self.avg_complexity = self.total_complexity / count;
        self.avg_quality = self.total_quality / count;
    }
}

/// Aggregation output for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageAggregate {
    /// Keyed by normalized technology name
    pub technologies: BTreeMap<String, TechnologyUsage>,
    pub sessions_accepted: usize,
    pub sessions_skipped: usize,
    /// Minutes across accepted sessions
    pub total_duration: f64,
    pub projects: BTreeSet<String>,
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

impl UsageAggregate {
    pub fn is_empty(&self) -> bool {
        self.technologies.is_empty()
    }

    pub fn total_hours(&self) -> f64 {
        self.total_duration / 60.0
    }
}

/// Lower is stronger
fn precedence(category: &str) -> u8 {
    match category {
        category::PROGRAMMING_LANGUAGE => 0,
        category::FRAMEWORK => 1,
        category::LIBRARY => 2,
        category::TOOL => 3,
        _ => 4,
    }
}

fn project_of(session: &Session) -> Option<String> {
    session
        .project_name
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
}

/// Distinct technologies of one session with their resolved categories
fn explode(session: &Session) -> BTreeMap<String, (String, &'static str)> {
    let fields: [(&'static str, Vec<&String>); 5] = [
        (
            category::PROGRAMMING_LANGUAGE,
            session.primary_technology.iter().collect(),
        ),
        (category::FRAMEWORK, session.frameworks.iter().collect()),
        (category::LIBRARY, session.libraries.iter().collect()),
        (category::TOOL, session.tools.iter().collect()),
        (category::GENERAL, session.technologies.iter().collect()),
    ];

    let mut found = BTreeMap::new();
    for (category, names) in fields {
        for name in names {
            let key = technology_key(name);
            if key.is_empty() {
                continue;
            }
            found
                .entry(key)
                .or_insert_with(|| (name.trim().to_string(), category));
        }
    }
    found
}

pub fn aggregate(sessions: &[Session]) -> UsageAggregate {
    let mut result = UsageAggregate::default();

    for session in sessions {
        if let Err(e) = session.validate() {
            warn!("Skipping session: {}", e);
            result.sessions_skipped += 1;
            continue;
        }

        for (key, (name, category)) in explode(session) {
            let usage = result
                .technologies
                .entry(key)
                .or_insert_with(|| TechnologyUsage::new(name, category));
            if precedence(category) < precedence(&usage.category) {
                usage.category = category.to_string();
            }
            usage.record(session);
        }

        result.sessions_accepted += 1;
        result.total_duration += session.duration_minutes;
        if let Some(project) = project_of(session) {
            result.projects.insert(project);
        }
        result.earliest = Some(match result.earliest {
            Some(t) => t.min(session.completed_at),
            None => session.completed_at,
        });
        result.latest = Some(match result.latest {
            Some(t) => t.max(session.completed_at),
            None => session.completed_at,
        });
    }

    for usage in result.technologies.values_mut() {
        usage.finalize();
    }

    debug!(
        "Aggregated {} technologies from {} sessions ({} skipped)",
        result.technologies.len(),
        result.sessions_accepted,
        result.sessions_skipped
    );
    result
}

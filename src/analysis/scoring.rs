//! Proficiency Scoring
//!
//! Pure functions turning aggregated usage into score changes:
//! - Raw increment: base + duration + complexity + quality terms
//! - Existing assets: increment capped at max_single_increment
//! - New assets: raw increment scaled by the category weight
//! - Skill dimensions: usage, complexity and project diversity deltas
//!
//! Every result is clamped to [0, 100].

use super::aggregator::TechnologyUsage;
use crate::config::{ProficiencyScoring, ScoringConfig};
use crate::types::{Asset, ProficiencyLevel};

const MAX_SCORE: f64 = 100.0;

/// Duration term saturates at 20 (ten hours average)
const MAX_DURATION_SCORE: f64 = 20.0;

/// Uncapped increment for one technology's usage in a cycle
///
/// `base + min(20, hours * 2) * dw + complexity * 2 * cw + quality / 10 * qw`
pub fn raw_increment(usage: &TechnologyUsage, scoring: &ProficiencyScoring) -> f64 {
    let duration_score = (usage.avg_duration / 60.0 * 2.0).min(MAX_DURATION_SCORE);
    let complexity_score = usage.avg_complexity * 2.0;
    let quality_score = usage.avg_quality / 10.0;

    scoring.base_score
        + duration_score * scoring.duration_weight
        + complexity_score * scoring.complexity_weight
        + quality_score * scoring.quality_weight
}

/// New score for an existing asset
pub fn apply_increment(old_score: f64, raw: f64, scoring: &ProficiencyScoring) -> f64 {
    let applied = raw.min(scoring.max_single_increment);
    (old_score + applied).clamp(0.0, MAX_SCORE)
}

/// Score for a newly created asset
pub fn initial_score(raw: f64, weight: f64) -> f64 {
    (raw * weight).clamp(0.0, MAX_SCORE)
}

/// Initial score using the configured weight for `category`
pub fn initial_score_for(raw: f64, category: &str, config: &ScoringConfig) -> f64 {
    initial_score(raw, config.weight_for(category))
}

pub fn level_for(score: f64) -> ProficiencyLevel {
    ProficiencyLevel::from_score(score)
}

/// Confidence assigned at creation
pub fn initial_confidence(score: f64) -> f64 {
    (score / MAX_SCORE).clamp(0.0, 1.0)
}

/// Additive changes to the three skill dimensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkillDeltas {
    pub practical_skills: f64,
    pub problem_solving: f64,
    pub theoretical_knowledge: f64,
}

impl SkillDeltas {
    /// Add the deltas to an asset, clamping each dimension
    pub fn apply_to(&self, asset: &mut Asset) {
        asset.practical_skills = clamp_score(asset.practical_skills + self.practical_skills);
        asset.problem_solving = clamp_score(asset.problem_solving + self.problem_solving);
        asset.theoretical_knowledge =
            clamp_score(asset.theoretical_knowledge + self.theoretical_knowledge);
    }
}

pub fn skill_deltas(usage: &TechnologyUsage) -> SkillDeltas {
    let usage_factor = (usage.usage_count as f64 / 10.0).min(1.0);
    let quality_factor = usage.avg_quality / 100.0;
    let complexity_factor = usage.avg_complexity / 10.0;
    let project_diversity = (usage.project_count() as f64 / 5.0).min(1.0);

    SkillDeltas {
        practical_skills: usage_factor * quality_factor * 10.0,
        problem_solving: complexity_factor * 8.0,
        theoretical_knowledge: project_diversity * 6.0,
    }
}

fn clamp_score(value: f64) -> f64 {
    value.clamp(0.0, MAX_SCORE)
}

//! Skill proficiency and gap analysis
//!
//! - [`aggregator`]: per-technology usage statistics for a session batch
//! - [`scoring`]: pure score, level and skill-dimension functions
//! - [`gaps`]: related-technology debts
//! - [`engine`]: per-user passes and multi-user runs

pub mod aggregator;
pub mod engine;
pub mod gaps;
pub mod scoring;

pub use aggregator::{aggregate, TechnologyUsage, UsageAggregate};
pub use engine::{
    AnalysisEngine, AnalysisResult, AnalysisStatus, RunStatus, UserAnalysisResult, UserWindow,
    ANALYSIS_CYCLE_PERIOD,
};
pub use gaps::{GapInference, RelatedTechnologyLookup, StaticRelatedTechnologies};

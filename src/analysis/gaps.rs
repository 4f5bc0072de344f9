//! Gap inference
//!
//! For every technology used in a cycle, proposes its related technologies as
//! learning debts unless the user already holds them as an asset or a debt.

use super::aggregator::UsageAggregate;
use crate::config::{DebtDefaults, GapInferenceConfig};
use crate::error::Result;
use crate::storage::UnitOfWork;
use crate::types::{category, technology_key, Debt, DebtStatus, UserId};
use std::collections::BTreeMap;
use tracing::debug;

/// Source of "if you use X you should also know Y" relations
pub trait RelatedTechnologyLookup: Send + Sync {
    /// Related technologies for `technology`, matched case-insensitively
    fn related(&self, technology: &str) -> Vec<String>;

    /// Category assigned to a debt for `technology`
    fn category_of(&self, technology: &str) -> String;
}

/// Lookup backed by the `[gap_inference]` configuration tables
#[derive(Debug, Clone, Default)]
pub struct StaticRelatedTechnologies {
    related: BTreeMap<String, Vec<String>>,
    categories: BTreeMap<String, String>,
}

impl StaticRelatedTechnologies {
    pub fn from_config(config: &GapInferenceConfig) -> Self {
        let related = config
            .related_technologies
            .iter()
            .map(|(tech, related)| (technology_key(tech), related.clone()))
            .collect();
        let categories = config
            .technology_categories
            .iter()
            .map(|(tech, category)| (technology_key(tech), category.clone()))
            .collect();
        Self {
            related,
            categories,
        }
    }
}

impl RelatedTechnologyLookup for StaticRelatedTechnologies {
    fn related(&self, technology: &str) -> Vec<String> {
        self.related
            .get(&technology_key(technology))
            .cloned()
            .unwrap_or_default()
    }

    fn category_of(&self, technology: &str) -> String {
        self.categories
            .get(&technology_key(technology))
            .cloned()
            .unwrap_or_else(|| category::GENERAL.to_string())
    }
}

/// Build an auto-generated debt from the configured defaults
pub fn debt_from_defaults(
    user_id: UserId,
    technology: &str,
    category: String,
    defaults: &DebtDefaults,
) -> Debt {
    let mut debt = Debt::new(user_id, technology, category);
    debt.urgency_level = defaults.urgency_level;
    debt.importance_score = defaults.importance_score;
    debt.career_impact = defaults.career_impact;
    debt.project_relevance = defaults.project_relevance;
    debt.target_level = defaults.target_level;
    debt.estimated_learning_hours = defaults.estimated_learning_hours;
    debt.learning_priority = defaults.learning_priority;
    debt.status = DebtStatus::Identified;
    debt.auto_generated = true;
    debt
}

pub struct GapInference<'a> {
    lookup: &'a dyn RelatedTechnologyLookup,
    defaults: &'a DebtDefaults,
}

impl<'a> GapInference<'a> {
    pub fn new(lookup: &'a dyn RelatedTechnologyLookup, defaults: &'a DebtDefaults) -> Self {
        Self { lookup, defaults }
    }

    /// Stage debts for missing related technologies; returns their names
    ///
    /// Must run after the cycle's assets are staged so technologies used in
    /// this cycle are never proposed.
    pub async fn infer(
        &self,
        uow: &mut UnitOfWork<'_>,
        usage: &UsageAggregate,
    ) -> Result<Vec<String>> {
        let mut created = Vec::new();

        for used in usage.technologies.values() {
            for related in self.lookup.related(&used.name) {
                let related = related.trim();
                if related.is_empty() {
                    continue;
                }
                if uow.get_asset(related).await?.is_some() || uow.get_debt(related).await?.is_some()
                {
                    continue;
                }

                let debt = debt_from_defaults(
                    uow.user_id(),
                    related,
                    self.lookup.category_of(related),
                    self.defaults,
                );
                debug!(
                    "Identified debt {} (related to {}) for user {}",
                    related,
                    used.name,
                    uow.user_id()
                );
                uow.create_debt(debt)?;
                created.push(related.to_string());
            }
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::aggregate;
    use crate::storage::{DataAccessPort, MemoryStore};
    use crate::types::{Asset, ProficiencyLevel, Session, UrgencyLevel};
    use chrono::Utc;

    fn react_session() -> Session {
        let mut s = Session::new("s1", UserId(1), Utc::now());
        s.frameworks = vec!["React".to_string()];
        s.duration_minutes = 60.0;
        s
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let lookup = StaticRelatedTechnologies::from_config(&GapInferenceConfig::default());
        assert_eq!(lookup.related("react"), vec!["JavaScript", "HTML", "CSS", "Node.js"]);
        assert_eq!(lookup.related("SPRING BOOT"), vec!["Java", "SQL", "Maven"]);
        assert!(lookup.related("Haskell").is_empty());
        assert_eq!(lookup.category_of("node.js"), "runtime");
        assert_eq!(lookup.category_of("Elixir"), "general");
    }

    #[test]
    fn test_debt_defaults() {
        let debt = debt_from_defaults(
            UserId(2),
            "CSS",
            "stylesheet_language".to_string(),
            &DebtDefaults::default(),
        );
        assert_eq!(debt.urgency_level, UrgencyLevel::Medium);
        assert_eq!(debt.importance_score, 70.0);
        assert_eq!(debt.career_impact, 60.0);
        assert_eq!(debt.project_relevance, 80.0);
        assert_eq!(debt.target_level, ProficiencyLevel::Intermediate);
        assert_eq!(debt.estimated_learning_hours, 20.0);
        assert_eq!(debt.learning_priority, 3);
        assert_eq!(debt.status, DebtStatus::Identified);
        assert!(debt.auto_generated);
    }

    #[tokio::test]
    async fn test_skips_held_assets_and_debts() {
        let store = MemoryStore::new();
        store
            .insert_asset(Asset::new(UserId(1), "javascript", "programming_language"))
            .await;
        store.insert_debt(Debt::new(UserId(1), "Css", "stylesheet_language")).await;

        let config = GapInferenceConfig::default();
        let lookup = StaticRelatedTechnologies::from_config(&config);
        let inference = GapInference::new(&lookup, &config.debt_defaults);

        let usage = aggregate(&[react_session()]);
        let mut uow = UnitOfWork::new(&store, UserId(1));
        let created = inference.infer(&mut uow, &usage).await.unwrap();

        assert_eq!(created, vec!["HTML", "Node.js"]);
        let changes = uow.into_change_set();
        let node = changes
            .debts
            .iter()
            .find(|s| s.debt.key() == "node.js")
            .unwrap();
        assert!(node.created);
        assert_eq!(node.debt.category, "runtime");
        assert!(store.get_debt(UserId(1), "html").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_shared_related_technology_created_once() {
        let store = MemoryStore::new();
        let config = GapInferenceConfig::default();
        let lookup = StaticRelatedTechnologies::from_config(&config);
        let inference = GapInference::new(&lookup, &config.debt_defaults);

        let mut session = react_session();
        session.frameworks.push("Vue.js".to_string());
        let usage = aggregate(&[session]);

        let mut uow = UnitOfWork::new(&store, UserId(1));
        let created = inference.infer(&mut uow, &usage).await.unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(uow.debts_created(), 4);
    }
}

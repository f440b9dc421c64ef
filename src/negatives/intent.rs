//! Query intent tagging.
//!
//! Clusters are keyed `canonical_query :: intent`; the intent comes from a
//! layered keyword-set scan over the normalized query with fixed priority
//! child > adult > concern > info > generic. The tagger is immutable after
//! construction; re-tagging with different sets means building a new tagger.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::models::QueryIntent;

/// Keyword sets the tagger is built from. Extend at startup, not at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentTaggerConfig {
    pub child_terms: Vec<String>,
    pub adult_terms: Vec<String>,
    pub concern_terms: Vec<String>,
    pub info_terms: Vec<String>,
}

impl Default for IntentTaggerConfig {
    fn default() -> Self {
        Self {
            child_terms: ["kids", "child", "children", "baby", "toddler", "boys", "girls"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            adult_terms: ["adult", "mens", "womens", "men", "women"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            concern_terms: ["safe", "safety", "allergy", "allergic", "bpa", "organic", "sensitive"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            info_terms: ["how", "what", "why", "vs", "versus", "review", "reviews", "compare"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

pub struct IntentTagger {
    child: HashSet<String>,
    adult: HashSet<String>,
    concern: HashSet<String>,
    info: HashSet<String>,
}

impl IntentTagger {
    pub fn new(config: &IntentTaggerConfig) -> Self {
        let to_set = |terms: &[String]| {
            terms
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect::<HashSet<String>>()
        };
        Self {
            child: to_set(&config.child_terms),
            adult: to_set(&config.adult_terms),
            concern: to_set(&config.concern_terms),
            info: to_set(&config.info_terms),
        }
    }

    /// Lowercase, collapse whitespace. The canonical query is the cluster
    /// key together with the intent tag.
    pub fn canonicalize(query: &str) -> String {
        query
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Layered scan in priority order; first layer with a hit wins.
    pub fn tag(&self, query: &str) -> QueryIntent {
        let canonical = Self::canonicalize(query);
        let tokens: Vec<&str> = canonical.split(' ').collect();

        let hits = |set: &HashSet<String>| tokens.iter().any(|t| set.contains(*t));

        if hits(&self.child) {
            QueryIntent::Child
        } else if hits(&self.adult) {
            QueryIntent::Adult
        } else if hits(&self.concern) {
            QueryIntent::Concern
        } else if hits(&self.info) {
            QueryIntent::Info
        } else {
            QueryIntent::Generic
        }
    }

    /// Cluster key `canonical_query :: intent`.
    pub fn cluster_key(&self, query: &str) -> String {
        let canonical = Self::canonicalize(query);
        format!("{}::{}", canonical, self.tag(query).as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger() -> IntentTagger {
        IntentTagger::new(&IntentTaggerConfig::default())
    }

    #[test]
    fn priority_child_over_adult() {
        // Both "kids" (child) and "mens" (adult) present: child wins.
        assert_eq!(tagger().tag("mens shoes for kids"), QueryIntent::Child);
    }

    #[test]
    fn priority_order_is_layered() {
        let t = tagger();
        assert_eq!(t.tag("adult safety scissors"), QueryIntent::Adult);
        assert_eq!(t.tag("bpa free bottle"), QueryIntent::Concern);
        assert_eq!(t.tag("earbuds vs headphones"), QueryIntent::Info);
        assert_eq!(t.tag("wireless earbuds"), QueryIntent::Generic);
    }

    #[test]
    fn canonicalization_folds_case_and_whitespace() {
        assert_eq!(
            IntentTagger::canonicalize("  Wireless   EARBUDS "),
            "wireless earbuds"
        );
        assert_eq!(
            tagger().cluster_key("Wireless  Earbuds"),
            "wireless earbuds::generic"
        );
    }

    #[test]
    fn custom_terms_require_a_new_tagger() {
        let mut cfg = IntentTaggerConfig::default();
        let t = IntentTagger::new(&cfg);
        assert_eq!(t.tag("petite earbuds"), QueryIntent::Generic);

        cfg.child_terms.push("petite".to_string());
        let retagged = IntentTagger::new(&cfg);
        assert_eq!(retagged.tag("petite earbuds"), QueryIntent::Child);
        // The original instance is untouched.
        assert_eq!(t.tag("petite earbuds"), QueryIntent::Generic);
    }
}

//! Whitelist registry for the hybrid override.
//!
//! Three layers: manual per-ASIN entries, global entries, and auto-detected
//! top spenders. Built once at startup from configuration plus the current
//! search-term snapshot; lookups only afterwards. A whitelist hit may loosen
//! a cluster verdict (STOP becomes no-action) but never tighten one.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::SearchTermStat;
use crate::negatives::intent::IntentTagger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistConfig {
    /// Manual per-ASIN protected queries.
    pub manual: HashMap<String, Vec<String>>,
    /// Queries protected for every ASIN.
    pub global: Vec<String>,
    /// Auto-protect the top N queries by spend per ASIN.
    pub auto_top_n_by_spend: usize,
}

impl Default for WhitelistConfig {
    fn default() -> Self {
        Self {
            manual: HashMap::new(),
            global: Vec::new(),
            auto_top_n_by_spend: 3,
        }
    }
}

pub struct WhitelistRegistry {
    manual: HashMap<String, HashSet<String>>,
    global: HashSet<String>,
    auto: HashMap<String, HashSet<String>>,
}

impl WhitelistRegistry {
    /// Build from config plus the search-term snapshot used for auto
    /// detection. Queries are stored canonicalized.
    pub fn build(config: &WhitelistConfig, terms: &[SearchTermStat]) -> Self {
        let manual = config
            .manual
            .iter()
            .map(|(asin, queries)| {
                (
                    asin.clone(),
                    queries.iter().map(|q| IntentTagger::canonicalize(q)).collect(),
                )
            })
            .collect();

        let global = config
            .global
            .iter()
            .map(|q| IntentTagger::canonicalize(q))
            .collect();

        let mut by_asin: HashMap<String, Vec<(&str, i64)>> = HashMap::new();
        for t in terms {
            by_asin
                .entry(t.asin.clone())
                .or_default()
                .push((t.query.as_str(), t.spend_jpy));
        }
        let mut auto: HashMap<String, HashSet<String>> = HashMap::new();
        for (asin, mut rows) in by_asin {
            rows.sort_by(|a, b| b.1.cmp(&a.1));
            let top = rows
                .into_iter()
                .take(config.auto_top_n_by_spend)
                .map(|(q, _)| IntentTagger::canonicalize(q))
                .collect();
            auto.insert(asin, top);
        }

        Self {
            manual,
            global,
            auto,
        }
    }

    pub fn is_whitelisted(&self, asin: &str, query: &str) -> bool {
        let canonical = IntentTagger::canonicalize(query);
        if self.global.contains(&canonical) {
            return true;
        }
        if self
            .manual
            .get(asin)
            .map(|set| set.contains(&canonical))
            .unwrap_or(false)
        {
            return true;
        }
        self.auto
            .get(asin)
            .map(|set| set.contains(&canonical))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn term(asin: &str, query: &str, spend: i64) -> SearchTermStat {
        SearchTermStat {
            asin: asin.into(),
            campaign_id: "cmp-1".into(),
            ad_group_id: "adg-1".into(),
            query: query.into(),
            match_type: "broad".into(),
            impressions: 1000,
            clicks: 50,
            orders: 2,
            sales_jpy: 6000,
            spend_jpy: spend,
            target_acos: 0.25,
        }
    }

    #[test]
    fn manual_and_global_layers() {
        let mut cfg = WhitelistConfig::default();
        cfg.manual
            .insert("B0A".to_string(), vec!["Protected Query".to_string()]);
        cfg.global.push("brand hero".to_string());
        let reg = WhitelistRegistry::build(&cfg, &[]);

        assert!(reg.is_whitelisted("B0A", "protected  query"));
        assert!(!reg.is_whitelisted("B0B", "protected query"));
        assert!(reg.is_whitelisted("B0B", "Brand Hero"));
    }

    #[test]
    fn auto_layer_takes_top_spenders_per_asin() {
        let cfg = WhitelistConfig {
            auto_top_n_by_spend: 2,
            ..WhitelistConfig::default()
        };
        let terms = vec![
            term("B0A", "big spender", 9000),
            term("B0A", "mid spender", 5000),
            term("B0A", "small spender", 100),
            term("B0B", "other asin", 8000),
        ];
        let reg = WhitelistRegistry::build(&cfg, &terms);
        assert!(reg.is_whitelisted("B0A", "big spender"));
        assert!(reg.is_whitelisted("B0A", "mid spender"));
        assert!(!reg.is_whitelisted("B0A", "small spender"));
        assert!(reg.is_whitelisted("B0B", "other asin"));
        assert!(!reg.is_whitelisted("B0B", "big spender"));
    }
}

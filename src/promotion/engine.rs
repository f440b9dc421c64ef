//! Auto-exact promotion engine.
//!
//! Mines broad/phrase/auto search terms for queries worth an exact-match
//! target of their own. A query qualifies when it has proven clicks and
//! orders at acceptable ACOS; the suggested bid starts from the observed
//! CPC plus a premium. Discovery mode relaxes the gates and suggests no
//! bid, feeding the keyword-discovery review queue instead.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    AutoExactPromotionSuggestion, PromotionReasonCode, QueryIntent, RecommendationStatus,
    SearchTermStat,
};
use crate::negatives::intent::IntentTagger;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionConfig {
    pub min_clicks: u64,
    pub min_orders: u64,
    /// ACOS must be at or below target x this.
    pub acos_ratio_cap: f64,
    /// Suggested bid = observed CPC x (1 + premium).
    pub bid_premium: f64,
    pub min_bid_jpy: i64,

    /// Discovery mode gates (no bid suggestion).
    pub discovery_min_clicks: u64,
    pub discovery_min_orders: u64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            min_clicks: 10,
            min_orders: 2,
            acos_ratio_cap: 1.0,
            bid_premium: 0.10,
            min_bid_jpy: 10,
            discovery_min_clicks: 5,
            discovery_min_orders: 1,
        }
    }
}

pub struct PromotionEngine {
    config: PromotionConfig,
}

impl PromotionEngine {
    pub fn new(config: PromotionConfig) -> Self {
        Self { config }
    }

    /// Mine promotion candidates. With `discovery` the relaxed gates apply
    /// and no bid is suggested.
    pub fn run(
        &self,
        execution_id: &str,
        terms: &[SearchTermStat],
        tagger: &IntentTagger,
        discovery: bool,
    ) -> Vec<AutoExactPromotionSuggestion> {
        let cfg = &self.config;
        let (min_clicks, min_orders) = if discovery {
            (cfg.discovery_min_clicks, cfg.discovery_min_orders)
        } else {
            (cfg.min_clicks, cfg.min_orders)
        };

        let mut out = Vec::new();
        for t in terms {
            // Exact targets already exist for exact traffic.
            if t.match_type.eq_ignore_ascii_case("exact") {
                continue;
            }
            if t.clicks < min_clicks || t.orders < min_orders {
                continue;
            }
            if t.target_acos > 0.0 && t.acos() > t.target_acos * cfg.acos_ratio_cap {
                continue;
            }

            // Audience-mismatch intents never get promoted, only surfaced.
            let intent = tagger.tag(&t.query);
            if matches!(intent, QueryIntent::Child | QueryIntent::Adult) {
                out.push(self.suggestion(
                    execution_id,
                    t,
                    0,
                    PromotionReasonCode::IntentExcluded,
                    format!("intent {} excluded from promotion", intent.as_str()),
                ));
                continue;
            }

            let (bid, reason_code, detail) = if discovery {
                (
                    0,
                    PromotionReasonCode::DiscoveryCandidate,
                    format!("{} clicks / {} orders under relaxed gates", t.clicks, t.orders),
                )
            } else {
                let raw = t.cpc_jpy() * (1.0 + cfg.bid_premium);
                (
                    (raw.round() as i64).max(cfg.min_bid_jpy),
                    PromotionReasonCode::ProvenConverter,
                    format!(
                        "{} clicks / {} orders, acos {:.2} within target",
                        t.clicks,
                        t.orders,
                        t.acos()
                    ),
                )
            };

            out.push(self.suggestion(execution_id, t, bid, reason_code, detail));
        }

        out.sort_by(|a, b| (a.asin.as_str(), a.query.as_str()).cmp(&(b.asin.as_str(), b.query.as_str())));
        out
    }

    fn suggestion(
        &self,
        execution_id: &str,
        t: &SearchTermStat,
        suggested_bid: i64,
        reason_code: PromotionReasonCode,
        reason_detail: String,
    ) -> AutoExactPromotionSuggestion {
        AutoExactPromotionSuggestion {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            asin: t.asin.clone(),
            campaign_id: t.campaign_id.clone(),
            ad_group_id: t.ad_group_id.clone(),
            query: IntentTagger::canonicalize(&t.query),
            source_match_type: t.match_type.clone(),
            clicks: t.clicks,
            orders: t.orders,
            cvr: t.cvr(),
            acos: t.acos(),
            suggested_bid,
            reason_code,
            reason_detail,
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }
}

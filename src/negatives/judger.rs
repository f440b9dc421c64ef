//! Negative-keyword judger.
//!
//! Aggregates search terms into (ASIN, query-cluster) pairs, ladders each
//! cluster through LEARNING / LIMITED_ACTION / STOP_CANDIDATE by click
//! volume, and inside STOP_CANDIDATE applies the long-tail guard, the rule
//! of three for zero-conversion stops, and low-CVR / high-ACOS heuristics
//! for DOWN-only verdicts. The whitelist may loosen a STOP, never tighten.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    ClusterPhase, NegativeKeywordSuggestion, NegativeReasonCode, NegativeVerdict, QueryIntent,
    RecommendationStatus, SearchTermStat,
};
use crate::negatives::intent::IntentTagger;
use crate::negatives::whitelist::WhitelistRegistry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegativeJudgeConfig {
    /// Cluster phase boundaries by click count.
    pub learning_max_clicks: u64,
    pub limited_max_clicks: u64,

    /// Long-tail guard: tiny clusters go to manual review, never auto-stop.
    pub long_tail_max_impressions: u64,
    pub long_tail_max_clicks: u64,

    /// Rule-of-three inputs.
    pub minimum_baseline_cvr: f64,
    /// In [0, 1]; 0.5 is neutral, higher tolerates more risk (fewer clicks
    /// required before stopping).
    pub risk_tolerance: f64,
    pub required_clicks_floor: u64,

    /// DOWN-only heuristics inside STOP_CANDIDATE.
    pub low_cvr_ratio: f64,
    pub high_acos_ratio: f64,
}

impl Default for NegativeJudgeConfig {
    fn default() -> Self {
        Self {
            learning_max_clicks: 20,
            limited_max_clicks: 60,
            long_tail_max_impressions: 200,
            long_tail_max_clicks: 5,
            minimum_baseline_cvr: 0.02,
            risk_tolerance: 0.5,
            required_clicks_floor: 10,
            low_cvr_ratio: 0.3,
            high_acos_ratio: 1.5,
        }
    }
}

/// Aggregated cluster totals.
#[derive(Debug, Clone)]
struct Cluster {
    asin: String,
    campaign_id: String,
    ad_group_id: String,
    query: String,
    intent: QueryIntent,
    impressions: u64,
    clicks: u64,
    conversions: u64,
    sales_jpy: i64,
    spend_jpy: i64,
    target_acos: f64,
}

impl Cluster {
    fn cvr(&self) -> f64 {
        if self.clicks == 0 {
            return 0.0;
        }
        self.conversions as f64 / self.clicks as f64
    }

    fn acos(&self) -> f64 {
        if self.sales_jpy <= 0 {
            if self.spend_jpy > 0 {
                return f64::MAX;
            }
            return 0.0;
        }
        self.spend_jpy as f64 / self.sales_jpy as f64
    }
}

pub struct NegativeJudger {
    config: NegativeJudgeConfig,
}

impl NegativeJudger {
    pub fn new(config: NegativeJudgeConfig) -> Self {
        Self { config }
    }

    /// Required clicks to trust a zero-CVR observation: about 3/p draws,
    /// scaled by risk tolerance and floored.
    pub fn required_clicks_for_stop(&self, baseline_cvr: f64) -> u64 {
        let cfg = &self.config;
        let p = baseline_cvr.max(cfg.minimum_baseline_cvr);
        let scale = 1.0 - (cfg.risk_tolerance - 0.5);
        let required = (3.0 / p * scale).ceil() as u64;
        required.max(cfg.required_clicks_floor)
    }

    /// Judge the whole search-term snapshot. `baseline_cvrs` is keyed by
    /// ASIN (account-level CVR baseline for the rule of three).
    pub fn run(
        &self,
        execution_id: &str,
        terms: &[SearchTermStat],
        tagger: &IntentTagger,
        whitelist: &WhitelistRegistry,
        baseline_cvrs: &HashMap<String, f64>,
    ) -> Vec<NegativeKeywordSuggestion> {
        let clusters = self.aggregate(terms, tagger);
        let mut out = Vec::with_capacity(clusters.len());

        for cluster in clusters.into_values() {
            let baseline = baseline_cvrs
                .get(&cluster.asin)
                .copied()
                .unwrap_or(self.config.minimum_baseline_cvr);
            out.push(self.judge_cluster(execution_id, &cluster, whitelist, baseline));
        }

        // Deterministic output order regardless of map iteration.
        out.sort_by(|a, b| {
            (a.asin.as_str(), a.query.as_str(), a.intent.as_str())
                .cmp(&(b.asin.as_str(), b.query.as_str(), b.intent.as_str()))
        });
        out
    }

    fn aggregate(
        &self,
        terms: &[SearchTermStat],
        tagger: &IntentTagger,
    ) -> HashMap<(String, String), Cluster> {
        let mut clusters: HashMap<(String, String), Cluster> = HashMap::new();
        for t in terms {
            let key = (t.asin.clone(), tagger.cluster_key(&t.query));
            let entry = clusters.entry(key).or_insert_with(|| Cluster {
                asin: t.asin.clone(),
                campaign_id: t.campaign_id.clone(),
                ad_group_id: t.ad_group_id.clone(),
                query: IntentTagger::canonicalize(&t.query),
                intent: tagger.tag(&t.query),
                impressions: 0,
                clicks: 0,
                conversions: 0,
                sales_jpy: 0,
                spend_jpy: 0,
                target_acos: t.target_acos,
            });
            entry.impressions += t.impressions;
            entry.clicks += t.clicks;
            entry.conversions += t.orders;
            entry.sales_jpy += t.sales_jpy;
            entry.spend_jpy += t.spend_jpy;
        }
        clusters
    }

    fn judge_cluster(
        &self,
        execution_id: &str,
        cluster: &Cluster,
        whitelist: &WhitelistRegistry,
        baseline_cvr: f64,
    ) -> NegativeKeywordSuggestion {
        let cfg = &self.config;
        let phase = if cluster.clicks < cfg.learning_max_clicks {
            ClusterPhase::Learning
        } else if cluster.clicks < cfg.limited_max_clicks {
            ClusterPhase::LimitedAction
        } else {
            ClusterPhase::StopCandidate
        };

        let (mut verdict, mut reason_code, mut detail) = match phase {
            ClusterPhase::Learning => (
                NegativeVerdict::NoAction,
                NegativeReasonCode::LearningPhase,
                format!("{} clicks, still learning", cluster.clicks),
            ),
            ClusterPhase::LimitedAction => self.judge_limited(cluster),
            ClusterPhase::StopCandidate => self.judge_stop_candidate(cluster, baseline_cvr),
        };

        // Hybrid override: whitelisted queries are never stopped.
        if verdict == NegativeVerdict::Stop && whitelist.is_whitelisted(&cluster.asin, &cluster.query)
        {
            debug!(asin = %cluster.asin, query = %cluster.query, "stop loosened by whitelist");
            verdict = NegativeVerdict::NoAction;
            reason_code = NegativeReasonCode::WhitelistLoosened;
            detail = format!("stop suppressed by whitelist ({detail})");
        }

        NegativeKeywordSuggestion {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            asin: cluster.asin.clone(),
            campaign_id: cluster.campaign_id.clone(),
            ad_group_id: cluster.ad_group_id.clone(),
            query: cluster.query.clone(),
            intent: cluster.intent,
            phase,
            verdict,
            reason_code,
            reason_detail: detail,
            clicks: cluster.clicks,
            impressions: cluster.impressions,
            conversions: cluster.conversions,
            spend_jpy: cluster.spend_jpy,
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }

    /// LIMITED_ACTION: bid-down recommendations only.
    fn judge_limited(&self, cluster: &Cluster) -> (NegativeVerdict, NegativeReasonCode, String) {
        let cfg = &self.config;
        if cluster.conversions == 0 {
            return (
                NegativeVerdict::BidDown,
                NegativeReasonCode::LimitedLowCvr,
                format!("{} clicks without a conversion", cluster.clicks),
            );
        }
        let acos = cluster.acos();
        if cluster.target_acos > 0.0 && acos > cluster.target_acos * cfg.high_acos_ratio {
            return (
                NegativeVerdict::BidDown,
                NegativeReasonCode::LimitedHighAcos,
                format!("acos {:.2} above {:.2}x target", acos, cfg.high_acos_ratio),
            );
        }
        (
            NegativeVerdict::NoAction,
            NegativeReasonCode::Healthy,
            "limited phase, performance acceptable".to_string(),
        )
    }

    fn judge_stop_candidate(
        &self,
        cluster: &Cluster,
        baseline_cvr: f64,
    ) -> (NegativeVerdict, NegativeReasonCode, String) {
        let cfg = &self.config;

        // Long-tail guard: thin evidence never auto-stops.
        if cluster.impressions < cfg.long_tail_max_impressions
            && cluster.clicks < cfg.long_tail_max_clicks
            && cluster.conversions == 0
        {
            return (
                NegativeVerdict::ManualReview,
                NegativeReasonCode::LongTailGuard,
                format!(
                    "{} impressions / {} clicks, below the long-tail floor",
                    cluster.impressions, cluster.clicks
                ),
            );
        }

        // Rule of three: enough clicks to trust zero CVR.
        if cluster.conversions == 0 {
            let required = self.required_clicks_for_stop(baseline_cvr);
            if cluster.clicks >= required {
                return (
                    NegativeVerdict::Stop,
                    NegativeReasonCode::RuleOfThreeStop,
                    format!(
                        "{} clicks with zero conversions (required {})",
                        cluster.clicks, required
                    ),
                );
            }
            return (
                NegativeVerdict::BidDown,
                NegativeReasonCode::LowCvrDown,
                format!(
                    "zero conversions but only {} of {} required clicks",
                    cluster.clicks, required
                ),
            );
        }

        // Converting but inefficient: DOWN only.
        let cvr = cluster.cvr();
        if baseline_cvr > 0.0 && cvr < baseline_cvr * cfg.low_cvr_ratio {
            return (
                NegativeVerdict::BidDown,
                NegativeReasonCode::LowCvrDown,
                format!("cvr {:.3} below {:.1}x baseline", cvr, cfg.low_cvr_ratio),
            );
        }
        let acos = cluster.acos();
        if cluster.target_acos > 0.0 && acos > cluster.target_acos * cfg.high_acos_ratio {
            return (
                NegativeVerdict::BidDown,
                NegativeReasonCode::HighAcosDown,
                format!("acos {:.2} above {:.1}x target", acos, cfg.high_acos_ratio),
            );
        }

        (
            NegativeVerdict::NoAction,
            NegativeReasonCode::Healthy,
            "converting within tolerance".to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negatives::intent::IntentTaggerConfig;
    use crate::negatives::whitelist::WhitelistConfig;

    fn judger() -> NegativeJudger {
        NegativeJudger::new(NegativeJudgeConfig::default())
    }

    fn tagger() -> IntentTagger {
        IntentTagger::new(&IntentTaggerConfig::default())
    }

    fn empty_whitelist() -> WhitelistRegistry {
        WhitelistRegistry::build(
            &WhitelistConfig {
                auto_top_n_by_spend: 0,
                ..WhitelistConfig::default()
            },
            &[],
        )
    }

    fn term(query: &str, impressions: u64, clicks: u64, orders: u64) -> SearchTermStat {
        SearchTermStat {
            asin: "B0TEST".into(),
            campaign_id: "cmp-1".into(),
            ad_group_id: "adg-1".into(),
            query: query.into(),
            match_type: "broad".into(),
            impressions,
            clicks,
            orders,
            sales_jpy: orders as i64 * 3000,
            spend_jpy: clicks as i64 * 60,
            target_acos: 0.25,
        }
    }

    fn baselines(cvr: f64) -> HashMap<String, f64> {
        let mut m = HashMap::new();
        m.insert("B0TEST".to_string(), cvr);
        m
    }

    #[test]
    fn rule_of_three_matches_expectation() {
        let j = judger();
        // baseline 0.05, neutral risk: ceil(3 / 0.05) = 60.
        assert_eq!(j.required_clicks_for_stop(0.05), 60);
        // Tiny baselines clamp to the configured minimum.
        assert_eq!(j.required_clicks_for_stop(0.001), 150);
        // Floor applies for high baselines.
        assert_eq!(j.required_clicks_for_stop(0.5), 10);
    }

    #[test]
    fn risk_tolerance_scales_required_clicks() {
        let mut cfg = NegativeJudgeConfig::default();
        cfg.risk_tolerance = 0.7;
        let j = NegativeJudger::new(cfg);
        // scale = 1 - 0.2 = 0.8 -> ceil(60 * 0.8) = 48
        assert_eq!(j.required_clicks_for_stop(0.05), 48);
    }

    #[test]
    fn learning_cluster_never_stops() {
        let recs = judger().run(
            "exec-1",
            &[term("foo", 1000, 10, 0)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        let r = &recs[0];
        assert_eq!(r.phase, ClusterPhase::Learning);
        assert_eq!(r.verdict, NegativeVerdict::NoAction);
        assert_eq!(r.reason_code, NegativeReasonCode::LearningPhase);
    }

    #[test]
    fn limited_cluster_only_bids_down() {
        let recs = judger().run(
            "exec-1",
            &[term("foo", 2000, 40, 0)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        let r = &recs[0];
        assert_eq!(r.phase, ClusterPhase::LimitedAction);
        assert_eq!(r.verdict, NegativeVerdict::BidDown);
    }

    #[test]
    fn stop_candidate_zero_cvr_with_enough_clicks_stops() {
        // clicks=60, conversions=0, baseline 0.05 -> required 60 -> STOP.
        let recs = judger().run(
            "exec-1",
            &[term("foo", 1000, 60, 0)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        let r = &recs[0];
        assert_eq!(r.phase, ClusterPhase::StopCandidate);
        assert_eq!(r.verdict, NegativeVerdict::Stop);
        assert_eq!(r.reason_code, NegativeReasonCode::RuleOfThreeStop);
        assert_eq!(r.intent, QueryIntent::Generic);
    }

    #[test]
    fn long_tail_goes_to_manual_review() {
        // Clicks beyond the candidate boundary come from aggregation of a
        // low-impression tail: guard fires before the rule of three.
        let mut cfg = NegativeJudgeConfig::default();
        cfg.limited_max_clicks = 4; // make a 4-click cluster a candidate
        cfg.learning_max_clicks = 2;
        let j = NegativeJudger::new(cfg);
        let recs = j.run(
            "exec-1",
            &[term("foo", 150, 4, 0)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        let r = &recs[0];
        assert_eq!(r.verdict, NegativeVerdict::ManualReview);
        assert_eq!(r.reason_code, NegativeReasonCode::LongTailGuard);
    }

    #[test]
    fn whitelist_loosens_stop_to_no_action() {
        let mut wl_cfg = WhitelistConfig::default();
        wl_cfg.global.push("foo".to_string());
        let wl = WhitelistRegistry::build(&wl_cfg, &[]);
        let recs = judger().run(
            "exec-1",
            &[term("foo", 1000, 80, 0)],
            &tagger(),
            &wl,
            &baselines(0.05),
        );
        let r = &recs[0];
        assert_eq!(r.verdict, NegativeVerdict::NoAction);
        assert_eq!(r.reason_code, NegativeReasonCode::WhitelistLoosened);
    }

    #[test]
    fn whitelist_never_tightens() {
        // A healthy whitelisted cluster stays healthy.
        let mut wl_cfg = WhitelistConfig::default();
        wl_cfg.global.push("foo".to_string());
        let wl = WhitelistRegistry::build(&wl_cfg, &[]);
        let recs = judger().run(
            "exec-1",
            &[term("foo", 5000, 100, 8)],
            &tagger(),
            &wl,
            &baselines(0.05),
        );
        assert_eq!(recs[0].verdict, NegativeVerdict::NoAction);
        assert_eq!(recs[0].reason_code, NegativeReasonCode::Healthy);
    }

    #[test]
    fn clusters_merge_same_canonical_query() {
        let recs = judger().run(
            "exec-1",
            &[
                term("Foo  Bar", 500, 30, 0),
                term("foo bar", 500, 30, 0),
            ],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].clicks, 60);
        assert_eq!(recs[0].phase, ClusterPhase::StopCandidate);
    }

    #[test]
    fn converting_but_inefficient_bids_down() {
        // cvr 8/100 = 0.08, baseline 0.05: fine. acos = 6000/24000 = 0.25
        // at ratio 1.0: fine -> healthy.
        let recs = judger().run(
            "exec-1",
            &[term("foo", 5000, 100, 8)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        assert_eq!(recs[0].verdict, NegativeVerdict::NoAction);

        // Same volume but one conversion: cvr 0.01 < 0.3 x 0.05 -> DOWN.
        let recs = judger().run(
            "exec-1",
            &[term("foo", 5000, 100, 1)],
            &tagger(),
            &empty_whitelist(),
            &baselines(0.05),
        );
        assert_eq!(recs[0].verdict, NegativeVerdict::BidDown);
        assert_eq!(recs[0].reason_code, NegativeReasonCode::LowCvrDown);
    }
}

//! SEO launch progress evaluator.
//!
//! Classifies each CORE keyword of an ASIN as ACHIEVED / GAVE_UP / ACTIVE
//! against dynamic (tier x volume-bucket) thresholds, then rolls the counts
//! up to the per-product completion and success ratios the launch-exit
//! decider consumes. Conservation holds by construction:
//! achieved + gave_up + active == total core keywords.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lifecycle::config::SeoLaunchConfig;
use crate::lifecycle::types::{GiveUpPath, KeywordLaunchStatus};
use crate::models::{AsinSeoLaunchProgress, CoreKeywordConfig, KeywordRankSummary, KeywordRole, KeywordTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeBucket {
    High,
    Mid,
    Low,
}

/// Effective give-up gates for one keyword after tier/bucket scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicThresholds {
    pub min_days: u32,
    pub min_clicks: u64,
    pub rank_threshold: u32,
    pub bucket: VolumeBucket,
}

/// One keyword's classification with its audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordLaunchEvaluation {
    pub keyword: String,
    pub status: KeywordLaunchStatus,
    pub give_up_path: Option<GiveUpPath>,
    pub thresholds: DynamicThresholds,
}

/// Median search volume across an ASIN's core keywords. Zero when the set
/// is empty or all volumes are zero.
pub fn median_volume(core_keywords: &[&CoreKeywordConfig]) -> f64 {
    if core_keywords.is_empty() {
        return 0.0;
    }
    let mut volumes: Vec<u64> = core_keywords.iter().map(|k| k.search_volume).collect();
    volumes.sort_unstable();
    let mid = volumes.len() / 2;
    if volumes.len() % 2 == 0 {
        (volumes[mid - 1] + volumes[mid]) as f64 / 2.0
    } else {
        volumes[mid] as f64
    }
}

pub fn volume_bucket(cfg: &SeoLaunchConfig, search_volume: u64, median: f64) -> VolumeBucket {
    let ratio = if median <= 0.0 {
        1.0
    } else {
        search_volume as f64 / median
    };
    if ratio >= cfg.volume_high_ratio {
        VolumeBucket::High
    } else if ratio < cfg.volume_low_ratio {
        VolumeBucket::Low
    } else {
        VolumeBucket::Mid
    }
}

pub fn dynamic_thresholds(
    cfg: &SeoLaunchConfig,
    tier: KeywordTier,
    bucket: VolumeBucket,
) -> DynamicThresholds {
    let (base_days, base_clicks, base_rank) = match tier {
        KeywordTier::Big => (cfg.big_min_days, cfg.big_min_clicks, cfg.big_rank_threshold),
        KeywordTier::Middle | KeywordTier::Brand => {
            (cfg.mid_min_days, cfg.mid_min_clicks, cfg.mid_rank_threshold)
        }
    };

    let mult = match bucket {
        VolumeBucket::High => cfg.bucket_mult_high,
        VolumeBucket::Mid => cfg.bucket_mult_mid,
        VolumeBucket::Low => cfg.bucket_mult_low,
    };

    // High-volume keywords get more runway and a wider acceptable rank
    // band; low-volume ones are cut loose sooner.
    let rank_threshold = match bucket {
        VolumeBucket::High => base_rank + cfg.rank_threshold_shift,
        VolumeBucket::Mid => base_rank,
        VolumeBucket::Low => base_rank.saturating_sub(cfg.rank_threshold_shift),
    };

    DynamicThresholds {
        min_days: (base_days as f64 * mult).round() as u32,
        min_clicks: (base_clicks as f64 * mult).round() as u64,
        rank_threshold,
        bucket,
    }
}

/// Classify one core keyword. `target_cpa_jpy` is the product-level allowed
/// cost per acquisition.
pub fn classify_keyword(
    cfg: &SeoLaunchConfig,
    keyword: &CoreKeywordConfig,
    summary: Option<&KeywordRankSummary>,
    target_cpa_jpy: f64,
    median: f64,
) -> KeywordLaunchEvaluation {
    let bucket = volume_bucket(cfg, keyword.search_volume, median);
    let thresholds = dynamic_thresholds(cfg, keyword.tier, bucket);

    let summary = match summary {
        Some(s) => s,
        // No rank series yet: still active by definition.
        None => {
            return KeywordLaunchEvaluation {
                keyword: keyword.keyword.clone(),
                status: KeywordLaunchStatus::Active,
                give_up_path: None,
                thresholds,
            }
        }
    };

    if is_achieved(cfg, keyword, summary) {
        return KeywordLaunchEvaluation {
            keyword: keyword.keyword.clone(),
            status: KeywordLaunchStatus::Achieved,
            give_up_path: None,
            thresholds,
        };
    }

    if let Some(path) = give_up_path(cfg, summary, &thresholds, target_cpa_jpy) {
        return KeywordLaunchEvaluation {
            keyword: keyword.keyword.clone(),
            status: KeywordLaunchStatus::GaveUp,
            give_up_path: Some(path),
            thresholds,
        };
    }

    KeywordLaunchEvaluation {
        keyword: keyword.keyword.clone(),
        status: KeywordLaunchStatus::Active,
        give_up_path: None,
        thresholds,
    }
}

fn is_achieved(
    cfg: &SeoLaunchConfig,
    keyword: &CoreKeywordConfig,
    summary: &KeywordRankSummary,
) -> bool {
    let in_target = summary
        .current_rank
        .map(|r| r <= keyword.target_rank_max)
        .unwrap_or(false);
    in_target
        && summary.impressions_total >= cfg.min_impressions_for_rank
        && summary.clicks_total >= cfg.min_clicks_for_rank
}

fn give_up_path(
    cfg: &SeoLaunchConfig,
    summary: &KeywordRankSummary,
    thresholds: &DynamicThresholds,
    target_cpa_jpy: f64,
) -> Option<GiveUpPath> {
    // Common gating: enough days, clicks and spend to call it.
    let gated = summary.days_with_rank_data >= thresholds.min_days
        && summary.clicks_total >= thresholds.min_clicks
        && summary.cost_total_jpy as f64 >= target_cpa_jpy * cfg.cost_multiplier;
    if !gated {
        return None;
    }

    let rank_never_reached = summary
        .best_rank
        .map(|best| best > thresholds.rank_threshold)
        .unwrap_or(true);
    if rank_never_reached {
        return Some(GiveUpPath::RankFailure);
    }

    if summary.cvr() <= cfg.max_cvr && summary.acos() >= cfg.max_acos {
        return Some(GiveUpPath::PerformanceFailure);
    }

    None
}

/// Evaluate all CORE keywords of one ASIN and roll up. Non-core roles are
/// ignored entirely.
pub fn evaluate_asin(
    cfg: &SeoLaunchConfig,
    asin: &str,
    keywords: &[CoreKeywordConfig],
    summaries: &HashMap<String, KeywordRankSummary>,
    target_cpa_jpy: f64,
) -> (AsinSeoLaunchProgress, Vec<KeywordLaunchEvaluation>) {
    let core: Vec<&CoreKeywordConfig> = keywords
        .iter()
        .filter(|k| k.asin == asin && k.role == KeywordRole::Core)
        .collect();
    let median = median_volume(&core);

    let mut achieved = 0u32;
    let mut gave_up = 0u32;
    let mut active = 0u32;
    let mut evaluations = Vec::with_capacity(core.len());

    for keyword in &core {
        let eval = classify_keyword(
            cfg,
            keyword,
            summaries.get(&keyword.keyword),
            target_cpa_jpy,
            median,
        );
        match eval.status {
            KeywordLaunchStatus::Achieved => achieved += 1,
            KeywordLaunchStatus::GaveUp => gave_up += 1,
            KeywordLaunchStatus::Active => active += 1,
        }
        evaluations.push(eval);
    }

    let total = core.len() as u32;
    let completion_ratio = if total == 0 {
        0.0
    } else {
        (achieved + gave_up) as f64 / total as f64
    };
    let success_ratio = if total == 0 {
        0.0
    } else {
        achieved as f64 / total as f64
    };

    debug!(
        asin,
        total, achieved, gave_up, active, "seo launch progress evaluated"
    );

    (
        AsinSeoLaunchProgress {
            asin: asin.to_string(),
            total_core_keywords: total,
            achieved_count: achieved,
            gave_up_count: gave_up,
            active_count: active,
            completion_ratio,
            success_ratio,
        },
        evaluations,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SeoLaunchConfig {
        SeoLaunchConfig::default()
    }

    fn core_kw(keyword: &str, tier: KeywordTier, volume: u64) -> CoreKeywordConfig {
        CoreKeywordConfig {
            asin: "B0TEST".into(),
            keyword: keyword.into(),
            tier,
            target_rank_min: 1,
            target_rank_max: 5,
            search_volume: volume,
            role: KeywordRole::Core,
        }
    }

    fn summary(keyword: &str) -> KeywordRankSummary {
        KeywordRankSummary {
            asin: "B0TEST".into(),
            keyword: keyword.into(),
            current_rank: Some(3),
            best_rank: Some(2),
            days_with_rank_data: 60,
            impressions_total: 5000,
            clicks_total: 200,
            orders_total: 10,
            cost_total_jpy: 20_000,
            revenue_total_jpy: 60_000,
        }
    }

    #[test]
    fn achieved_needs_rank_and_evidence() {
        let kw = core_kw("kw", KeywordTier::Middle, 1000);
        let mut s = summary("kw");
        let eval = classify_keyword(&cfg(), &kw, Some(&s), 900.0, 1000.0);
        assert_eq!(eval.status, KeywordLaunchStatus::Achieved);

        // Rank in band but impressions thin: not achieved.
        s.impressions_total = 100;
        let eval = classify_keyword(&cfg(), &kw, Some(&s), 900.0, 1000.0);
        assert_ne!(eval.status, KeywordLaunchStatus::Achieved);
    }

    #[test]
    fn rank_failure_give_up() {
        let kw = core_kw("kw", KeywordTier::Middle, 1000);
        let mut s = summary("kw");
        s.current_rank = None;
        s.best_rank = Some(40); // never inside threshold 15
        s.orders_total = 3;
        s.revenue_total_jpy = 9000;
        let eval = classify_keyword(&cfg(), &kw, Some(&s), 900.0, 1000.0);
        assert_eq!(eval.status, KeywordLaunchStatus::GaveUp);
        assert_eq!(eval.give_up_path, Some(GiveUpPath::RankFailure));
    }

    #[test]
    fn performance_failure_give_up() {
        let kw = core_kw("kw", KeywordTier::Middle, 1000);
        let mut s = summary("kw");
        s.current_rank = Some(10); // outside the 1..=5 target band
        s.best_rank = Some(8); // inside rank threshold, so not a rank failure
        s.orders_total = 0; // zero CVR
        s.revenue_total_jpy = 0; // ACOS saturates
        let eval = classify_keyword(&cfg(), &kw, Some(&s), 900.0, 1000.0);
        assert_eq!(eval.status, KeywordLaunchStatus::GaveUp);
        assert_eq!(eval.give_up_path, Some(GiveUpPath::PerformanceFailure));
    }

    #[test]
    fn under_gated_keyword_stays_active() {
        let kw = core_kw("kw", KeywordTier::Middle, 1000);
        let mut s = summary("kw");
        s.current_rank = Some(10);
        s.best_rank = Some(40);
        s.days_with_rank_data = 10; // below min days
        let eval = classify_keyword(&cfg(), &kw, Some(&s), 900.0, 1000.0);
        assert_eq!(eval.status, KeywordLaunchStatus::Active);
    }

    #[test]
    fn missing_summary_is_active() {
        let kw = core_kw("kw", KeywordTier::Big, 1000);
        let eval = classify_keyword(&cfg(), &kw, None, 900.0, 1000.0);
        assert_eq!(eval.status, KeywordLaunchStatus::Active);
    }

    #[test]
    fn volume_buckets_scale_thresholds() {
        let c = cfg();
        // Median 1000: volume 2500 is HIGH, 300 is LOW, 1000 is MID.
        assert_eq!(volume_bucket(&c, 2500, 1000.0), VolumeBucket::High);
        assert_eq!(volume_bucket(&c, 300, 1000.0), VolumeBucket::Low);
        assert_eq!(volume_bucket(&c, 1000, 1000.0), VolumeBucket::Mid);
        // Zero median pins the ratio to 1.0.
        assert_eq!(volume_bucket(&c, 99, 0.0), VolumeBucket::Mid);

        let high = dynamic_thresholds(&c, KeywordTier::Big, VolumeBucket::High);
        let mid = dynamic_thresholds(&c, KeywordTier::Big, VolumeBucket::Mid);
        let low = dynamic_thresholds(&c, KeywordTier::Big, VolumeBucket::Low);
        assert!(high.min_days > mid.min_days);
        assert!(low.min_days < mid.min_days);
        assert_eq!(high.rank_threshold, c.big_rank_threshold + c.rank_threshold_shift);
        assert_eq!(low.rank_threshold, c.big_rank_threshold - c.rank_threshold_shift);
    }

    #[test]
    fn median_is_standard() {
        let a = core_kw("a", KeywordTier::Big, 100);
        let b = core_kw("b", KeywordTier::Big, 300);
        let c = core_kw("c", KeywordTier::Big, 1000);
        assert_eq!(median_volume(&[&a, &b, &c]), 300.0);
        assert_eq!(median_volume(&[&a, &b]), 200.0);
        assert_eq!(median_volume(&[]), 0.0);
    }

    #[test]
    fn rollup_conserves_counts() {
        let keywords = vec![
            core_kw("achieved", KeywordTier::Middle, 1000),
            core_kw("gaveup", KeywordTier::Middle, 1000),
            core_kw("active", KeywordTier::Middle, 1000),
            // SUPPORT role: must not enter the rollup.
            CoreKeywordConfig {
                role: KeywordRole::Support,
                ..core_kw("support", KeywordTier::Middle, 1000)
            },
        ];
        let mut summaries = HashMap::new();
        summaries.insert("achieved".to_string(), summary("achieved"));
        let mut gave = summary("gaveup");
        gave.current_rank = None;
        gave.best_rank = Some(40);
        summaries.insert("gaveup".to_string(), gave);

        let (progress, evals) =
            evaluate_asin(&cfg(), "B0TEST", &keywords, &summaries, 900.0);
        assert_eq!(progress.total_core_keywords, 3);
        assert_eq!(
            progress.achieved_count + progress.gave_up_count + progress.active_count,
            progress.total_core_keywords
        );
        assert_eq!(progress.achieved_count, 1);
        assert_eq!(progress.gave_up_count, 1);
        assert_eq!(progress.active_count, 1);
        assert!((progress.completion_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert!((progress.success_ratio - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(evals.len(), 3);
    }
}

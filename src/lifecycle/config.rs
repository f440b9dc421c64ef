//! Lifecycle-side calibration: SEO launch evaluation, launch exit, and the
//! state machine's safety and extension knobs. Defaults are the production
//! calibration; every engine entry point takes its config explicitly.

use serde::{Deserialize, Serialize};

/// SEO launch evaluator thresholds (C6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeoLaunchConfig {
    /// Minimum evidence before ACHIEVED may fire.
    pub min_impressions_for_rank: u64,
    pub min_clicks_for_rank: u64,

    /// Base give-up gates for BIG-tier keywords.
    pub big_min_days: u32,
    pub big_min_clicks: u64,
    pub big_rank_threshold: u32,

    /// Base give-up gates for MIDDLE/BRAND-tier keywords.
    pub mid_min_days: u32,
    pub mid_min_clicks: u64,
    pub mid_rank_threshold: u32,

    /// Cost gate: give-up needs spend at or beyond target CPA x this.
    pub cost_multiplier: f64,

    /// Performance-failure path gates.
    pub max_cvr: f64,
    pub max_acos: f64,

    /// Volume bucket cutoffs relative to the ASIN's median core volume.
    pub volume_high_ratio: f64,
    pub volume_low_ratio: f64,

    /// Bucket multipliers applied to day/click bases.
    pub bucket_mult_high: f64,
    pub bucket_mult_mid: f64,
    pub bucket_mult_low: f64,

    /// Rank-threshold shift for HIGH (+) and LOW (-) buckets.
    pub rank_threshold_shift: u32,
}

impl Default for SeoLaunchConfig {
    fn default() -> Self {
        Self {
            min_impressions_for_rank: 1000,
            min_clicks_for_rank: 30,

            big_min_days: 45,
            big_min_clicks: 120,
            big_rank_threshold: 20,

            mid_min_days: 30,
            mid_min_clicks: 60,
            mid_rank_threshold: 15,

            cost_multiplier: 5.0,

            max_cvr: 0.01,
            max_acos: 1.0,

            volume_high_ratio: 2.0,
            volume_low_ratio: 0.5,

            bucket_mult_high: 1.3,
            bucket_mult_mid: 1.0,
            bucket_mult_low: 0.7,

            rank_threshold_shift: 5,
        }
    }
}

/// Launch-exit decider thresholds (C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchExitConfig {
    /// C-axis: emergency when the stage loss ratio exceeds this.
    pub emergency_loss_ratio_threshold: f64,
    /// C-axis: emergency when invest-window usage reaches this.
    pub launch_invest_critical_threshold: f64,

    /// A-axis: SEO completion required for a normal exit.
    pub min_core_completion_ratio: f64,
    /// Early exit: partial completion accepted while in the WARNING zone.
    pub seo_completion_warning_threshold: f64,

    /// B-axis trial conditions (any one suffices).
    pub min_launch_days: u32,
    pub min_asin_clicks_total: u64,
    pub min_asin_orders_total: u64,

    /// Volume scaling of the click/order thresholds.
    pub ref_daily_sales: f64,
    pub min_volume_scale: f64,
    pub max_volume_scale: f64,
}

impl Default for LaunchExitConfig {
    fn default() -> Self {
        Self {
            emergency_loss_ratio_threshold: 1.2,
            launch_invest_critical_threshold: 1.0,

            min_core_completion_ratio: 0.7,
            seo_completion_warning_threshold: 0.5,

            min_launch_days: 60,
            min_asin_clicks_total: 2000,
            min_asin_orders_total: 60,

            ref_daily_sales: 3.0,
            min_volume_scale: 0.5,
            max_volume_scale: 2.0,
        }
    }
}

/// Global safety overrides (C8 step 1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Consecutive months, each beyond the monthly loss cap, forcing HARVEST.
    pub consecutive_loss_months: u32,
    /// Cumulative net loss forcing HARVEST, positive JPY.
    pub global_cumulative_loss_limit_jpy: i64,
    /// Review-quality floor; only enforced once enough reviews exist.
    pub min_review_rating: f64,
    pub min_review_count: u32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            consecutive_loss_months: 3,
            global_cumulative_loss_limit_jpy: 500_000,
            min_review_rating: 3.5,
            min_review_count: 30,
        }
    }
}

/// Investment-window extension rules (C8 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Realized monthly loss must stay within this fraction of the cap.
    pub loss_tolerance_ratio: f64,
    /// Hard cap on dynamically granted months.
    pub max_dynamic_months: u32,
}

impl Default for ExtensionConfig {
    fn default() -> Self {
        Self {
            loss_tolerance_ratio: 0.8,
            max_dynamic_months: 3,
        }
    }
}

/// State-machine calibration (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub safety: SafetyConfig,
    pub extension: ExtensionConfig,

    /// SEO score cut-offs for HIGH / LOW levels.
    pub seo_high_score: f64,
    pub seo_low_score: f64,

    /// Stage-transition TACOS bands as multiples of sustainable TACOS.
    pub hard_grow_tacos_band_ratio: f64,
    pub soft_grow_tacos_band_ratio: f64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            safety: SafetyConfig::default(),
            extension: ExtensionConfig::default(),
            seo_high_score: 70.0,
            seo_low_score: 40.0,
            hard_grow_tacos_band_ratio: 1.2,
            soft_grow_tacos_band_ratio: 1.3,
        }
    }
}

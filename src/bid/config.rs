//! Bid engine calibration.
//!
//! Every threshold and table entry in this struct is a calibrated constant
//! (tuned offline). Engines receive the struct explicitly; the default value
//! is the production calibration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidEngineConfig {
    // -- classifier ---------------------------------------------------------
    /// Below this many recent clicks the classifier refuses to move.
    pub min_clicks_for_decision: u64,
    /// Above this many clicks the stats coefficient stops damping.
    pub min_clicks_for_confident: u64,
    /// Above this many clicks the stats coefficient rewards volume.
    pub min_clicks_for_tos: u64,

    /// ACOS-ratio breakpoints in invest mode: strong_up / mild_up / keep /
    /// mild_down; beyond the last one it is STRONG_DOWN.
    pub invest_ratio_strong_up: f64,
    pub invest_ratio_mild_up: f64,
    pub invest_ratio_keep: f64,
    pub invest_ratio_mild_down: f64,

    /// ACOS-ratio breakpoints in normal mode; beyond `normal_ratio_stop`
    /// the classifier emits STOP.
    pub normal_ratio_strong_up: f64,
    pub normal_ratio_mild_up: f64,
    pub normal_ratio_keep: f64,
    pub normal_ratio_mild_down: f64,
    pub normal_ratio_stop: f64,

    // -- coefficient tables -------------------------------------------------
    /// CVR delta breakpoints (relative change vs baseline).
    pub cvr_delta_small: f64,
    pub cvr_delta_medium: f64,
    pub cvr_delta_large: f64,

    /// Rank-gap steps for directional actions.
    pub rank_gap_small: i64,
    pub rank_gap_medium: i64,
    pub rank_gap_large: i64,

    /// Competitor CPC ratio breakpoints.
    pub competitor_ratio_hot: f64,
    pub competitor_ratio_warm: f64,
    pub competitor_ratio_cool: f64,
    pub competitor_strength_gate: f64,

    /// Top-of-search multiplier-product breakpoints (S_MODE only).
    pub tos_product_high: f64,
    pub tos_product_mid: f64,
    pub tos_product_low: f64,

    // -- bid computation ----------------------------------------------------
    /// Base change-rate magnitude per action.
    pub base_rate_strong: f64,
    pub base_rate_mild: f64,

    /// Score-rank scaling: priority keywords move faster.
    pub score_rank_priority_cutoff: u32,
    pub score_rank_tail_cutoff: u32,
    pub score_rank_priority_mult: f64,
    pub score_rank_tail_mult: f64,

    /// Global clip bounds on the composed change rate. The decrease bound
    /// is negative.
    pub max_bid_increase_rate: f64,
    pub max_bid_decrease_rate: f64,

    /// Floor for any recommended bid, integer JPY.
    pub min_bid_jpy: i64,
}

impl Default for BidEngineConfig {
    fn default() -> Self {
        Self {
            min_clicks_for_decision: 10,
            min_clicks_for_confident: 30,
            min_clicks_for_tos: 100,

            invest_ratio_strong_up: 0.7,
            invest_ratio_mild_up: 0.9,
            invest_ratio_keep: 1.1,
            invest_ratio_mild_down: 1.3,

            normal_ratio_strong_up: 0.5,
            normal_ratio_mild_up: 0.8,
            normal_ratio_keep: 1.2,
            normal_ratio_mild_down: 1.5,
            normal_ratio_stop: 2.0,

            cvr_delta_small: 0.10,
            cvr_delta_medium: 0.30,
            cvr_delta_large: 0.40,

            rank_gap_small: 1,
            rank_gap_medium: 5,
            rank_gap_large: 10,

            competitor_ratio_hot: 1.2,
            competitor_ratio_warm: 1.1,
            competitor_ratio_cool: 0.9,
            competitor_strength_gate: 0.6,

            tos_product_high: 2.0,
            tos_product_mid: 1.5,
            tos_product_low: 1.2,

            base_rate_strong: 0.15,
            base_rate_mild: 0.07,

            score_rank_priority_cutoff: 10,
            score_rank_tail_cutoff: 50,
            score_rank_priority_mult: 1.2,
            score_rank_tail_mult: 0.8,

            max_bid_increase_rate: 0.30,
            max_bid_decrease_rate: -0.25,

            min_bid_jpy: 10,
        }
    }
}

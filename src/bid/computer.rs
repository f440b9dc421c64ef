//! Bid computation.
//!
//! Composes base rate x coefficient product into a change rate, clips it
//! against the global bounds and the guardrail down-step, and rounds the new
//! bid to integer JPY with the min-bid floor. Every clip is recorded.

use serde::{Deserialize, Serialize};

use crate::bid::coefficients::CoefficientSet;
use crate::bid::config::BidEngineConfig;
use crate::bid::guardrails::Guardrails;
use crate::models::BidAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClipReason {
    GlobalMaxIncrease,
    GlobalMaxDecrease,
    GuardrailStep,
    MinBid,
}

impl ClipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipReason::GlobalMaxIncrease => "GLOBAL_MAX_INCREASE",
            ClipReason::GlobalMaxDecrease => "GLOBAL_MAX_DECREASE",
            ClipReason::GuardrailStep => "GUARDRAIL_STEP",
            ClipReason::MinBid => "MIN_BID",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BidComputation {
    pub change_rate: f64,
    pub new_bid: i64,
    pub clipped: bool,
    pub clip_reason: Option<ClipReason>,
}

/// Base change-rate magnitude for an action, scaled by score-rank priority.
/// STOP carries no rate of its own; the caller pins the bid to the floor.
pub fn base_rate(cfg: &BidEngineConfig, score_rank: u32, action: BidAction) -> f64 {
    let magnitude = match action {
        BidAction::StrongUp => cfg.base_rate_strong,
        BidAction::MildUp => cfg.base_rate_mild,
        BidAction::Keep => 0.0,
        BidAction::MildDown => -cfg.base_rate_mild,
        BidAction::StrongDown | BidAction::Stop => -cfg.base_rate_strong,
    };

    let scale = if score_rank <= cfg.score_rank_priority_cutoff {
        cfg.score_rank_priority_mult
    } else if score_rank <= cfg.score_rank_tail_cutoff {
        1.0
    } else {
        cfg.score_rank_tail_mult
    };

    magnitude * scale
}

pub fn compute(
    cfg: &BidEngineConfig,
    guardrails: &Guardrails,
    current_bid: i64,
    score_rank: u32,
    action: BidAction,
    coefficients: &CoefficientSet,
) -> BidComputation {
    // STOP recommends the floor bid directly; the pause itself is carried
    // by the action, not the number.
    if action == BidAction::Stop {
        let new_bid = cfg.min_bid_jpy;
        let change_rate = if current_bid > 0 {
            new_bid as f64 / current_bid as f64 - 1.0
        } else {
            0.0
        };
        return BidComputation {
            change_rate,
            new_bid,
            clipped: false,
            clip_reason: None,
        };
    }

    let raw = base_rate(cfg, score_rank, action) * coefficients.product();

    let mut rate = raw;
    let mut clip_reason = None;

    if rate > cfg.max_bid_increase_rate {
        rate = cfg.max_bid_increase_rate;
        clip_reason = Some(ClipReason::GlobalMaxIncrease);
    }
    if rate < cfg.max_bid_decrease_rate {
        rate = cfg.max_bid_decrease_rate;
        clip_reason = Some(ClipReason::GlobalMaxDecrease);
    }
    if rate < 0.0 && -rate > guardrails.max_down_step_ratio {
        rate = -guardrails.max_down_step_ratio;
        clip_reason = Some(ClipReason::GuardrailStep);
    }

    let target = (current_bid as f64 * (1.0 + rate)).round() as i64;
    let new_bid = if target < cfg.min_bid_jpy {
        clip_reason = Some(ClipReason::MinBid);
        cfg.min_bid_jpy
    } else {
        target
    };

    BidComputation {
        change_rate: rate,
        new_bid,
        clipped: clip_reason.is_some(),
        clip_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> BidEngineConfig {
        BidEngineConfig::default()
    }

    fn neutral() -> CoefficientSet {
        CoefficientSet {
            phase: 1.0,
            cvr: 1.0,
            rank_gap: 1.0,
            competitor: 1.0,
            brand: 1.0,
            stats: 1.0,
            tos: 1.0,
        }
    }

    #[test]
    fn keep_leaves_bid_unchanged() {
        let out = compute(&cfg(), &Guardrails::default(), 80, 20, BidAction::Keep, &neutral());
        assert_eq!(out.change_rate, 0.0);
        assert_eq!(out.new_bid, 80);
        assert!(!out.clipped);
    }

    #[test]
    fn strong_up_applies_base_rate() {
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            100,
            20,
            BidAction::StrongUp,
            &neutral(),
        );
        assert!((out.change_rate - 0.15).abs() < 1e-9);
        assert_eq!(out.new_bid, 115);
    }

    #[test]
    fn priority_rank_scales_the_step() {
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            100,
            5,
            BidAction::StrongUp,
            &neutral(),
        );
        assert!((out.change_rate - 0.18).abs() < 1e-9);
    }

    #[test]
    fn global_increase_clip_is_recorded() {
        let mut boosted = neutral();
        boosted.phase = 1.8;
        boosted.cvr = 1.5;
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            100,
            5,
            BidAction::StrongUp,
            &boosted,
        );
        assert!((out.change_rate - cfg().max_bid_increase_rate).abs() < 1e-9);
        assert!(out.clipped);
        assert_eq!(out.clip_reason, Some(ClipReason::GlobalMaxIncrease));
    }

    #[test]
    fn guardrail_step_clips_down_moves() {
        let mut g = Guardrails::default();
        g.max_down_step_ratio = 0.05;
        let out = compute(&cfg(), &g, 100, 20, BidAction::StrongDown, &neutral());
        assert!((out.change_rate + 0.05).abs() < 1e-9);
        assert_eq!(out.clip_reason, Some(ClipReason::GuardrailStep));
        assert_eq!(out.new_bid, 95);
    }

    #[test]
    fn min_bid_floor_holds() {
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            11,
            20,
            BidAction::StrongDown,
            &neutral(),
        );
        assert_eq!(out.new_bid, cfg().min_bid_jpy);
        assert_eq!(out.clip_reason, Some(ClipReason::MinBid));
    }

    #[test]
    fn stop_pins_to_floor() {
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            100,
            20,
            BidAction::Stop,
            &neutral(),
        );
        assert_eq!(out.new_bid, cfg().min_bid_jpy);
        assert!(out.change_rate < 0.0);
    }

    #[test]
    fn zero_phase_coefficient_freezes_rate() {
        let mut frozen = neutral();
        frozen.phase = 0.0;
        let out = compute(
            &cfg(),
            &Guardrails::default(),
            100,
            20,
            BidAction::StrongUp,
            &frozen,
        );
        assert_eq!(out.change_rate, 0.0);
        assert_eq!(out.new_bid, 100);
    }
}

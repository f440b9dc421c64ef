//! Coefficient calculator.
//!
//! Seven multiplicative coefficients, each centered at 1.0, composed into
//! the final change rate. Tables are the calibration of the engine; the
//! breakpoints live in `BidEngineConfig`.

use serde::{Deserialize, Serialize};

use crate::bid::config::BidEngineConfig;
use crate::models::{BidAction, BrandType, EngineMode, KeywordMetrics, PhaseTag};

/// The seven coefficients, named so they can be serialized into the reason
/// detail of a recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientSet {
    pub phase: f64,
    pub cvr: f64,
    pub rank_gap: f64,
    pub competitor: f64,
    pub brand: f64,
    pub stats: f64,
    pub tos: f64,
}

impl CoefficientSet {
    pub fn product(&self) -> f64 {
        self.phase * self.cvr * self.rank_gap * self.competitor * self.brand * self.stats * self.tos
    }
}

pub fn calculate(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    action: BidAction,
    mode: EngineMode,
) -> CoefficientSet {
    CoefficientSet {
        phase: phase_coefficient(metrics.phase, mode),
        cvr: cvr_coefficient(cfg, metrics, action, mode),
        rank_gap: rank_gap_coefficient(cfg, metrics, action),
        competitor: competitor_coefficient(cfg, metrics, action),
        brand: brand_coefficient(metrics.brand_type, action),
        stats: stats_coefficient(cfg, metrics.clicks_7d),
        tos: tos_coefficient(cfg, metrics, action, mode),
    }
}

/// NORMAL mode ignores the sale-phase table entirely.
fn phase_coefficient(phase: PhaseTag, mode: EngineMode) -> f64 {
    if mode == EngineMode::Normal {
        return 1.0;
    }
    match phase {
        PhaseTag::Normal => 1.0,
        PhaseTag::SPre1 => 1.2,
        PhaseTag::SPre2 => 1.5,
        PhaseTag::SFreeze => 0.0,
        PhaseTag::SNormal => 1.3,
        PhaseTag::SFinal => 1.8,
        PhaseTag::SRevert => 0.8,
    }
}

fn cvr_coefficient(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    action: BidAction,
    mode: EngineMode,
) -> f64 {
    if metrics.cvr_baseline <= 0.0 {
        return 1.0;
    }
    let delta = (metrics.cvr_recent - metrics.cvr_baseline) / metrics.cvr_baseline;

    if mode == EngineMode::SMode {
        // Steeper curve, and only when the CVR signal agrees with the
        // action direction; a disagreeing signal is noise during events.
        if action.is_up() && delta > 0.0 {
            return if delta >= cfg.cvr_delta_large {
                1.5
            } else if delta >= cfg.cvr_delta_medium {
                1.35
            } else if delta >= cfg.cvr_delta_small {
                1.15
            } else {
                1.0
            };
        }
        if action.is_down() && delta < 0.0 {
            return if delta <= -cfg.cvr_delta_large {
                0.5
            } else if delta <= -cfg.cvr_delta_medium {
                0.65
            } else if delta <= -cfg.cvr_delta_small {
                0.85
            } else {
                1.0
            };
        }
        return 1.0;
    }

    if delta >= cfg.cvr_delta_large {
        1.3
    } else if delta >= cfg.cvr_delta_medium {
        1.2
    } else if delta >= cfg.cvr_delta_small {
        1.1
    } else if delta <= -cfg.cvr_delta_large {
        0.7
    } else if delta <= -cfg.cvr_delta_medium {
        0.8
    } else if delta <= -cfg.cvr_delta_small {
        0.9
    } else {
        1.0
    }
}

/// Organic-rank distance from target. Only directional actions react to it;
/// an out-of-range rank counts as the largest gap for UP actions.
fn rank_gap_coefficient(cfg: &BidEngineConfig, metrics: &KeywordMetrics, action: BidAction) -> f64 {
    if !action.is_directional() {
        return 1.0;
    }

    let target = metrics.organic_rank_target as i64;
    let gap = match metrics.organic_rank {
        Some(rank) => rank as i64 - target,
        None => i64::MAX,
    };

    if action.is_up() && gap >= cfg.rank_gap_small {
        return if gap >= cfg.rank_gap_large {
            1.3
        } else if gap >= cfg.rank_gap_medium {
            1.2
        } else {
            1.1
        };
    }

    if action.is_down() && gap != i64::MAX && -gap >= cfg.rank_gap_small {
        let lead = -gap;
        return if lead >= cfg.rank_gap_large {
            0.7
        } else if lead >= cfg.rank_gap_medium {
            0.8
        } else {
            0.9
        };
    }

    1.0
}

/// Competitive pressure. Accelerates UP when the competitor CPC is rising
/// and competitor strength clears the gate; eases DOWN when pressure fades.
fn competitor_coefficient(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    action: BidAction,
) -> f64 {
    if metrics.competitor_cpc_baseline <= 0.0 {
        return 1.0;
    }
    let ratio = metrics.competitor_cpc / metrics.competitor_cpc_baseline;

    if action.is_up() {
        if ratio >= cfg.competitor_ratio_hot
            && metrics.competitor_strength >= cfg.competitor_strength_gate
        {
            return 1.2;
        }
        if ratio >= cfg.competitor_ratio_warm {
            return 1.1;
        }
        return 1.0;
    }

    if action.is_down() && ratio <= cfg.competitor_ratio_cool {
        return 0.9;
    }

    1.0
}

fn brand_coefficient(brand: BrandType, action: BidAction) -> f64 {
    match brand {
        BrandType::Brand => {
            if action.is_up() {
                1.2
            } else if action.is_down() {
                0.8
            } else {
                1.0
            }
        }
        BrandType::Conquest => {
            if action == BidAction::StrongUp {
                0.9
            } else {
                1.0
            }
        }
        BrandType::Generic => 1.0,
    }
}

/// Statistical confidence damping by recent click volume.
fn stats_coefficient(cfg: &BidEngineConfig, clicks: u64) -> f64 {
    if clicks < cfg.min_clicks_for_decision {
        0.5
    } else if clicks < cfg.min_clicks_for_confident {
        0.8
    } else if clicks < cfg.min_clicks_for_tos {
        1.0
    } else {
        1.1
    }
}

/// Top-of-search boost, live only during sale events for TOS-targeted
/// keywords moving up.
fn tos_coefficient(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    action: BidAction,
    mode: EngineMode,
) -> f64 {
    if mode != EngineMode::SMode || !metrics.tos_targeted || !action.is_up() {
        return 1.0;
    }
    let product = metrics.tos_ctr_mult * metrics.tos_cvr_mult;
    if product >= cfg.tos_product_high {
        1.8
    } else if product >= cfg.tos_product_mid {
        1.5
    } else if product >= cfg.tos_product_low {
        1.3
    } else {
        1.2
    }
}

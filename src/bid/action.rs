//! Action classifier.
//!
//! Maps (ACOS ratio, clicks, phase, brand, invest flag, mode) to one of the
//! six bid actions. Two post-hoc overrides run after the threshold ladder:
//! BRAND_OWN keywords never see STRONG_DOWN or STOP, and the S_FREEZE phase
//! pins everything to KEEP.

use crate::bid::config::BidEngineConfig;
use crate::models::{BidAction, BidReasonCode, KeywordMetrics, KeywordRole, PhaseTag};

/// Classifier verdict with the reason that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedAction {
    pub action: BidAction,
    pub reason_code: BidReasonCode,
}

pub fn classify(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    invest_mode: bool,
) -> ClassifiedAction {
    let raw = classify_by_ratio(cfg, metrics, invest_mode);
    apply_overrides(metrics, raw)
}

fn classify_by_ratio(
    cfg: &BidEngineConfig,
    metrics: &KeywordMetrics,
    invest_mode: bool,
) -> ClassifiedAction {
    let clicks = metrics.clicks_7d;

    // Data starvation: do not move on noise. Invest mode probes upward
    // instead of waiting.
    if clicks < cfg.min_clicks_for_decision {
        let action = if invest_mode {
            BidAction::MildUp
        } else {
            BidAction::Keep
        };
        return ClassifiedAction {
            action,
            reason_code: BidReasonCode::InsufficientClicks,
        };
    }

    let r = metrics.acos_ratio();

    if invest_mode {
        let (action, reason_code) = if r < cfg.invest_ratio_strong_up {
            (BidAction::StrongUp, BidReasonCode::AcosWellBelowTarget)
        } else if r < cfg.invest_ratio_mild_up {
            (BidAction::MildUp, BidReasonCode::AcosBelowTarget)
        } else if r < cfg.invest_ratio_keep {
            (BidAction::Keep, BidReasonCode::AcosOnTarget)
        } else if r < cfg.invest_ratio_mild_down {
            (BidAction::MildDown, BidReasonCode::AcosAboveTarget)
        } else {
            (BidAction::StrongDown, BidReasonCode::AcosWellAboveTarget)
        };
        return ClassifiedAction { action, reason_code };
    }

    let (action, reason_code) = if r < cfg.normal_ratio_strong_up {
        (BidAction::StrongUp, BidReasonCode::AcosWellBelowTarget)
    } else if r < cfg.normal_ratio_mild_up {
        (BidAction::MildUp, BidReasonCode::AcosBelowTarget)
    } else if r < cfg.normal_ratio_keep {
        (BidAction::Keep, BidReasonCode::AcosOnTarget)
    } else if r < cfg.normal_ratio_mild_down {
        (BidAction::MildDown, BidReasonCode::AcosAboveTarget)
    } else if r < cfg.normal_ratio_stop {
        (BidAction::StrongDown, BidReasonCode::AcosWellAboveTarget)
    } else {
        (BidAction::Stop, BidReasonCode::AcosCritical)
    };
    ClassifiedAction { action, reason_code }
}

fn apply_overrides(metrics: &KeywordMetrics, classified: ClassifiedAction) -> ClassifiedAction {
    let mut out = classified;

    if metrics.role == KeywordRole::BrandOwn
        && matches!(out.action, BidAction::StrongDown | BidAction::Stop)
    {
        out = ClassifiedAction {
            action: BidAction::MildDown,
            reason_code: BidReasonCode::BrandOwnProtected,
        };
    }

    if metrics.phase == PhaseTag::SFreeze {
        out = ClassifiedAction {
            action: BidAction::Keep,
            reason_code: BidReasonCode::FreezePhase,
        };
    }

    out
}

//! Lifecycle state machine.
//!
//! Evaluation order per product: global safety overrides, investment-window
//! extension (launch stages only), the per-stage transition table, and
//! finally the launch-exit override when a decision from the SEO launch
//! evaluator is present. HARVEST is sticky; there is no automatic return.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::lifecycle::config::LifecycleConfig;
use crate::lifecycle::types::LaunchExitDecision;
use crate::models::{LifecycleStage, MonthlyProfit, ProductStrategy, SeoScore, SeoTrend};

/// Outcome of the extension evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionDecision {
    pub extend: bool,
    /// Total dynamic months after this evaluation.
    pub extension_months: u32,
    pub reason: String,
}

/// Per-product verdict of one state-machine evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleDecision {
    pub asin: String,
    pub current_stage: LifecycleStage,
    pub recommended_stage: LifecycleStage,
    pub should_transition: bool,
    pub reason: String,
    pub force_harvest: bool,
    pub is_emergency_exit: bool,
    pub extension: Option<ExtensionDecision>,
    pub warnings: Vec<String>,
}

/// Inputs for one product. `profits` is sorted ascending by month; the last
/// element is the most recent closed month.
#[derive(Debug, Clone)]
pub struct LifecycleInput<'a> {
    pub strategy: &'a ProductStrategy,
    pub profits: &'a [MonthlyProfit],
    pub seo: Option<&'a SeoScore>,
    pub launch_exit: Option<&'a LaunchExitDecision>,
}

pub fn evaluate(cfg: &LifecycleConfig, input: &LifecycleInput<'_>) -> LifecycleDecision {
    let strategy = input.strategy;
    let current = strategy.stage;
    let mut warnings = Vec::new();

    // 1. Global safety: any hit forces HARVEST regardless of stage rules.
    if let Some(reason) = safety_override(cfg, input, &mut warnings) {
        warn!(asin = %strategy.asin, %reason, "safety override to HARVEST");
        return LifecycleDecision {
            asin: strategy.asin.clone(),
            current_stage: current,
            recommended_stage: LifecycleStage::Harvest,
            should_transition: current != LifecycleStage::Harvest,
            reason,
            force_harvest: true,
            is_emergency_exit: false,
            extension: None,
            warnings,
        };
    }

    // 2. Investment-window extension, launch stages only.
    let extension = if current.is_launch() {
        Some(extension_decision(cfg, input))
    } else {
        None
    };

    // 3. Per-stage transition table.
    let (mut recommended, mut reason) = stage_rule(cfg, input, extension.as_ref(), &mut warnings);
    let mut is_emergency_exit = false;

    // 4. Launch-exit override: the dedicated decider outranks the table
    //    while the product is still launching.
    if current.is_launch() {
        if let Some(exit) = input.launch_exit {
            if exit.should_exit {
                recommended = exit.target_stage;
                reason = format!("launch exit: {}", exit.reason_code.as_str());
                is_emergency_exit = exit.is_emergency;
            }
        }
    }

    debug!(
        asin = %strategy.asin,
        from = current.as_str(),
        to = recommended.as_str(),
        "lifecycle evaluated"
    );

    LifecycleDecision {
        asin: strategy.asin.clone(),
        current_stage: current,
        recommended_stage: recommended,
        should_transition: recommended != current,
        reason,
        force_harvest: false,
        is_emergency_exit,
        extension,
        warnings,
    }
}

fn latest<'a>(profits: &'a [MonthlyProfit]) -> Option<&'a MonthlyProfit> {
    profits.last()
}

fn safety_override(
    cfg: &LifecycleConfig,
    input: &LifecycleInput<'_>,
    warnings: &mut Vec<String>,
) -> Option<String> {
    let strategy = input.strategy;
    let safety = &cfg.safety;

    // Consecutive months each losing beyond the monthly cap.
    let needed = safety.consecutive_loss_months as usize;
    if needed > 0 && input.profits.len() >= needed {
        let tail = &input.profits[input.profits.len() - needed..];
        let all_exceeded = tail
            .iter()
            .all(|p| p.net_profit_jpy < -strategy.invest_max_loss_per_month_jpy);
        if all_exceeded {
            return Some(format!(
                "{} consecutive months beyond the monthly loss cap",
                needed
            ));
        }
    }

    if let Some(p) = latest(input.profits) {
        if p.net_profit_cumulative_jpy < -safety.global_cumulative_loss_limit_jpy {
            return Some(format!(
                "cumulative loss {} beyond limit {}",
                p.net_profit_cumulative_jpy, safety.global_cumulative_loss_limit_jpy
            ));
        }
    }

    if strategy.review_rating < safety.min_review_rating
        && strategy.review_count >= safety.min_review_count
    {
        return Some(format!(
            "review rating {:.1} below {:.1} with {} reviews",
            strategy.review_rating, safety.min_review_rating, strategy.review_count
        ));
    }

    if strategy.review_rating < safety.min_review_rating {
        warnings.push(format!(
            "review rating {:.1} low but only {} reviews",
            strategy.review_rating, strategy.review_count
        ));
    }

    None
}

/// All three must hold to extend by one month, capped at the dynamic
/// maximum: SEO not degrading, realized loss within tolerance, monthly
/// TACOS within the invest cap.
fn extension_decision(cfg: &LifecycleConfig, input: &LifecycleInput<'_>) -> ExtensionDecision {
    let strategy = input.strategy;
    let ext = &cfg.extension;
    let granted = strategy.invest_window_extension_months;

    if granted >= ext.max_dynamic_months {
        return ExtensionDecision {
            extend: false,
            extension_months: granted,
            reason: format!("dynamic extension capped at {}", ext.max_dynamic_months),
        };
    }

    let seo_ok = input
        .seo
        .map(|s| matches!(s.trend, SeoTrend::Up | SeoTrend::Flat))
        .unwrap_or(false);

    let (loss_ok, tacos_ok) = match latest(input.profits) {
        Some(p) => {
            let tolerated =
                (strategy.invest_max_loss_per_month_jpy as f64 * ext.loss_tolerance_ratio) as i64;
            (
                p.net_profit_jpy >= -tolerated,
                p.tacos <= strategy.invest_tacos_cap,
            )
        }
        None => (false, false),
    };

    if seo_ok && loss_ok && tacos_ok {
        ExtensionDecision {
            extend: true,
            extension_months: granted + 1,
            reason: "seo holding, loss within tolerance, tacos within cap".to_string(),
        }
    } else {
        ExtensionDecision {
            extend: false,
            extension_months: granted,
            reason: format!(
                "extension denied: seo_ok={seo_ok} loss_ok={loss_ok} tacos_ok={tacos_ok}"
            ),
        }
    }
}

fn seo_level(cfg: &LifecycleConfig, seo: Option<&SeoScore>) -> SeoLevel {
    match seo {
        Some(s) if s.overall >= cfg.seo_high_score => SeoLevel::High,
        Some(s) if s.overall < cfg.seo_low_score => SeoLevel::Low,
        Some(_) => SeoLevel::Mid,
        None => SeoLevel::Unknown,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeoLevel {
    High,
    Mid,
    Low,
    Unknown,
}

fn stage_rule(
    cfg: &LifecycleConfig,
    input: &LifecycleInput<'_>,
    extension: Option<&ExtensionDecision>,
    warnings: &mut Vec<String>,
) -> (LifecycleStage, String) {
    let strategy = input.strategy;
    let level = seo_level(cfg, input.seo);
    let trend = input.seo.map(|s| s.trend).unwrap_or(SeoTrend::Unknown);
    let profit = latest(input.profits);

    // Window including any extension granted in this evaluation.
    let window = strategy.invest_window_months
        + extension
            .map(|e| e.extension_months)
            .unwrap_or(strategy.invest_window_extension_months);

    match strategy.stage {
        LifecycleStage::LaunchHard => {
            let tacos_exceeded = profit
                .map(|p| p.tacos > strategy.invest_tacos_cap)
                .unwrap_or(false);
            let loss_exceeded = profit
                .map(|p| p.net_profit_jpy < -strategy.invest_max_loss_per_month_jpy)
                .unwrap_or(false);
            let seo_stalled = trend == SeoTrend::Down || level == SeoLevel::Low;

            let months = profit.map(|p| p.months_since_launch).unwrap_or(0);
            let profit_ok = profit.map(|p| p.net_profit_jpy >= 0).unwrap_or(false);
            let tacos_in_band = profit
                .map(|p| p.tacos <= strategy.sustainable_tacos * cfg.hard_grow_tacos_band_ratio)
                .unwrap_or(false);

            if months > window && level == SeoLevel::High && tacos_in_band && profit_ok {
                return (
                    LifecycleStage::Grow,
                    "window done with high seo, tacos in band and breakeven".to_string(),
                );
            }
            if tacos_exceeded || loss_exceeded || seo_stalled {
                let mut causes = Vec::new();
                if tacos_exceeded {
                    causes.push("tacos above invest cap");
                }
                if loss_exceeded {
                    causes.push("monthly loss above cap");
                }
                if seo_stalled {
                    causes.push("seo stalled");
                }
                return (
                    LifecycleStage::LaunchSoft,
                    format!("moderating launch: {}", causes.join(", ")),
                );
            }
            (LifecycleStage::LaunchHard, "continuing hard launch".to_string())
        }

        LifecycleStage::LaunchSoft => {
            let months = profit.map(|p| p.months_since_launch).unwrap_or(0);
            let breakeven = profit.map(|p| p.net_profit_jpy >= 0).unwrap_or(false);
            let tacos_in_band = profit
                .map(|p| p.tacos <= strategy.sustainable_tacos * cfg.soft_grow_tacos_band_ratio)
                .unwrap_or(false);
            let cumulative_loss = profit
                .map(|p| p.net_profit_cumulative_jpy < 0)
                .unwrap_or(false);

            if level == SeoLevel::High && breakeven && tacos_in_band {
                return (
                    LifecycleStage::Grow,
                    "high seo with breakeven and tacos in band".to_string(),
                );
            }
            if months > window && level == SeoLevel::Low && cumulative_loss {
                return (
                    LifecycleStage::Harvest,
                    "window exceeded with low seo and cumulative loss".to_string(),
                );
            }
            (LifecycleStage::LaunchSoft, "continuing soft launch".to_string())
        }

        LifecycleStage::Grow => {
            let stable_trend = matches!(trend, SeoTrend::Up | SeoTrend::Flat);
            let profit_ok = profit.map(|p| p.net_profit_jpy >= 0).unwrap_or(false);
            let tacos_sustainable = profit
                .map(|p| p.tacos <= strategy.sustainable_tacos)
                .unwrap_or(false);
            let cumulative_positive = profit
                .map(|p| p.net_profit_cumulative_jpy > 0)
                .unwrap_or(false);

            if level == SeoLevel::High && stable_trend && tacos_sustainable && profit_ok {
                return (
                    LifecycleStage::Harvest,
                    "position secured: high stable seo at sustainable tacos".to_string(),
                );
            }
            if level == SeoLevel::Low && strategy.reinvest_allowed && cumulative_positive {
                return (
                    LifecycleStage::LaunchSoft,
                    "seo slipping, reinvesting from accumulated profit".to_string(),
                );
            }
            if level == SeoLevel::Low && !strategy.reinvest_allowed {
                warnings.push("seo low but reinvestment not allowed".to_string());
            }
            (LifecycleStage::Grow, "holding grow".to_string())
        }

        // No automatic return from HARVEST.
        LifecycleStage::Harvest => (LifecycleStage::Harvest, "harvest is sticky".to_string()),
    }
}

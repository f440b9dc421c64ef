//! Launch-exit decider.
//!
//! Two-priority decision tree for products still in a LAUNCH_* stage:
//! emergency exit on the loss-budget axis first, then the normal
//! SEO-completion + trial-evidence exit, then the early WARNING-zone exit.
//! Click and order thresholds scale with the product's sales velocity; the
//! time threshold and completion ratio never scale.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::lifecycle::config::LaunchExitConfig;
use crate::lifecycle::types::{EffectiveThresholds, LaunchExitDecision, LaunchExitReasonCode};
use crate::models::{AsinSeoLaunchProgress, InvestmentState, LifecycleStage, LossBudgetSummary};

/// Per-product trial evidence gathered over the launch window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchTrialMetrics {
    pub days_since_launch: u32,
    pub asin_clicks_total: u64,
    pub asin_orders_total: u64,
    pub avg_daily_sales_30d: f64,
}

pub fn decide(
    cfg: &LaunchExitConfig,
    progress: &AsinSeoLaunchProgress,
    loss_budget: &LossBudgetSummary,
    trial: &LaunchTrialMetrics,
) -> LaunchExitDecision {
    let thresholds = effective_thresholds(cfg, trial);

    // 1. Emergency exit: the loss budget overrides everything else.
    if let Some(reason) = emergency_reason(cfg, loss_budget) {
        info!(asin = %progress.asin, reason = reason.as_str(), "emergency launch exit");
        return LaunchExitDecision {
            asin: progress.asin.clone(),
            should_exit: true,
            is_emergency: true,
            reason_code: reason,
            target_stage: LifecycleStage::Grow,
            detail: format!(
                "loss budget state={:?} stage_ratio={:.2} invest_usage={:.2}",
                loss_budget.investment_state,
                loss_budget.launch_cumulative_ratio,
                loss_budget.launch_invest_usage_ratio
            ),
            effective_thresholds: thresholds,
        };
    }

    // 2. Normal exit: SEO settled plus at least one trial condition.
    let trial_met = trial.days_since_launch >= thresholds.min_launch_days
        || trial.asin_clicks_total >= thresholds.min_asin_clicks_total
        || trial.asin_orders_total >= thresholds.min_asin_orders_total;

    if progress.completion_ratio >= thresholds.min_core_completion_ratio && trial_met {
        return LaunchExitDecision {
            asin: progress.asin.clone(),
            should_exit: true,
            is_emergency: false,
            reason_code: LaunchExitReasonCode::SeoCompleted,
            target_stage: LifecycleStage::Grow,
            detail: format!(
                "completion={:.2} days={} clicks={} orders={}",
                progress.completion_ratio,
                trial.days_since_launch,
                trial.asin_clicks_total,
                trial.asin_orders_total
            ),
            effective_thresholds: thresholds,
        };
    }

    // 3. Early exit: WARNING zone plus partial SEO completion.
    if loss_budget.investment_state == InvestmentState::Warning
        && progress.completion_ratio >= cfg.seo_completion_warning_threshold
    {
        return LaunchExitDecision {
            asin: progress.asin.clone(),
            should_exit: true,
            is_emergency: false,
            reason_code: LaunchExitReasonCode::EarlyWarningExit,
            target_stage: LifecycleStage::Grow,
            detail: format!(
                "warning zone, completion={:.2} >= {:.2}",
                progress.completion_ratio, cfg.seo_completion_warning_threshold
            ),
            effective_thresholds: thresholds,
        };
    }

    // 4. Continue investing.
    let reason_code = if loss_budget.investment_state == InvestmentState::Safe {
        LaunchExitReasonCode::LossBudgetOk
    } else {
        LaunchExitReasonCode::Continue
    };
    LaunchExitDecision {
        asin: progress.asin.clone(),
        should_exit: false,
        is_emergency: false,
        reason_code,
        target_stage: LifecycleStage::Grow,
        detail: format!(
            "completion={:.2} trial_met={} loss_state={:?}",
            progress.completion_ratio, trial_met, loss_budget.investment_state
        ),
        effective_thresholds: thresholds,
    }
}

fn emergency_reason(
    cfg: &LaunchExitConfig,
    loss_budget: &LossBudgetSummary,
) -> Option<LaunchExitReasonCode> {
    if loss_budget.investment_state == InvestmentState::Breach {
        return Some(LaunchExitReasonCode::EmergencyLossBudget);
    }
    if loss_budget.launch_cumulative_ratio > cfg.emergency_loss_ratio_threshold {
        return Some(LaunchExitReasonCode::EmergencyLossBudget);
    }
    if loss_budget.launch_invest_usage_ratio >= cfg.launch_invest_critical_threshold {
        return Some(LaunchExitReasonCode::EmergencyLaunchInvest);
    }
    None
}

/// Scale click/order thresholds by sales velocity; days and completion
/// ratio are absolute.
fn effective_thresholds(cfg: &LaunchExitConfig, trial: &LaunchTrialMetrics) -> EffectiveThresholds {
    let volume_scale = if cfg.ref_daily_sales <= 0.0 {
        1.0
    } else {
        (trial.avg_daily_sales_30d / cfg.ref_daily_sales)
            .clamp(cfg.min_volume_scale, cfg.max_volume_scale)
    };

    EffectiveThresholds {
        min_launch_days: cfg.min_launch_days,
        min_asin_clicks_total: (cfg.min_asin_clicks_total as f64 * volume_scale).round() as u64,
        min_asin_orders_total: (cfg.min_asin_orders_total as f64 * volume_scale).round() as u64,
        min_core_completion_ratio: cfg.min_core_completion_ratio,
        volume_scale,
    }
}

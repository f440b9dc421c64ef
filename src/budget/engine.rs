//! Budget decision rules.
//!
//! Per campaign, evaluated in order: data gate, BOOST, CURB, default KEEP.
//! A boost pinned by the budget cap or a curb pinned by the floor downgrades
//! to KEEP with the pin named as the reason.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::models::{
    BudgetAction, BudgetMetrics, BudgetReasonCode, BudgetRecommendation, RecommendationStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Below this many 7d orders the campaign is not judged at all.
    pub min_orders_for_decision: u64,

    /// BOOST triggers: usage percent or lost impression share.
    pub boost_usage_threshold: f64,
    pub boost_lost_is_threshold: f64,
    /// BOOST requires ACOS at or below target x this ratio.
    pub boost_acos_ratio: f64,
    pub boost_percent: f64,
    /// Per-campaign growth cap as a multiple of the current budget.
    pub max_budget_multiplier: f64,
    /// Absolute ceiling across all campaigns, JPY.
    pub global_max_budget_cap_jpy: i64,

    /// CURB triggers.
    pub curb_low_usage_days: u32,
    pub curb_acos_ratio: f64,
    pub curb_percent: f64,
    pub min_budget_jpy: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            min_orders_for_decision: 5,
            boost_usage_threshold: 90.0,
            boost_lost_is_threshold: 10.0,
            boost_acos_ratio: 0.8,
            boost_percent: 20.0,
            max_budget_multiplier: 3.0,
            global_max_budget_cap_jpy: 100_000,
            curb_low_usage_days: 7,
            curb_acos_ratio: 1.2,
            curb_percent: 20.0,
            min_budget_jpy: 100,
        }
    }
}

pub struct BudgetEngine {
    config: BudgetConfig,
}

impl BudgetEngine {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, execution_id: &str, batch: &[BudgetMetrics]) -> Vec<BudgetRecommendation> {
        batch
            .iter()
            .map(|m| self.evaluate(execution_id, m))
            .collect()
    }

    fn evaluate(&self, execution_id: &str, metrics: &BudgetMetrics) -> BudgetRecommendation {
        let cfg = &self.config;
        let current = metrics.daily_budget_jpy;

        if current <= 0 {
            warn!(campaign_id = %metrics.campaign_id, "non-positive budget, keeping");
            return self.record(
                execution_id,
                metrics,
                BudgetAction::Keep,
                BudgetReasonCode::Error,
                current.max(cfg.min_budget_jpy),
                "daily budget not positive".to_string(),
            );
        }

        // 1. Data gate.
        if metrics.orders_7d < cfg.min_orders_for_decision {
            return self.record(
                execution_id,
                metrics,
                BudgetAction::Keep,
                BudgetReasonCode::InsufficientData,
                current,
                format!(
                    "orders_7d={} below {}",
                    metrics.orders_7d, cfg.min_orders_for_decision
                ),
            );
        }

        let acos_ratio = if metrics.target_acos > 0.0 {
            metrics.acos_7d / metrics.target_acos
        } else {
            f64::MAX
        };

        // 2. BOOST: constrained by budget while performing.
        let lost_is_fired = metrics
            .lost_impression_share_budget
            .map(|v| v > cfg.boost_lost_is_threshold)
            .unwrap_or(false);
        let usage_fired = metrics.budget_usage_percent > cfg.boost_usage_threshold;

        if (usage_fired || lost_is_fired) && acos_ratio < cfg.boost_acos_ratio {
            let raw = (current as f64 * (1.0 + cfg.boost_percent / 100.0)).round() as i64;
            let cap = cfg
                .global_max_budget_cap_jpy
                .min((current as f64 * cfg.max_budget_multiplier).round() as i64);
            let new_budget = raw.min(cap);

            if new_budget <= current {
                return self.record(
                    execution_id,
                    metrics,
                    BudgetAction::Keep,
                    BudgetReasonCode::MaxBudgetReached,
                    current,
                    format!("boost pinned at cap {cap}"),
                );
            }

            let reason = if lost_is_fired {
                BudgetReasonCode::HighPerformanceLostIs
            } else {
                BudgetReasonCode::HighPerformanceUsage
            };
            return self.record(
                execution_id,
                metrics,
                BudgetAction::Boost,
                reason,
                new_budget,
                format!(
                    "usage={:.0}% lost_is={:?} acos_ratio={:.2}",
                    metrics.budget_usage_percent, metrics.lost_impression_share_budget, acos_ratio
                ),
            );
        }

        // 3. CURB: sustained low usage with poor efficiency.
        if metrics.low_usage_days >= cfg.curb_low_usage_days && acos_ratio > cfg.curb_acos_ratio {
            let raw = (current as f64 * (1.0 - cfg.curb_percent / 100.0)).round() as i64;
            let new_budget = raw.max(cfg.min_budget_jpy);

            if new_budget >= current {
                return self.record(
                    execution_id,
                    metrics,
                    BudgetAction::Keep,
                    BudgetReasonCode::MinBudgetReached,
                    current,
                    format!("curb pinned at floor {}", cfg.min_budget_jpy),
                );
            }

            return self.record(
                execution_id,
                metrics,
                BudgetAction::Curb,
                BudgetReasonCode::LowBudgetUsage,
                new_budget,
                format!(
                    "low_usage_days={} acos_ratio={:.2}",
                    metrics.low_usage_days, acos_ratio
                ),
            );
        }

        // 4. Default KEEP, reason picked by which side did not fire.
        let reason = if metrics.budget_usage_percent <= cfg.boost_usage_threshold {
            BudgetReasonCode::BudgetAvailable
        } else {
            BudgetReasonCode::ModeratePerformance
        };
        self.record(
            execution_id,
            metrics,
            BudgetAction::Keep,
            reason,
            current,
            format!(
                "usage={:.0}% acos_ratio={:.2}",
                metrics.budget_usage_percent, acos_ratio
            ),
        )
    }

    fn record(
        &self,
        execution_id: &str,
        metrics: &BudgetMetrics,
        action: BudgetAction,
        reason_code: BudgetReasonCode,
        recommended_budget: i64,
        reason_detail: String,
    ) -> BudgetRecommendation {
        BudgetRecommendation {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            campaign_id: metrics.campaign_id.clone(),
            campaign_name: metrics.campaign_name.clone(),
            action,
            reason_code,
            reason_detail,
            current_budget: metrics.daily_budget_jpy,
            recommended_budget,
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }
}

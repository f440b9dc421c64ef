//! Shared launch-exit types.
//!
//! Both the SEO launch evaluator and the lifecycle state machine need these;
//! keeping them here means the evaluator produces a decision and the state
//! machine consumes it, with no import in the other direction.

use serde::{Deserialize, Serialize};

use crate::models::LifecycleStage;

/// Per-keyword launch progress classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeywordLaunchStatus {
    Achieved,
    GaveUp,
    Active,
}

impl KeywordLaunchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeywordLaunchStatus::Achieved => "ACHIEVED",
            KeywordLaunchStatus::GaveUp => "GAVE_UP",
            KeywordLaunchStatus::Active => "ACTIVE",
        }
    }
}

/// Which give-up path fired, kept for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GiveUpPath {
    RankFailure,
    PerformanceFailure,
}

/// Closed reason set for launch-exit decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LaunchExitReasonCode {
    SeoCompleted,
    EmergencyLossBudget,
    EmergencyLaunchInvest,
    EarlyWarningExit,
    LossBudgetOk,
    Continue,
}

impl LaunchExitReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchExitReasonCode::SeoCompleted => "SEO_COMPLETED",
            LaunchExitReasonCode::EmergencyLossBudget => "EMERGENCY_LOSS_BUDGET",
            LaunchExitReasonCode::EmergencyLaunchInvest => "EMERGENCY_LAUNCH_INVEST",
            LaunchExitReasonCode::EarlyWarningExit => "EARLY_WARNING_EXIT",
            LaunchExitReasonCode::LossBudgetOk => "LOSS_BUDGET_OK",
            LaunchExitReasonCode::Continue => "CONTINUE",
        }
    }
}

/// The thresholds actually used for one decision, after volume scaling.
/// Recorded alongside the decision for auditability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveThresholds {
    pub min_launch_days: u32,
    pub min_asin_clicks_total: u64,
    pub min_asin_orders_total: u64,
    pub min_core_completion_ratio: f64,
    pub volume_scale: f64,
}

/// Launch-exit verdict for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchExitDecision {
    pub asin: String,
    pub should_exit: bool,
    pub is_emergency: bool,
    pub reason_code: LaunchExitReasonCode,
    pub target_stage: LifecycleStage,
    pub effective_thresholds: EffectiveThresholds,
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_cover_loss_budget_ok() {
        // LOSS_BUDGET_OK is a member of the closed set.
        assert_eq!(LaunchExitReasonCode::LossBudgetOk.as_str(), "LOSS_BUDGET_OK");
    }
}

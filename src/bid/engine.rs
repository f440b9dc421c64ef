//! Bid recommendation engine.
//!
//! Drives classifier -> guardrails -> coefficients -> bid computation over a
//! batch of keyword metrics. Emits exactly one recommendation per input row.
//! A single keyword's failure is isolated: it becomes a KEEP record with the
//! error in the reason detail and the batch continues.

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::bid::action::{self, ClassifiedAction};
use crate::bid::coefficients::{self, CoefficientSet};
use crate::bid::computer;
use crate::bid::config::BidEngineConfig;
use crate::bid::guardrails::{self, GuardrailContext};
use crate::models::{
    BidAction, BidReasonCode, BidRecommendation, EngineMode, InvestmentState, KeywordMetrics,
    LifecycleStage, LossBudgetSummary, ProductStrategy, RecommendationStatus,
};

/// Reason triple serialized into `reason_detail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonDetail {
    /// What was observed.
    pub facts: String,
    /// Which rule fired.
    pub logic: String,
    /// What the recommendation changes.
    pub impact: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coefficients: Option<CoefficientSet>,
}

pub struct BidEngine {
    config: BidEngineConfig,
}

impl BidEngine {
    pub fn new(config: BidEngineConfig) -> Self {
        Self { config }
    }

    /// Evaluate one batch. `strategies` and `loss_budgets` are keyed by ASIN;
    /// missing entries fall back to conservative defaults (GROW stage, SAFE
    /// budget).
    pub fn run(
        &self,
        execution_id: &str,
        batch: &[KeywordMetrics],
        strategies: &HashMap<String, ProductStrategy>,
        loss_budgets: &HashMap<String, LossBudgetSummary>,
        mode: EngineMode,
    ) -> Vec<BidRecommendation> {
        let mut out = Vec::with_capacity(batch.len());
        for metrics in batch {
            let stage = strategies
                .get(&metrics.asin)
                .map(|s| s.stage)
                .unwrap_or(LifecycleStage::Grow);
            let loss_state = loss_budgets
                .get(&metrics.asin)
                .map(|l| l.investment_state)
                .unwrap_or(InvestmentState::Safe);

            let rec = match self.evaluate(execution_id, metrics, stage, loss_state, mode) {
                Ok(rec) => rec,
                Err(err) => {
                    warn!(
                        keyword_id = %metrics.keyword_id,
                        error = %err,
                        "bid evaluation failed, emitting KEEP"
                    );
                    self.error_record(execution_id, metrics, &err)
                }
            };
            out.push(rec);
        }
        out
    }

    fn evaluate(
        &self,
        execution_id: &str,
        metrics: &KeywordMetrics,
        stage: LifecycleStage,
        loss_state: InvestmentState,
        mode: EngineMode,
    ) -> anyhow::Result<BidRecommendation> {
        anyhow::ensure!(
            metrics.current_bid > 0,
            "non-positive current bid {}",
            metrics.current_bid
        );

        let invest_mode = stage.is_invest_mode();
        let classified = action::classify(&self.config, metrics, invest_mode);

        let rails = guardrails::resolve(&GuardrailContext {
            role: metrics.role,
            stage,
            phase: metrics.phase,
            loss_state,
        });
        let enforced = guardrails::enforce(
            &rails,
            classified.action,
            metrics.clicks_7d,
            metrics.overspend_ratio(),
        );

        let final_action = enforced.action;
        let reason_code = if enforced.downgraded {
            BidReasonCode::GuardrailDowngrade
        } else {
            classified.reason_code
        };

        // Coefficients depend on the action that survived enforcement.
        let coeffs = coefficients::calculate(&self.config, metrics, final_action, mode);
        let computed = computer::compute(
            &self.config,
            &rails,
            metrics.current_bid,
            metrics.score_rank,
            final_action,
            &coeffs,
        );

        let detail = self.reason_detail(metrics, &classified, final_action, &coeffs, computed.change_rate);

        Ok(BidRecommendation {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            keyword_id: metrics.keyword_id.clone(),
            keyword: metrics.keyword.clone(),
            campaign_id: metrics.campaign_id.clone(),
            ad_group_id: metrics.ad_group_id.clone(),
            asin: metrics.asin.clone(),
            action: final_action,
            reason_code,
            reason_detail: serde_json::to_string(&detail).unwrap_or_default(),
            current_bid: metrics.current_bid,
            recommended_bid: computed.new_bid,
            change_rate: computed.change_rate,
            clipped: computed.clipped,
            clip_reason: computed.clip_reason.map(|r| r.as_str().to_string()),
            guardrail_flags: enforced.flags,
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        })
    }

    fn reason_detail(
        &self,
        metrics: &KeywordMetrics,
        classified: &ClassifiedAction,
        final_action: BidAction,
        coeffs: &CoefficientSet,
        change_rate: f64,
    ) -> ReasonDetail {
        let facts = format!(
            "acos={:.3} target={:.3} clicks7d={} rank={:?} phase={}",
            metrics.acos_actual,
            metrics.acos_target,
            metrics.clicks_7d,
            metrics.organic_rank,
            metrics.phase.as_str(),
        );
        let logic = if final_action == classified.action {
            format!("{} via {}", final_action.as_str(), classified.reason_code.as_str())
        } else {
            format!(
                "{} downgraded to {} by guardrails",
                classified.action.as_str(),
                final_action.as_str()
            )
        };
        let impact = format!(
            "bid {} -> {:+.1}% ({})",
            metrics.current_bid,
            change_rate * 100.0,
            final_action.as_str()
        );
        ReasonDetail {
            facts,
            logic,
            impact,
            coefficients: Some(coeffs.clone()),
        }
    }

    fn error_record(
        &self,
        execution_id: &str,
        metrics: &KeywordMetrics,
        err: &anyhow::Error,
    ) -> BidRecommendation {
        let detail = ReasonDetail {
            facts: format!("keyword {} failed evaluation", metrics.keyword_id),
            logic: "KEEP emitted on per-record error".to_string(),
            impact: "no change".to_string(),
            coefficients: None,
        };
        BidRecommendation {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            keyword_id: metrics.keyword_id.clone(),
            keyword: metrics.keyword.clone(),
            campaign_id: metrics.campaign_id.clone(),
            ad_group_id: metrics.ad_group_id.clone(),
            asin: metrics.asin.clone(),
            action: BidAction::Keep,
            reason_code: BidReasonCode::Error,
            reason_detail: format!(
                "{} | {}",
                serde_json::to_string(&detail).unwrap_or_default(),
                err
            ),
            current_bid: metrics.current_bid,
            recommended_bid: metrics.current_bid.max(0),
            change_rate: 0.0,
            clipped: false,
            clip_reason: None,
            guardrail_flags: Vec::new(),
            status: RecommendationStatus::Pending,
            is_applied: false,
            apply_error: None,
            created_at: Utc::now(),
        }
    }
}

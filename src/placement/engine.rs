//! Placement multiplier rules.
//!
//! Per campaign x placement slot: RAISE the multiplier where the slot
//! converts below target ACOS with real volume, LOWER it where the slot
//! burns, otherwise KEEP. The multiplier is clipped into [0, max].

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    PlacementAction, PlacementMetrics, PlacementReasonCode, PlacementRecommendation,
    RecommendationStatus,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub min_clicks_for_decision: u64,
    /// RAISE requires ACOS at or below target x this.
    pub good_acos_ratio: f64,
    /// LOWER fires at or above target x this.
    pub bad_acos_ratio: f64,
    pub step_percent: f64,
    pub max_multiplier_percent: f64,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            min_clicks_for_decision: 20,
            good_acos_ratio: 0.8,
            bad_acos_ratio: 1.3,
            step_percent: 10.0,
            max_multiplier_percent: 200.0,
        }
    }
}

pub struct PlacementEngine {
    config: PlacementConfig,
}

impl PlacementEngine {
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, execution_id: &str, batch: &[PlacementMetrics]) -> Vec<PlacementRecommendation> {
        batch
            .iter()
            .map(|m| self.evaluate(execution_id, m))
            .collect()
    }

    fn evaluate(&self, execution_id: &str, m: &PlacementMetrics) -> PlacementRecommendation {
        let cfg = &self.config;

        if m.clicks < cfg.min_clicks_for_decision {
            return self.record(
                execution_id,
                m,
                PlacementAction::Keep,
                PlacementReasonCode::InsufficientData,
                m.current_multiplier_percent,
                format!("{} clicks below {}", m.clicks, cfg.min_clicks_for_decision),
            );
        }

        let ratio = if m.target_acos > 0.0 {
            m.acos / m.target_acos
        } else {
            f64::MAX
        };

        if ratio <= cfg.good_acos_ratio {
            let target = (m.current_multiplier_percent + cfg.step_percent)
                .clamp(0.0, cfg.max_multiplier_percent);
            if target <= m.current_multiplier_percent {
                return self.record(
                    execution_id,
                    m,
                    PlacementAction::Keep,
                    PlacementReasonCode::MaxMultiplierReached,
                    m.current_multiplier_percent,
                    format!("multiplier pinned at {:.0}%", cfg.max_multiplier_percent),
                );
            }
            return self.record(
                execution_id,
                m,
                PlacementAction::Raise,
                PlacementReasonCode::StrongSlotPerformance,
                target,
                format!("acos ratio {ratio:.2} at or below {:.2}", cfg.good_acos_ratio),
            );
        }

        if ratio >= cfg.bad_acos_ratio {
            let target =
                (m.current_multiplier_percent - cfg.step_percent).clamp(0.0, cfg.max_multiplier_percent);
            return self.record(
                execution_id,
                m,
                PlacementAction::Lower,
                PlacementReasonCode::WeakSlotPerformance,
                target,
                format!("acos ratio {ratio:.2} at or above {:.2}", cfg.bad_acos_ratio),
            );
        }

        self.record(
            execution_id,
            m,
            PlacementAction::Keep,
            PlacementReasonCode::ModeratePerformance,
            m.current_multiplier_percent,
            format!("acos ratio {ratio:.2} inside the neutral band"),
        )
    }

    fn record(
        &self,
        execution_id: &str,
        m: &PlacementMetrics,
        action: PlacementAction,
        reason_code: PlacementReasonCode,
        recommended: f64,
        reason_detail: String,
    ) -> PlacementRecommendation {
        PlacementRecommendation {
            id: Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            campaign_id: m.campaign_id.clone(),
            slot: m.slot,
            action,
            reason_code,
            reason_detail,
            current_multiplier_percent: m.current_multiplier_percent,
            recommended_multiplier_percent: recommended,
            status: RecommendationStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlacementSlot;

    fn engine() -> PlacementEngine {
        PlacementEngine::new(PlacementConfig::default())
    }

    fn metrics(acos: f64, multiplier: f64) -> PlacementMetrics {
        PlacementMetrics {
            campaign_id: "cmp-1".into(),
            slot: PlacementSlot::TopOfSearch,
            current_multiplier_percent: multiplier,
            impressions: 5000,
            clicks: 100,
            spend_jpy: 6000,
            sales_jpy: 30000,
            acos,
            target_acos: 0.25,
        }
    }

    #[test]
    fn strong_slot_raises_by_step() {
        let recs = engine().run("exec-1", &[metrics(0.15, 50.0)]);
        let r = &recs[0];
        assert_eq!(r.action, PlacementAction::Raise);
        assert!((r.recommended_multiplier_percent - 60.0).abs() < 1e-9);
    }

    #[test]
    fn weak_slot_lowers_and_floors_at_zero() {
        let recs = engine().run("exec-1", &[metrics(0.40, 5.0)]);
        let r = &recs[0];
        assert_eq!(r.action, PlacementAction::Lower);
        assert_eq!(r.recommended_multiplier_percent, 0.0);
    }

    #[test]
    fn raise_pinned_at_cap_downgrades() {
        let recs = engine().run("exec-1", &[metrics(0.15, 200.0)]);
        let r = &recs[0];
        assert_eq!(r.action, PlacementAction::Keep);
        assert_eq!(r.reason_code, PlacementReasonCode::MaxMultiplierReached);
    }

    #[test]
    fn thin_data_keeps() {
        let mut m = metrics(0.15, 50.0);
        m.clicks = 5;
        let recs = engine().run("exec-1", &[m]);
        assert_eq!(recs[0].action, PlacementAction::Keep);
        assert_eq!(recs[0].reason_code, PlacementReasonCode::InsufficientData);
    }

    #[test]
    fn neutral_band_keeps() {
        let recs = engine().run("exec-1", &[metrics(0.25, 50.0)]);
        assert_eq!(recs[0].action, PlacementAction::Keep);
        assert_eq!(recs[0].reason_code, PlacementReasonCode::ModeratePerformance);
    }
}

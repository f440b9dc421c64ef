//! Guardrail resolution and enforcement.
//!
//! The resolver turns (role, lifecycle stage, sale phase, presale, loss
//! budget) into the constraint set bounding which actions and step sizes are
//! permitted. Enforcement re-checks a classified action against that set and
//! walks the fallback chain STOP -> STRONG_DOWN -> MILD_DOWN -> KEEP until an
//! allowed action remains, collecting a flag per downgrade cause.

use serde::{Deserialize, Serialize};

use crate::models::{BidAction, InvestmentState, KeywordRole, LifecycleStage, PhaseTag};

/// Resolved constraint set for one keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Guardrails {
    pub allow_stop: bool,
    pub allow_strong_down: bool,
    /// Largest permitted downward step, as a positive ratio. 0.0 freezes
    /// DOWN entirely.
    pub max_down_step_ratio: f64,
    /// STOP requires at least this many recent clicks.
    pub min_clicks_for_stop: u64,
    /// STRONG_DOWN requires at least this many recent clicks.
    pub min_clicks_for_strong_down: u64,
    /// STOP additionally requires spend at or beyond this multiple of the
    /// allowed spend.
    pub overspend_ratio_for_stop: f64,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            allow_stop: true,
            allow_strong_down: true,
            max_down_step_ratio: 0.25,
            min_clicks_for_stop: 30,
            min_clicks_for_strong_down: 20,
            overspend_ratio_for_stop: 2.0,
        }
    }
}

/// Inputs the resolver keys on. Snapshot of the keyword's surroundings, not
/// the keyword metrics themselves.
#[derive(Debug, Clone, Copy)]
pub struct GuardrailContext {
    pub role: KeywordRole,
    pub stage: LifecycleStage,
    pub phase: PhaseTag,
    pub loss_state: InvestmentState,
}

pub fn resolve(ctx: &GuardrailContext) -> Guardrails {
    let mut g = Guardrails::default();

    // Core keywords under hard launch are the SEO push itself: never stop
    // them, and keep downward steps small.
    if ctx.role == KeywordRole::Core && ctx.stage == LifecycleStage::LaunchHard {
        g.allow_stop = false;
        g.allow_strong_down = false;
        g.max_down_step_ratio = 0.05;
    }

    // Brand-owned terms are defensive inventory; stopping them hands the
    // shelf to competitors.
    if ctx.role == KeywordRole::BrandOwn {
        g.allow_stop = false;
    }

    // Experiment keywords may be culled aggressively.
    if ctx.role == KeywordRole::Experiment {
        g.min_clicks_for_stop = 20;
        g.min_clicks_for_strong_down = 10;
    }

    // Pre-sale ramp: bids were deliberately raised; no DOWN of any kind
    // until the event window closes.
    if ctx.phase.is_presale() {
        g.allow_stop = false;
        g.allow_strong_down = false;
        g.max_down_step_ratio = 0.0;
    }

    // A breached loss budget overrides launch protection: every DOWN limit
    // relaxes except the BRAND_OWN stop prohibition.
    if ctx.loss_state == InvestmentState::Breach {
        g.allow_strong_down = true;
        g.max_down_step_ratio = Guardrails::default().max_down_step_ratio;
        if ctx.role != KeywordRole::BrandOwn {
            g.allow_stop = true;
        }
    }

    g
}

/// Outcome of re-checking an action against the resolved guardrails.
#[derive(Debug, Clone)]
pub struct EnforcedAction {
    pub action: BidAction,
    pub downgraded: bool,
    pub flags: Vec<String>,
}

/// Walk the fallback chain until the action passes every applicable check.
pub fn enforce(
    guardrails: &Guardrails,
    action: BidAction,
    clicks: u64,
    overspend_ratio: f64,
) -> EnforcedAction {
    let mut current = action;
    let mut flags = Vec::new();

    loop {
        let blocked = match current {
            BidAction::Stop => {
                if !guardrails.allow_stop {
                    Some("stop_forbidden")
                } else if clicks < guardrails.min_clicks_for_stop {
                    Some("stop_click_threshold")
                } else if overspend_ratio < guardrails.overspend_ratio_for_stop {
                    Some("stop_overspend_threshold")
                } else {
                    None
                }
            }
            BidAction::StrongDown => {
                if !guardrails.allow_strong_down {
                    Some("strong_down_forbidden")
                } else if clicks < guardrails.min_clicks_for_strong_down {
                    Some("strong_down_click_threshold")
                } else {
                    None
                }
            }
            BidAction::MildDown => {
                if guardrails.max_down_step_ratio <= 0.0 {
                    Some("down_frozen")
                } else {
                    None
                }
            }
            _ => None,
        };

        match blocked {
            Some(flag) => {
                flags.push(flag.to_string());
                let next = current.milder();
                if next == current {
                    break;
                }
                current = next;
            }
            None => break,
        }
    }

    EnforcedAction {
        downgraded: current != action,
        action: current,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> GuardrailContext {
        GuardrailContext {
            role: KeywordRole::Support,
            stage: LifecycleStage::Grow,
            phase: PhaseTag::Normal,
            loss_state: InvestmentState::Safe,
        }
    }

    #[test]
    fn core_launch_hard_forbids_stop_and_caps_step() {
        let g = resolve(&GuardrailContext {
            role: KeywordRole::Core,
            stage: LifecycleStage::LaunchHard,
            ..ctx()
        });
        assert!(!g.allow_stop);
        assert!(!g.allow_strong_down);
        assert!(g.max_down_step_ratio <= 0.05);
    }

    #[test]
    fn presale_freezes_down_entirely() {
        let g = resolve(&GuardrailContext {
            phase: PhaseTag::SPre2,
            ..ctx()
        });
        assert_eq!(g.max_down_step_ratio, 0.0);
        let enforced = enforce(&g, BidAction::MildDown, 100, 3.0);
        assert_eq!(enforced.action, BidAction::Keep);
        assert!(enforced.flags.contains(&"down_frozen".to_string()));
    }

    #[test]
    fn breach_relaxes_down_limits_but_not_brand_own_stop() {
        let g = resolve(&GuardrailContext {
            role: KeywordRole::Core,
            stage: LifecycleStage::LaunchHard,
            loss_state: InvestmentState::Breach,
            ..ctx()
        });
        assert!(g.allow_stop);
        assert!(g.allow_strong_down);

        let g = resolve(&GuardrailContext {
            role: KeywordRole::BrandOwn,
            loss_state: InvestmentState::Breach,
            ..ctx()
        });
        assert!(!g.allow_stop);
    }

    #[test]
    fn stop_falls_back_through_the_chain() {
        let g = resolve(&GuardrailContext {
            role: KeywordRole::Core,
            stage: LifecycleStage::LaunchHard,
            ..ctx()
        });
        // STOP forbidden, STRONG_DOWN forbidden, MILD_DOWN allowed (small).
        let enforced = enforce(&g, BidAction::Stop, 200, 5.0);
        assert_eq!(enforced.action, BidAction::MildDown);
        assert!(enforced.downgraded);
        assert_eq!(enforced.flags.len(), 2);
    }

    #[test]
    fn stop_needs_clicks_and_overspend() {
        let g = Guardrails::default();
        let e = enforce(&g, BidAction::Stop, 10, 5.0);
        assert_eq!(e.action, BidAction::StrongDown);
        let e = enforce(&g, BidAction::Stop, 50, 1.0);
        assert_eq!(e.action, BidAction::StrongDown);
        let e = enforce(&g, BidAction::Stop, 50, 3.0);
        assert_eq!(e.action, BidAction::Stop);
        assert!(!e.downgraded);
    }

    #[test]
    fn up_actions_pass_untouched() {
        let g = resolve(&GuardrailContext {
            phase: PhaseTag::SPre1,
            ..ctx()
        });
        let e = enforce(&g, BidAction::StrongUp, 0, 0.0);
        assert_eq!(e.action, BidAction::StrongUp);
        assert!(e.flags.is_empty());
    }
}

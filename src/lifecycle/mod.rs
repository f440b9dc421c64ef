//! Product lifecycle management.
//!
//! Three cooperating pieces: the SEO launch evaluator scores per-keyword
//! launch progress, the launch-exit decider turns that progress plus the
//! loss budget into an exit verdict, and the state machine folds the verdict
//! into the per-stage transition table under the global safety overrides.

pub mod config;
pub mod launch_exit;
pub mod seo_launch;
pub mod state_machine;
pub mod types;

pub use config::{ExtensionConfig, LaunchExitConfig, LifecycleConfig, SafetyConfig, SeoLaunchConfig};
pub use launch_exit::LaunchTrialMetrics;
pub use state_machine::{ExtensionDecision, LifecycleDecision, LifecycleInput};
pub use types::{
    EffectiveThresholds, KeywordLaunchStatus, LaunchExitDecision, LaunchExitReasonCode,
};

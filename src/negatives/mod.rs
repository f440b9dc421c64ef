//! Search-term negative mining.
//!
//! Intent tagging builds cluster keys, the judger ladders clusters through
//! click phases, and the whitelist registry provides the loosening-only
//! hybrid override.

pub mod intent;
pub mod judger;
pub mod whitelist;

pub use intent::{IntentTagger, IntentTaggerConfig};
pub use judger::{NegativeJudgeConfig, NegativeJudger};
pub use whitelist::{WhitelistConfig, WhitelistRegistry};

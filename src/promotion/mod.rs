//! Auto-exact promotion mining.

pub mod engine;

pub use engine::{PromotionConfig, PromotionEngine};

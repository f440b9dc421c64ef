//! Historical replay of recommendations against actual outcomes.

pub mod engine;
pub mod models;

pub use engine::BacktestEngine;
pub use models::{BacktestParams, BacktestResult, Granularity};

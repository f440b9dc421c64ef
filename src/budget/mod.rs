//! Campaign daily-budget engine.

pub mod engine;

pub use engine::{BudgetConfig, BudgetEngine};

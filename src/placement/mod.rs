//! Placement multiplier optimization.

pub mod engine;

pub use engine::{PlacementConfig, PlacementEngine};

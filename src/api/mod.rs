//! HTTP surface.
//!
//! Thin shells over the orchestrator: parse and validate, run, serialize.
//! Cron handlers return 200 with the run summary, 400 with field errors on
//! bad input, 500 otherwise.

pub mod routes;

pub use routes::build_router;

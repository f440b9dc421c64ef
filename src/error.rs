//! Error taxonomy for the I/O boundary.
//!
//! Pure engines never return errors outward; a per-record failure becomes a
//! KEEP/no-op record with reason code ERROR. Only loading, persistence and
//! apply paths produce the kinds below.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One field-level validation failure, surfaced to HTTP callers as part of a
/// 400 body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed request input. Never retried.
    #[error("validation failed: {0:?}")]
    Validation(Vec<FieldError>),

    /// Input set empty or a key join produced nothing. The run completes
    /// with empty outputs; this kind only signals the structured warning.
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Warehouse read/write failure. Reads are fatal to the run; writes
    /// abort the run before any apply call.
    #[error("sink error: {0}")]
    Sink(String),

    /// Missing or invalid configuration at startup. No run begins.
    #[error("config error: {0}")]
    Config(String),
}

impl AppError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        AppError::Validation(errors)
    }

    pub fn field(field: &str, message: &str) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Sink(e.to_string())
    }
}

/// Apply-sink failure, tagged with whether a retry could succeed. Terminal
/// errors are written back to the recommendation row's `apply_error`.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("retryable apply failure: {0}")]
    Retryable(String),
    #[error("terminal apply failure: {0}")]
    Terminal(String),
}

impl ApplyError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApplyError::Retryable(_))
    }
}

impl From<reqwest::Error> for ApplyError {
    fn from(e: reqwest::Error) -> Self {
        // Network-level and 5xx failures may clear on retry; anything the
        // platform rejected outright is terminal.
        if e.is_timeout() || e.is_connect() {
            return ApplyError::Retryable(e.to_string());
        }
        if let Some(status) = e.status() {
            if status.is_server_error() {
                return ApplyError::Retryable(e.to_string());
            }
        }
        ApplyError::Terminal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_carry_through_validation() {
        let err = AppError::field("startDate", "missing required date");
        match err {
            AppError::Validation(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].field, "startDate");
            }
            other => panic!("unexpected kind: {other:?}"),
        }
    }

    #[test]
    fn apply_error_retryable_flag() {
        assert!(ApplyError::Retryable("timeout".into()).is_retryable());
        assert!(!ApplyError::Terminal("bad keyword id".into()).is_retryable());
    }
}

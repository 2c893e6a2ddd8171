// src/error.rs

use thiserror::Error;

/// Failures surfaced by the detection core.
///
/// Missing evidence is never an error; a frame without enough confident
/// joints is absorbed silently.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    /// A configuration value is outside its valid range.
    #[error("invalid detection config: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A live session received a frame older than the previous one.
    #[error("timestamp went backwards: {current:.3}s after {previous:.3}s")]
    NonMonotonicTimestamp { previous: f64, current: f64 },

    /// NaN or infinite frame timestamp.
    #[error("invalid frame timestamp: {0}")]
    InvalidTimestamp(f64),
}

impl DetectionError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

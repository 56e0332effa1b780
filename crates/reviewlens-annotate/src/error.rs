//! Error taxonomy for the annotation core.
//!
//! Every failure is fatal for the run: there is no best-effort mode, so the
//! pipeline either annotates and aggregates 100% of its input or returns one
//! of these errors.

use std::time::Duration;

use crate::pipeline::PipelineStage;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AnnotateError>;

#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    /// Input table is missing a required column or value.
    #[error("schema error: {0}")]
    Schema(String),

    /// A review text failed basic validity at sentiment inference.
    #[error("invalid input at row {index}{}: {reason}", review_suffix(.review_id))]
    InvalidInput {
        index: usize,
        review_id: Option<String>,
        reason: String,
    },

    /// The classifier backend failed to initialize or answer.
    /// `batch` is `None` when the failure happened during model load.
    #[error("sentiment model unavailable{}: {reason}", batch_suffix(.batch))]
    ModelUnavailable {
        batch: Option<usize>,
        reason: String,
    },

    /// The classifier backend did not answer within the caller's timeout.
    #[error("sentiment model timed out after {timeout:?}{}", batch_suffix(.batch))]
    ModelTimeout {
        batch: Option<usize>,
        timeout: Duration,
    },

    /// Malformed configuration (theme table, batch size, bank list, ...).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The caller raised the cancellation signal. `stage` is the last
    /// stage the run completed.
    #[error("run cancelled after {stage}")]
    Cancelled { stage: PipelineStage },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

fn batch_suffix(batch: &Option<usize>) -> String {
    match batch {
        Some(idx) => format!(" (batch {idx})"),
        None => " (model load)".to_string(),
    }
}

fn review_suffix(review_id: &Option<String>) -> String {
    match review_id {
        Some(id) => format!(" (review '{id}')"),
        None => String::new(),
    }
}

/// Failure reported by a classifier backend for a single call.
///
/// The annotator decides what to do with it: `Transient` is retried with
/// backoff, everything else aborts the run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("transient backend failure: {0}")]
    Transient(String),
    #[error("backend failure: {0}")]
    Fatal(String),
    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelError::Transient(_))
    }
}

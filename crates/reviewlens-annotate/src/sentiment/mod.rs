//! Batched sentiment inference.
//!
//! The classifier is an external capability behind [`SentimentModel`]
//! (`texts -> class scores`). [`SentimentAnnotator`] owns everything around
//! it: input validation, batching, optional parallelism across batches,
//! per-call timeouts, bounded retries of transient failures, and
//! reassembly of results in input order.

pub mod http;
pub mod lexicon;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::{ModelConfig, ModelKind, PipelineConfig};
use crate::error::{AnnotateError, ModelError, Result};
use crate::pipeline::PipelineStage;
use crate::record::{ClassScores, SentimentResult};

pub use lexicon::LexiconModel;

/// Tolerance for `negative + positive == 1`.
const DISTRIBUTION_TOLERANCE: f64 = 1e-6;

/// A binary sentiment classifier.
pub trait SentimentModel: Send + Sync {
    fn name(&self) -> &str;

    /// One class distribution per input text, in input order.
    fn predict_batch(&self, texts: &[String]) -> std::result::Result<Vec<ClassScores>, ModelError>;
}

/// One-time model initialization.
pub trait ModelLoader: Send + Sync {
    fn describe(&self) -> String;

    fn load(&self) -> std::result::Result<Arc<dyn SentimentModel>, ModelError>;
}

/// Loads [`LexiconModel`], optionally extended from a file.
#[derive(Debug, Clone, Default)]
pub struct LexiconLoader {
    pub extension: Option<PathBuf>,
}

impl ModelLoader for LexiconLoader {
    fn describe(&self) -> String {
        match &self.extension {
            Some(path) => format!("lexicon (+{})", path.display()),
            None => "lexicon".to_string(),
        }
    }

    fn load(&self) -> std::result::Result<Arc<dyn SentimentModel>, ModelError> {
        let model = match &self.extension {
            Some(path) => LexiconModel::with_extension_file(path)?,
            None => LexiconModel::new(),
        };
        Ok(Arc::new(model))
    }
}

/// Loader for the configured backend.
pub fn model_for_config(config: &ModelConfig) -> Result<Arc<dyn ModelLoader>> {
    match config.kind {
        ModelKind::Lexicon => Ok(Arc::new(LexiconLoader {
            extension: config.lexicon_path.as_ref().map(PathBuf::from),
        })),
        #[cfg(feature = "http")]
        ModelKind::Http => {
            let endpoint = config.endpoint.clone().ok_or_else(|| {
                AnnotateError::Configuration("model.endpoint is required for kind = \"http\"".into())
            })?;
            Ok(Arc::new(http::HttpLoader {
                endpoint,
                token: std::env::var(http::TOKEN_ENV).ok(),
                request_timeout: Duration::from_millis(config.inference_timeout_ms),
            }))
        }
        #[cfg(not(feature = "http"))]
        ModelKind::Http => Err(AnnotateError::Configuration(
            "model.kind = \"http\" requires building with the `http` feature".into(),
        )),
    }
}

// ============================================================================
// Annotator
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnnotatorSettings {
    pub batch_size: usize,
    pub workers: usize,
    pub inference_timeout: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
}

impl AnnotatorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            workers: config.workers,
            inference_timeout: Duration::from_millis(config.model.inference_timeout_ms),
            max_retries: config.retry.max_retries,
            backoff: Duration::from_millis(config.retry.backoff_ms),
        }
    }
}

pub struct SentimentAnnotator {
    model: Arc<dyn SentimentModel>,
    settings: AnnotatorSettings,
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for SentimentAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentAnnotator")
            .field("model", &self.model.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl SentimentAnnotator {
    /// Initialize the model through `loader`, bounded by the configured
    /// load timeout.
    pub fn load(loader: Arc<dyn ModelLoader>, config: &PipelineConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.model.load_timeout_ms);
        let description = loader.describe();
        let model = call_with_timeout(timeout, move || loader.load())
            .map_err(|failure| failure.into_error(None, timeout))?;
        info!(model = %description, "sentiment model loaded");
        Self::new(model, AnnotatorSettings::from_config(config))
    }

    pub fn new(model: Arc<dyn SentimentModel>, settings: AnnotatorSettings) -> Result<Self> {
        if settings.batch_size == 0 || settings.workers == 0 {
            return Err(AnnotateError::Configuration(
                "batch_size and workers must be at least 1".into(),
            ));
        }
        let pool = if settings.workers > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(settings.workers)
                .thread_name(|i| format!("reviewlens-infer-{i}"))
                .build()
                .map_err(|e| AnnotateError::Configuration(format!("worker pool: {e}")))?;
            Some(pool)
        } else {
            None
        };
        Ok(Self {
            model,
            settings,
            pool,
        })
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// One result per text, same length and order as `texts`.
    ///
    /// Blank texts are rejected with [`AnnotateError::InvalidInput`]
    /// before any model call.
    pub fn annotate(&self, texts: &[String], cancel: &CancelToken) -> Result<Vec<SentimentResult>> {
        if let Some(index) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(AnnotateError::InvalidInput {
                index,
                review_id: None,
                reason: "review text is empty or whitespace-only".to_string(),
            });
        }

        let batches: Vec<(usize, &[String])> =
            texts.chunks(self.settings.batch_size).enumerate().collect();
        debug!(
            texts = texts.len(),
            batches = batches.len(),
            workers = self.settings.workers,
            "running sentiment inference"
        );

        // Set by the first failing batch; batches not yet started are skipped.
        let halted = AtomicBool::new(false);
        let outcomes: Vec<Result<Option<Vec<ClassScores>>>> = match &self.pool {
            None => {
                let mut outcomes = Vec::with_capacity(batches.len());
                for (index, batch) in &batches {
                    let outcome = self.run_batch(*index, batch, cancel, &halted);
                    let failed = outcome.is_err();
                    outcomes.push(outcome);
                    if failed {
                        break;
                    }
                }
                outcomes
            }
            Some(pool) => pool.install(|| {
                batches
                    .par_iter()
                    .map(|(index, batch)| {
                        let outcome = self.run_batch(*index, batch, cancel, &halted);
                        if outcome.is_err() {
                            halted.store(true, AtomicOrdering::SeqCst);
                        }
                        outcome
                    })
                    .collect()
            }),
        };

        let mut scores = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            scores.push(outcome?);
        }
        let mut results = Vec::with_capacity(texts.len());
        for batch in scores.into_iter().flatten() {
            results.extend(batch.into_iter().map(SentimentResult::from_scores));
        }
        Ok(results)
    }

    /// `Ok(None)` when another batch already failed and this one was not run.
    fn run_batch(
        &self,
        index: usize,
        batch: &[String],
        cancel: &CancelToken,
        halted: &AtomicBool,
    ) -> Result<Option<Vec<ClassScores>>> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(AnnotateError::Cancelled {
                    stage: PipelineStage::Loaded,
                });
            }
            if halted.load(AtomicOrdering::SeqCst) {
                debug!(batch = index, "skipping batch after an earlier failure");
                return Ok(None);
            }

            let model = Arc::clone(&self.model);
            let owned = batch.to_vec();
            let timeout = self.settings.inference_timeout;
            let outcome = call_with_timeout(timeout, move || model.predict_batch(&owned));

            match outcome {
                Ok(scores) => {
                    validate_scores(&scores, batch.len()).map_err(|reason| {
                        AnnotateError::ModelUnavailable {
                            batch: Some(index),
                            reason,
                        }
                    })?;
                    debug!(batch = index, size = batch.len(), attempt, "batch annotated");
                    return Ok(Some(scores));
                }
                Err(CallFailure::Model(err)) if err.is_transient() && attempt < self.settings.max_retries => {
                    let delay = self.settings.backoff.saturating_mul(2u32.saturating_pow(attempt));
                    warn!(
                        batch = index,
                        attempt = attempt + 1,
                        max_retries = self.settings.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient model failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(failure) => return Err(failure.into_error(Some(index), timeout)),
            }
        }
    }
}

fn validate_scores(scores: &[ClassScores], expected: usize) -> std::result::Result<(), String> {
    if scores.len() != expected {
        return Err(format!(
            "backend returned {} results for {} texts",
            scores.len(),
            expected
        ));
    }
    for (i, s) in scores.iter().enumerate() {
        let in_range = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
        if !in_range(s.negative) || !in_range(s.positive) {
            return Err(format!("result {i}: probabilities outside [0, 1]"));
        }
        if (s.negative + s.positive - 1.0).abs() > DISTRIBUTION_TOLERANCE {
            return Err(format!("result {i}: probabilities do not sum to 1"));
        }
    }
    Ok(())
}

// ============================================================================
// Timeouts
// ============================================================================

enum CallFailure {
    Model(ModelError),
    TimedOut,
    /// The helper thread died without answering (backend panicked).
    Lost,
}

impl CallFailure {
    fn into_error(self, batch: Option<usize>, timeout: Duration) -> AnnotateError {
        match self {
            CallFailure::Model(err) => AnnotateError::ModelUnavailable {
                batch,
                reason: err.to_string(),
            },
            CallFailure::TimedOut => AnnotateError::ModelTimeout { batch, timeout },
            CallFailure::Lost => AnnotateError::ModelUnavailable {
                batch,
                reason: "backend thread terminated without a result".to_string(),
            },
        }
    }
}

/// Run `f` on a helper thread and wait at most `timeout` for it. A call
/// that times out is abandoned; its thread finishes on its own.
fn call_with_timeout<T, F>(timeout: Duration, f: F) -> std::result::Result<T, CallFailure>
where
    T: Send + 'static,
    F: FnOnce() -> std::result::Result<T, ModelError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("reviewlens-model-call".to_string())
        .spawn(move || {
            let _ = tx.send(f());
        })
        .map_err(|e| CallFailure::Model(ModelError::Fatal(format!("cannot spawn model thread: {e}"))))?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result.map_err(CallFailure::Model),
        Err(RecvTimeoutError::Timeout) => Err(CallFailure::TimedOut),
        Err(RecvTimeoutError::Disconnected) => Err(CallFailure::Lost),
    }
}

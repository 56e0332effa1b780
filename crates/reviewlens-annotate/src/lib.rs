//! Annotation & aggregation core for bank app-store reviews.
//!
//! Takes cleaned review records and deterministically produces:
//! - a binary sentiment judgment per review ([`sentiment`]),
//! - a non-empty set of rule-based theme tags per review ([`themes`]),
//! - per-bank TF-IDF keyword rankings for theme curation ([`keywords`]),
//! - sentiment-by-(bank, rating) and theme-by-bank summaries ([`aggregate`]).
//!
//! [`pipeline::AnnotationOrchestrator`] sequences the passes; [`tables`]
//! reads the cleaner's CSV and writes the output tables.

pub mod aggregate;
pub mod cancel;
pub mod config;
pub mod error;
pub mod keywords;
pub mod pipeline;
pub mod record;
pub mod sentiment;
pub mod tables;
pub mod text;
pub mod themes;

pub use aggregate::{sentiment_summary, theme_summary, SentimentSummaryRow, ThemeSummaryRow};
pub use cancel::CancelToken;
pub use config::PipelineConfig;
pub use error::{AnnotateError, ModelError, Result};
pub use keywords::{KeywordExtractor, WeightedTerm};
pub use pipeline::{AnnotationOrchestrator, PipelineOutput, PipelineStage};
pub use record::{
    AnnotatedReview, Bank, BankRegistry, ClassScores, ReviewRecord, SentimentLabel,
    SentimentResult,
};
pub use sentiment::{
    model_for_config, AnnotatorSettings, LexiconModel, ModelLoader, SentimentAnnotator,
    SentimentModel,
};
pub use tables::{read_reviews_csv, write_outputs, OutputFormat};
pub use text::normalize_text;
pub use themes::{classify, ThemeClassifier, ThemeDefinition, ThemeTable};

//! Annotation orchestration.
//!
//! A strict linear pipeline:
//!
//! ```text
//! LOADED -> SENTIMENT_DONE -> THEMES_DONE -> AGGREGATED -> EMITTED
//! ```
//!
//! Any failure aborts the run at the stage it happened in. There is no
//! partial emit and no resume; a re-run starts again from `LOADED` and its
//! output supersedes the previous one wholesale.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use tracing::info;

use crate::aggregate::{sentiment_summary, theme_summary, SentimentSummaryRow, ThemeSummaryRow};
use crate::cancel::CancelToken;
use crate::config::PipelineConfig;
use crate::error::{AnnotateError, Result};
use crate::keywords::{KeywordExtractor, WeightedTerm};
use crate::record::{AnnotatedReview, Bank, ReviewRecord};
use crate::sentiment::SentimentAnnotator;
use crate::tables::{write_outputs, OutputFormat};
use crate::themes::{ThemeClassifier, ThemeTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Loaded,
    SentimentDone,
    ThemesDone,
    Aggregated,
    Emitted,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Loaded => "LOADED",
            PipelineStage::SentimentDone => "SENTIMENT_DONE",
            PipelineStage::ThemesDone => "THEMES_DONE",
            PipelineStage::Aggregated => "AGGREGATED",
            PipelineStage::Emitted => "EMITTED",
        };
        f.write_str(name)
    }
}

/// Complete result of one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub reviews: Vec<AnnotatedReview>,
    pub sentiment_summary: Vec<SentimentSummaryRow>,
    pub theme_summary: Vec<ThemeSummaryRow>,
    pub bank_keywords: BTreeMap<Bank, Vec<WeightedTerm>>,
}

pub struct AnnotationOrchestrator {
    annotator: SentimentAnnotator,
    classifier: ThemeClassifier,
    keywords: KeywordExtractor,
    max_examples: usize,
    summary_keywords: usize,
}

impl AnnotationOrchestrator {
    pub fn new(config: &PipelineConfig, annotator: SentimentAnnotator) -> Result<Self> {
        config.validate()?;
        let table = ThemeTable::from_config(&config.themes)?;
        Ok(Self {
            annotator,
            classifier: ThemeClassifier::new(table),
            keywords: KeywordExtractor::new(&config.keywords),
            max_examples: config.max_examples,
            summary_keywords: config.keywords.summary_keywords,
        })
    }

    pub fn theme_table(&self) -> &ThemeTable {
        self.classifier.table()
    }

    /// Annotate every record and derive the summary tables.
    pub fn run(&self, records: &[ReviewRecord], cancel: &CancelToken) -> Result<PipelineOutput> {
        check_unique_ids(records)?;
        info!(stage = %PipelineStage::Loaded, reviews = records.len(), "pipeline started");

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let sentiments = self
            .annotator
            .annotate(&texts, cancel)
            .map_err(|err| attach_review_id(err, records))?;
        info!(stage = %PipelineStage::SentimentDone, model = %self.annotator.model_name(), "sentiment pass complete");

        checkpoint(cancel, PipelineStage::SentimentDone)?;
        let themes = self.classifier.classify_all(&texts);
        info!(stage = %PipelineStage::ThemesDone, "theme pass complete");

        let reviews: Vec<AnnotatedReview> = records
            .iter()
            .zip(sentiments)
            .zip(themes)
            .map(|((record, sentiment), themes)| AnnotatedReview {
                record: record.clone(),
                sentiment,
                themes,
            })
            .collect();

        checkpoint(cancel, PipelineStage::ThemesDone)?;
        let bank_keywords = self.keywords.keywords_by_bank(records);
        let sentiment_rows = sentiment_summary(&reviews);
        let theme_rows = theme_summary(
            &reviews,
            self.classifier.table(),
            self.max_examples,
            &bank_keywords,
            self.summary_keywords,
        );
        info!(
            stage = %PipelineStage::Aggregated,
            sentiment_rows = sentiment_rows.len(),
            theme_rows = theme_rows.len(),
            "aggregation complete"
        );

        Ok(PipelineOutput {
            reviews,
            sentiment_summary: sentiment_rows,
            theme_summary: theme_rows,
            bank_keywords,
        })
    }

    /// Run, then write every output table into `out_dir`.
    pub fn run_and_emit(
        &self,
        records: &[ReviewRecord],
        out_dir: &Path,
        format: OutputFormat,
        cancel: &CancelToken,
    ) -> Result<PipelineOutput> {
        let output = self.run(records, cancel)?;
        checkpoint(cancel, PipelineStage::Aggregated)?;
        write_outputs(out_dir, &output, format)?;
        info!(stage = %PipelineStage::Emitted, dir = %out_dir.display(), "outputs written");
        Ok(output)
    }
}

fn checkpoint(cancel: &CancelToken, completed: PipelineStage) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(AnnotateError::Cancelled { stage: completed });
    }
    Ok(())
}

fn check_unique_ids(records: &[ReviewRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        if !seen.insert(record.id.as_str()) {
            return Err(AnnotateError::Schema(format!(
                "row {row}: duplicate review_id '{}'",
                record.id
            )));
        }
    }
    Ok(())
}

fn attach_review_id(err: AnnotateError, records: &[ReviewRecord]) -> AnnotateError {
    match err {
        AnnotateError::InvalidInput {
            index,
            review_id: None,
            reason,
        } => AnnotateError::InvalidInput {
            index,
            review_id: records.get(index).map(|r| r.id.clone()),
            reason,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_banks;
    use crate::record::{BankRegistry, SentimentLabel};
    use crate::sentiment::{AnnotatorSettings, LexiconModel};
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn orchestrator(config: &PipelineConfig) -> AnnotationOrchestrator {
        let annotator = SentimentAnnotator::new(
            Arc::new(LexiconModel::new()),
            AnnotatorSettings::from_config(config),
        )
        .unwrap();
        AnnotationOrchestrator::new(config, annotator).unwrap()
    }

    fn record(id: &str, text: &str, rating: u8, bank: &str) -> ReviewRecord {
        let banks = BankRegistry::new(default_banks()).unwrap();
        ReviewRecord::new(
            id,
            text,
            rating,
            NaiveDate::from_ymd_opt(2025, 9, 14).unwrap(),
            banks.resolve(bank).unwrap(),
            "Google Play",
        )
        .unwrap()
    }

    #[test]
    fn stages_display_in_screaming_case() {
        assert_eq!(PipelineStage::SentimentDone.to_string(), "SENTIMENT_DONE");
    }

    #[test]
    fn run_preserves_input_order_and_merges_annotations() {
        let records = vec![
            record("r1", "app keeps crashing", 1, "CBE"),
            record("r2", "nice app, please add budgeting feature", 4, "CBE"),
            record("r3", "xyz abc qwerty", 3, "BOA"),
        ];
        let output = orchestrator(&PipelineConfig::default())
            .run(&records, &CancelToken::new())
            .unwrap();

        let ids: Vec<&str> = output.reviews.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2", "r3"]);
        assert_eq!(output.reviews[0].sentiment.label, SentimentLabel::Negative);
        assert_eq!(output.reviews[0].themes, vec!["Reliability & Stability"]);
        assert!(output.reviews[1].has_theme("Feature Requests"));
        assert_eq!(output.reviews[2].themes, vec!["Other Feedback"]);
        assert_eq!(output.bank_keywords.len(), 2);
    }

    #[test]
    fn blank_text_reports_the_review_id() {
        let records = vec![record("r1", "good", 5, "CBE"), record("r2", "  ", 3, "CBE")];
        let err = orchestrator(&PipelineConfig::default())
            .run(&records, &CancelToken::new())
            .unwrap_err();
        match err {
            AnnotateError::InvalidInput { index, review_id, .. } => {
                assert_eq!(index, 1);
                assert_eq!(review_id.as_deref(), Some("r2"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_ids_are_a_schema_error() {
        let records = vec![record("r1", "good", 5, "CBE"), record("r1", "bad", 1, "CBE")];
        let err = orchestrator(&PipelineConfig::default())
            .run(&records, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, AnnotateError::Schema(_)));
    }

    #[test]
    fn cancelled_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let records = vec![record("r1", "good", 5, "CBE")];
        let err = orchestrator(&PipelineConfig::default())
            .run_and_emit(&records, dir.path(), OutputFormat::Csv, &cancel)
            .unwrap_err();
        assert!(matches!(err, AnnotateError::Cancelled { stage: PipelineStage::Loaded }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn empty_input_yields_empty_tables() {
        let output = orchestrator(&PipelineConfig::default())
            .run(&[], &CancelToken::new())
            .unwrap();
        assert!(output.reviews.is_empty());
        assert!(output.sentiment_summary.is_empty());
        assert!(output.theme_summary.is_empty());
    }
}

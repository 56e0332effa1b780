//! End-to-end tests for the annotation pipeline
//!
//! Drives the full flow the CLI uses: cleaned CSV in, orchestrated
//! sentiment + theme passes, summary tables out, then reads the written
//! tables back.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use approx::assert_relative_eq;
use reviewlens_annotate::config::{ThemeEntry, ThemeTableConfig};
use reviewlens_annotate::sentiment::{AnnotatorSettings, LexiconModel};
use reviewlens_annotate::{
    read_reviews_csv, AnnotateError, AnnotationOrchestrator, BankRegistry, CancelToken,
    ClassScores, ModelError, OutputFormat, PipelineConfig, PipelineOutput, SentimentAnnotator,
    SentimentLabel, SentimentModel,
};

const HEADER: &str = "review_id,review,rating,date,bank,source\n";

const CSV_TABLES: [&str; 4] = [
    "reviews_with_sentiment.csv",
    "sentiment_summary.csv",
    "theme_summary.csv",
    "bank_keywords.json",
];

fn write_input(dir: &Path, rows: &[&str]) -> std::path::PathBuf {
    let path = dir.join("reviews_clean.csv");
    let mut contents = HEADER.to_string();
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(&path, contents).unwrap();
    path
}

fn orchestrator_with(config: &PipelineConfig, model: Arc<dyn SentimentModel>) -> AnnotationOrchestrator {
    let annotator = SentimentAnnotator::new(model, AnnotatorSettings::from_config(config)).unwrap();
    AnnotationOrchestrator::new(config, annotator).unwrap()
}

fn annotate_csv(dir: &Path, rows: &[&str], config: &PipelineConfig, format: OutputFormat) -> PipelineOutput {
    let input = write_input(dir, rows);
    let banks = BankRegistry::new(config.banks.clone()).unwrap();
    let records = read_reviews_csv(&input, &banks).unwrap();
    orchestrator_with(config, Arc::new(LexiconModel::new()))
        .run_and_emit(&records, &dir.join("out"), format, &CancelToken::new())
        .unwrap()
}

fn read_csv(path: &Path) -> Vec<csv::StringRecord> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader.records().map(|r| r.unwrap()).collect()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn crashing_app_is_reliability_and_negative() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.themes = ThemeTableConfig {
        catch_all: "Other".to_string(),
        themes: vec![ThemeEntry {
            name: "Reliability".to_string(),
            keywords: vec!["crash".to_string()],
        }],
        ..ThemeTableConfig::default()
    };

    let output = annotate_csv(
        dir.path(),
        &["r1,app keeps crashing,1,2025-05-04,CBE,Google Play"],
        &config,
        OutputFormat::Csv,
    );
    let review = &output.reviews[0];
    assert_eq!(review.themes, vec!["Reliability"]);
    assert_eq!(review.sentiment.label, SentimentLabel::Negative);

    let rows = read_csv(&dir.path().join("out/reviews_with_sentiment.csv"));
    assert_eq!(&rows[0][0], "r1");
    assert_eq!(&rows[0][6], "NEGATIVE");
    assert_eq!(&rows[0][10], r#"["Reliability"]"#);
}

#[test]
fn feature_request_does_not_get_catch_all() {
    let dir = tempfile::tempdir().unwrap();
    let output = annotate_csv(
        dir.path(),
        &["r1,\"nice app, please add budgeting feature\",4,2025-05-04,BOA,Google Play"],
        &PipelineConfig::default(),
        OutputFormat::Csv,
    );
    let themes = &output.reviews[0].themes;
    assert!(themes.contains(&"Feature Requests".to_string()));
    assert!(!themes.contains(&"Other Feedback".to_string()));
}

#[test]
fn unmatched_text_is_exactly_the_catch_all() {
    let dir = tempfile::tempdir().unwrap();
    let output = annotate_csv(
        dir.path(),
        &["r1,xyz abc qwerty,3,2025-05-04,DASHEN,Google Play"],
        &PipelineConfig::default(),
        OutputFormat::Csv,
    );
    assert_eq!(output.reviews[0].themes, vec!["Other Feedback"]);
}

#[test]
fn rating_rows_report_full_shares() {
    let dir = tempfile::tempdir().unwrap();
    let output = annotate_csv(
        dir.path(),
        &[
            "r1,excellent app love it,5,2025-05-04,CBE,Google Play",
            "r2,worst app ever terrible,1,2025-05-05,CBE,Google Play",
        ],
        &PipelineConfig::default(),
        OutputFormat::Csv,
    );
    assert_eq!(output.reviews[0].sentiment.label, SentimentLabel::Positive);
    assert_eq!(output.reviews[1].sentiment.label, SentimentLabel::Negative);

    let five = output.sentiment_summary.iter().find(|r| r.rating == 5).unwrap();
    let one = output.sentiment_summary.iter().find(|r| r.rating == 1).unwrap();
    assert_relative_eq!(five.positive_share, 1.0);
    assert_relative_eq!(one.negative_share, 1.0);

    let rows = read_csv(&dir.path().join("out/sentiment_summary.csv"));
    assert_eq!(rows.len(), 2);
    assert_eq!(&rows[0][1], "1");
    assert_eq!(&rows[0][4], "1.000000");
    assert_eq!(&rows[0][5], "1");
}

#[test]
fn theme_summary_is_written_with_examples_and_keywords() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.max_examples = 2;
    annotate_csv(
        dir.path(),
        &[
            "r1,app crash after update,1,2025-05-04,CBE,Google Play",
            "r2,crash on login,2,2025-05-04,CBE,Google Play",
            "r3,another crash today,1,2025-05-04,CBE,Google Play",
        ],
        &config,
        OutputFormat::Csv,
    );
    let rows = read_csv(&dir.path().join("out/theme_summary.csv"));
    let reliability = rows.iter().find(|r| &r[1] == "Reliability & Stability").unwrap();
    assert_eq!(&reliability[2], "1.000000");
    assert_eq!(&reliability[5], r#"["r1","r2"]"#);
    let keywords: Vec<String> = serde_json::from_str(&reliability[6]).unwrap();
    assert_eq!(keywords[0], "crash");

    let catch_all = rows.iter().find(|r| &r[1] == "Other Feedback").unwrap();
    assert_eq!(&catch_all[3], "");
    assert_eq!(&catch_all[4], "0");
}

#[test]
fn rerun_produces_byte_identical_tables() {
    let dir = tempfile::tempdir().unwrap();
    let rows = [
        "r1,Transfer pending for days,2,2025-05-04,CBE,Google Play",
        "r2,Great UI very easy,5,2025-05-04,BOA,Google Play",
        "r3,app keeps crashing,1,2025-05-05,Dashen Bank,Google Play",
    ];
    let config = PipelineConfig::default();
    annotate_csv(dir.path(), &rows, &config, OutputFormat::Csv);
    let snapshot = || -> Vec<Vec<u8>> {
        CSV_TABLES
            .iter()
            .map(|name| fs::read(dir.path().join("out").join(name)).unwrap())
            .collect()
    };
    let first = snapshot();

    annotate_csv(dir.path(), &rows, &config, OutputFormat::Csv);
    assert_eq!(first, snapshot());
}

#[test]
fn json_output_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    annotate_csv(
        dir.path(),
        &["r1,login fails every time,1,2025-05-04,CBE,Google Play"],
        &PipelineConfig::default(),
        OutputFormat::Json,
    );
    let raw = fs::read_to_string(dir.path().join("out/reviews_with_sentiment.json")).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(rows[0]["review_id"], "r1");
    assert_eq!(rows[0]["bank"], "CBE");
    assert_eq!(rows[0]["themes"][0], "Account Access Issues");
}

// ============================================================================
// Failure modes
// ============================================================================

struct Unavailable;

impl SentimentModel for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }
    fn predict_batch(&self, _texts: &[String]) -> Result<Vec<ClassScores>, ModelError> {
        Err(ModelError::Fatal("connection refused".to_string()))
    }
}

#[test]
fn backend_failure_aborts_without_writing_tables() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), &["r1,good app,5,2025-05-04,CBE,Google Play"]);
    let mut config = PipelineConfig::default();
    config.retry.backoff_ms = 1;
    let banks = BankRegistry::new(config.banks.clone()).unwrap();
    let records = read_reviews_csv(&input, &banks).unwrap();

    let out = dir.path().join("out");
    let err = orchestrator_with(&config, Arc::new(Unavailable))
        .run_and_emit(&records, &out, OutputFormat::Csv, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, AnnotateError::ModelUnavailable { batch: Some(0), .. }));
    assert!(!out.exists());
}

#[test]
fn missing_column_fails_before_any_compute() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    fs::write(&path, "review_id,review,rating,date,bank\nr1,ok,5,2025-05-04,CBE\n").unwrap();
    let banks = BankRegistry::new(PipelineConfig::default().banks).unwrap();
    let err = read_reviews_csv(&path, &banks).unwrap_err();
    assert!(matches!(err, AnnotateError::Schema(_)));
}

#[test]
fn whitespace_review_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(
        dir.path(),
        &[
            "r1,good app,5,2025-05-04,CBE,Google Play",
            "r2,   ,3,2025-05-04,CBE,Google Play",
        ],
    );
    let config = PipelineConfig::default();
    let banks = BankRegistry::new(config.banks.clone()).unwrap();
    let records = read_reviews_csv(&input, &banks).unwrap();
    let err = orchestrator_with(&config, Arc::new(LexiconModel::new()))
        .run(&records, &CancelToken::new())
        .unwrap_err();
    assert!(matches!(err, AnnotateError::InvalidInput { index: 1, .. }));
    assert!(err.to_string().contains("r2"));
}

#[test]
fn malformed_theme_table_is_rejected_at_load() {
    let raw = r#"
[[themes.themes]]
name = "Reliability"
keywords = ["crash"]

[[themes.themes]]
name = "Reliability"
keywords = ["bug"]
"#;
    let err = PipelineConfig::from_toml_str(raw).unwrap_err();
    assert!(matches!(err, AnnotateError::Configuration(_)));
}

#[test]
fn parallel_workers_match_sequential_output() {
    let dir = tempfile::tempdir().unwrap();
    let rows: Vec<String> = (0..50)
        .map(|i| {
            let text = if i % 3 == 0 { "app keeps crashing" } else { "great and fast transfer" };
            format!("r{i},{text},{},2025-05-04,CBE,Google Play", i % 5 + 1)
        })
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();

    let sequential = annotate_csv(dir.path(), &rows, &PipelineConfig::default(), OutputFormat::Csv);
    let mut parallel_config = PipelineConfig::default();
    parallel_config.batch_size = 4;
    parallel_config.workers = 4;
    let parallel = annotate_csv(dir.path(), &rows, &parallel_config, OutputFormat::Csv);
    assert_eq!(sequential, parallel);
}

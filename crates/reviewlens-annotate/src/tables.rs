//! Tabular input and output.
//!
//! Input is the cleaner's CSV (`review_id, review, rating, date, bank,
//! source`). Output is one file per table, written atomically: every table
//! goes to a temporary file in the target directory first and the temporary
//! files are renamed only once all of them were written, so a failed run
//! never leaves a partial table behind.

use chrono::NaiveDate;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{AnnotateError, Result};
use crate::pipeline::PipelineOutput;
use crate::record::{BankRegistry, ReviewRecord};

pub const INPUT_COLUMNS: [&str; 6] = ["review_id", "review", "rating", "date", "bank", "source"];

pub const REVIEWS_TABLE: &str = "reviews_with_sentiment";
pub const SENTIMENT_SUMMARY_TABLE: &str = "sentiment_summary";
pub const THEME_SUMMARY_TABLE: &str = "theme_summary";
pub const BANK_KEYWORDS_TABLE: &str = "bank_keywords";

const FLOAT_PRECISION: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Csv,
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = AnnotateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "json" => Ok(OutputFormat::Json),
            other => Err(AnnotateError::Configuration(format!(
                "unknown output format '{other}' (expected csv or json)"
            ))),
        }
    }
}

// ============================================================================
// Input
// ============================================================================

/// Read and validate the cleaned review table. Any bad row fails the whole
/// read.
pub fn read_reviews_csv(path: &Path, banks: &BankRegistry) -> Result<Vec<ReviewRecord>> {
    // Flexible so short rows reach `cell` and are reported by column.
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader
        .headers()
        .map_err(|e| AnnotateError::Schema(format!("{}: unreadable header: {e}", path.display())))?
        .clone();

    let mut index = [0usize; 6];
    for (slot, column) in index.iter_mut().zip(INPUT_COLUMNS) {
        *slot = headers
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| {
                AnnotateError::Schema(format!(
                    "{}: missing required column '{column}'",
                    path.display()
                ))
            })?;
    }

    let mut records = Vec::new();
    for (offset, result) in reader.byte_records().enumerate() {
        let raw = result?;
        let row = offset + 1;

        let rating: u8 = cell(&raw, &index, row, 2)?
            .trim()
            .parse()
            .map_err(|_| schema_at(row, "rating", "not an integer"))?;
        let date = parse_date(cell(&raw, &index, row, 3)?)
            .ok_or_else(|| schema_at(row, "date", "not a date"))?;
        let bank_raw = cell(&raw, &index, row, 4)?;
        let bank = banks
            .resolve(bank_raw)
            .ok_or_else(|| schema_at(row, "bank", &format!("unknown bank '{bank_raw}'")))?;

        let record = ReviewRecord::new(
            cell(&raw, &index, row, 0)?.trim(),
            cell(&raw, &index, row, 1)?,
            rating,
            date,
            bank,
            cell(&raw, &index, row, 5)?.trim(),
        )
        .map_err(|err| match err {
            AnnotateError::Schema(msg) => AnnotateError::Schema(format!("row {row}: {msg}")),
            other => other,
        })?;
        records.push(record);
    }

    info!(path = %path.display(), rows = records.len(), "review table loaded");
    Ok(records)
}

/// Value of input column `col`. The review text only has to be non-empty;
/// whitespace-only text is left for the sentiment pass to reject.
fn cell<'r>(raw: &'r csv::ByteRecord, index: &[usize; 6], row: usize, col: usize) -> Result<&'r str> {
    let column = INPUT_COLUMNS[col];
    let bytes = raw
        .get(index[col])
        .ok_or_else(|| schema_at(row, column, "missing value"))?;
    let value = std::str::from_utf8(bytes).map_err(|_| schema_at(row, column, "invalid UTF-8"))?;
    let blank = if col == 1 {
        value.is_empty()
    } else {
        value.trim().is_empty()
    };
    if blank {
        return Err(schema_at(row, column, "empty value"));
    }
    Ok(value)
}

fn schema_at(row: usize, column: &str, problem: &str) -> AnnotateError {
    AnnotateError::Schema(format!("row {row}, column '{column}': {problem}"))
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

// ============================================================================
// Output
// ============================================================================

#[derive(Serialize)]
struct ReviewRow<'a> {
    review_id: &'a str,
    review: &'a str,
    rating: u8,
    date: NaiveDate,
    bank: &'a str,
    source: &'a str,
    sentiment_label: &'static str,
    sentiment_score: f64,
    positive_score: f64,
    negative_score: f64,
    themes: &'a [String],
}

/// Write all output tables into `dir`. Returns the final paths.
pub fn write_outputs(dir: &Path, output: &PipelineOutput, format: OutputFormat) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let tables = match format {
        OutputFormat::Csv => vec![
            (REVIEWS_TABLE, "csv", reviews_csv(output)?),
            (SENTIMENT_SUMMARY_TABLE, "csv", sentiment_csv(output)?),
            (THEME_SUMMARY_TABLE, "csv", themes_csv(output)?),
            (BANK_KEYWORDS_TABLE, "json", to_json(&output.bank_keywords)?),
        ],
        OutputFormat::Json => vec![
            (REVIEWS_TABLE, "json", to_json(&review_rows(output))?),
            (SENTIMENT_SUMMARY_TABLE, "json", to_json(&output.sentiment_summary)?),
            (THEME_SUMMARY_TABLE, "json", to_json(&output.theme_summary)?),
            (BANK_KEYWORDS_TABLE, "json", to_json(&output.bank_keywords)?),
        ],
    };

    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(tables.len());
    for (name, ext, contents) in tables {
        let target = dir.join(format!("{name}.{ext}"));
        let temp = dir.join(format!(".{name}.{ext}.tmp"));
        if let Err(err) = fs::write(&temp, contents) {
            discard(&staged);
            let _ = fs::remove_file(&temp);
            return Err(err.into());
        }
        debug!(table = name, path = %temp.display(), "table staged");
        staged.push((temp, target));
    }

    let mut written = Vec::with_capacity(staged.len());
    for (i, (temp, target)) in staged.iter().enumerate() {
        if let Err(err) = fs::rename(temp, target) {
            discard(&staged[i..]);
            return Err(err.into());
        }
        written.push(target.clone());
    }
    Ok(written)
}

fn discard(staged: &[(PathBuf, PathBuf)]) {
    for (temp, _) in staged {
        let _ = fs::remove_file(temp);
    }
}

fn review_rows(output: &PipelineOutput) -> Vec<ReviewRow<'_>> {
    output
        .reviews
        .iter()
        .map(|r| ReviewRow {
            review_id: &r.record.id,
            review: &r.record.text,
            rating: r.record.rating,
            date: r.record.date,
            bank: r.record.bank.as_str(),
            source: &r.record.source,
            sentiment_label: r.sentiment.label.as_str(),
            sentiment_score: r.sentiment.score,
            positive_score: r.sentiment.positive_probability,
            negative_score: r.sentiment.negative_probability,
            themes: &r.themes,
        })
        .collect()
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn fixed(value: f64) -> String {
    format!("{value:.prec$}", prec = FLOAT_PRECISION)
}

fn csv_bytes<I>(header: &[&str], rows: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    writer
        .into_inner()
        .map_err(|e| AnnotateError::Io(e.into_error()))
}

fn reviews_csv(output: &PipelineOutput) -> Result<Vec<u8>> {
    let rows = review_rows(output)
        .into_iter()
        .map(|r| {
            Ok(vec![
                r.review_id.to_string(),
                r.review.to_string(),
                r.rating.to_string(),
                r.date.format("%Y-%m-%d").to_string(),
                r.bank.to_string(),
                r.source.to_string(),
                r.sentiment_label.to_string(),
                fixed(r.sentiment_score),
                fixed(r.positive_score),
                fixed(r.negative_score),
                serde_json::to_string(r.themes)?,
            ])
        })
        .collect::<Result<Vec<_>>>()?;
    csv_bytes(
        &[
            "review_id",
            "review",
            "rating",
            "date",
            "bank",
            "source",
            "sentiment_label",
            "sentiment_score",
            "positive_score",
            "negative_score",
            "themes",
        ],
        rows,
    )
}

fn sentiment_csv(output: &PipelineOutput) -> Result<Vec<u8>> {
    let rows = output.sentiment_summary.iter().map(|r| {
        vec![
            r.bank.to_string(),
            r.rating.to_string(),
            fixed(r.mean_sentiment),
            fixed(r.positive_share),
            fixed(r.negative_share),
            r.review_count.to_string(),
            fixed(r.mean_polarity),
        ]
    });
    csv_bytes(
        &[
            "bank",
            "rating",
            "mean_sentiment",
            "positive_share",
            "negative_share",
            "review_count",
            "mean_polarity",
        ],
        rows,
    )
}

fn themes_csv(output: &PipelineOutput) -> Result<Vec<u8>> {
    let rows = output
        .theme_summary
        .iter()
        .map(|r| {
            Ok(vec![
                r.bank.to_string(),
                r.theme.clone(),
                fixed(r.coverage),
                r.mean_rating.map(fixed).unwrap_or_default(),
                r.review_count.to_string(),
                serde_json::to_string(&r.example_review_ids)?,
                serde_json::to_string(&r.top_keywords)?,
            ])
        })
        .collect::<Result<Vec<_>>>()?;
    csv_bytes(
        &[
            "bank",
            "theme",
            "coverage",
            "mean_rating",
            "review_count",
            "example_review_ids",
            "top_keywords",
        ],
        rows,
    )
}

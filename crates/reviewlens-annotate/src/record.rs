//! Review records and their derived annotations.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::BankConfig;
use crate::error::{AnnotateError, Result};

// ============================================================================
// Banks
// ============================================================================

/// Canonical bank code (one of the configured target identifiers).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bank(String);

impl Bank {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of banks a run accepts.
///
/// Resolves either the short code (`CBE`) or the display name
/// (`Commercial Bank of Ethiopia`) to the canonical [`Bank`].
#[derive(Debug, Clone)]
pub struct BankRegistry {
    banks: Vec<BankConfig>,
}

impl BankRegistry {
    pub fn new(banks: Vec<BankConfig>) -> Result<Self> {
        if banks.is_empty() {
            return Err(AnnotateError::Configuration(
                "bank list must not be empty".to_string(),
            ));
        }
        for (i, bank) in banks.iter().enumerate() {
            if bank.code.trim().is_empty() {
                return Err(AnnotateError::Configuration(format!(
                    "bank #{i} has an empty code"
                )));
            }
            if banks[..i]
                .iter()
                .any(|other| other.code.eq_ignore_ascii_case(&bank.code))
            {
                return Err(AnnotateError::Configuration(format!(
                    "duplicate bank code '{}'",
                    bank.code
                )));
            }
        }
        Ok(Self { banks })
    }

    pub fn resolve(&self, raw: &str) -> Option<Bank> {
        let raw = raw.trim();
        self.banks
            .iter()
            .find(|b| b.code.eq_ignore_ascii_case(raw) || b.name.eq_ignore_ascii_case(raw))
            .map(|b| Bank(b.code.clone()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.banks.iter().map(|b| b.code.as_str())
    }
}

// ============================================================================
// Input records
// ============================================================================

/// A cleaned review, as produced by the upstream cleaner. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: String,
    pub text: String,
    pub rating: u8,
    pub date: NaiveDate,
    pub bank: Bank,
    pub source: String,
}

impl ReviewRecord {
    /// Build a record, checking the invariants the cleaner is supposed to
    /// guarantee. Violations are schema errors.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        rating: u8,
        date: NaiveDate,
        bank: Bank,
        source: impl Into<String>,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(AnnotateError::Schema("review_id must not be empty".into()));
        }
        if !(1..=5).contains(&rating) {
            return Err(AnnotateError::Schema(format!(
                "review '{id}': rating {rating} outside 1-5"
            )));
        }
        Ok(Self {
            id,
            text: text.into(),
            rating,
            date,
            bank,
            source: source.into(),
        })
    }
}

// ============================================================================
// Sentiment
// ============================================================================

/// Binary polarity; there is no neutral class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentLabel {
    Negative,
    Positive,
}

impl SentimentLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            SentimentLabel::Negative => "NEGATIVE",
            SentimentLabel::Positive => "POSITIVE",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class distribution returned by a backend for one text:
/// `[negative, positive]`, assumed already normalized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassScores {
    pub negative: f64,
    pub positive: f64,
}

/// Sentiment judgment for one review.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    /// Probability of the winning label.
    pub score: f64,
    pub positive_probability: f64,
    pub negative_probability: f64,
}

impl SentimentResult {
    /// Argmax over the class distribution. Ties go to the first class in
    /// label order (NEGATIVE).
    pub fn from_scores(scores: ClassScores) -> Self {
        let (label, score) = if scores.positive > scores.negative {
            (SentimentLabel::Positive, scores.positive)
        } else {
            (SentimentLabel::Negative, scores.negative)
        };
        Self {
            label,
            score,
            positive_probability: scores.positive,
            negative_probability: scores.negative,
        }
    }

    /// Signed polarity in [-1, 1].
    pub fn polarity(&self) -> f64 {
        self.positive_probability - self.negative_probability
    }
}

// ============================================================================
// Annotated output
// ============================================================================

/// ReviewRecord + SentimentResult + ThemeAssignment, one per input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedReview {
    pub record: ReviewRecord,
    pub sentiment: SentimentResult,
    /// Matched theme names in theme-table order; never empty.
    pub themes: Vec<String>,
}

impl AnnotatedReview {
    pub fn has_theme(&self, theme: &str) -> bool {
        self.themes.iter().any(|t| t == theme)
    }
}

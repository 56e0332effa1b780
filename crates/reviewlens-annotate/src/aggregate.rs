//! Summary tables derived from the annotated review table.
//!
//! Both tables are pure functions of their inputs; they hold no state of
//! their own and are recomputed wholesale on every run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::keywords::WeightedTerm;
use crate::record::{AnnotatedReview, Bank, SentimentLabel};
use crate::themes::ThemeTable;

/// One row per observed (bank, rating).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSummaryRow {
    pub bank: Bank,
    pub rating: u8,
    /// Mean confidence of the winning label.
    pub mean_sentiment: f64,
    pub positive_share: f64,
    pub negative_share: f64,
    pub review_count: usize,
    /// Mean of `positive_probability - negative_probability`.
    pub mean_polarity: f64,
}

/// One row per (bank, theme) with at least one match, plus the catch-all
/// row for every bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeSummaryRow {
    pub bank: Bank,
    pub theme: String,
    pub coverage: f64,
    /// `None` when no review matched (catch-all only).
    pub mean_rating: Option<f64>,
    pub review_count: usize,
    pub example_review_ids: Vec<String>,
    pub top_keywords: Vec<String>,
}

#[derive(Default)]
struct SentimentAcc {
    count: usize,
    positives: usize,
    score_sum: f64,
    polarity_sum: f64,
}

/// Sorted by (bank, rating).
pub fn sentiment_summary(reviews: &[AnnotatedReview]) -> Vec<SentimentSummaryRow> {
    let mut groups: BTreeMap<(&Bank, u8), SentimentAcc> = BTreeMap::new();
    for review in reviews {
        let acc = groups
            .entry((&review.record.bank, review.record.rating))
            .or_default();
        acc.count += 1;
        if review.sentiment.label == SentimentLabel::Positive {
            acc.positives += 1;
        }
        acc.score_sum += review.sentiment.score;
        acc.polarity_sum += review.sentiment.polarity();
    }

    groups
        .into_iter()
        .map(|((bank, rating), acc)| {
            let n = acc.count as f64;
            SentimentSummaryRow {
                bank: bank.clone(),
                rating,
                mean_sentiment: acc.score_sum / n,
                mean_polarity: acc.polarity_sum / n,
                positive_share: acc.positives as f64 / n,
                negative_share: (acc.count - acc.positives) as f64 / n,
                review_count: acc.count,
            }
        })
        .collect()
}

/// Per-bank theme coverage.
///
/// Rows are ordered by bank, then review count descending, then theme-table
/// order. Examples are the first `max_examples` matching ids in input order.
pub fn theme_summary(
    reviews: &[AnnotatedReview],
    table: &ThemeTable,
    max_examples: usize,
    bank_keywords: &BTreeMap<Bank, Vec<WeightedTerm>>,
    summary_keywords: usize,
) -> Vec<ThemeSummaryRow> {
    let mut by_bank: BTreeMap<&Bank, Vec<&AnnotatedReview>> = BTreeMap::new();
    for review in reviews {
        by_bank.entry(&review.record.bank).or_default().push(review);
    }

    let mut rows = Vec::new();
    for (bank, bank_reviews) in by_bank {
        let total = bank_reviews.len() as f64;
        let top_keywords: Vec<String> = bank_keywords
            .get(bank)
            .map(|terms| {
                terms
                    .iter()
                    .take(summary_keywords)
                    .map(|t| t.term.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut bank_rows = Vec::new();
        for theme in table.names() {
            let matching: Vec<&AnnotatedReview> = bank_reviews
                .iter()
                .copied()
                .filter(|r| r.has_theme(theme))
                .collect();
            if matching.is_empty() && theme != table.catch_all() {
                continue;
            }
            let rating_sum: u32 = matching.iter().map(|r| u32::from(r.record.rating)).sum();
            let mean_rating = if matching.is_empty() {
                None
            } else {
                Some(f64::from(rating_sum) / matching.len() as f64)
            };
            bank_rows.push(ThemeSummaryRow {
                bank: bank.clone(),
                theme: theme.to_string(),
                coverage: matching.len() as f64 / total,
                mean_rating,
                review_count: matching.len(),
                example_review_ids: matching
                    .iter()
                    .take(max_examples)
                    .map(|r| r.record.id.clone())
                    .collect(),
                top_keywords: top_keywords.clone(),
            });
        }
        // Stable: equal counts keep theme-table order.
        bank_rows.sort_by(|a, b| b.review_count.cmp(&a.review_count));
        rows.extend(bank_rows);
    }
    rows
}

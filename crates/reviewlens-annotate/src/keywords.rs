//! Keyword discovery: TF-IDF over unigrams and bigrams.
//!
//! Output is diagnostic input for curating theme keyword tables; nothing in
//! here assigns themes.
//!
//! Weighting:
//! - term counts per document over the capped vocabulary,
//! - smoothed idf `ln((1 + n) / (1 + df)) + 1`,
//! - each document vector L2-normalized,
//! - a term's weight is the sum of its normalized values over the corpus.
//!
//! Documents are ordered maps so float sums run in a fixed order and
//! repeated runs agree to the last bit.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::config::KeywordConfig;
use crate::record::{Bank, ReviewRecord};
use crate::text::{content_tokens, normalize_text};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    max_features: usize,
    ngram_min: usize,
    ngram_max: usize,
    top_k: usize,
}

impl KeywordExtractor {
    pub fn new(config: &KeywordConfig) -> Self {
        Self {
            max_features: config.max_features,
            ngram_min: config.ngram_min,
            ngram_max: config.ngram_max,
            top_k: config.top_k,
        }
    }

    /// Highest-weighted terms of `corpus`, weight descending, ties broken
    /// by the term string.
    pub fn top_keywords<S: AsRef<str>>(&self, corpus: &[S], max_terms: usize) -> Vec<WeightedTerm> {
        let documents: Vec<BTreeMap<String, usize>> =
            corpus.iter().map(|doc| self.term_counts(doc.as_ref())).collect();
        let vocabulary = self.vocabulary(&documents);
        if vocabulary.is_empty() {
            return Vec::new();
        }

        let n = documents.len() as f64;
        let idf: HashMap<&str, f64> = vocabulary
            .iter()
            .map(|term| {
                let df = documents.iter().filter(|d| d.contains_key(term.as_str())).count() as f64;
                (term.as_str(), ((1.0 + n) / (1.0 + df)).ln() + 1.0)
            })
            .collect();

        let mut weights: BTreeMap<&str, f64> = BTreeMap::new();
        for doc in &documents {
            let raw: Vec<(&str, f64)> = doc
                .iter()
                .filter_map(|(term, &count)| {
                    idf.get(term.as_str())
                        .map(|w| (term.as_str(), count as f64 * w))
                })
                .collect();
            let norm = raw.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                continue;
            }
            for (term, value) in raw {
                *weights.entry(term).or_insert(0.0) += value / norm;
            }
        }

        let mut ranked: Vec<WeightedTerm> = weights
            .into_iter()
            .map(|(term, weight)| WeightedTerm {
                term: term.to_string(),
                weight,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        ranked.truncate(max_terms);
        ranked
    }

    /// `top_k` terms per bank, each bank's reviews forming its own corpus.
    pub fn keywords_by_bank(&self, records: &[ReviewRecord]) -> BTreeMap<Bank, Vec<WeightedTerm>> {
        let mut corpora: BTreeMap<Bank, Vec<&str>> = BTreeMap::new();
        for record in records {
            corpora
                .entry(record.bank.clone())
                .or_default()
                .push(record.text.as_str());
        }
        corpora
            .into_iter()
            .map(|(bank, texts)| {
                let terms = self.top_keywords(&texts, self.top_k);
                (bank, terms)
            })
            .collect()
    }

    fn term_counts(&self, text: &str) -> BTreeMap<String, usize> {
        let normalized = normalize_text(text);
        let tokens = content_tokens(&normalized);
        let mut counts = BTreeMap::new();
        for n in self.ngram_min..=self.ngram_max {
            if n == 0 || tokens.len() < n {
                continue;
            }
            for window in tokens.windows(n) {
                *counts.entry(window.join(" ")).or_insert(0) += 1;
            }
        }
        counts
    }

    /// The `max_features` most frequent terms across the corpus.
    fn vocabulary(&self, documents: &[BTreeMap<String, usize>]) -> Vec<String> {
        let mut totals: HashMap<&str, usize> = HashMap::new();
        for doc in documents {
            for (term, count) in doc {
                *totals.entry(term.as_str()).or_insert(0) += count;
            }
        }
        let mut terms: Vec<(&str, usize)> = totals.into_iter().collect();
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        terms.truncate(self.max_features);
        terms.into_iter().map(|(term, _)| term.to_string()).collect()
    }
}

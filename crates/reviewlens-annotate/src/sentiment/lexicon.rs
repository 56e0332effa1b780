//! Built-in lexicon classifier.
//!
//! Scores a review by summing word valences, flipping the sign of a word
//! that follows a negation (within a short window) and scaling it by a
//! preceding intensifier. The summed valence is mapped to a two-class
//! distribution with a logistic curve, so the output has the same shape as
//! a pretrained binary classifier's softmax.
//!
//! An extension file (TOML) can add or override entries:
//!
//! ```toml
//! negations = ["aint"]
//!
//! [words]
//! telebirr = 0.4
//!
//! [intensifiers]
//! super = 1.6
//! ```

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::SentimentModel;
use crate::error::ModelError;
use crate::record::ClassScores;
use crate::text::normalize_text;

/// Logistic slope applied to the summed valence.
const STEEPNESS: f64 = 2.0;

/// Tokens a negation stays active for.
const NEGATION_WINDOW: usize = 3;

const SUFFIXES: &[&str] = &["ing", "ed", "es", "s", "ly"];

#[derive(Debug, Clone)]
pub struct LexiconModel {
    words: HashMap<String, f64>,
    negations: HashSet<String>,
    intensifiers: HashMap<String, f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LexiconExtension {
    words: HashMap<String, f64>,
    negations: Vec<String>,
    intensifiers: HashMap<String, f64>,
}

impl Default for LexiconModel {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconModel {
    pub fn new() -> Self {
        let positive = [
            ("good", 0.6),
            ("great", 0.8),
            ("excellent", 0.9),
            ("best", 0.8),
            ("nice", 0.6),
            ("easy", 0.6),
            ("fast", 0.6),
            ("love", 0.8),
            ("like", 0.3),
            ("amazing", 0.9),
            ("awesome", 0.9),
            ("perfect", 0.9),
            ("helpful", 0.6),
            ("smooth", 0.5),
            ("convenient", 0.6),
            ("reliable", 0.6),
            ("secure", 0.5),
            ("simple", 0.4),
            ("satisfied", 0.6),
            ("thank", 0.4),
            ("wow", 0.6),
            ("work", 0.3),
            ("friendly", 0.5),
            ("improve", 0.2),
        ];
        let negative = [
            ("bad", -0.7),
            ("worst", -0.9),
            ("poor", -0.6),
            ("slow", -0.5),
            ("crash", -0.8),
            ("bug", -0.5),
            ("error", -0.5),
            ("fail", -0.7),
            ("freeze", -0.6),
            ("terrible", -0.9),
            ("horrible", -0.9),
            ("useless", -0.8),
            ("annoying", -0.6),
            ("frustrating", -0.7),
            ("disappoint", -0.7),
            ("problem", -0.5),
            ("issue", -0.4),
            ("stuck", -0.6),
            ("hate", -0.8),
            ("waste", -0.7),
            ("broken", -0.7),
            ("difficult", -0.5),
            ("lag", -0.4),
            ("pending", -0.3),
            ("delay", -0.4),
            ("scam", -0.9),
            ("unable", -0.5),
        ];
        let words = positive
            .into_iter()
            .chain(negative)
            .map(|(w, v)| (w.to_string(), v))
            .collect();

        // Contractions lose their apostrophe during normalization ("don't"
        // becomes "don t"), so the stems are listed as well.
        let negations = [
            "not", "no", "never", "nothing", "none", "cannot", "cant", "dont", "don", "doesnt",
            "doesn", "didnt", "didn", "isnt", "isn", "wasnt", "wasn", "wont", "won", "aren",
            "couldn", "wouldn", "hardly", "barely",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let intensifiers = [
            ("very", 1.5),
            ("extremely", 2.0),
            ("really", 1.4),
            ("so", 1.3),
            ("super", 1.6),
            ("too", 1.3),
            ("totally", 1.5),
            ("slightly", 0.5),
            ("somewhat", 0.7),
            ("bit", 0.6),
        ]
        .into_iter()
        .map(|(w, v)| (w.to_string(), v))
        .collect();

        Self {
            words,
            negations,
            intensifiers,
        }
    }

    /// Built-in lexicon with the entries of a TOML extension file merged
    /// over it.
    pub fn with_extension_file(path: &Path) -> Result<Self, ModelError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ModelError::Fatal(format!("cannot read lexicon {}: {e}", path.display()))
        })?;
        let ext: LexiconExtension = toml::from_str(&raw).map_err(|e| {
            ModelError::Fatal(format!("invalid lexicon {}: {e}", path.display()))
        })?;

        let mut model = Self::new();
        for (word, valence) in ext.words {
            if !valence.is_finite() {
                return Err(ModelError::Fatal(format!(
                    "lexicon entry '{word}' has non-finite valence"
                )));
            }
            model.words.insert(normalize_text(&word), valence);
        }
        model
            .negations
            .extend(ext.negations.iter().map(|w| normalize_text(w)));
        for (word, factor) in ext.intensifiers {
            model.intensifiers.insert(normalize_text(&word), factor);
        }
        Ok(model)
    }

    /// Signed valence of a text (0 when nothing matched).
    pub fn valence(&self, text: &str) -> f64 {
        let normalized = normalize_text(text);
        let mut total = 0.0;
        let mut negation_left = 0usize;
        let mut intensity = 1.0;

        for token in normalized.split(' ').filter(|t| !t.is_empty()) {
            if self.negations.contains(token) {
                negation_left = NEGATION_WINDOW;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(token) {
                intensity = *factor;
                continue;
            }
            match self.lookup(token) {
                Some(mut valence) => {
                    if negation_left > 0 {
                        valence = -valence;
                        negation_left = 0;
                    }
                    total += valence * intensity;
                    intensity = 1.0;
                }
                None => {
                    negation_left = negation_left.saturating_sub(1);
                }
            }
        }
        total
    }

    fn lookup(&self, token: &str) -> Option<f64> {
        if let Some(v) = self.words.get(token) {
            return Some(*v);
        }
        SUFFIXES.iter().find_map(|suffix| {
            let stem = token.strip_suffix(suffix)?;
            if stem.len() < 3 {
                return None;
            }
            self.words
                .get(stem)
                .or_else(|| self.words.get(&format!("{stem}e")))
                .copied()
        })
    }

    pub fn scores(&self, text: &str) -> ClassScores {
        let positive = 1.0 / (1.0 + (-STEEPNESS * self.valence(text)).exp());
        ClassScores {
            negative: 1.0 - positive,
            positive,
        }
    }
}

impl SentimentModel for LexiconModel {
    fn name(&self) -> &str {
        "lexicon"
    }

    fn predict_batch(&self, texts: &[String]) -> Result<Vec<ClassScores>, ModelError> {
        Ok(texts.iter().map(|t| self.scores(t)).collect())
    }
}

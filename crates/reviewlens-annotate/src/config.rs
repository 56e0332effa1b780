//! Pipeline configuration.
//!
//! Loaded once at process start (TOML), validated, then treated as
//! immutable for the whole run. Every field has a default so an empty file
//! is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{AnnotateError, Result};

/// Theme tables this build understands.
pub const THEME_TABLE_VERSION: u32 = 1;

pub const DEFAULT_CATCH_ALL: &str = "Other Feedback";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Texts per classifier call.
    pub batch_size: usize,
    /// Worker threads for batched inference (1 = sequential).
    pub workers: usize,
    /// Example review ids kept per theme-summary row.
    pub max_examples: usize,
    pub model: ModelConfig,
    pub retry: RetryConfig,
    pub keywords: KeywordConfig,
    pub banks: Vec<BankConfig>,
    pub themes: ThemeTableConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            workers: 1,
            max_examples: 3,
            model: ModelConfig::default(),
            retry: RetryConfig::default(),
            keywords: KeywordConfig::default(),
            banks: default_banks(),
            themes: ThemeTableConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AnnotateError::Configuration(format!("cannot serialize config: {e}")))
    }

    /// Structural checks. Theme-table checks live in
    /// [`crate::themes::ThemeTable::from_config`], which this calls.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(config_err("batch_size must be at least 1"));
        }
        if self.workers == 0 {
            return Err(config_err("workers must be at least 1"));
        }
        self.keywords.validate()?;
        self.model.validate()?;
        crate::record::BankRegistry::new(self.banks.clone())?;
        crate::themes::ThemeTable::from_config(&self.themes)?;
        Ok(())
    }
}

fn config_err(msg: impl Into<String>) -> AnnotateError {
    AnnotateError::Configuration(msg.into())
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Built-in lexicon classifier.
    Lexicon,
    /// Hosted text-classification endpoint (requires the `http` feature).
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Extra lexicon entries (TOML) merged over the built-in lexicon.
    pub lexicon_path: Option<String>,
    pub endpoint: Option<String>,
    pub load_timeout_ms: u64,
    pub inference_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::Lexicon,
            lexicon_path: None,
            endpoint: None,
            load_timeout_ms: 30_000,
            inference_timeout_ms: 60_000,
        }
    }
}

impl ModelConfig {
    fn validate(&self) -> Result<()> {
        if self.load_timeout_ms == 0 || self.inference_timeout_ms == 0 {
            return Err(config_err("model timeouts must be positive"));
        }
        if self.kind == ModelKind::Http && self.endpoint.as_deref().unwrap_or("").is_empty() {
            return Err(config_err("model.kind = \"http\" requires model.endpoint"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts after the first failed call of a batch.
    pub max_retries: u32,
    /// Backoff before the first retry; doubles each attempt.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: 200,
        }
    }
}

// ============================================================================
// Keyword extraction
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    /// Vocabulary cap.
    pub max_features: usize,
    pub ngram_min: usize,
    pub ngram_max: usize,
    /// Terms reported per bank.
    pub top_k: usize,
    /// Terms copied into each theme-summary row.
    pub summary_keywords: usize,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            max_features: 1000,
            ngram_min: 1,
            ngram_max: 2,
            top_k: 20,
            summary_keywords: 5,
        }
    }
}

impl KeywordConfig {
    fn validate(&self) -> Result<()> {
        if self.max_features == 0 {
            return Err(config_err("keywords.max_features must be at least 1"));
        }
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max || self.ngram_max > 2 {
            return Err(config_err(format!(
                "keywords n-gram span {}..={} unsupported (unigrams and bigrams only)",
                self.ngram_min, self.ngram_max
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Banks
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankConfig {
    pub code: String,
    pub name: String,
}

pub fn default_banks() -> Vec<BankConfig> {
    [
        ("CBE", "Commercial Bank of Ethiopia"),
        ("BOA", "Bank of Abyssinia"),
        ("DASHEN", "Dashen Bank"),
    ]
    .into_iter()
    .map(|(code, name)| BankConfig {
        code: code.to_string(),
        name: name.to_string(),
    })
    .collect()
}

// ============================================================================
// Theme table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeTableConfig {
    pub version: u32,
    pub catch_all: String,
    pub themes: Vec<ThemeEntry>,
}

impl Default for ThemeTableConfig {
    fn default() -> Self {
        let entry = |name: &str, keywords: &[&str]| ThemeEntry {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        };
        Self {
            version: THEME_TABLE_VERSION,
            catch_all: DEFAULT_CATCH_ALL.to_string(),
            themes: vec![
                entry(
                    "Account Access Issues",
                    &[
                        "login", "pin", "otp", "password", "credential", "account",
                        "activation", "access", "authenticate",
                    ],
                ),
                entry(
                    "Transaction Performance",
                    &[
                        "transfer", "pending", "delay", "slow", "failed", "processing",
                        "transaction", "speed", "loading",
                    ],
                ),
                entry(
                    "User Interface & Experience",
                    &[
                        "ui", "interface", "design", "navigation", "layout", "experience",
                        "user-friendly", "screen",
                    ],
                ),
                entry(
                    "Reliability & Stability",
                    &[
                        "crash", "error", "bug", "freeze", "lag", "issue", "stability",
                        "reliable",
                    ],
                ),
                entry(
                    "Customer Support & Communication",
                    &[
                        "support", "service", "help", "respond", "call", "branch", "customer",
                        "care", "contact",
                    ],
                ),
                entry(
                    "Feature Requests",
                    &[
                        "feature", "add", "need", "would like", "option", "card", "request",
                        "suggestion", "improve",
                    ],
                ),
            ],
        }
    }
}

//! Rule-based multi-label theme tagging.
//!
//! A theme table is an ordered list of rules. Each named theme matches when
//! any of its keywords occurs as a substring of the normalized review text;
//! the catch-all is the last rule and matches exactly when nothing before it
//! did. Rules are evaluated uniformly, one after another, so the classifier
//! has no special-cased fallback branch.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::{ThemeTableConfig, THEME_TABLE_VERSION};
use crate::error::{AnnotateError, Result};
use crate::text::normalize_text;

/// A named theme and its keyword set (normalized, deduplicated, sorted).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeDefinition {
    pub name: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Any keyword is a substring of the normalized text.
    AnyKeyword(Vec<String>),
    /// No earlier rule matched.
    NoPriorMatch,
}

impl Matcher {
    fn matches(&self, normalized: &str, matched_so_far: bool) -> bool {
        match self {
            Matcher::AnyKeyword(keywords) => keywords.iter().any(|k| normalized.contains(k.as_str())),
            Matcher::NoPriorMatch => !matched_so_far,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeRule {
    pub theme: String,
    pub matcher: Matcher,
}

/// Validated, immutable theme table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeTable {
    version: u32,
    definitions: Vec<ThemeDefinition>,
    catch_all: String,
    rules: Vec<ThemeRule>,
}

impl ThemeTable {
    pub fn from_config(config: &ThemeTableConfig) -> Result<Self> {
        if config.version != THEME_TABLE_VERSION {
            return Err(AnnotateError::Configuration(format!(
                "theme table version {} unsupported (expected {})",
                config.version, THEME_TABLE_VERSION
            )));
        }
        let catch_all = config.catch_all.trim().to_string();
        if catch_all.is_empty() {
            return Err(AnnotateError::Configuration(
                "catch-all theme name must not be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut definitions = Vec::with_capacity(config.themes.len());
        for entry in &config.themes {
            let name = entry.name.trim().to_string();
            if name.is_empty() {
                return Err(AnnotateError::Configuration(
                    "theme name must not be empty".to_string(),
                ));
            }
            if name == catch_all {
                return Err(AnnotateError::Configuration(format!(
                    "theme '{name}' collides with the catch-all name"
                )));
            }
            if !seen.insert(name.clone()) {
                return Err(AnnotateError::Configuration(format!(
                    "duplicate theme name '{name}'"
                )));
            }
            if entry.keywords.is_empty() {
                return Err(AnnotateError::Configuration(format!(
                    "theme '{name}' has an empty keyword set"
                )));
            }

            let mut keywords = Vec::with_capacity(entry.keywords.len());
            for raw in &entry.keywords {
                let keyword = normalize_text(raw);
                if keyword.is_empty() {
                    return Err(AnnotateError::Configuration(format!(
                        "theme '{name}': keyword '{raw}' is empty after normalization"
                    )));
                }
                keywords.push(keyword);
            }
            keywords.sort();
            keywords.dedup();
            definitions.push(ThemeDefinition { name, keywords });
        }

        let mut rules: Vec<ThemeRule> = definitions
            .iter()
            .map(|d| ThemeRule {
                theme: d.name.clone(),
                matcher: Matcher::AnyKeyword(d.keywords.clone()),
            })
            .collect();
        rules.push(ThemeRule {
            theme: catch_all.clone(),
            matcher: Matcher::NoPriorMatch,
        });

        Ok(Self {
            version: config.version,
            definitions,
            catch_all,
            rules,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn definitions(&self) -> &[ThemeDefinition] {
        &self.definitions
    }

    pub fn catch_all(&self) -> &str {
        &self.catch_all
    }

    pub fn rules(&self) -> &[ThemeRule] {
        &self.rules
    }

    /// All theme names in table order, catch-all last.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.theme.as_str())
    }
}

/// Pure function of (text, theme table).
#[derive(Debug, Clone)]
pub struct ThemeClassifier {
    table: ThemeTable,
}

impl ThemeClassifier {
    pub fn new(table: ThemeTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ThemeTable {
        &self.table
    }

    /// Matched theme names in table order. Never empty.
    pub fn classify(&self, text: &str) -> Vec<String> {
        classify(text, &self.table)
    }

    /// Classify many texts concurrently; output is aligned with input.
    pub fn classify_all<S: AsRef<str> + Sync>(&self, texts: &[S]) -> Vec<Vec<String>> {
        texts.par_iter().map(|t| self.classify(t.as_ref())).collect()
    }
}

pub fn classify(text: &str, table: &ThemeTable) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut matched = Vec::new();
    for rule in table.rules() {
        if rule.matcher.matches(&normalized, !matched.is_empty()) {
            matched.push(rule.theme.clone());
        }
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThemeEntry;
    use proptest::prelude::*;

    fn table() -> ThemeTable {
        ThemeTable::from_config(&ThemeTableConfig::default()).unwrap()
    }

    fn config_with(themes: Vec<(&str, Vec<&str>)>) -> ThemeTableConfig {
        ThemeTableConfig {
            version: THEME_TABLE_VERSION,
            catch_all: "Other".to_string(),
            themes: themes
                .into_iter()
                .map(|(name, kws)| ThemeEntry {
                    name: name.to_string(),
                    keywords: kws.into_iter().map(String::from).collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn crash_review_is_reliability_not_catch_all() {
        let table = ThemeTable::from_config(&config_with(vec![("Reliability", vec!["crash"])])).unwrap();
        assert_eq!(classify("app keeps crashing", &table), vec!["Reliability"]);
    }

    #[test]
    fn feature_request_suppresses_catch_all() {
        let themes = classify("nice app, please add budgeting feature", &table());
        assert!(themes.contains(&"Feature Requests".to_string()));
        assert!(!themes.contains(&"Other Feedback".to_string()));
    }

    #[test]
    fn unmatched_text_gets_exactly_the_catch_all() {
        assert_eq!(classify("xyz abc qwerty", &table()), vec!["Other Feedback"]);
    }

    #[test]
    fn review_can_carry_several_themes() {
        let themes = classify("Login fails and transfer is slow", &table());
        assert_eq!(
            themes,
            vec!["Account Access Issues", "Transaction Performance"]
        );
    }

    #[test]
    fn hyphenated_keywords_match_in_normalized_space() {
        let themes = classify("Very user friendly!", &table());
        assert!(themes.contains(&"User Interface & Experience".to_string()));
    }

    #[test]
    fn duplicate_theme_names_are_rejected() {
        let err = ThemeTable::from_config(&config_with(vec![
            ("A", vec!["x"]),
            ("A", vec!["y"]),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("duplicate theme"));
    }

    #[test]
    fn empty_keyword_set_is_rejected() {
        let err = ThemeTable::from_config(&config_with(vec![("A", vec![])])).unwrap_err();
        assert!(err.to_string().contains("empty keyword set"));
    }

    #[test]
    fn punctuation_only_keyword_is_rejected() {
        let err = ThemeTable::from_config(&config_with(vec![("A", vec!["!!"])])).unwrap_err();
        assert!(matches!(err, AnnotateError::Configuration(_)));
    }

    #[test]
    fn catch_all_collision_is_rejected() {
        let err = ThemeTable::from_config(&config_with(vec![("Other", vec!["x"])])).unwrap_err();
        assert!(err.to_string().contains("catch-all"));
    }

    #[test]
    fn catch_all_is_the_final_rule() {
        let table = table();
        let last = table.rules().last().unwrap();
        assert_eq!(last.theme, "Other Feedback");
        assert_eq!(last.matcher, Matcher::NoPriorMatch);
    }

    #[test]
    fn classify_all_preserves_input_order() {
        let classifier = ThemeClassifier::new(table());
        let texts = ["xyz", "crash again", "pin reset"];
        let out = classifier.classify_all(&texts);
        assert_eq!(out[0], vec!["Other Feedback"]);
        assert_eq!(out[1], vec!["Reliability & Stability"]);
        assert_eq!(out[2], vec!["Account Access Issues"]);
    }

    proptest! {
        #[test]
        fn every_text_gets_at_least_one_theme(text in ".{0,80}") {
            prop_assert!(!classify(&text, &table()).is_empty());
        }

        #[test]
        fn classify_is_pure(text in "[a-zA-Z ,.!]{0,80}") {
            let table = table();
            prop_assert_eq!(classify(&text, &table), classify(&text, &table));
        }

        #[test]
        fn contained_keyword_implies_theme(prefix in "[a-z ]{0,20}", suffix in "[a-z ]{0,20}") {
            let text = format!("{prefix} crash {suffix}");
            let themes = classify(&text, &table());
            prop_assert!(themes.contains(&"Reliability & Stability".to_string()));
            prop_assert!(!themes.contains(&"Other Feedback".to_string()));
        }
    }
}

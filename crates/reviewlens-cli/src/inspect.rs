//! `reviewlens keywords` and `reviewlens themes ...`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use reviewlens_annotate::themes::Matcher;
use reviewlens_annotate::{
    read_reviews_csv, BankRegistry, KeywordExtractor, PipelineConfig, ThemeClassifier, ThemeTable,
};

#[derive(Args)]
pub struct KeywordsArgs {
    /// Cleaned review table (CSV).
    #[arg(short, long)]
    input: PathBuf,

    /// Terms per bank (defaults to `keywords.top_k`).
    #[arg(long)]
    top: Option<usize>,

    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
pub struct ClassifyArgs {
    /// Texts to classify.
    #[arg(required = true)]
    texts: Vec<String>,
}

pub fn keywords(config: &PipelineConfig, args: KeywordsArgs) -> Result<()> {
    let banks = BankRegistry::new(config.banks.clone())?;
    let records = read_reviews_csv(&args.input, &banks)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut keyword_config = config.keywords.clone();
    if let Some(top) = args.top {
        keyword_config.top_k = top;
    }
    let by_bank = KeywordExtractor::new(&keyword_config).keywords_by_bank(&records);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&by_bank)?);
        return Ok(());
    }
    for (bank, terms) in &by_bank {
        println!("{}", bank.as_str().bold());
        for term in terms {
            println!("  {:<32} {:.4}", term.term, term.weight);
        }
    }
    Ok(())
}

pub fn themes_check(config: &PipelineConfig) -> Result<()> {
    let table = ThemeTable::from_config(&config.themes)?;
    println!(
        "{} theme table v{} ({} themes + catch-all)",
        "ok".green().bold(),
        table.version(),
        table.definitions().len()
    );
    for rule in table.rules() {
        match &rule.matcher {
            Matcher::AnyKeyword(keywords) => {
                println!("  {:<36} {}", rule.theme.bold(), keywords.join(", "));
            }
            Matcher::NoPriorMatch => {
                println!("  {:<36} {}", rule.theme.bold(), "(no other theme matched)".dimmed());
            }
        }
    }
    Ok(())
}

pub fn themes_classify(config: &PipelineConfig, args: ClassifyArgs) -> Result<()> {
    let classifier = ThemeClassifier::new(ThemeTable::from_config(&config.themes)?);
    for (text, themes) in args.texts.iter().zip(classifier.classify_all(&args.texts)) {
        println!("{}\n  -> {}", text, themes.join(", ").cyan());
    }
    Ok(())
}

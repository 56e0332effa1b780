//! `reviewlens annotate`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use reviewlens_annotate::{
    model_for_config, read_reviews_csv, AnnotationOrchestrator, BankRegistry, CancelToken,
    OutputFormat, PipelineConfig, PipelineOutput, SentimentAnnotator, SentimentLabel,
};

#[derive(Args)]
pub struct AnnotateArgs {
    /// Cleaned review table (CSV).
    #[arg(short, long)]
    input: PathBuf,

    /// Directory for the output tables.
    #[arg(short, long)]
    out_dir: PathBuf,

    /// Output format: csv or json.
    #[arg(long, default_value = "csv")]
    format: String,

    /// Override `batch_size`.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override `workers`.
    #[arg(long)]
    workers: Option<usize>,
}

pub fn run(config: &PipelineConfig, args: AnnotateArgs) -> Result<()> {
    let mut config = config.clone();
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    let format: OutputFormat = args.format.parse()?;

    let cancel = CancelToken::new();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.flag())
        .context("failed to install SIGINT handler")?;

    let banks = BankRegistry::new(config.banks.clone())?;
    let records = read_reviews_csv(&args.input, &banks)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let loader = model_for_config(&config.model)?;
    info!(
        input = %args.input.display(),
        model = %loader.describe(),
        out_dir = %args.out_dir.display(),
        format = format.extension(),
        "starting annotation run"
    );
    let annotator = SentimentAnnotator::load(loader, &config)?;
    let orchestrator = AnnotationOrchestrator::new(&config, annotator)?;
    let output = orchestrator.run_and_emit(&records, &args.out_dir, format, &cancel)?;

    print_report(&output);
    eprintln!(
        "{} {} ({} tables)",
        "wrote".green().bold(),
        args.out_dir.display().to_string().bold(),
        format.extension()
    );
    Ok(())
}

fn print_report(output: &PipelineOutput) {
    let positives = output
        .reviews
        .iter()
        .filter(|r| r.sentiment.label == SentimentLabel::Positive)
        .count();
    println!(
        "{} {} reviews ({} positive, {} negative)",
        "Annotated".green().bold(),
        output.reviews.len(),
        positives.to_string().green(),
        (output.reviews.len() - positives).to_string().red()
    );

    let mut current_bank = None;
    for row in &output.theme_summary {
        if current_bank != Some(&row.bank) {
            println!("\n{}", row.bank.as_str().bold());
            current_bank = Some(&row.bank);
        }
        let mean = row
            .mean_rating
            .map(|m| format!("{m:.2}"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<36} {:>6.1}%  rating {:>4}  n={}",
            row.theme,
            row.coverage * 100.0,
            mean,
            row.review_count
        );
    }
}

//! ReviewLens CLI
//!
//! Thin wrapper over `reviewlens-annotate`:
//! - `annotate`: sentiment + themes + summaries for a cleaned review table
//! - `keywords`: per-bank TF-IDF terms for theme curation
//! - `themes check` / `themes classify`: inspect the theme table
//! - `config init`: write the default configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use reviewlens_annotate::PipelineConfig;

mod annotate;
mod inspect;

#[derive(Parser)]
#[command(name = "reviewlens")]
#[command(author, version, about = "ReviewLens: sentiment and theme annotation for bank app reviews")]
struct Cli {
    /// Pipeline configuration (TOML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Annotate a cleaned review table and write the output tables.
    Annotate(annotate::AnnotateArgs),

    /// Show the top TF-IDF terms per bank.
    Keywords(inspect::KeywordsArgs),

    /// Inspect the theme table.
    Themes {
        #[command(subcommand)]
        command: ThemesCommands,
    },

    /// Configuration helpers.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ThemesCommands {
    /// Validate the theme table and list its rules.
    Check,
    /// Print the themes matched by each text.
    Classify(inspect::ClassifyArgs),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Write the default configuration as TOML.
    Init(ConfigInitArgs),
}

#[derive(Args)]
struct ConfigInitArgs {
    /// Destination file (stdout when omitted).
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Annotate(args) => annotate::run(&load_config(cli.config.as_deref())?, args),
        Commands::Keywords(args) => inspect::keywords(&load_config(cli.config.as_deref())?, args),
        Commands::Themes { command } => {
            let config = load_config(cli.config.as_deref())?;
            match command {
                ThemesCommands::Check => inspect::themes_check(&config),
                ThemesCommands::Classify(args) => inspect::themes_classify(&config, args),
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Init(args) => config_init(args),
        },
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn config_init(args: ConfigInitArgs) -> Result<()> {
    let rendered = PipelineConfig::default().to_toml_string()?;
    match args.out {
        Some(out) => {
            if out.exists() && !args.force {
                anyhow::bail!("{} already exists (use --force to overwrite)", out.display());
            }
            std::fs::write(&out, rendered)
                .with_context(|| format!("failed to write {}", out.display()))?;
            eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

//! routecat command line
//!
//! ## Commands
//!
//! - `routecat categories` - List the configured taxonomy
//! - `routecat classify <TEXT>` - Classify, route and act on one text
//! - `routecat batch --input <FILE>` - Classify one text per line
//! - `routecat evaluate --data <JSONL>` - Score the classifier on labeled data
//!
//! ## Exit Codes
//!
//! - 0: Success
//! - 1: Classification or evaluation failure (including any failed batch item)
//! - 2: Configuration error (pipeline cannot start)

use clap::{Parser, Subcommand};
use routecat_core::api::CategorySummary;
use routecat_core::{ErrorCategory, RoutecatConfig, RoutecatError, Strategy};
use std::path::PathBuf;

mod classify_cmd;
mod evaluate_cmd;

pub use classify_cmd::{BatchArgs, ClassifyArgs, read_texts};
pub use evaluate_cmd::EvaluateArgs;

/// Exit codes for routecat commands
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

/// Confidence-routed text classification
#[derive(Debug, Parser)]
#[command(name = "routecat", version, about)]
pub struct Cli {
    /// Config file (default: $ROUTECAT_CONFIG or ~/.config/routecat/routecat.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override the configured classification strategy
    #[arg(long, global = true, value_name = "prompt|embedding")]
    pub strategy: Option<Strategy>,

    /// Log at info level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered categories in registry order
    Categories(CategoriesArgs),

    /// Classify one text and apply the routing decision
    Classify(ClassifyArgs),

    /// Classify one text per line of a file
    ///
    /// Prints one JSON object per input line, in input order.
    Batch(BatchArgs),

    /// Evaluate the classifier against a labeled JSONL dataset
    Evaluate(EvaluateArgs),
}

#[derive(Debug, Parser)]
pub struct CategoriesArgs {
    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    pub async fn run(self) -> i32 {
        let cfg = match self.load_config() {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Configuration error: {e}");
                return exit_codes::CONFIG_ERROR;
            }
        };

        match self.command {
            Command::Categories(args) => run_categories(&cfg, &args),
            Command::Classify(args) => classify_cmd::run_classify(&cfg, args).await,
            Command::Batch(args) => classify_cmd::run_batch(&cfg, args).await,
            Command::Evaluate(args) => evaluate_cmd::run_evaluate(&cfg, args).await,
        }
    }

    /// Load config from `--config` or the default location, then apply
    /// command-line overrides
    pub fn load_config(&self) -> routecat_core::Result<RoutecatConfig> {
        let mut cfg = match &self.config {
            Some(path) => RoutecatConfig::load_from_path(path)?,
            None => RoutecatConfig::load()?,
        };

        if let Some(strategy) = self.strategy {
            tracing::debug!(strategy = %strategy, "Strategy overridden on the command line");
            cfg.classifier.strategy = strategy;
            cfg.validate()?;
        }

        Ok(cfg)
    }
}

/// Map a pipeline error to the process exit code
pub(crate) fn exit_code_for(err: &RoutecatError) -> i32 {
    match err.category() {
        ErrorCategory::ConfigError => exit_codes::CONFIG_ERROR,
        _ => exit_codes::FAILURE,
    }
}

fn run_categories(cfg: &RoutecatConfig, args: &CategoriesArgs) -> i32 {
    let registry = match cfg.registry() {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return exit_code_for(&e);
        }
    };

    if args.json {
        let summaries: Vec<CategorySummary> = registry.all().iter().map(CategorySummary::from).collect();
        match serde_json::to_string_pretty(&summaries) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize categories: {e}");
                return exit_codes::FAILURE;
            }
        }
        return exit_codes::SUCCESS;
    }

    println!("{:<20} {:<24} {:<12} Description", "Name", "Label", "Parent");
    println!("{}", "-".repeat(72));
    for category in registry.all() {
        println!(
            "{:<20} {:<24} {:<12} {}",
            category.name,
            category.label,
            category.parent.as_deref().unwrap_or("-"),
            category.description
        );
    }
    println!();
    println!(
        "{} categories, fallback '{}', thresholds high={} low={}",
        registry.len(),
        cfg.fallback.category,
        cfg.router.high,
        cfg.router.low
    );
    exit_codes::SUCCESS
}

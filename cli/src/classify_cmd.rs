//! `routecat classify` and `routecat batch`

use crate::{exit_code_for, exit_codes};
use anyhow::Context;
use clap::Parser;
use routecat_core::api::BatchItem;
use routecat_core::{Pipeline, PipelineOutcome, RoutecatConfig};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
pub struct ClassifyArgs {
    /// Text to classify
    #[arg(value_name = "TEXT")]
    pub text: String,

    /// Output as JSON for automation
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct BatchArgs {
    /// File with one text per line (blank lines are skipped)
    #[arg(long, short, value_name = "FILE")]
    pub input: PathBuf,

    /// Abort on the first failed item instead of reporting it inline
    #[arg(long)]
    pub fail_fast: bool,
}

async fn start_pipeline(cfg: &RoutecatConfig) -> Result<Pipeline, i32> {
    Pipeline::from_config(cfg).await.map_err(|e| {
        eprintln!("Failed to start pipeline: {e}");
        exit_code_for(&e)
    })
}

pub async fn run_classify(cfg: &RoutecatConfig, args: ClassifyArgs) -> i32 {
    let pipeline = match start_pipeline(cfg).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let outcome = match pipeline.process(&args.text).await {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("Classification failed [{}]: {e}", e.category());
            return exit_code_for(&e);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Failed to serialize result: {e}");
                return exit_codes::FAILURE;
            }
        }
    } else {
        print_outcome(&outcome);
    }
    exit_codes::SUCCESS
}

fn print_outcome(outcome: &PipelineOutcome) {
    let result = &outcome.result;
    println!("Category:   {}", result.category);
    println!("Confidence: {:.3}", result.confidence);
    if let (Some(category), Some(confidence)) = (result.secondary_category(), result.secondary_confidence()) {
        println!("Runner-up:  {category} ({confidence:.3})");
    }
    println!("Reasoning:  {}", result.reasoning);
    println!("Decision:   {}", outcome.decision);
    match outcome.action.review_id() {
        Some(id) => println!("Action:     {} -> {} (review {id})", outcome.action.as_str(), outcome.action.category()),
        None => println!("Action:     {} -> {}", outcome.action.as_str(), outcome.action.category()),
    }
}

pub async fn run_batch(cfg: &RoutecatConfig, args: BatchArgs) -> i32 {
    let texts = match read_texts(&args.input) {
        Ok(texts) => texts,
        Err(e) => {
            eprintln!("{e:#}");
            return exit_codes::FAILURE;
        }
    };
    let pipeline = match start_pipeline(cfg).await {
        Ok(p) => p,
        Err(code) => return code,
    };

    let items: Vec<BatchItem> = if args.fail_fast {
        match pipeline.try_classify_batch(&texts).await {
            Ok(results) => results.into_iter().map(|r| BatchItem::from(Ok(r))).collect(),
            Err(e) => {
                eprintln!("Batch aborted [{}]: {e}", e.category());
                return exit_code_for(&e);
            }
        }
    } else {
        pipeline
            .classify_batch(&texts)
            .await
            .into_iter()
            .map(BatchItem::from)
            .collect()
    };

    let mut failed = 0;
    for item in &items {
        if item.is_error() {
            failed += 1;
        }
        match serde_json::to_string(item) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                eprintln!("Failed to serialize result: {e}");
                return exit_codes::FAILURE;
            }
        }
    }

    if failed > 0 {
        eprintln!("{failed} of {} items failed", items.len());
        exit_codes::FAILURE
    } else {
        exit_codes::SUCCESS
    }
}

/// Read one text per non-blank line
pub fn read_texts(path: &Path) -> anyhow::Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read batch input {}", path.display()))?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}

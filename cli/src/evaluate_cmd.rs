//! `routecat evaluate`

use crate::{exit_code_for, exit_codes};
use anyhow::Context;
use clap::Parser;
use routecat_core::evaluator::DatasetEvaluation;
use routecat_core::{Pipeline, RoutecatConfig, TrainingDataset, evaluate_dataset};
use std::path::PathBuf;

#[derive(Debug, Parser)]
pub struct EvaluateArgs {
    /// Labeled data, one {"text", "category"} object per line
    #[arg(long, value_name = "JSONL")]
    pub data: PathBuf,

    /// Also write the report as JSON to this path
    #[arg(long, short, value_name = "REPORT.json")]
    pub output: Option<PathBuf>,

    /// Evaluate human-verified labels only (skip silver labels)
    #[arg(long)]
    pub human_only: bool,

    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub async fn run_evaluate(cfg: &RoutecatConfig, args: EvaluateArgs) -> i32 {
    let mut dataset = match TrainingDataset::load_jsonl(&args.data) {
        Ok(dataset) => dataset,
        Err(e) => {
            eprintln!("{e}");
            return exit_codes::FAILURE;
        }
    };

    let pipeline = match Pipeline::from_config(cfg).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to start pipeline: {e}");
            return exit_code_for(&e);
        }
    };

    if let Err(e) = dataset.validate_against(pipeline.registry()) {
        eprintln!("{e}");
        return exit_codes::FAILURE;
    }
    if args.human_only {
        dataset = dataset.human_labeled();
    }
    dataset = dataset.with_registry_categories(pipeline.registry());

    let evaluation = match evaluate_dataset(pipeline.classifier(), &dataset, &dataset.categories).await {
        Ok(evaluation) => evaluation,
        Err(e) => {
            eprintln!("Evaluation failed [{}]: {e}", e.category());
            return exit_code_for(&e);
        }
    };

    if let Some(path) = &args.output {
        if let Err(e) = evaluation.report.save_json(path) {
            eprintln!("{e}");
            return exit_codes::FAILURE;
        }
    }

    if let Err(e) = print_evaluation(&evaluation, args.json) {
        eprintln!("{e:#}");
        return exit_codes::FAILURE;
    }
    exit_codes::SUCCESS
}

fn print_evaluation(evaluation: &DatasetEvaluation, json: bool) -> anyhow::Result<()> {
    if json {
        let out = serde_json::to_string_pretty(evaluation).context("failed to serialize evaluation")?;
        println!("{out}");
        return Ok(());
    }

    println!("{}", evaluation.report.format_table());
    if !evaluation.failures.is_empty() {
        println!();
        println!("{} examples failed to classify:", evaluation.failures.len());
        for failure in &evaluation.failures {
            println!("  #{:<5} {} {}", failure.index, failure.code, failure.message);
        }
    }
    Ok(())
}

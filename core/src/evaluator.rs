//! Offline classifier evaluation
//!
//! Compares predictions against ground-truth labels over a fixed category
//! axis. The axis order is the caller's (normally registry order) and is used
//! as-is for confusion-matrix rows and columns, so reports diff cleanly
//! across runs.

use crate::classifier::{ClassificationResult, Classifier};
use crate::dataset::TrainingDataset;
use crate::errors::{Result, RoutecatError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::path::Path;

/// Misclassified records kept per report (the first ones in input order)
pub const MISCLASSIFIED_CAP: usize = 20;

/// Precision, recall and F1 for one category
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of ground-truth items with this label
    pub support: usize,
}

/// One wrong prediction, for manual error review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Misclassification {
    /// Position in the evaluated input
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub predicted: String,
    pub actual: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Evaluation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierEvaluation {
    /// Category axis, in matrix order
    pub categories: Vec<String>,
    pub total: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub macro_f1: f64,
    pub weighted_precision: f64,
    pub weighted_recall: f64,
    pub weighted_f1: f64,
    pub per_category: BTreeMap<String, CategoryMetrics>,
    /// `confusion_matrix[predicted][actual]`: one row per predicted
    /// category, one column per actual category, both in axis order
    pub confusion_matrix: Vec<Vec<usize>>,
    pub misclassified_examples: Vec<Misclassification>,
}

/// Score `predictions` against `ground_truth` over `categories`
///
/// Fails with `ShapeError` when the two sequences differ in length, when the
/// axis repeats a name, or when any predicted or actual label is missing
/// from the axis.
pub fn evaluate<S: AsRef<str>>(
    predictions: &[ClassificationResult],
    ground_truth: &[S],
    categories: &[String],
) -> Result<ClassifierEvaluation> {
    evaluate_inner(predictions, ground_truth, None, categories)
}

fn evaluate_inner<S: AsRef<str>>(
    predictions: &[ClassificationResult],
    ground_truth: &[S],
    texts: Option<&[&str]>,
    categories: &[String],
) -> Result<ClassifierEvaluation> {
    if predictions.len() != ground_truth.len() {
        return Err(RoutecatError::shape(format!(
            "{} predictions for {} ground-truth labels",
            predictions.len(),
            ground_truth.len()
        )));
    }

    let mut axis: HashMap<&str, usize> = HashMap::with_capacity(categories.len());
    for (i, name) in categories.iter().enumerate() {
        if axis.insert(name.as_str(), i).is_some() {
            return Err(RoutecatError::shape(format!(
                "category '{name}' appears twice on the evaluation axis"
            )));
        }
    }
    let position = |label: &str, role: &str| -> Result<usize> {
        axis.get(label).copied().ok_or_else(|| {
            RoutecatError::shape(format!("{role} label '{label}' is not on the evaluation axis"))
        })
    };

    let n = categories.len();
    let mut matrix = vec![vec![0_usize; n]; n];
    let mut misclassified = Vec::new();
    let mut correct = 0;

    for (i, (prediction, actual)) in predictions.iter().zip(ground_truth).enumerate() {
        let actual = actual.as_ref();
        let row = position(prediction.category.as_str(), "predicted")?;
        let col = position(actual, "actual")?;
        matrix[row][col] += 1;

        if row == col {
            correct += 1;
        } else if misclassified.len() < MISCLASSIFIED_CAP {
            misclassified.push(Misclassification {
                index: i,
                text: texts.and_then(|t| t.get(i)).map(|s| (*s).to_string()),
                predicted: prediction.category.clone(),
                actual: actual.to_string(),
                confidence: prediction.confidence,
                reasoning: prediction.reasoning.clone(),
            });
        }
    }

    let total = predictions.len();
    let mut per_category = BTreeMap::new();
    let mut rows = Vec::with_capacity(n);
    for (k, name) in categories.iter().enumerate() {
        let tp = matrix[k][k];
        let predicted: usize = matrix[k].iter().sum();
        let support: usize = matrix.iter().map(|row| row[k]).sum();

        let precision = ratio(tp, predicted);
        let recall = ratio(tp, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        let metrics = CategoryMetrics {
            precision,
            recall,
            f1,
            support,
        };
        rows.push(metrics);
        per_category.insert(name.clone(), metrics);
    }

    let macro_avg = |f: fn(&CategoryMetrics) -> f64| {
        if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(f).sum::<f64>() / rows.len() as f64
        }
    };
    let weighted_avg = |f: fn(&CategoryMetrics) -> f64| {
        if total == 0 {
            0.0
        } else {
            rows.iter().map(|m| f(m) * m.support as f64).sum::<f64>() / total as f64
        }
    };

    let report = ClassifierEvaluation {
        categories: categories.to_vec(),
        total,
        correct,
        accuracy: ratio(correct, total),
        macro_precision: macro_avg(|m| m.precision),
        macro_recall: macro_avg(|m| m.recall),
        macro_f1: macro_avg(|m| m.f1),
        weighted_precision: weighted_avg(|m| m.precision),
        weighted_recall: weighted_avg(|m| m.recall),
        weighted_f1: weighted_avg(|m| m.f1),
        per_category,
        confusion_matrix: matrix,
        misclassified_examples: misclassified,
    };

    tracing::info!(
        total,
        correct,
        accuracy = report.accuracy,
        macro_f1 = report.macro_f1,
        "Evaluation complete"
    );

    Ok(report)
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

impl ClassifierEvaluation {
    pub fn summary(&self) -> String {
        format!(
            "Accuracy {:.3} ({}/{}), macro F1 {:.3}, weighted F1 {:.3}",
            self.accuracy, self.correct, self.total, self.macro_f1, self.weighted_f1
        )
    }

    /// Human-readable report: per-category metrics, then the confusion matrix
    pub fn format_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<24} {:>9} {:>9} {:>9} {:>8}",
            "Category", "Precision", "Recall", "F1", "Support"
        );
        out.push_str(&"-".repeat(63));
        out.push('\n');

        for name in &self.categories {
            if let Some(m) = self.per_category.get(name) {
                let _ = writeln!(
                    out,
                    "{:<24} {:>9.3} {:>9.3} {:>9.3} {:>8}",
                    truncate(name, 24),
                    m.precision,
                    m.recall,
                    m.f1,
                    m.support
                );
            }
        }

        out.push_str(&"-".repeat(63));
        out.push('\n');
        let _ = writeln!(
            out,
            "{:<24} {:>9.3} {:>9.3} {:>9.3} {:>8}",
            "macro avg", self.macro_precision, self.macro_recall, self.macro_f1, self.total
        );
        let _ = writeln!(
            out,
            "{:<24} {:>9.3} {:>9.3} {:>9.3} {:>8}",
            "weighted avg", self.weighted_precision, self.weighted_recall, self.weighted_f1, self.total
        );

        out.push_str("\nConfusion matrix (rows = predicted, columns = actual)\n");
        let _ = write!(out, "{:<16}", "");
        for name in &self.categories {
            let _ = write!(out, " {:>10}", truncate(name, 10));
        }
        out.push('\n');
        for (name, row) in self.categories.iter().zip(&self.confusion_matrix) {
            let _ = write!(out, "{:<16}", truncate(name, 16));
            for count in row {
                let _ = write!(out, " {count:>10}");
            }
            out.push('\n');
        }

        if !self.misclassified_examples.is_empty() {
            let _ = writeln!(
                out,
                "\nMisclassified (first {} of {})",
                self.misclassified_examples.len(),
                self.total - self.correct
            );
            for m in &self.misclassified_examples {
                let _ = writeln!(
                    out,
                    "  #{:<5} actual={} predicted={} ({:.2})",
                    m.index, m.actual, m.predicted, m.confidence
                );
            }
        }

        out.push('\n');
        out.push_str(&self.summary());
        out
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RoutecatError::internal(format!("Failed to serialize evaluation: {e}")))
    }

    /// Write the report as a single JSON document
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| {
            RoutecatError::dataset_with_source(
                format!("Failed to write evaluation report: {}", path.display()),
                e,
            )
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dataset evaluation
// ─────────────────────────────────────────────────────────────────────────────

/// A dataset item the classifier could not classify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub index: usize,
    pub text: String,
    pub code: String,
    pub message: String,
}

/// Report over the items that classified, plus the items that failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEvaluation {
    pub report: ClassifierEvaluation,
    pub failures: Vec<EvaluationFailure>,
}

/// Classify every example with a best-effort batch and evaluate the results
///
/// Per-item failures are excluded from the metrics and listed in
/// `failures`; any other failure aborts the evaluation.
/// Misclassified indices refer to positions in the dataset.
pub async fn evaluate_dataset<C: Classifier + ?Sized>(
    classifier: &C,
    dataset: &TrainingDataset,
    categories: &[String],
) -> Result<DatasetEvaluation> {
    let texts: Vec<String> = dataset.examples.iter().map(|e| e.text.clone()).collect();
    let outcomes = classifier.classify_batch(&texts).await;

    let mut predictions = Vec::with_capacity(outcomes.len());
    let mut labels = Vec::with_capacity(outcomes.len());
    let mut kept_texts = Vec::with_capacity(outcomes.len());
    let mut kept_index = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (i, (outcome, example)) in outcomes.into_iter().zip(&dataset.examples).enumerate() {
        match outcome {
            Ok(result) => {
                predictions.push(result);
                labels.push(example.category.as_str());
                kept_texts.push(example.text.as_str());
                kept_index.push(i);
            }
            Err(err) if !err.category().is_per_item() => return Err(err),
            Err(err) => failures.push(EvaluationFailure {
                index: i,
                text: example.text.clone(),
                code: err.category().as_str().to_string(),
                message: err.to_string(),
            }),
        }
    }

    if !failures.is_empty() {
        tracing::warn!(
            failed = failures.len(),
            total = dataset.examples.len(),
            "Some examples failed to classify and are excluded from metrics"
        );
    }

    let mut report = evaluate_inner(&predictions, &labels, Some(&kept_texts), categories)?;
    for m in &mut report.misclassified_examples {
        if let Some(original) = kept_index.get(m.index) {
            m.index = *original;
        }
    }

    Ok(DatasetEvaluation { report, failures })
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use pretty_assertions::assert_eq;

    fn predictions(labels: &[&str]) -> Vec<ClassificationResult> {
        labels
            .iter()
            .map(|l| ClassificationResult::new(*l, 0.9, format!("looks like {l}")))
            .collect()
    }

    fn axis(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn two_by_two_example() {
        let report = evaluate(&predictions(&["A", "A", "B"]), &["A", "B", "B"], &axis(&["A", "B"]))
            .expect("evaluate");

        assert!((report.accuracy - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.confusion_matrix, vec![vec![1, 1], vec![0, 1]]);
        assert_eq!(report.total, 3);
        assert_eq!(report.correct, 2);

        assert_eq!(report.misclassified_examples.len(), 1);
        let miss = &report.misclassified_examples[0];
        assert_eq!((miss.predicted.as_str(), miss.actual.as_str()), ("A", "B"));
        assert_eq!(miss.index, 1);

        let a = report.per_category["A"];
        assert!((a.precision - 0.5).abs() < 1e-12);
        assert!((a.recall - 1.0).abs() < 1e-12);
        assert_eq!(a.support, 1);
        let b = report.per_category["B"];
        assert!((b.precision - 1.0).abs() < 1e-12);
        assert!((b.recall - 0.5).abs() < 1e-12);
        assert_eq!(b.support, 2);

        // F1 is 2/3 for both, so macro and weighted agree.
        assert!((report.macro_f1 - 2.0 / 3.0).abs() < 1e-12);
        assert!((report.weighted_f1 - 2.0 / 3.0).abs() < 1e-12);
        // Weighted precision: (0.5 * 1 + 1.0 * 2) / 3
        assert!((report.weighted_precision - 2.5 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn matrix_follows_supplied_axis_order() {
        let preds = predictions(&["A", "A", "A"]);
        let truth = ["A", "A", "B"];

        let ab = evaluate(&preds, &truth, &axis(&["A", "B"])).expect("evaluate");
        assert_eq!(ab.confusion_matrix, vec![vec![2, 1], vec![0, 0]]);

        let ba = evaluate(&preds, &truth, &axis(&["B", "A"])).expect("evaluate");
        assert_eq!(ba.confusion_matrix, vec![vec![0, 0], vec![1, 2]]);
        assert_eq!(ba.categories, axis(&["B", "A"]));
    }

    #[test]
    fn misclassified_keeps_first_twenty() {
        let preds = predictions(&["A"; 30]);
        let truth = vec!["B"; 30];
        let report = evaluate(&preds, &truth, &axis(&["A", "B"])).expect("evaluate");

        assert_eq!(report.misclassified_examples.len(), MISCLASSIFIED_CAP);
        let indices: Vec<usize> = report.misclassified_examples.iter().map(|m| m.index).collect();
        assert_eq!(indices, (0..20).collect::<Vec<_>>());
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn shape_errors() {
        let cats = axis(&["A", "B"]);
        let cases: Vec<(Vec<ClassificationResult>, Vec<&str>, Vec<String>)> = vec![
            (predictions(&["A", "B"]), vec!["A"], cats.clone()),
            (predictions(&["C"]), vec!["A"], cats.clone()),
            (predictions(&["A"]), vec!["C"], cats.clone()),
            (predictions(&["A"]), vec!["A"], axis(&["A", "A"])),
        ];
        for (preds, truth, categories) in cases {
            let err = evaluate(&preds, &truth, &categories).expect_err("shape");
            assert_eq!(err.category(), ErrorCategory::ShapeError);
        }
    }

    #[test]
    fn unused_category_scores_zero_without_nan() {
        let report = evaluate(&predictions(&["A"]), &["A"], &axis(&["A", "B"])).expect("evaluate");
        let b = report.per_category["B"];
        assert_eq!((b.precision, b.recall, b.f1, b.support), (0.0, 0.0, 0.0, 0));
        assert!((report.macro_f1 - 0.5).abs() < 1e-12);
        assert!((report.weighted_f1 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_reports_zeroes() {
        let report = evaluate::<&str>(&[], &[], &axis(&["A"])).expect("evaluate");
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.confusion_matrix, vec![vec![0]]);
    }

    #[test]
    fn report_round_trips_through_json_file() {
        let report = evaluate(&predictions(&["A", "B"]), &["A", "A"], &axis(&["A", "B"])).expect("evaluate");
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("report.json");
        report.save_json(&path).expect("save");

        let loaded: ClassifierEvaluation =
            serde_json::from_str(&std::fs::read_to_string(&path).expect("read")).expect("parse");
        assert_eq!(loaded, report);
    }

    #[test]
    fn table_lists_axis_in_order() {
        let report = evaluate(&predictions(&["A", "B"]), &["A", "A"], &axis(&["B", "A"])).expect("evaluate");
        let table = report.format_table();
        let b = table.find("\nB ").expect("B row");
        let a = table.find("\nA ").expect("A row");
        assert!(b < a);
        assert!(table.contains("Confusion matrix"));
        assert!(table.contains("Accuracy 0.500 (1/2)"));
    }
}

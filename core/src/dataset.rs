//! Labeled training and evaluation data
//!
//! On disk a dataset is line-delimited JSON, one `{"text", "category"}`
//! record per line. Machine-assigned ("silver") labels also carry a
//! `confidence` below 1.0; human labels omit it.

use crate::errors::{Result, RoutecatError};
use crate::registry::CategoryRegistry;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Confidence of a human-verified label
pub const HUMAN_LABEL_CONFIDENCE: f64 = 1.0;

fn default_confidence() -> f64 {
    HUMAN_LABEL_CONFIDENCE
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_human_confidence(confidence: &f64) -> bool {
    *confidence >= HUMAN_LABEL_CONFIDENCE
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub text: String,
    /// Ground-truth category name
    pub category: String,
    #[serde(default = "default_confidence", skip_serializing_if = "is_human_confidence")]
    pub confidence: f64,
}

impl TrainingExample {
    pub fn new(text: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: category.into(),
            confidence: HUMAN_LABEL_CONFIDENCE,
        }
    }

    /// Builder: mark as a machine-assigned label
    pub fn silver(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn is_silver(&self) -> bool {
        self.confidence < HUMAN_LABEL_CONFIDENCE
    }
}

/// Version tag of a dataset file: `sha256:` plus the first 16 hex digits of
/// the SHA-256 of its contents
pub fn content_version(contents: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("sha256:{}", &digest[..16])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingDataset {
    /// Category names the labels are drawn from
    pub categories: Vec<String>,
    pub version: String,
    /// Where the labels came from (file path, annotation run, ...)
    pub label_source: String,
    pub examples: Vec<TrainingExample>,
}

impl TrainingDataset {
    pub fn new(
        categories: Vec<String>,
        version: impl Into<String>,
        label_source: impl Into<String>,
        examples: Vec<TrainingExample>,
    ) -> Self {
        Self {
            categories,
            version: version.into(),
            label_source: label_source.into(),
            examples,
        }
    }

    /// Read a JSONL file
    ///
    /// Blank lines are skipped. `categories` lists the labels in first-seen
    /// order; `label_source` is the file path; `version` is the content hash
    /// of the file (see `content_version`).
    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RoutecatError::dataset_with_source(format!("Failed to read dataset: {}", path.display()), e)
        })?;

        let mut examples = Vec::new();
        for (i, line) in contents.lines().enumerate() {
            let line_no = i + 1;
            if line.trim().is_empty() {
                continue;
            }

            let example: TrainingExample = serde_json::from_str(line).map_err(|e| {
                RoutecatError::dataset_with_source(format!("{}:{line_no}: invalid record", path.display()), e)
            })?;
            if example.text.trim().is_empty() {
                return Err(RoutecatError::dataset(format!(
                    "{}:{line_no}: empty text",
                    path.display()
                )));
            }
            if !(0.0..=1.0).contains(&example.confidence) {
                return Err(RoutecatError::dataset(format!(
                    "{}:{line_no}: label confidence {} outside [0, 1]",
                    path.display(),
                    example.confidence
                )));
            }
            examples.push(example);
        }

        let mut categories: Vec<String> = Vec::new();
        for example in &examples {
            if !categories.contains(&example.category) {
                categories.push(example.category.clone());
            }
        }

        let version = content_version(&contents);
        tracing::debug!(
            path = %path.display(),
            version = %version,
            examples = examples.len(),
            categories = categories.len(),
            "Loaded dataset"
        );

        Ok(Self::new(categories, version, path.display().to_string(), examples))
    }

    /// Write examples as JSONL, one record per line
    pub fn write_jsonl(&self, path: &Path) -> Result<()> {
        let write_err = |e: std::io::Error| {
            RoutecatError::dataset_with_source(format!("Failed to write dataset: {}", path.display()), e)
        };

        let file = std::fs::File::create(path).map_err(write_err)?;
        let mut out = BufWriter::new(file);
        for example in &self.examples {
            let line = serde_json::to_string(example)
                .map_err(|e| RoutecatError::internal(format!("Failed to serialize example: {e}")))?;
            writeln!(out, "{line}").map_err(write_err)?;
        }
        out.flush().map_err(write_err)
    }

    /// Fail if any label is not a registered category
    pub fn validate_against(&self, registry: &CategoryRegistry) -> Result<()> {
        for (i, example) in self.examples.iter().enumerate() {
            if !registry.contains(&example.category) {
                return Err(RoutecatError::dataset(format!(
                    "example {i} has unregistered category '{}'",
                    example.category
                )));
            }
        }
        Ok(())
    }

    /// Builder: take the category list from the registry
    pub fn with_registry_categories(mut self, registry: &CategoryRegistry) -> Self {
        self.categories = registry.names();
        self
    }

    /// Example count per registry category, in registry order
    pub fn category_counts(&self, registry: &CategoryRegistry) -> Vec<(String, usize)> {
        registry
            .all()
            .iter()
            .map(|c| {
                let count = self.examples.iter().filter(|e| e.category == c.name).count();
                (c.name.clone(), count)
            })
            .collect()
    }

    /// Examples with human-verified labels only
    pub fn human_labeled(&self) -> Self {
        Self {
            categories: self.categories.clone(),
            version: self.version.clone(),
            label_source: self.label_source.clone(),
            examples: self.examples.iter().filter(|e| !e.is_silver()).cloned().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use crate::registry::CategoryDefinition;
    use pretty_assertions::assert_eq;

    fn registry() -> CategoryRegistry {
        CategoryRegistry::register(vec![
            CategoryDefinition::new("billing", "Billing", "", vec!["a".into(), "b".into()]),
            CategoryDefinition::new("tech", "Tech", "", vec!["c".into(), "d".into()]),
            CategoryDefinition::new("other", "Other", "", vec!["e".into(), "f".into()]),
        ])
        .expect("registry")
    }

    fn write(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("data.jsonl");
        std::fs::write(&path, contents).expect("write");
        (dir, path)
    }

    #[test]
    fn loads_jsonl_skipping_blank_lines() {
        let (_dir, path) = write(
            "{\"text\": \"refund my card\", \"category\": \"billing\"}\n\n\
             {\"text\": \"wifi is down\", \"category\": \"tech\", \"confidence\": 0.7}\n   \n",
        );
        let dataset = TrainingDataset::load_jsonl(&path).expect("load");

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.categories, vec!["billing", "tech"]);
        assert!(!dataset.examples[0].is_silver());
        assert!(dataset.examples[1].is_silver());
        assert_eq!(dataset.label_source, path.display().to_string());
        assert_eq!(dataset.version, content_version(&std::fs::read_to_string(&path).expect("read")));
    }

    #[test]
    fn version_tracks_file_contents() {
        let (_dir, path) = write("{\"text\": \"refund my card\", \"category\": \"billing\"}\n");
        let first = TrainingDataset::load_jsonl(&path).expect("load").version;
        assert!(first.starts_with("sha256:"), "{first}");
        assert_eq!(first.len(), "sha256:".len() + 16);
        assert_eq!(TrainingDataset::load_jsonl(&path).expect("reload").version, first);

        std::fs::write(&path, "{\"text\": \"refund my card\", \"category\": \"tech\"}\n").expect("rewrite");
        let relabeled = TrainingDataset::load_jsonl(&path).expect("load").version;
        assert_ne!(relabeled, first);
    }

    #[test]
    fn malformed_line_reports_line_number() {
        let (_dir, path) = write("{\"text\": \"ok\", \"category\": \"billing\"}\n\n{\"text\": \"missing label\"}\n");
        let err = TrainingDataset::load_jsonl(&path).expect_err("malformed");
        assert_eq!(err.category(), ErrorCategory::DatasetError);
        assert!(err.to_string().contains(":3:"), "{err}");
    }

    #[test]
    fn missing_file_is_dataset_error() {
        let err = TrainingDataset::load_jsonl(Path::new("/nonexistent/routecat.jsonl")).expect_err("missing");
        assert_eq!(err.category(), ErrorCategory::DatasetError);
    }

    #[test]
    fn write_then_load_preserves_examples() {
        let dataset = TrainingDataset::new(
            vec!["billing".into(), "tech".into()],
            "1",
            "test",
            vec![
                TrainingExample::new("refund", "billing"),
                TrainingExample::new("reboot loop", "tech").silver(0.6),
            ],
        );
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.jsonl");
        dataset.write_jsonl(&path).expect("write");

        let raw = std::fs::read_to_string(&path).expect("read");
        let first = raw.lines().next().expect("line");
        assert!(!first.contains("confidence"), "human labels omit confidence: {first}");

        let loaded = TrainingDataset::load_jsonl(&path).expect("load");
        assert_eq!(loaded.examples, dataset.examples);
    }

    #[test]
    fn validates_and_counts_against_registry() {
        let reg = registry();
        let dataset = TrainingDataset::new(
            vec![],
            "1",
            "test",
            vec![
                TrainingExample::new("x", "tech"),
                TrainingExample::new("y", "billing"),
                TrainingExample::new("z", "tech"),
            ],
        );
        dataset.validate_against(&reg).expect("valid");
        assert_eq!(
            dataset.category_counts(&reg),
            vec![
                ("billing".to_string(), 1),
                ("tech".to_string(), 2),
                ("other".to_string(), 0)
            ]
        );

        let bad = TrainingDataset::new(vec![], "1", "test", vec![TrainingExample::new("x", "spam")]);
        let err = bad.validate_against(&reg).expect_err("unregistered");
        assert_eq!(err.category(), ErrorCategory::DatasetError);
    }

    #[test]
    fn human_labeled_drops_silver() {
        let dataset = TrainingDataset::new(
            vec![],
            "1",
            "test",
            vec![
                TrainingExample::new("x", "tech"),
                TrainingExample::new("y", "billing").silver(0.4),
            ],
        )
        .with_registry_categories(&registry());

        let human = dataset.human_labeled();
        assert_eq!(human.len(), 1);
        assert_eq!(human.examples[0].text, "x");
        assert_eq!(human.categories, vec!["billing", "tech", "other"]);
    }
}

//! Nearest-mean exemplar classification
//!
//! `build_index` embeds every category's examples once. After that the index
//! is immutable and shared; `classify` embeds the input, takes the mean cosine
//! similarity against each category's exemplars and picks the highest mean.
//! Ties go to the category registered first.
//!
//! Confidence is the winning mean similarity as-is, so it can be negative.
//! A negative score means "no positive evidence" and routes like any other
//! low score.

use crate::classifier::{ClassificationResult, Classifier, ensure_text, with_timeout};
use crate::config::{DEFAULT_MAX_CONCURRENCY, RoutecatConfig};
use crate::errors::{Result, RoutecatError};
use crate::providers::EmbeddingProvider;
use crate::registry::CategoryRegistry;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;

/// Exemplar vectors per category, in registry order
#[derive(Debug, Clone)]
pub struct ExemplarIndex {
    entries: Vec<CategoryExemplars>,
    dimension: usize,
}

#[derive(Debug, Clone)]
struct CategoryExemplars {
    name: String,
    vectors: Vec<Vec<f32>>,
}

impl ExemplarIndex {
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of categories indexed
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean cosine similarity of `query` to each category, in registry order
    pub fn mean_similarities(&self, query: &[f32]) -> Vec<(&str, f64)> {
        self.entries
            .iter()
            .map(|entry| {
                let total: f64 = entry.vectors.iter().map(|v| cosine_similarity(query, v)).sum();
                let mean = if entry.vectors.is_empty() {
                    0.0
                } else {
                    total / entry.vectors.len() as f64
                };
                (entry.name.as_str(), mean)
            })
            .collect()
    }
}

/// Classifier backed by an embedding service
pub struct EmbeddingClassifier<E> {
    provider: E,
    registry: Arc<CategoryRegistry>,
    index: OnceCell<ExemplarIndex>,
    timeout: Duration,
    max_concurrency: usize,
}

impl<E: EmbeddingProvider> EmbeddingClassifier<E> {
    pub fn new(provider: E, registry: Arc<CategoryRegistry>) -> Self {
        Self {
            provider,
            registry,
            index: OnceCell::new(),
            timeout: Duration::from_millis(30_000),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Apply timeout and concurrency settings from config
    pub fn with_config(mut self, cfg: &RoutecatConfig) -> Self {
        self.timeout = cfg.classifier.timeout();
        self.max_concurrency = cfg.classifier.max_concurrency;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.index.initialized()
    }

    pub fn index(&self) -> Option<&ExemplarIndex> {
        self.index.get()
    }

    /// Embed every category's examples
    ///
    /// Runs once. Later calls (including concurrent ones) return the index
    /// built by the first successful call without re-embedding.
    pub async fn build_index(&self) -> Result<&ExemplarIndex> {
        if let Some(index) = self.index.get() {
            tracing::debug!("Exemplar index already built");
            return Ok(index);
        }
        self.index.get_or_try_init(|| self.embed_exemplars()).await
    }

    async fn embed_exemplars(&self) -> Result<ExemplarIndex> {
        let start = Instant::now();
        let limit = self.max_concurrency.max(1);

        let entries: Vec<CategoryExemplars> = stream::iter(self.registry.all())
            .map(|category| async move {
                let vectors = with_timeout(
                    "exemplar embedding",
                    self.timeout,
                    self.provider.embed(&category.examples),
                )
                .await?;
                if vectors.len() != category.examples.len() {
                    return Err(RoutecatError::provider(format!(
                        "embedding service returned {} vectors for {} examples of '{}'",
                        vectors.len(),
                        category.examples.len(),
                        category.name
                    )));
                }
                Ok(CategoryExemplars {
                    name: category.name.clone(),
                    vectors,
                })
            })
            .buffered(limit)
            .try_collect()
            .await?;

        let dimension = common_dimension(&entries)?;
        let exemplars: usize = entries.iter().map(|e| e.vectors.len()).sum();

        tracing::info!(
            categories = entries.len(),
            exemplars,
            dimension,
            latency_ms = start.elapsed().as_millis() as u64,
            "Exemplar index built"
        );

        Ok(ExemplarIndex { entries, dimension })
    }
}

#[async_trait]
impl<E: EmbeddingProvider> Classifier for EmbeddingClassifier<E> {
    fn strategy(&self) -> &'static str {
        "embedding"
    }

    fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        let index = self.index.get().ok_or_else(|| {
            RoutecatError::not_ready("exemplar index not built; call build_index first")
        })?;
        ensure_text(text)?;

        let start = Instant::now();
        let input = [text.to_string()];
        let mut vectors = with_timeout("input embedding", self.timeout, self.provider.embed(&input)).await?;
        let query = match vectors.pop() {
            Some(v) if vectors.is_empty() => v,
            _ => {
                return Err(RoutecatError::provider(
                    "embedding service did not return exactly one vector for the input",
                ));
            }
        };
        if query.len() != index.dimension {
            return Err(RoutecatError::provider(format!(
                "input embedding has dimension {}, index has {}",
                query.len(),
                index.dimension
            )));
        }

        let scores = index.mean_similarities(&query);
        let result = pick_best(&scores)?;

        tracing::debug!(
            category = %result.category,
            confidence = result.confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Embedding classification complete"
        );

        Ok(result)
    }
}

/// Highest mean wins; on equal means the earlier category is kept
fn pick_best(scores: &[(&str, f64)]) -> Result<ClassificationResult> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &(_, score)) in scores.iter().enumerate() {
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    let Some((winner, score)) = best else {
        return Err(RoutecatError::internal("exemplar index has no categories"));
    };

    let mut runner_up: Option<(usize, f64)> = None;
    for (i, &(_, s)) in scores.iter().enumerate() {
        if i == winner {
            continue;
        }
        match runner_up {
            Some((_, top)) if s <= top => {}
            _ => runner_up = Some((i, s)),
        }
    }

    let name = scores[winner].0;
    let mut reasoning = format!("mean exemplar similarity {score:.3} to '{name}'");
    if let Some((i, s)) = runner_up {
        reasoning.push_str(&format!("; runner-up '{}' at {s:.3}", scores[i].0));
    }
    if score <= 0.0 {
        reasoning.push_str("; no positive evidence for any category");
    }

    let mut result = ClassificationResult::new(name, score, reasoning);
    if let Some((i, s)) = runner_up {
        result = result.with_secondary(scores[i].0, s);
    }
    Ok(result)
}

fn common_dimension(entries: &[CategoryExemplars]) -> Result<usize> {
    let mut dimension: Option<usize> = None;
    for entry in entries {
        for vector in &entry.vectors {
            match dimension {
                None => dimension = Some(vector.len()),
                Some(d) if d != vector.len() => {
                    return Err(RoutecatError::provider(format!(
                        "exemplar embeddings for '{}' have dimension {}, expected {d}",
                        entry.name,
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
        }
    }
    match dimension {
        Some(0) | None => Err(RoutecatError::provider("embedding service returned empty vectors")),
        Some(d) => Ok(d),
    }
}

/// Cosine similarity; 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

//! Classification result and the `Classifier` capability
//!
//! Two strategies implement `Classifier`: `PromptClassifier` (generative
//! model with a few-shot prompt) and `EmbeddingClassifier` (nearest mean
//! exemplar similarity). Which one runs is chosen at configuration time.

use crate::errors::{Result, RoutecatError};
use async_trait::async_trait;
use futures::{FutureExt, StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Outcome of classifying one text
///
/// `secondary` is either fully present (category and confidence) or absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Registered category name
    pub category: String,

    /// Nominally in [0.0, 1.0]. Embedding scores are raw cosine means and
    /// may be negative, which means "no positive evidence".
    pub confidence: f64,

    pub reasoning: String,

    #[serde(skip_serializing_if = "Option::is_none", flatten)]
    pub secondary: Option<SecondaryPrediction>,
}

/// Runner-up category reported alongside the primary decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondaryPrediction {
    #[serde(rename = "secondary_category")]
    pub category: String,
    #[serde(rename = "secondary_confidence")]
    pub confidence: f64,
}

impl ClassificationResult {
    pub fn new(category: impl Into<String>, confidence: f64, reasoning: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            confidence,
            reasoning: reasoning.into(),
            secondary: None,
        }
    }

    /// Builder: attach a secondary prediction
    pub fn with_secondary(mut self, category: impl Into<String>, confidence: f64) -> Self {
        self.secondary = Some(SecondaryPrediction {
            category: category.into(),
            confidence,
        });
        self
    }

    pub fn secondary_category(&self) -> Option<&str> {
        self.secondary.as_ref().map(|s| s.category.as_str())
    }

    pub fn secondary_confidence(&self) -> Option<f64> {
        self.secondary.as_ref().map(|s| s.confidence)
    }

    /// Whether the score carries any positive evidence
    pub fn has_positive_evidence(&self) -> bool {
        self.confidence > 0.0
    }
}

/// A classification strategy
///
/// `classify` performs one outbound call. The batch helpers fan out over
/// `classify` with at most `max_concurrency()` calls in flight and always
/// return results in input order, whatever order the calls complete in.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short strategy name for logs ("prompt", "embedding")
    fn strategy(&self) -> &'static str;

    /// Classify a single text
    async fn classify(&self, text: &str) -> Result<ClassificationResult>;

    /// Upper bound on concurrent provider calls during a batch
    fn max_concurrency(&self) -> usize {
        crate::config::DEFAULT_MAX_CONCURRENCY
    }

    /// Best-effort batch: one result-or-error per input, in input order
    ///
    /// A failing item never discards the other items.
    async fn classify_batch(&self, texts: &[String]) -> Vec<Result<ClassificationResult>> {
        let limit = self.max_concurrency().max(1);
        let calls: Vec<_> = texts.iter().map(|text| self.classify(text)).collect();
        let results: Vec<Result<ClassificationResult>> = stream::iter(calls).buffered(limit).collect().await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        if failed > 0 {
            tracing::warn!(
                strategy = self.strategy(),
                total = texts.len(),
                failed,
                "Batch classification finished with failed items"
            );
        }
        results
    }

    /// Fail-fast batch: the first call to fail aborts the batch as soon as
    /// it completes and drops (cancels) every call still in flight
    ///
    /// Successful batches come back in input order.
    async fn try_classify_batch(&self, texts: &[String]) -> Result<Vec<ClassificationResult>> {
        let limit = self.max_concurrency().max(1);
        let calls: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| self.classify(text).map(move |outcome| (index, outcome)))
            .collect();

        let mut slots: Vec<Option<ClassificationResult>> = vec![None; texts.len()];
        let mut pending = stream::iter(calls).buffer_unordered(limit);
        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                Ok(result) => slots[index] = Some(result),
                Err(e) => {
                    tracing::warn!(
                        strategy = self.strategy(),
                        index,
                        code = e.category().as_str(),
                        "Fail-fast batch aborted"
                    );
                    return Err(e);
                }
            }
        }

        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| RoutecatError::internal("batch finished with unfilled result slots"))
    }
}

/// Race a provider call against the per-call timeout
///
/// Expiry surfaces as `ProviderTimeout`, never as a parse failure or a
/// zero-confidence result.
pub(crate) async fn with_timeout<T, F>(what: &str, timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::warn!(call = what, timeout_ms, "Provider call timed out");
            Err(RoutecatError::provider_timeout(what, timeout_ms))
        }
    }
}

/// Reject blank input before it reaches a provider
pub(crate) fn ensure_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RoutecatError::input("text must not be blank"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Echo classifier: sleeps longer for earlier inputs so completion order
    /// is the reverse of input order.
    struct ReverseLatencyClassifier {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        limit: usize,
    }

    impl ReverseLatencyClassifier {
        fn new(limit: usize) -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                limit,
            }
        }
    }

    #[async_trait]
    impl Classifier for ReverseLatencyClassifier {
        fn strategy(&self) -> &'static str {
            "test"
        }

        fn max_concurrency(&self) -> usize {
            self.limit
        }

        async fn classify(&self, text: &str) -> Result<ClassificationResult> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = match text {
                "slow" => 30_000,
                "x" => 30,
                "y" => 20,
                _ => 5,
            };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if text == "bad" {
                return Err(RoutecatError::parse("unparseable reply"));
            }
            Ok(ClassificationResult::new(text, 0.9, "echo"))
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn batch_preserves_input_order() {
        let classifier = ReverseLatencyClassifier::new(8);
        let results = classifier.classify_batch(&texts(&["x", "y", "z"])).await;

        let categories: Vec<String> = results
            .into_iter()
            .map(|r| r.expect("ok").category)
            .collect();
        assert_eq!(categories, vec!["x", "y", "z"]);
        assert!(classifier.peak.load(Ordering::SeqCst) > 1, "calls should overlap");
    }

    #[tokio::test]
    async fn batch_respects_concurrency_bound() {
        let classifier = ReverseLatencyClassifier::new(2);
        let input = texts(&["a", "b", "c", "d", "e", "f"]);
        let results = classifier.classify_batch(&input).await;

        assert_eq!(results.len(), 6);
        assert!(classifier.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn best_effort_batch_isolates_failures() {
        let classifier = ReverseLatencyClassifier::new(4);
        let results = classifier.classify_batch(&texts(&["x", "bad", "z"])).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().expect("x").category, "x");
        assert_eq!(
            results[1].as_ref().map_err(RoutecatError::category).err(),
            Some(ErrorCategory::ParseError)
        );
        assert_eq!(results[2].as_ref().expect("z").category, "z");
    }

    #[tokio::test]
    async fn fail_fast_batch_surfaces_first_error() {
        let classifier = ReverseLatencyClassifier::new(4);
        let err = classifier
            .try_classify_batch(&texts(&["x", "bad", "z"]))
            .await
            .expect_err("should fail");
        assert_eq!(err.category(), ErrorCategory::ParseError);

        let ok = classifier
            .try_classify_batch(&texts(&["x", "y"]))
            .await
            .expect("ok");
        assert_eq!(ok.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_fast_batch_does_not_wait_for_slow_items() {
        let classifier = ReverseLatencyClassifier::new(4);
        let start = tokio::time::Instant::now();
        let err = classifier
            .try_classify_batch(&texts(&["slow", "bad"]))
            .await
            .expect_err("should fail");

        assert_eq!(err.category(), ErrorCategory::ParseError);
        assert!(start.elapsed() < Duration::from_secs(1), "waited {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn fail_fast_batch_keeps_input_order() {
        let classifier = ReverseLatencyClassifier::new(4);
        let results = classifier
            .try_classify_batch(&texts(&["x", "y", "z"]))
            .await
            .expect("ok");

        let categories: Vec<String> = results.into_iter().map(|r| r.category).collect();
        assert_eq!(categories, vec!["x", "y", "z"]);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_maps_to_provider_timeout() {
        let err = with_timeout("slow call", Duration::from_millis(50), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, RoutecatError>(1)
        })
        .await
        .expect_err("should time out");

        assert_eq!(err.category(), ErrorCategory::ProviderTimeout);
    }

    #[test]
    fn secondary_serializes_as_flat_pair() {
        let result = ClassificationResult::new("bug", 0.8, "crash report").with_secondary("feature", 0.1);
        let json = serde_json::to_value(&result).expect("serialize");
        assert_eq!(json["secondary_category"], "feature");
        assert_eq!(json["secondary_confidence"], 0.1);

        let plain = serde_json::to_value(ClassificationResult::new("bug", 0.8, "r")).expect("serialize");
        assert!(plain.get("secondary_category").is_none());
    }

    #[test]
    fn blank_text_is_input_error() {
        let err = ensure_text("   ").expect_err("blank");
        assert_eq!(err.category(), ErrorCategory::InputError);
        assert!(ensure_text("hello").is_ok());
    }
}

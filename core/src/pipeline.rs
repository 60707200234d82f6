//! End-to-end pipeline: classify, route, act

use crate::classifier::{ClassificationResult, Classifier, ensure_text};
use crate::config::{RoutecatConfig, Strategy};
use crate::embedding::EmbeddingClassifier;
use crate::errors::Result;
use crate::fallback::{Action, FallbackHandler};
use crate::prompt::{PromptClassifier, PromptSettings};
use crate::providers::OpenAiCompatClient;
use crate::registry::CategoryRegistry;
use crate::review::{HttpReviewQueue, InMemoryReviewQueue, ReviewId, ReviewQueue};
use crate::router::{ConfidenceRouter, RoutingDecision};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Result of running one text through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutcome {
    pub result: ClassificationResult,
    pub decision: RoutingDecision,
    pub action: Action,
}

pub struct Pipeline {
    registry: Arc<CategoryRegistry>,
    classifier: Arc<dyn Classifier>,
    router: ConfidenceRouter,
    fallback: FallbackHandler,
}

impl Pipeline {
    pub fn new(
        registry: Arc<CategoryRegistry>,
        classifier: Arc<dyn Classifier>,
        router: ConfidenceRouter,
        fallback: FallbackHandler,
    ) -> Self {
        Self {
            registry,
            classifier,
            router,
            fallback,
        }
    }

    /// Build the configured pipeline
    ///
    /// Validates the taxonomy and thresholds, connects the providers and,
    /// for the embedding strategy, builds the exemplar index before
    /// returning. Any failure here means the pipeline must not start.
    pub async fn from_config(cfg: &RoutecatConfig) -> Result<Self> {
        cfg.validate()?;
        let registry = Arc::new(cfg.registry()?);
        let router = cfg.router()?;
        let timeout = cfg.classifier.timeout();

        let classifier: Arc<dyn Classifier> = match cfg.classifier.strategy {
            Strategy::Prompt => {
                let client = OpenAiCompatClient::for_completions(&cfg.prompt, timeout)?;
                Arc::new(PromptClassifier::new(
                    client,
                    Arc::clone(&registry),
                    PromptSettings::from_config(cfg),
                ))
            }
            Strategy::Embedding => {
                let client = OpenAiCompatClient::for_embeddings(&cfg.embedding, timeout)?;
                let classifier = EmbeddingClassifier::new(client, Arc::clone(&registry)).with_config(cfg);
                classifier.build_index().await?;
                Arc::new(classifier)
            }
        };

        let queue: Arc<dyn ReviewQueue> = match HttpReviewQueue::from_config(&cfg.review_queue, timeout)? {
            Some(queue) => Arc::new(queue),
            None => {
                tracing::info!("No review queue endpoint configured; review items stay in process");
                Arc::new(InMemoryReviewQueue::new())
            }
        };
        let fallback = FallbackHandler::from_config(queue, &cfg.fallback);

        tracing::info!(
            strategy = classifier.strategy(),
            categories = registry.len(),
            high = router.high(),
            low = router.low(),
            "Pipeline ready"
        );

        Ok(Self::new(registry, classifier, router, fallback))
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn router(&self) -> &ConfidenceRouter {
        &self.router
    }

    /// Classify, route and act on one text
    pub async fn process(&self, text: &str) -> Result<PipelineOutcome> {
        ensure_text(text)?;
        let start = Instant::now();

        let result = self.classifier.classify(text).await?;
        let decision = self.router.route(&result);
        let action = self.fallback.handle(text, &result, decision).await?;

        tracing::info!(
            category = %result.category,
            confidence = result.confidence,
            decision = %decision,
            action = action.as_str(),
            review_id = action.review_id().map(ReviewId::as_str),
            latency_ms = start.elapsed().as_millis() as u64,
            "Processed text"
        );

        Ok(PipelineOutcome {
            result,
            decision,
            action,
        })
    }

    /// Best-effort batch classification, in input order
    pub async fn classify_batch(&self, texts: &[String]) -> Vec<Result<ClassificationResult>> {
        self.classifier.classify_batch(texts).await
    }

    /// Fail-fast batch classification
    pub async fn try_classify_batch(&self, texts: &[String]) -> Result<Vec<ClassificationResult>> {
        self.classifier.try_classify_batch(texts).await
    }
}

//! Routing decision to concrete action
//!
//! | decision | action              | side effect                 |
//! |----------|---------------------|-----------------------------|
//! | auto     | `apply`             | none                        |
//! | review   | `queued_for_review` | one `ReviewQueue::submit`   |
//! | reject   | `fallback`          | none                        |

use crate::classifier::ClassificationResult;
use crate::config::FallbackConfig;
use crate::errors::Result;
use crate::review::{ReviewId, ReviewItem, ReviewQueue};
use crate::router::RoutingDecision;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What the caller should do with a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Use the predicted category
    Apply { category: String },
    /// Prediction held for review; `category` is not applied yet
    QueuedForReview { category: String, review_id: ReviewId },
    /// Prediction discarded; `category` is the configured fallback
    Fallback { category: String, note: String },
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apply { .. } => "apply",
            Self::QueuedForReview { .. } => "queued_for_review",
            Self::Fallback { .. } => "fallback",
        }
    }

    /// The category attached to the action
    pub fn category(&self) -> &str {
        match self {
            Self::Apply { category } | Self::QueuedForReview { category, .. } | Self::Fallback { category, .. } => {
                category
            }
        }
    }

    pub fn review_id(&self) -> Option<&ReviewId> {
        match self {
            Self::QueuedForReview { review_id, .. } => Some(review_id),
            _ => None,
        }
    }
}

pub struct FallbackHandler {
    queue: Arc<dyn ReviewQueue>,
    fallback_category: String,
    note: String,
}

impl FallbackHandler {
    pub fn new(queue: Arc<dyn ReviewQueue>, fallback_category: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            queue,
            fallback_category: fallback_category.into(),
            note: note.into(),
        }
    }

    pub fn from_config(queue: Arc<dyn ReviewQueue>, cfg: &FallbackConfig) -> Self {
        Self::new(queue, &cfg.category, &cfg.note)
    }

    pub fn fallback_category(&self) -> &str {
        &self.fallback_category
    }

    /// Turn a routing decision into an action
    ///
    /// Only `review` touches the queue, exactly once. A queue failure is
    /// returned as-is and is not retried here.
    pub async fn handle(
        &self,
        text: &str,
        result: &ClassificationResult,
        decision: RoutingDecision,
    ) -> Result<Action> {
        let action = match decision {
            RoutingDecision::Auto => Action::Apply {
                category: result.category.clone(),
            },
            RoutingDecision::Review => {
                let review_id = self.queue.submit(ReviewItem::from_result(text, result)).await?;
                Action::QueuedForReview {
                    category: result.category.clone(),
                    review_id,
                }
            }
            RoutingDecision::Reject => Action::Fallback {
                category: self.fallback_category.clone(),
                note: self.note.clone(),
            },
        };

        tracing::debug!(
            decision = %decision,
            action = action.as_str(),
            category = action.category(),
            review_id = action.review_id().map(ReviewId::as_str),
            "Action selected"
        );
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorCategory, RoutecatError};
    use crate::review::InMemoryReviewQueue;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    struct FailingQueue;

    #[async_trait]
    impl ReviewQueue for FailingQueue {
        async fn submit(&self, _item: ReviewItem) -> Result<ReviewId> {
            Err(RoutecatError::queue("queue offline"))
        }
    }

    fn result() -> ClassificationResult {
        ClassificationResult::new("billing", 0.7, "mentions a refund")
    }

    fn handler(queue: Arc<InMemoryReviewQueue>) -> FallbackHandler {
        FallbackHandler::new(queue, "other", "low confidence")
    }

    #[tokio::test]
    async fn auto_applies_prediction_without_queueing() {
        let queue = Arc::new(InMemoryReviewQueue::new());
        let action = handler(queue.clone())
            .handle("refund please", &result(), RoutingDecision::Auto)
            .await
            .expect("action");

        assert_eq!(
            action,
            Action::Apply {
                category: "billing".to_string()
            }
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn review_creates_exactly_one_item() {
        let queue = Arc::new(InMemoryReviewQueue::new());
        let action = handler(queue.clone())
            .handle("refund please", &result(), RoutingDecision::Review)
            .await
            .expect("action");

        let review_id = action.review_id().expect("review id");
        assert!(!review_id.as_str().is_empty());
        assert_eq!(action.category(), "billing");

        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(&pending[0].0, review_id);
        assert_eq!(pending[0].1.text, "refund please");
    }

    #[tokio::test]
    async fn reject_substitutes_fallback_category() {
        let queue = Arc::new(InMemoryReviewQueue::new());
        let action = handler(queue.clone())
            .handle("refund please", &result(), RoutingDecision::Reject)
            .await
            .expect("action");

        assert_eq!(action.category(), "other");
        assert_eq!(action.as_str(), "fallback");
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn queue_failure_surfaces() {
        let handler = FallbackHandler::new(Arc::new(FailingQueue), "other", "");
        let err = handler
            .handle("x", &result(), RoutingDecision::Review)
            .await
            .expect_err("queue down");
        assert_eq!(err.category(), ErrorCategory::QueueError);
    }

    #[test]
    fn action_serializes_with_tag() {
        let action = Action::Fallback {
            category: "other".to_string(),
            note: "n".to_string(),
        };
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["action"], "fallback");
        assert_eq!(json["category"], "other");
    }
}

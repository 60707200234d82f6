//! Transport contract
//!
//! Request and response bodies for the HTTP surface, and a service that
//! binds them to a `Pipeline`. The HTTP framework itself lives outside this
//! crate; a transport deserializes a request, calls the matching service
//! method and serializes either the response or `ApiError::body` with
//! `ApiError::status`.
//!
//! | route                  | request                | response                |
//! |------------------------|------------------------|-------------------------|
//! | `POST /classify`       | `ClassifyRequest`      | `ClassifyResponse`      |
//! | `POST /classify/batch` | `BatchClassifyRequest` | `BatchClassifyResponse` |
//! | `GET /categories`      |                        | `Vec<CategorySummary>`  |

use crate::classifier::ClassificationResult;
use crate::errors::{Result, RoutecatError};
use crate::pipeline::Pipeline;
use crate::registry::CategoryDefinition;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    /// Category attached to the action: the prediction for `apply` and
    /// `queued_for_review`, the fallback category for `fallback`
    pub category: String,
    pub confidence: f64,
    pub reasoning: String,
    /// `apply`, `queued_for_review` or `fallback`
    pub action: String,
    /// Present only when `action == "queued_for_review"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchClassifyRequest {
    pub texts: Vec<String>,
}

/// One batch entry: either a classification or an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl BatchItem {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl From<Result<ClassificationResult>> for BatchItem {
    fn from(outcome: Result<ClassificationResult>) -> Self {
        match outcome {
            Ok(result) => Self {
                category: Some(result.category),
                confidence: Some(result.confidence),
                reasoning: Some(result.reasoning),
                error: None,
            },
            Err(err) => Self {
                category: None,
                confidence: None,
                reasoning: None,
                error: Some(ErrorDetail::from(&err)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchClassifyResponse {
    /// In request order
    pub results: Vec<BatchItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub name: String,
    pub label: String,
    pub description: String,
}

impl From<&CategoryDefinition> for CategorySummary {
    fn from(def: &CategoryDefinition) -> Self {
        Self {
            name: def.name.clone(),
            label: def.label.clone(),
            description: def.description.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine code, e.g. `PARSE_ERROR`
    pub code: String,
    pub message: String,
}

impl From<&RoutecatError> for ErrorDetail {
    fn from(err: &RoutecatError) -> Self {
        Self {
            code: err.category().as_str().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// Error response: HTTP status plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: u16,
    pub body: ErrorBody,
}

impl From<RoutecatError> for ApiError {
    fn from(err: RoutecatError) -> Self {
        Self {
            status: err.category().http_status(),
            body: ErrorBody {
                error: ErrorDetail::from(&err),
            },
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {} {}: {}", self.status, self.body.error.code, self.body.error.message)
    }
}

impl std::error::Error for ApiError {}

/// Binds the transport contract to a pipeline
#[derive(Clone)]
pub struct ClassificationService {
    pipeline: Arc<Pipeline>,
}

impl ClassificationService {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self { pipeline }
    }

    /// `POST /classify`
    pub async fn classify(&self, request: ClassifyRequest) -> std::result::Result<ClassifyResponse, ApiError> {
        let outcome = self.pipeline.process(&request.text).await.map_err(|e| {
            tracing::warn!(code = e.category().as_str(), error = %e, "classify request failed");
            ApiError::from(e)
        })?;

        Ok(ClassifyResponse {
            category: outcome.action.category().to_string(),
            confidence: outcome.result.confidence,
            reasoning: outcome.result.reasoning,
            action: outcome.action.as_str().to_string(),
            review_id: outcome.action.review_id().map(ToString::to_string),
        })
    }

    /// `POST /classify/batch`
    ///
    /// Best-effort: a failing text yields an entry with `error` set and
    /// leaves every other entry intact. Failures that are not confined to
    /// one item (e.g. an unbuilt index) fail the whole request.
    pub async fn classify_batch(
        &self,
        request: BatchClassifyRequest,
    ) -> std::result::Result<BatchClassifyResponse, ApiError> {
        let outcomes = self.pipeline.classify_batch(&request.texts).await;
        if let Some(err) = outcomes
            .iter()
            .filter_map(|o| o.as_ref().err())
            .find(|e| !e.category().is_per_item())
        {
            return Err(ApiError::from(err.clone()));
        }
        let results: Vec<BatchItem> = outcomes.into_iter().map(BatchItem::from).collect();
        Ok(BatchClassifyResponse { results })
    }

    /// `GET /categories`
    pub fn categories(&self) -> Vec<CategorySummary> {
        self.pipeline
            .registry()
            .all()
            .iter()
            .map(CategorySummary::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCategory;
    use pretty_assertions::assert_eq;

    #[test]
    fn api_error_uses_category_status() {
        let cases = [
            (RoutecatError::parse("bad reply"), 422, "PARSE_ERROR"),
            (RoutecatError::provider_timeout("chat", 10), 504, "PROVIDER_TIMEOUT"),
            (RoutecatError::input("blank"), 400, "INPUT_ERROR"),
            (RoutecatError::not_ready("index"), 503, "NOT_READY"),
        ];
        for (err, status, code) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status, status);
            assert_eq!(api.body.error.code, code);
        }
    }

    #[test]
    fn batch_item_serializes_success_or_error() {
        let ok = BatchItem::from(Ok(ClassificationResult::new("tech", 0.9, "r")));
        let json = serde_json::to_value(&ok).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({"category": "tech", "confidence": 0.9, "reasoning": "r"})
        );

        let failed = BatchItem::from(Err(RoutecatError::parse("not json")));
        assert!(failed.is_error());
        let json = serde_json::to_value(&failed).expect("serialize");
        assert_eq!(json["error"]["code"], ErrorCategory::ParseError.as_str());
        assert!(json.get("category").is_none());
    }

    #[test]
    fn review_id_omitted_unless_present() {
        let response = ClassifyResponse {
            category: "tech".into(),
            confidence: 0.95,
            reasoning: "r".into(),
            action: "apply".into(),
            review_id: None,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("review_id").is_none());
    }

    struct UnusedEmbedder;

    #[async_trait::async_trait]
    impl crate::providers::EmbeddingProvider for UnusedEmbedder {
        async fn embed(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RoutecatError::provider("not expected"))
        }
    }

    #[tokio::test]
    async fn batch_before_index_build_fails_whole_request() {
        use crate::embedding::EmbeddingClassifier;
        use crate::fallback::FallbackHandler;
        use crate::registry::CategoryRegistry;
        use crate::review::InMemoryReviewQueue;
        use crate::router::ConfidenceRouter;

        let registry = Arc::new(
            CategoryRegistry::register(vec![CategoryDefinition::new(
                "other",
                "Other",
                "",
                vec!["a".into(), "b".into()],
            )])
            .expect("registry"),
        );
        let pipeline = Pipeline::new(
            Arc::clone(&registry),
            Arc::new(EmbeddingClassifier::new(UnusedEmbedder, registry)),
            ConfidenceRouter::new(0.85, 0.5).expect("router"),
            FallbackHandler::new(Arc::new(InMemoryReviewQueue::new()), "other", ""),
        );
        let service = ClassificationService::new(Arc::new(pipeline));

        let err = service
            .classify_batch(BatchClassifyRequest {
                texts: vec!["x".into(), "y".into()],
            })
            .await
            .expect_err("not ready");
        assert_eq!(err.status, 503);
        assert_eq!(err.body.error.code, "NOT_READY");
    }
}

//! Review queue collaborators
//!
//! The pipeline only emits review requests. Storage, deduplication and the
//! reviewer workflow live behind `ReviewQueue`; submission is at-least-once
//! from the pipeline's side.

use crate::classifier::ClassificationResult;
use crate::config::{ReviewQueueConfig, resolve_api_key};
use crate::errors::{Result, RoutecatError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Opaque identifier assigned by the review queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(String);

impl ReviewId {
    /// Wrap a collaborator-issued id; blank ids are rejected
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(RoutecatError::queue("review queue returned a blank id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReviewId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A prediction awaiting human review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub text: String,
    pub predicted_category: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_category: Option<String>,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
}

impl ReviewItem {
    pub fn from_result(text: &str, result: &ClassificationResult) -> Self {
        Self {
            text: text.to_string(),
            predicted_category: result.category.clone(),
            confidence: result.confidence,
            secondary_category: result.secondary_category().map(str::to_string),
            reasoning: result.reasoning.clone(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReviewQueue: Send + Sync {
    /// Create one review item and return its id
    async fn submit(&self, item: ReviewItem) -> Result<ReviewId>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP queue
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    id: String,
}

/// REST review queue: `POST {endpoint}/reviews` returning `{"id": ...}`
#[derive(Debug, Clone)]
pub struct HttpReviewQueue {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpReviewQueue {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoutecatError::config_with_source("failed to build HTTP client", e))?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Queue from the `[review_queue]` section; `None` when no endpoint is set
    pub fn from_config(cfg: &ReviewQueueConfig, timeout: Duration) -> Result<Option<Self>> {
        match &cfg.endpoint {
            Some(endpoint) => Self::new(endpoint, resolve_api_key(cfg.api_key_env.as_deref()), timeout).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ReviewQueue for HttpReviewQueue {
    async fn submit(&self, item: ReviewItem) -> Result<ReviewId> {
        let url = format!("{}/reviews", self.endpoint);
        let mut request = self.client.post(&url).json(&item);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| RoutecatError::queue_with_source("POST review failed", e))?;

        if !resp.status().is_success() {
            return Err(RoutecatError::queue(format!(
                "POST review failed: HTTP {}",
                resp.status().as_u16()
            )));
        }

        let parsed: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| RoutecatError::queue_with_source("review queue returned an unexpected body", e))?;

        let id = ReviewId::new(parsed.id)?;
        tracing::debug!(review_id = %id, category = %item.predicted_category, "Submitted review item");
        Ok(id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process queue
// ─────────────────────────────────────────────────────────────────────────────

/// Process-local queue; contents are lost when the process exits
#[derive(Debug, Default)]
pub struct InMemoryReviewQueue {
    items: Mutex<Vec<(ReviewId, ReviewItem)>>,
}

impl InMemoryReviewQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of submitted items, in submission order
    pub fn pending(&self) -> Vec<(ReviewId, ReviewItem)> {
        self.items().clone()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items are only ever appended whole, so a poisoned lock still guards
    /// a consistent list.
    fn items(&self) -> MutexGuard<'_, Vec<(ReviewId, ReviewItem)>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReviewQueue for InMemoryReviewQueue {
    async fn submit(&self, item: ReviewItem) -> Result<ReviewId> {
        let id = ReviewId::new(uuid::Uuid::new_v4().to_string())?;
        self.items().push((id.clone(), item));
        Ok(id)
    }
}

//! Model and embedding service collaborators
//!
//! The classifiers depend only on the `CompletionProvider` and
//! `EmbeddingProvider` traits. `OpenAiCompatClient` implements both against
//! any OpenAI-compatible endpoint (vLLM, SGLang, text-generation-inference,
//! hosted APIs). Retries, if any, belong to the provider, not the classifier.

use crate::config::{EmbeddingConfig, PromptConfig, resolve_api_key};
use crate::errors::{Result, RoutecatError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// One generation request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Text-generation backend
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Return the raw text of the model reply
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Embedding backend
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed every input; one vector per input, in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    response_format: ResponseFormat,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP client for OpenAI-compatible chat completion and embedding endpoints
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout_ms: u64,
}

impl OpenAiCompatClient {
    /// Create a client for `endpoint` (base URL ending in e.g. `/v1`)
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RoutecatError::config_with_source("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Chat client from the `[prompt]` section
    pub fn for_completions(cfg: &PromptConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &cfg.endpoint,
            &cfg.model,
            resolve_api_key(cfg.api_key_env.as_deref()),
            timeout,
        )
    }

    /// Embedding client from the `[embedding]` section
    pub fn for_embeddings(cfg: &EmbeddingConfig, timeout: Duration) -> Result<Self> {
        Self::new(
            &cfg.endpoint,
            &cfg.model,
            resolve_api_key(cfg.api_key_env.as_deref()),
            timeout,
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{path}", self.endpoint);
        let builder = self.client.post(url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let start = Instant::now();
        let response = self
            .post(path)
            .json(body)
            .send()
            .await
            .map_err(|e| RoutecatError::from_reqwest(&format!("POST {path}"), e, self.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RoutecatError::provider(format!(
                "POST {path} returned HTTP {}: {body}",
                status.as_u16()
            )));
        }

        let parsed = response.json::<R>().await.map_err(|e| {
            if e.is_timeout() {
                RoutecatError::provider_timeout(format!("POST {path}: {e}"), self.timeout_ms)
            } else {
                RoutecatError::provider_with_source(
                    format!("POST {path} returned an unexpected body"),
                    e,
                )
            }
        })?;

        tracing::debug!(
            path,
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "Provider call completed"
        );

        Ok(parsed)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            stream: false,
        };

        let completion: ChatCompletionResponse = self.send_json("chat/completions", &body).await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(RoutecatError::provider("chat completion returned no content"));
        }

        Ok(content)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatClient {
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };
        let response: EmbeddingResponse = self.send_json("embeddings", &body).await?;

        if response.data.len() != inputs.len() {
            return Err(RoutecatError::provider(format!(
                "embedding service returned {} vectors for {} inputs",
                response.data.len(),
                inputs.len()
            )));
        }

        // Services may return data out of order; `index` restores input order.
        let mut data = response.data;
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }

        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

//! Few-shot prompt classification
//!
//! The system prompt is assembled once from the registry (name, description,
//! keywords and up to N examples per category, in registry order) and reused
//! for every call. Replies are validated strictly: a reply that names an
//! unregistered category, omits a required field or uses the wrong type is a
//! `ParseError`, never a default category.

use crate::classifier::{ClassificationResult, Classifier, ensure_text, with_timeout};
use crate::config::RoutecatConfig;
use crate::errors::{Result, RoutecatError};
use crate::providers::{CompletionProvider, CompletionRequest};
use crate::registry::CategoryRegistry;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sampling and call settings for the prompt strategy
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub examples_per_category: usize,
    pub timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for PromptSettings {
    fn default() -> Self {
        Self::from_config(&RoutecatConfig::default())
    }
}

impl PromptSettings {
    pub fn from_config(cfg: &RoutecatConfig) -> Self {
        Self {
            temperature: cfg.prompt.temperature,
            max_tokens: cfg.prompt.max_tokens,
            examples_per_category: cfg.prompt.examples_per_category,
            timeout: cfg.classifier.timeout(),
            max_concurrency: cfg.classifier.max_concurrency,
        }
    }
}

/// Classifier backed by a text-generation model
pub struct PromptClassifier<P> {
    provider: P,
    registry: Arc<CategoryRegistry>,
    system_prompt: String,
    settings: PromptSettings,
}

impl<P: CompletionProvider> PromptClassifier<P> {
    pub fn new(provider: P, registry: Arc<CategoryRegistry>, settings: PromptSettings) -> Self {
        let system_prompt = build_system_prompt(&registry, settings.examples_per_category);
        tracing::debug!(
            categories = registry.len(),
            prompt_chars = system_prompt.len(),
            "Prompt classifier initialized"
        );
        Self {
            provider,
            registry,
            system_prompt,
            settings,
        }
    }

    /// The static system prompt sent with every request
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn registry(&self) -> &CategoryRegistry {
        &self.registry
    }
}

#[async_trait]
impl<P: CompletionProvider> Classifier for PromptClassifier<P> {
    fn strategy(&self) -> &'static str {
        "prompt"
    }

    fn max_concurrency(&self) -> usize {
        self.settings.max_concurrency
    }

    async fn classify(&self, text: &str) -> Result<ClassificationResult> {
        ensure_text(text)?;

        let request = CompletionRequest {
            system: self.system_prompt.clone(),
            user: build_user_message(text),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let start = Instant::now();
        let reply = with_timeout(
            "chat completion",
            self.settings.timeout,
            self.provider.complete(request),
        )
        .await?;

        let result = parse_reply(&reply, &self.registry)?;

        tracing::debug!(
            category = %result.category,
            confidence = result.confidence,
            latency_ms = start.elapsed().as_millis() as u64,
            "Prompt classification complete"
        );

        Ok(result)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Prompt Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Build the few-shot system prompt from the registry
pub fn build_system_prompt(registry: &CategoryRegistry, examples_per_category: usize) -> String {
    let mut out = String::from(
        "You are a text classifier. Assign the input text to exactly one of the \
         categories below and estimate how confident you are.\n\n=== CATEGORIES ===\n",
    );

    for category in registry.all() {
        let _ = writeln!(out, "\n## {}", category.name);
        if !category.description.trim().is_empty() {
            let _ = writeln!(out, "Description: {}", category.description.trim());
        }
        if !category.keywords.is_empty() {
            let keywords: Vec<&str> = category.keywords.iter().map(String::as_str).collect();
            let _ = writeln!(out, "Keywords: {}", keywords.join(", "));
        }
        out.push_str("Examples:\n");
        for example in category.examples.iter().take(examples_per_category) {
            let _ = writeln!(out, "- {example:?}");
        }
    }

    let names: Vec<&str> = registry.all().iter().map(|c| c.name.as_str()).collect();
    let _ = write!(
        out,
        r#"
=== OUTPUT FORMAT ===

Respond with a single JSON object and nothing else:
{{"category": "<name>", "confidence": <number 0.0-1.0>, "reasoning": "<one sentence>", "secondary_category": "<name or null>", "secondary_confidence": <number 0.0-1.0 or null>}}

Rules:
- "category" MUST be one of: {names}
- "confidence" is your probability that "category" is correct.
- "secondary_category" is the next most likely category, or null.
- Do not invent categories. Do not add text outside the JSON object."#,
        names = names.join(", ")
    );

    out
}

fn build_user_message(text: &str) -> String {
    format!("Text to classify:\n---\n{text}\n---")
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Reply shape; secondary fields stay untyped so a malformed annotation
/// cannot fail an otherwise valid primary classification
#[derive(Debug, Deserialize)]
struct RawReply {
    category: String,
    confidence: f64,
    reasoning: String,
    #[serde(default)]
    secondary_category: Option<serde_json::Value>,
    #[serde(default)]
    secondary_confidence: Option<serde_json::Value>,
}

/// Validate a model reply against the registry
pub fn parse_reply(reply: &str, registry: &CategoryRegistry) -> Result<ClassificationResult> {
    let body = strip_code_fence(reply);

    let raw: RawReply = serde_json::from_str(body)
        .map_err(|e| RoutecatError::parse_with_source("model reply is not a valid classification object", e))?;

    if !registry.contains(&raw.category) {
        return Err(RoutecatError::parse(format!(
            "model predicted unregistered category '{}'",
            raw.category
        )));
    }

    if !raw.confidence.is_finite() || !(0.0..=1.0).contains(&raw.confidence) {
        return Err(RoutecatError::parse(format!(
            "model confidence {} outside [0, 1]",
            raw.confidence
        )));
    }

    let mut result = ClassificationResult::new(raw.category, raw.confidence, raw.reasoning);

    if let Some((category, confidence)) = parse_secondary(
        raw.secondary_category.as_ref(),
        raw.secondary_confidence.as_ref(),
        &result.category,
        registry,
    ) {
        result = result.with_secondary(category, confidence);
    }

    Ok(result)
}

fn parse_secondary(
    category: Option<&serde_json::Value>,
    confidence: Option<&serde_json::Value>,
    primary: &str,
    registry: &CategoryRegistry,
) -> Option<(String, f64)> {
    let category = category.and_then(serde_json::Value::as_str)?;
    let confidence = confidence.and_then(serde_json::Value::as_f64)?;

    if category == primary || !registry.contains(category) {
        tracing::debug!(
            secondary = category,
            "Dropping secondary prediction: unregistered or same as primary"
        );
        return None;
    }
    if !(0.0..=1.0).contains(&confidence) {
        tracing::debug!(
            secondary = category,
            confidence,
            "Dropping secondary prediction: confidence outside [0, 1]"
        );
        return None;
    }

    Some((category.to_string(), confidence))
}

/// Remove a surrounding markdown code fence (```json ... ```), if present
fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string ("json") on the opening fence line.
    match rest.find('\n') {
        Some(pos) => rest[pos + 1..].trim(),
        None => rest.trim(),
    }
}

//! Pipeline configuration loading
//!
//! Loads configuration from `~/.config/routecat/routecat.toml` (or the
//! `ROUTECAT_CONFIG` env var). The taxonomy lives in the same file as a list
//! of `[[categories]]` tables.

use crate::errors::{Result, RoutecatError};
use crate::registry::{CategoryDefinition, CategoryRegistry};
use crate::router::ConfidenceRouter;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default upper bound on in-flight provider calls during a batch
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Default name of the category used when a result is rejected
pub const DEFAULT_FALLBACK_CATEGORY: &str = "other";

/// Root configuration
#[derive(Debug, Deserialize, Clone)]
pub struct RoutecatConfig {
    /// Strategy selection and batch limits
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Generative (prompt) strategy settings
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Embedding strategy settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Routing thresholds
    #[serde(default)]
    pub router: RouterConfig,

    /// Action taken for rejected results
    #[serde(default)]
    pub fallback: FallbackConfig,

    /// External review queue
    #[serde(default)]
    pub review_queue: ReviewQueueConfig,

    /// The taxonomy, in registration order
    #[serde(default)]
    pub categories: Vec<CategoryDefinition>,
}

/// Which classification strategy the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Prompt,
    Embedding,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prompt => "prompt",
            Self::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Strategy {
    type Err = RoutecatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "prompt" => Ok(Self::Prompt),
            "embedding" => Ok(Self::Embedding),
            other => Err(RoutecatError::config(format!(
                "unknown classifier strategy '{other}' (expected 'prompt' or 'embedding')"
            ))),
        }
    }
}

/// Classifier selection and provider call limits
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Maximum provider calls in flight during a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-call timeout for model and embedding requests
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            max_concurrency: default_max_concurrency(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ClassifierConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Generative model settings
#[derive(Debug, Deserialize, Clone)]
pub struct PromptConfig {
    /// OpenAI-compatible base URL (e.g., "http://127.0.0.1:8000/v1")
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_chat_model")]
    pub model: String,

    /// Environment variable holding the bearer token, if any
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Few-shot examples included per category
    #[serde(default = "default_examples_per_category")]
    pub examples_per_category: usize,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    256
}
fn default_examples_per_category() -> usize {
    3
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_chat_model(),
            api_key_env: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            examples_per_category: default_examples_per_category(),
        }
    }
}

/// Embedding service settings
#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_embedding_model(),
            api_key_env: None,
        }
    }
}

/// Decision boundary: `auto` at or above `high`, `review` in `[low, high)`,
/// `reject` below `low`
#[derive(Debug, Deserialize, Clone)]
pub struct RouterConfig {
    #[serde(default = "default_high")]
    pub high: f64,

    #[serde(default = "default_low")]
    pub low: f64,
}

fn default_high() -> f64 {
    0.85
}
fn default_low() -> f64 {
    0.5
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            high: default_high(),
            low: default_low(),
        }
    }
}

/// Fallback for rejected results
#[derive(Debug, Deserialize, Clone)]
pub struct FallbackConfig {
    #[serde(default = "default_fallback_category")]
    pub category: String,

    /// Note attached to fallback actions
    #[serde(default = "default_fallback_note")]
    pub note: String,
}

fn default_fallback_category() -> String {
    DEFAULT_FALLBACK_CATEGORY.to_string()
}
fn default_fallback_note() -> String {
    "confidence below rejection threshold; assigned fallback category".to_string()
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            category: default_fallback_category(),
            note: default_fallback_note(),
        }
    }
}

/// Review queue collaborator; no endpoint means an in-process queue
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ReviewQueueConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl Default for RoutecatConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            prompt: PromptConfig::default(),
            embedding: EmbeddingConfig::default(),
            router: RouterConfig::default(),
            fallback: FallbackConfig::default(),
            review_queue: ReviewQueueConfig::default(),
            categories: Vec::new(),
        }
    }
}

impl RoutecatConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "ROUTECAT_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "routecat.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `ROUTECAT_CONFIG` environment variable
    /// 2. `~/.config/routecat/routecat.toml`
    ///
    /// If the config file doesn't exist, returns default configuration
    /// (which has no categories, so building a pipeline from it fails).
    pub fn load() -> Result<Self> {
        let path = Self::resolve_config_path();

        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "routecat config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            RoutecatError::config_with_source(
                format!("failed to read config at {}", path.display()),
                e,
            )
        })?;

        Self::parse(&contents)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: RoutecatConfig = toml::from_str(contents)
            .map_err(|e| RoutecatError::config_with_source("failed to parse config", e))?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Resolve the configuration file path
    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("routecat")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate settings that do not depend on the taxonomy
    ///
    /// Taxonomy checks run in `registry()`, so a config without categories
    /// still parses (useful for `--config` overrides layered in tests).
    pub fn validate(&self) -> Result<()> {
        ConfidenceRouter::new(self.router.high, self.router.low)?;

        if self.classifier.max_concurrency == 0 {
            return Err(RoutecatError::config(
                "classifier.max_concurrency must be at least 1",
            ));
        }
        if self.classifier.timeout_ms == 0 {
            return Err(RoutecatError::config("classifier.timeout_ms must be positive"));
        }

        match self.classifier.strategy {
            Strategy::Prompt => {
                require_non_empty("prompt.endpoint", &self.prompt.endpoint)?;
                require_non_empty("prompt.model", &self.prompt.model)?;
                if !(0.0..=2.0).contains(&self.prompt.temperature) {
                    return Err(RoutecatError::config(format!(
                        "prompt.temperature {} outside [0, 2]",
                        self.prompt.temperature
                    )));
                }
                if self.prompt.max_tokens == 0 {
                    return Err(RoutecatError::config("prompt.max_tokens must be positive"));
                }
                if self.prompt.temperature > 0.3 {
                    tracing::warn!(
                        temperature = self.prompt.temperature,
                        "High sampling temperature makes classification replies unstable"
                    );
                }
            }
            Strategy::Embedding => {
                require_non_empty("embedding.endpoint", &self.embedding.endpoint)?;
                require_non_empty("embedding.model", &self.embedding.model)?;
            }
        }

        require_non_empty("fallback.category", &self.fallback.category)?;

        if let Some(endpoint) = &self.review_queue.endpoint {
            require_non_empty("review_queue.endpoint", endpoint)?;
        }

        Ok(())
    }

    /// Build the validated category registry, checking that the fallback
    /// category is part of it
    pub fn registry(&self) -> Result<CategoryRegistry> {
        let registry = CategoryRegistry::register(self.categories.clone())?;
        if !registry.contains(&self.fallback.category) {
            return Err(RoutecatError::config(format!(
                "fallback category '{}' is not registered",
                self.fallback.category
            )));
        }
        Ok(registry)
    }

    /// Build the router from the configured thresholds
    pub fn router(&self) -> Result<ConfidenceRouter> {
        ConfidenceRouter::new(self.router.high, self.router.low)
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(RoutecatError::config(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Read a bearer token from the named environment variable, if configured
pub(crate) fn resolve_api_key(env_var: Option<&str>) -> Option<String> {
    let name = env_var?;
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            tracing::warn!(env_var = name, "API key variable configured but not set");
            None
        }
    }
}

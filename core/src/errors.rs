//! Error types for the classification pipeline
//!
//! Every failure maps to an `ErrorCategory`, which drives three policies:
//! whether the pipeline may start (config), whether a batch item failure is
//! isolated to that item, and which status code the transport layer returns.

use thiserror::Error;

/// Error category for structured logging and behavior mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid taxonomy, thresholds or settings; fatal at startup
    ConfigError,
    /// Embedding classification attempted before the exemplar index was built
    NotReady,
    /// Model reply missing fields, wrong types, or naming an unregistered category
    ParseError,
    /// Network or model-service failure
    ProviderError,
    /// Model or embedding call exceeded the per-call timeout
    ProviderTimeout,
    /// Evaluator input length or label mismatch
    ShapeError,
    /// Caller supplied unusable input (e.g. blank text)
    InputError,
    /// Review-queue collaborator failure
    QueueError,
    /// Unreadable or malformed training data
    DatasetError,
    /// Unexpected logic bugs
    InternalError,
}

impl ErrorCategory {
    /// Machine-readable code for logging and API error bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::NotReady => "NOT_READY",
            Self::ParseError => "PARSE_ERROR",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::ShapeError => "SHAPE_ERROR",
            Self::InputError => "INPUT_ERROR",
            Self::QueueError => "QUEUE_ERROR",
            Self::DatasetError => "DATASET_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether a failure of this kind stays confined to one batch item
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::ParseError | Self::ProviderError | Self::ProviderTimeout | Self::InputError
        )
    }

    /// Status code the HTTP transport should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InputError | Self::ShapeError | Self::DatasetError => 400,
            Self::ParseError => 422,
            Self::ProviderError | Self::QueueError => 502,
            Self::NotReady => 503,
            Self::ProviderTimeout => 504,
            Self::ConfigError | Self::InternalError => 500,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline error with category and context
#[derive(Debug, Error)]
pub enum RoutecatError {
    #[error("config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("not ready: {message}")]
    NotReady { message: String },

    #[error("parse error: {message}")]
    Parse {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("provider error: {message}")]
    Provider {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("provider timeout after {timeout_ms}ms: {message}")]
    ProviderTimeout { message: String, timeout_ms: u64 },

    #[error("shape error: {message}")]
    Shape { message: String },

    #[error("invalid input: {message}")]
    Input { message: String },

    #[error("review queue error: {message}")]
    Queue {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("dataset error: {message}")]
    Dataset {
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl RoutecatError {
    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config { .. } => ErrorCategory::ConfigError,
            Self::NotReady { .. } => ErrorCategory::NotReady,
            Self::Parse { .. } => ErrorCategory::ParseError,
            Self::Provider { .. } => ErrorCategory::ProviderError,
            Self::ProviderTimeout { .. } => ErrorCategory::ProviderTimeout,
            Self::Shape { .. } => ErrorCategory::ShapeError,
            Self::Input { .. } => ErrorCategory::InputError,
            Self::Queue { .. } => ErrorCategory::QueueError,
            Self::Dataset { .. } => ErrorCategory::DatasetError,
            Self::Internal { .. } => ErrorCategory::InternalError,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a parse error with source
    pub fn parse_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a provider error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Create a provider error with source
    pub fn provider_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Provider {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn provider_timeout(message: impl Into<String>, timeout_ms: u64) -> Self {
        Self::ProviderTimeout {
            message: message.into(),
            timeout_ms,
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create a review-queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    /// Create a review-queue error with source
    pub fn queue_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a dataset error
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset {
            message: message.into(),
            source: None,
        }
    }

    /// Create a dataset error with source
    pub fn dataset_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Dataset {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a reqwest failure, keeping timeouts distinct from other transport errors
    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            Self::provider_timeout(format!("{context}: {err}"), timeout_ms)
        } else {
            Self::provider_with_source(format!("{context} failed"), err)
        }
    }
}

impl Clone for RoutecatError {
    fn clone(&self) -> Self {
        match self {
            Self::Config { message, .. } => Self::config(message.clone()),
            Self::NotReady { message } => Self::not_ready(message.clone()),
            Self::Parse { message, .. } => Self::parse(message.clone()),
            Self::Provider { message, .. } => Self::provider(message.clone()),
            Self::ProviderTimeout {
                message,
                timeout_ms,
            } => Self::provider_timeout(message.clone(), *timeout_ms),
            Self::Shape { message } => Self::shape(message.clone()),
            Self::Input { message } => Self::input(message.clone()),
            Self::Queue { message, .. } => Self::queue(message.clone()),
            Self::Dataset { message, .. } => Self::dataset(message.clone()),
            Self::Internal { message } => Self::internal(message.clone()),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, RoutecatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_have_distinct_codes() {
        let all = [
            ErrorCategory::ConfigError,
            ErrorCategory::NotReady,
            ErrorCategory::ParseError,
            ErrorCategory::ProviderError,
            ErrorCategory::ProviderTimeout,
            ErrorCategory::ShapeError,
            ErrorCategory::InputError,
            ErrorCategory::QueueError,
            ErrorCategory::DatasetError,
            ErrorCategory::InternalError,
        ];
        let codes: std::collections::HashSet<&str> = all.iter().map(ErrorCategory::as_str).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn timeout_is_not_a_parse_error() {
        let err = RoutecatError::provider_timeout("chat completion", 1500);
        assert_eq!(err.category(), ErrorCategory::ProviderTimeout);
        assert!(err.category().is_per_item());
        assert_eq!(err.category().http_status(), 504);
        assert!(err.to_string().contains("1500ms"));
    }

    #[test]
    fn config_and_shape_errors_are_not_per_item() {
        assert!(!ErrorCategory::ConfigError.is_per_item());
        assert!(!ErrorCategory::ShapeError.is_per_item());
        assert!(!ErrorCategory::NotReady.is_per_item());
    }

    #[test]
    fn clone_keeps_message_and_drops_source() {
        let io = std::io::Error::other("disk gone");
        let err = RoutecatError::config_with_source("failed to read config", io);
        assert!(std::error::Error::source(&err).is_some());

        let cloned = err.clone();
        assert_eq!(cloned.to_string(), "config error: failed to read config");
        assert!(std::error::Error::source(&cloned).is_none());
    }
}

//! Confidence-routed text classification
//!
//! Assigns free-form text to one category of a fixed taxonomy, scores how
//! reliable that assignment is, and routes it:
//!
//! ```text
//! text -> Classifier (prompt | embedding) -> ClassificationResult
//!      -> ConfidenceRouter -> auto | review | reject
//!      -> FallbackHandler  -> apply | queued_for_review | fallback
//! ```
//!
//! The `evaluator` module scores a classifier offline against labeled data.
//! Model, embedding and review-queue services are external collaborators
//! reached through the traits in `providers` and `review`.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod api;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod embedding;
pub mod errors;
pub mod evaluator;
pub mod fallback;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod registry;
pub mod review;
pub mod router;

pub use api::{ApiError, ClassificationService};
pub use classifier::{ClassificationResult, Classifier, SecondaryPrediction};
pub use config::{RoutecatConfig, Strategy};
pub use dataset::{TrainingDataset, TrainingExample};
pub use embedding::EmbeddingClassifier;
pub use errors::{ErrorCategory, Result, RoutecatError};
pub use evaluator::{ClassifierEvaluation, DatasetEvaluation, evaluate, evaluate_dataset};
pub use fallback::{Action, FallbackHandler};
pub use pipeline::{Pipeline, PipelineOutcome};
pub use prompt::{PromptClassifier, PromptSettings};
pub use providers::{CompletionProvider, CompletionRequest, EmbeddingProvider, OpenAiCompatClient};
pub use registry::{CategoryDefinition, CategoryRegistry};
pub use review::{HttpReviewQueue, InMemoryReviewQueue, ReviewId, ReviewItem, ReviewQueue};
pub use router::{ConfidenceRouter, RoutingDecision};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

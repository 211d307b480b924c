//! # Errors
//!
//! A single error type for the coaching pipeline. The variants follow the
//! failure taxonomy of the system:
//!
//! - [`CoachError::EmbeddingService`]: the embedding backend failed (auth, rate limit,
//!   network, malformed vectors).
//! - [`CoachError::CompletionService`]: the chat model failed or timed out.
//! - [`CoachError::Configuration`]: credentials or settings are missing or inconsistent.
//! - [`CoachError::Validation`]: caller input was rejected (empty utterance, `k == 0`,
//!   oversized goal, unknown skill area).
//!
//! Construction-time failures (configuration, index build) are fatal; per-turn failures
//! are reported by the session loop and the session continues.

use thiserror::Error;

/// Every failure the library can surface.
#[derive(Debug, Error)]
pub enum CoachError {
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    #[error("completion service error: {0}")]
    CompletionService(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, CoachError>;

impl CoachError {
    /// `true` for failures that only affect the current turn.
    ///
    /// The session loop reports these and keeps accepting input; anything else
    /// aborts startup.
    pub fn is_per_turn(&self) -> bool {
        matches!(
            self,
            CoachError::EmbeddingService(_)
                | CoachError::CompletionService(_)
                | CoachError::Validation(_)
        )
    }
}

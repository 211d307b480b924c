//! This module provides functionality for loading and checking the application's configuration.
//!
//! It defines the [`CoachConfig`] struct, which holds the connection settings for the hosted
//! chat and embedding services plus the knobs that shape each turn, and [`load_config`] to
//! read it from a YAML file.
//!
//! Credentials may live in the file or in the environment: an empty (or `CHANGEME`) `api_key`
//! is replaced by `OPENAI_API_KEY`, which `main` may have loaded from a `.env` file. The
//! binary calls [`CoachConfig::validate`] before accepting the first turn, so a missing key
//! stops the process at startup rather than mid-conversation.
//!
//! # Examples
//!
//! ```no_run
//! use eque::config::load_config;
//!
//! let mut config = load_config(std::path::Path::new("/path/to/config.yaml")).unwrap();
//! config.resolve_credentials();
//! config.validate().unwrap();
//! println!("{:?}", config.model);
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use tracing::debug;

use crate::embeddings::SentenceEmbeddingsModel;
use crate::error::{CoachError, Result};

/// Environment variable consulted when the config file carries no usable key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Placeholder written by `eque init`.
pub const PLACEHOLDER_API_KEY: &str = "CHANGEME";

/// Which [`Embedder`](crate::embeddings::Embedder) backs the methodology index.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// The `/embeddings` endpoint of `api_base`.
    #[default]
    Remote,
    /// A sentence-transformer run in-process.
    Local,
    /// Offline/test backend: a deterministic feature-hashed bag of words.
    ///
    /// Needs no network and no model download, and always yields the same vector for
    /// the same text. Retrieval is lexical rather than semantic.
    Hashing,
}

/// Represents the application's configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct CoachConfig {
    /// The API key used to authenticate requests to the API.
    #[serde(default)]
    pub api_key: String,

    /// The base URL of the OpenAI-compatible API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Chat model used for coaching replies.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature for the chat model.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default)]
    pub embedding_backend: EmbeddingBackend,

    /// Embedding model; when unset the backend's default is used.
    #[serde(default)]
    pub embedding_model: Option<String>,

    // The context size of the model.
    #[serde(default = "default_context_max_tokens")]
    pub context_max_tokens: u16,

    // Tokens reserved for the reply.
    #[serde(default = "default_assistant_minimum_context_tokens")]
    pub assistant_minimum_context_tokens: u16,

    // Stream tokens as they arrive instead of waiting for the full reply.
    #[serde(default = "default_true")]
    pub should_stream: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.5
}

fn default_context_max_tokens() -> u16 {
    16384
}

fn default_assistant_minimum_context_tokens() -> u16 {
    2048
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    2
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_api_base(),
            model: default_model(),
            temperature: default_temperature(),
            embedding_backend: EmbeddingBackend::default(),
            embedding_model: None,
            context_max_tokens: default_context_max_tokens(),
            assistant_minimum_context_tokens: default_assistant_minimum_context_tokens(),
            should_stream: true,
            request_timeout_secs: default_request_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

impl CoachConfig {
    /// The embedding model to request, falling back to the backend's default.
    pub fn embedding_model(&self) -> String {
        match (&self.embedding_model, self.embedding_backend) {
            (Some(model), _) => model.clone(),
            (None, EmbeddingBackend::Local) => SentenceEmbeddingsModel::DEFAULT_MODEL_ID.to_string(),
            (None, EmbeddingBackend::Remote) => "text-embedding-3-small".to_string(),
            (None, EmbeddingBackend::Hashing) => "hashing".to_string(),
        }
    }

    /// Tokens available to the prompt once the reply reservation is taken out.
    pub fn prompt_token_budget(&self) -> usize {
        (self.context_max_tokens as usize)
            .saturating_sub(self.assistant_minimum_context_tokens as usize)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fill a missing or placeholder `api_key` from [`API_KEY_ENV`].
    pub fn resolve_credentials(&mut self) {
        self.apply_env_key(std::env::var(API_KEY_ENV).ok());
    }

    /// The environment-independent half of [`resolve_credentials`](Self::resolve_credentials).
    pub fn apply_env_key(&mut self, env_key: Option<String>) {
        let file_key = self.api_key.trim();
        if file_key.is_empty() || file_key == PLACEHOLDER_API_KEY {
            if let Some(key) = env_key.filter(|k| !k.trim().is_empty()) {
                debug!("Using API key from {}", API_KEY_ENV);
                self.api_key = key;
            }
        }
    }

    /// Fail fast on settings that would only break later, mid-session.
    ///
    /// # Errors
    /// [`CoachError::Configuration`] when the API key is missing (and a hosted service
    /// needs one), the base URL is empty, or the reply reservation eats the whole context.
    pub fn validate(&self) -> Result<()> {
        let key = self.api_key.trim();
        if key.is_empty() || key == PLACEHOLDER_API_KEY {
            return Err(CoachError::Configuration(format!(
                "no API key: set `api_key` in config.yaml or export {API_KEY_ENV}"
            )));
        }
        if self.api_base.trim().is_empty() {
            return Err(CoachError::Configuration("`api_base` is empty".into()));
        }
        if self.model.trim().is_empty() {
            return Err(CoachError::Configuration("`model` is empty".into()));
        }
        if self.prompt_token_budget() == 0 {
            return Err(CoachError::Configuration(format!(
                "assistant_minimum_context_tokens ({}) must be below context_max_tokens ({})",
                self.assistant_minimum_context_tokens, self.context_max_tokens
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoachError::Configuration(
                "`request_timeout_secs` must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Loads the application's configuration from a YAML file.
///
/// Missing optional fields take their defaults, so a file holding only `api_key` is valid.
///
/// # Errors
/// Returns [`CoachError::Io`] if the file cannot be read and [`CoachError::Yaml`] if it does
/// not parse.
pub fn load_config(file: &Path) -> Result<CoachConfig> {
    debug!("Loading config from: {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: CoachConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

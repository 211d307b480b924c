//! # Eque (library root)
//!
//! A retrieval-augmented coach for interpersonal skills. Each turn embeds the user's
//! utterance, retrieves the closest coaching methodologies from a small fixed corpus and
//! asks a chat model for a reply shaped by a coaching persona, the retrieved material,
//! the session parameters and the conversation so far.
//!
//! ## Pipeline
//! ```text
//! utterance ─▶ Retriever ─▶ PromptComposer ─▶ CompletionService ─▶ reply
//!                 │                ▲
//!          EmbeddingIndex   ConversationMemory
//! ```
//!
//! ## Modules
//! - [`corpus`]: the six built-in methodologies.
//! - [`embeddings`]: the [`Embedder`](embeddings::Embedder) trait with remote, local
//!   (Candle) and hashing backends.
//! - [`vector_store`]: the immutable [`EmbeddingIndex`](vector_store::EmbeddingIndex).
//! - [`retriever`]: top-k retrieval formatted as prompt context.
//! - [`parameters`]: skill area, level and goal.
//! - [`template`]: the persona and its YAML overrides.
//! - [`prompt`]: prompt composition and token budgeting.
//! - [`session_messages`]: the append-only conversation memory.
//! - [`api`]: the [`CompletionService`](api::CompletionService) seam and its OpenAI client.
//! - [`session`]: the turn state machine.
//! - [`config`], [`error`]: configuration and the error type.
//! - [`commands`], [`interactive`]: the terminal surface.

use directories::ProjectDirs;
use std::path::PathBuf;

pub mod api;
pub mod commands;
pub mod config;
pub mod corpus;
pub mod embeddings;
pub mod error;
pub mod interactive;
pub mod parameters;
pub mod prompt;
pub mod retriever;
pub mod session;
pub mod session_messages;
pub mod template;
pub mod vector_store;

use crate::error::{CoachError, Result};

/// Return the per-platform configuration directory used by Eque.
///
/// This uses [`directories::ProjectDirs`] with the application triple
/// `("com", "eque", "eque")`, e.g. `~/.config/eque` on Linux.
///
/// The directory is **not** created by this function.
///
/// # Errors
/// [`CoachError::Configuration`] if no home directory can be determined.
pub fn config_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "eque", "eque").ok_or_else(|| {
        CoachError::Configuration("Unable to determine config directory".into())
    })?;
    Ok(proj_dirs.config_dir().to_path_buf())
}

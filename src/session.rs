//! # Session loop
//!
//! Drives one coaching conversation turn by turn:
//!
//! ```text
//! Idle -> AwaitingInput -> Retrieving -> Composing -> Completing -> Appending -> Idle
//! ```
//!
//! A turn appends the human message, retrieves methodologies for it, composes the prompt
//! from the history *before* that message, asks the [`CompletionService`] for a reply
//! (forwarding chunks as [`TurnEvent`]s while they arrive) and finally appends the
//! assistant message. When retrieval, composition or completion fails the human message
//! stays in memory on its own, a [`TurnEvent::Failed`] is sent and the session returns to
//! [`TurnState::Idle`] ready for the next utterance.
//!
//! `turn` takes `&mut self`, so one session never runs two turns at once.

use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::api::CompletionService;
use crate::error::{CoachError, Result};
use crate::parameters::SessionParameters;
use crate::prompt::PromptComposer;
use crate::retriever::Retriever;
use crate::session_messages::{ConversationMemory, Message};

/// Default bound on one completion, stream included.
pub const DEFAULT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(60);

/// Where the session is within a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    AwaitingInput,
    Retrieving,
    Composing,
    Completing,
    Appending,
}

/// Progress of a turn, delivered in order over an unbounded channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// A piece of the reply, as soon as the model produced it.
    Chunk(String),
    /// The full reply, after it was recorded in memory.
    Completed(String),
    /// The turn failed; the message describes why.
    Failed(String),
}

/// One coaching session: parameters, memory and the collaborators a turn needs.
pub struct SessionLoop {
    retriever: Retriever,
    composer: PromptComposer,
    completion: Arc<dyn CompletionService>,
    memory: ConversationMemory,
    parameters: SessionParameters,
    state: TurnState,
    completion_timeout: Duration,
}

impl SessionLoop {
    pub fn new(
        retriever: Retriever,
        composer: PromptComposer,
        completion: Arc<dyn CompletionService>,
    ) -> Self {
        Self {
            retriever,
            composer,
            completion,
            memory: ConversationMemory::new(),
            parameters: SessionParameters::default(),
            state: TurnState::Idle,
            completion_timeout: DEFAULT_COMPLETION_TIMEOUT,
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    /// Start with `parameters` instead of the defaults.
    pub fn with_parameters(mut self, parameters: SessionParameters) -> Result<Self> {
        self.set_parameters(parameters)?;
        Ok(self)
    }

    /// Replace the session parameters; applies from the next turn on.
    pub fn set_parameters(&mut self, parameters: SessionParameters) -> Result<()> {
        parameters.validate()?;
        info!(
            skill_area = %parameters.skill_area,
            level = %parameters.level,
            goal = parameters.goal().unwrap_or(""),
            "Session parameters updated"
        );
        self.parameters = parameters;
        Ok(())
    }

    pub fn parameters(&self) -> &SessionParameters {
        &self.parameters
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Mark the session as waiting for the user.
    pub fn await_input(&mut self) {
        self.enter(TurnState::AwaitingInput);
    }

    fn enter(&mut self, state: TurnState) {
        debug!(from = ?self.state, to = ?state, "Turn state");
        self.state = state;
    }

    /// Run one turn and return the assistant's reply.
    ///
    /// Chunks are sent to `events` in the order the model produced them, followed by
    /// exactly one [`TurnEvent::Completed`] or [`TurnEvent::Failed`]. Send errors are
    /// ignored; a dropped receiver does not abort the turn.
    ///
    /// # Errors
    /// - [`CoachError::Validation`] for an empty utterance; nothing is appended.
    /// - [`CoachError::EmbeddingService`] or [`CoachError::CompletionService`] when a
    ///   collaborator fails; memory keeps only the human message.
    pub async fn turn(
        &mut self,
        utterance: &str,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<String> {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Err(CoachError::Validation("utterance is empty".into()));
        }
        if self.state == TurnState::Idle {
            self.enter(TurnState::AwaitingInput);
        }

        let history_len = self.memory.len();
        self.memory.append(Message::human(utterance));

        match self.respond(utterance, history_len, events).await {
            Ok(reply) => {
                self.enter(TurnState::Appending);
                self.memory.append(Message::assistant(reply.clone()));
                send(events, TurnEvent::Completed(reply.clone()));
                self.enter(TurnState::Idle);
                info!(messages = self.memory.len(), "Turn completed");
                Ok(reply)
            }
            Err(err) => {
                error!(state = ?self.state, error = %err, "Turn failed");
                send(events, TurnEvent::Failed(err.to_string()));
                self.enter(TurnState::Idle);
                Err(err)
            }
        }
    }

    async fn respond(
        &mut self,
        utterance: &str,
        history_len: usize,
        events: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<String> {
        self.enter(TurnState::Retrieving);
        let context = self.retriever.retrieve(utterance).await?;

        self.enter(TurnState::Composing);
        let prompt = self.composer.compose(
            &context,
            &self.parameters,
            &self.memory.all()[..history_len],
            utterance,
        );
        debug!(prompt = %prompt.render(), "Composed prompt");

        self.enter(TurnState::Completing);
        let completion = Arc::clone(&self.completion);
        let drain = async {
            let mut stream = completion.stream(&prompt).await?;
            let mut reply = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                send(events, TurnEvent::Chunk(chunk.clone()));
                reply.push_str(&chunk);
            }
            Ok::<_, CoachError>(reply)
        };

        let reply = tokio::time::timeout(self.completion_timeout, drain)
            .await
            .map_err(|_| {
                CoachError::CompletionService(format!(
                    "no reply within {}s",
                    self.completion_timeout.as_secs_f32()
                ))
            })??;

        if reply.trim().is_empty() {
            return Err(CoachError::CompletionService("model returned an empty reply".into()));
        }
        Ok(reply)
    }
}

fn send(events: Option<&UnboundedSender<TurnEvent>>, event: TurnEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

//! # Prompt composer
//!
//! Builds the exact message list sent to the chat model for one turn. The layout is
//! fixed:
//!
//! 1. a **system** message carrying the persona and the five-phase protocol,
//! 2. the prior conversation, oldest first, as user/assistant messages,
//! 3. a final **user** message with three labeled sections: the retrieved methodologies,
//!    the session parameters and the new utterance.
//!
//! ```text
//! Relevant coaching methodologies:
//! <retrieved context>
//!
//! Session parameters:
//! - Skill area: Influencing
//! - Current level: Advanced
//! - Specific goal: Win budget approval
//!
//! User message:
//! <utterance>
//! ```
//!
//! Composition is a pure function of its inputs; identical inputs give a byte-identical
//! [`ComposedPrompt`]. The protocol phases are instructions to the model only and are not
//! tracked here.
//!
//! ## Token budget
//! With [`PromptComposer::with_token_budget`] the composer counts tokens with
//! `cl100k_base` and leaves out the oldest history messages until the prompt fits. The
//! retained history always starts on a human message. Only the prompt is shortened; the
//! conversation memory itself is untouched.

use async_openai::types::chat::Role;
use tiktoken_rs::{CoreBPE, cl100k_base};
use tracing::info;

use crate::error::{CoachError, Result};
use crate::parameters::SessionParameters;
use crate::session_messages::{Message, Speaker};
use crate::template::CoachTemplate;

/// One message of a composed prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The model input for one turn.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComposedPrompt {
    pub messages: Vec<PromptMessage>,
    /// History messages left out to respect the token budget.
    pub omitted_history: usize,
}

impl ComposedPrompt {
    /// Plain-text rendering, for logs and debugging.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("[{}]\n{}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Assembles persona, history, retrieved context and parameters into a prompt.
pub struct PromptComposer {
    template: CoachTemplate,
    token_budget: Option<usize>,
    bpe: Option<CoreBPE>,
}

impl PromptComposer {
    pub fn new(template: CoachTemplate) -> Self {
        Self {
            template,
            token_budget: None,
            bpe: None,
        }
    }

    /// Cap the prompt at `budget` tokens by omitting the oldest history.
    ///
    /// # Errors
    /// [`CoachError::Configuration`] if the tokenizer tables cannot be loaded.
    pub fn with_token_budget(mut self, budget: usize) -> Result<Self> {
        let bpe = cl100k_base()
            .map_err(|e| CoachError::Configuration(format!("loading tokenizer: {e}")))?;
        self.token_budget = Some(budget);
        self.bpe = Some(bpe);
        Ok(self)
    }

    pub fn persona(&self) -> &str {
        &self.template.system_prompt
    }

    /// Compose the prompt for one turn.
    ///
    /// `history` is every message before this turn's utterance, oldest first.
    pub fn compose(
        &self,
        context: &str,
        parameters: &SessionParameters,
        history: &[Message],
        utterance: &str,
    ) -> ComposedPrompt {
        let system = self.template.system_prompt.clone();
        let final_turn = self.final_turn(context, parameters, utterance);
        let start = self.history_start(&system, &final_turn, history);

        if start > 0 {
            info!(omitted = start, "History exceeds the token budget, omitting oldest messages");
        }

        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(PromptMessage::new(Role::System, system));
        messages.extend(history[start..].iter().map(|m| {
            let role = match m.speaker {
                Speaker::Human => Role::User,
                Speaker::Assistant => Role::Assistant,
            };
            PromptMessage::new(role, m.content.clone())
        }));
        messages.push(PromptMessage::new(Role::User, final_turn));

        ComposedPrompt {
            messages,
            omitted_history: start,
        }
    }

    fn final_turn(&self, context: &str, parameters: &SessionParameters, utterance: &str) -> String {
        let context = match context.trim() {
            "" => "(none retrieved)",
            trimmed => trimmed,
        };
        let goal = parameters.goal().unwrap_or("(not specified)");

        format!(
            "Relevant coaching methodologies:\n{context}\n\n\
             Session parameters:\n\
             - Skill area: {}\n\
             - Current level: {}\n\
             - Specific goal: {goal}\n\n\
             User message:\n{}",
            parameters.skill_area,
            parameters.level,
            self.template.decorate(utterance),
        )
    }

    /// Index of the first history message that fits the budget.
    fn history_start(&self, system: &str, final_turn: &str, history: &[Message]) -> usize {
        let (Some(budget), Some(_)) = (self.token_budget, &self.bpe) else {
            return 0;
        };

        let costs: Vec<usize> = history.iter().map(|m| self.count_tokens(&m.content)).collect();
        let mut total =
            self.count_tokens(system) + self.count_tokens(final_turn) + costs.iter().sum::<usize>();

        let mut start = 0;
        while total > budget && start < history.len() {
            total -= costs[start];
            start += 1;
            while start < history.len() && history[start].speaker == Speaker::Assistant {
                total -= costs[start];
                start += 1;
            }
        }
        start
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.bpe
            .as_ref()
            .map(|bpe| bpe.encode_with_special_tokens(text).len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::{Level, SkillArea};

    fn params() -> SessionParameters {
        SessionParameters::new(SkillArea::ConflictResolution, Level::Intermediate, "Calm team stand-ups")
    }

    fn history() -> Vec<Message> {
        vec![
            Message::human("Hello"),
            Message::assistant("Hi! What would you like help with?"),
        ]
    }

    #[test]
    fn layout_is_system_then_history_then_labeled_turn() {
        let composer = PromptComposer::new(CoachTemplate::default());
        let prompt = composer.compose("GROW:\nGoal, Reality", &params(), &history(), "I avoid conflict");

        let roles: Vec<_> = prompt.messages.iter().map(|m| m.role.clone()).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(prompt.messages[0].content, composer.persona());
        assert_eq!(prompt.messages[1].content, "Hello");

        let last = &prompt.messages[3].content;
        assert_eq!(
            last,
            "Relevant coaching methodologies:\nGROW:\nGoal, Reality\n\n\
             Session parameters:\n\
             - Skill area: Conflict Resolution\n\
             - Current level: Intermediate\n\
             - Specific goal: Calm team stand-ups\n\n\
             User message:\nI avoid conflict"
        );
        assert_eq!(prompt.omitted_history, 0);
    }

    #[test]
    fn composition_is_pure() {
        let composer = PromptComposer::new(CoachTemplate::default())
            .with_token_budget(4096)
            .unwrap();
        let history = history();

        let a = composer.compose("ctx", &params(), &history, "Hi");
        let b = composer.compose("ctx", &params(), &history, "Hi");
        assert_eq!(a, b);
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn placeholders_fill_missing_context_and_goal() {
        let composer = PromptComposer::new(CoachTemplate::default());
        let prompt = composer.compose("  ", &SessionParameters::default(), &[], "Hello");

        assert_eq!(prompt.messages.len(), 2);
        let last = &prompt.messages[1].content;
        assert!(last.contains("Relevant coaching methodologies:\n(none retrieved)"));
        assert!(last.contains("- Skill area: Active Listening"));
        assert!(last.contains("- Current level: Beginner"));
        assert!(last.contains("- Specific goal: (not specified)"));
    }

    #[test]
    fn template_decorates_only_the_utterance() {
        let template = CoachTemplate {
            system_prompt: "Be brief.".into(),
            pre_user_message_content: Some("Coachee says:".into()),
            post_user_message_content: None,
        };
        let composer = PromptComposer::new(template);
        let prompt = composer.compose("", &params(), &history(), "Help");

        assert_eq!(prompt.messages[0].content, "Be brief.");
        assert_eq!(prompt.messages[1].content, "Hello");
        assert!(prompt.messages[3].content.ends_with("User message:\nCoachee says: Help"));
    }

    #[test]
    fn token_budget_omits_oldest_history_first() {
        let long = "practice listening without interrupting ".repeat(40);
        let mut history = Vec::new();
        for i in 0..6 {
            history.push(Message::human(format!("{i} {long}")));
            history.push(Message::assistant(format!("{i} {long}")));
        }

        let unlimited = PromptComposer::new(CoachTemplate::default());
        assert_eq!(
            unlimited.compose("ctx", &params(), &history, "Next?").messages.len(),
            history.len() + 2
        );

        let composer = PromptComposer::new(CoachTemplate::default())
            .with_token_budget(1200)
            .unwrap();
        let prompt = composer.compose("ctx", &params(), &history, "Next?");

        assert!(prompt.omitted_history > 0);
        assert_eq!(prompt.messages.len(), history.len() - prompt.omitted_history + 2);
        assert_eq!(prompt.messages[1].role, Role::User);
        assert!(prompt.messages[1].content.starts_with(&prompt.omitted_history.div_ceil(2).to_string()));

        let used: usize = prompt
            .messages
            .iter()
            .map(|m| composer.count_tokens(&m.content))
            .sum();
        assert!(used <= 1200, "prompt uses {used} tokens");
    }

    #[test]
    fn tiny_budget_still_keeps_system_and_final_turn() {
        let composer = PromptComposer::new(CoachTemplate::default())
            .with_token_budget(1)
            .unwrap();
        let prompt = composer.compose("ctx", &params(), &history(), "Hi");

        assert_eq!(prompt.omitted_history, 2);
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, Role::System);
    }
}

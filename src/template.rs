//! # Coaching templates
//!
//! A template is a small YAML document that overrides the coach's persona:
//!
//! - `system_prompt`: the persona and conversation protocol sent as the system message,
//! - optional `pre_user_message_content` / `post_user_message_content` strings that are
//!   added before/after the user's words in the final turn of every prompt.
//!
//! Templates live under the configuration directory:
//!
//! ```text
//! <config_dir>/templates/<name>.yaml
//! ```
//!
//! When no template is requested the built-in [`CoachTemplate::default`] is used, which
//! carries the Eque persona and its five-phase protocol.
//!
//! ## Minimal YAML example
//!
//! ```yaml
//! system_prompt: "You are Eque, a concise interpersonal skills coach."
//! # post_user_message_content: "Keep replies under 150 words."
//! ```

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::error::Result;

/// The built-in persona: who Eque is and the protocol it walks the user through.
pub const DEFAULT_PERSONA: &str = "You are Eque (pronounced e-que), a warm and experienced \
interpersonal skills coach talking with a human.

Your job is to help the person identify their strengths and limitations in interpersonal \
skills such as active listening, clear communication, influencing, creative thinking, \
collaboration, self reflection and conflict resolution. Pay attention to the tone of what \
they write and reflect back what you think they might be thinking or feeling.

Guide the conversation through five phases, moving on only when the current one is done:
1. Greeting: welcome the person and ask what they would like help with.
2. Assessment: ask questions and short scenarios to find where they struggle.
3. Technique teaching: explain one or two specific techniques that address those weaknesses, \
drawing on the methodologies supplied with each message.
4. Practice: set up a realistic role-play and ask them to use the technique on you.
5. Feedback: give constructive, specific feedback and tell them what they did well.

Tailor depth and vocabulary to the person's stated level and keep their specific goal in \
view. Ask one question at a time and let the person finish before moving on; never \
interrupt or answer on their behalf.";

/// Persona and user-message decoration for a coaching session.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CoachTemplate {
    /// Global instruction used as the session's system message.
    pub system_prompt: String,

    /// Extra text added **before** the user's words in the final turn.
    #[serde(default)]
    pub pre_user_message_content: Option<String>,

    /// Extra text added **after** the user's words in the final turn.
    #[serde(default)]
    pub post_user_message_content: Option<String>,
}

impl Default for CoachTemplate {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_PERSONA.to_string(),
            pre_user_message_content: None,
            post_user_message_content: None,
        }
    }
}

impl CoachTemplate {
    /// Wrap an utterance with the configured pre/post content.
    pub fn decorate(&self, utterance: &str) -> String {
        let mut text = utterance.to_string();
        if let Some(pre) = &self.pre_user_message_content {
            text = format!("{pre} {text}");
        }
        if let Some(post) = &self.post_user_message_content {
            text = format!("{text} {post}");
        }
        text
    }
}

/// Load a template by name from `<config_dir>/templates/<name>.yaml`.
pub fn load_template(name: &str) -> Result<CoachTemplate> {
    let path = crate::config_dir()?
        .join("templates")
        .join(format!("{name}.yaml"));
    load_template_from(&path)
}

/// Load a template from an explicit path.
pub fn load_template_from(path: &Path) -> Result<CoachTemplate> {
    tracing::info!("Loading template: {}", path.display());

    let content = fs::read_to_string(path)?;
    let template: CoachTemplate = serde_yaml::from_str(&content)?;
    Ok(template)
}

//! # Session parameters
//!
//! What the user tells the coach about themselves: which skill they want to work on,
//! how experienced they are and, optionally, a concrete goal. The values are typed so
//! the prompt composer never has to interpolate opaque strings, and so the CLI can
//! offer the fixed choices directly.
//!
//! ```rust
//! use eque::parameters::{Level, SessionParameters, SkillArea};
//!
//! let params = SessionParameters::new(SkillArea::Influencing, Level::Advanced, "Win budget approval");
//! assert!(params.validate().is_ok());
//! assert_eq!(params.skill_area.to_string(), "Influencing");
//! ```

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::{CoachError, Result};

/// Longest goal accepted, in characters.
pub const MAX_GOAL_CHARS: usize = 500;

/// The interpersonal skills the coach offers to work on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkillArea {
    #[default]
    ActiveListening,
    ClearCommunication,
    Influencing,
    CreativeThinking,
    Collaboration,
    SelfReflection,
    ConflictResolution,
}

impl SkillArea {
    pub fn label(&self) -> &'static str {
        match self {
            SkillArea::ActiveListening => "Active Listening",
            SkillArea::ClearCommunication => "Clear Communication",
            SkillArea::Influencing => "Influencing",
            SkillArea::CreativeThinking => "Creative Thinking",
            SkillArea::Collaboration => "Collaboration",
            SkillArea::SelfReflection => "Self Reflection",
            SkillArea::ConflictResolution => "Conflict Resolution",
        }
    }
}

impl fmt::Display for SkillArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SkillArea {
    type Err = CoachError;

    /// Accepts labels (`"Clear Communication"`) and kebab names (`"clear-communication"`),
    /// case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(&normalize(s), true)
            .map_err(|_| CoachError::Validation(format!("unknown skill area: {s:?}")))
    }
}

/// Self-reported experience, ordered from least to most.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Level {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Beginner => "Beginner",
            Level::Intermediate => "Intermediate",
            Level::Advanced => "Advanced",
        })
    }
}

impl FromStr for Level {
    type Err = CoachError;

    fn from_str(s: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(&normalize(s), true)
            .map_err(|_| CoachError::Validation(format!("unknown level: {s:?}")))
    }
}

fn normalize(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace([' ', '_'], "-")
}

/// The parameters applied to every turn of a session.
///
/// The [`Default`] value is what a session starts with when the user has not chosen
/// anything yet, so a completion is never requested without parameters.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionParameters {
    pub skill_area: SkillArea,
    pub level: Level,
    /// Free text; empty means "not specified".
    pub goal: String,
}

impl SessionParameters {
    pub fn new(skill_area: SkillArea, level: Level, goal: impl Into<String>) -> Self {
        Self {
            skill_area,
            level,
            goal: goal.into(),
        }
    }

    /// Reject goals longer than [`MAX_GOAL_CHARS`].
    pub fn validate(&self) -> Result<()> {
        let chars = self.goal.chars().count();
        if chars > MAX_GOAL_CHARS {
            return Err(CoachError::Validation(format!(
                "goal is {chars} characters, the limit is {MAX_GOAL_CHARS}"
            )));
        }
        Ok(())
    }

    /// The goal, or `None` when the user left it blank.
    pub fn goal(&self) -> Option<&str> {
        let goal = self.goal.trim();
        (!goal.is_empty()).then_some(goal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_beginner_active_listening() {
        let params = SessionParameters::default();
        assert_eq!(params.skill_area, SkillArea::ActiveListening);
        assert_eq!(params.level, Level::Beginner);
        assert_eq!(params.goal(), None);
    }

    #[test]
    fn skill_area_parses_labels_and_kebab_names() {
        assert_eq!(
            "Clear Communication".parse::<SkillArea>().unwrap(),
            SkillArea::ClearCommunication
        );
        assert_eq!(
            "conflict-resolution".parse::<SkillArea>().unwrap(),
            SkillArea::ConflictResolution
        );
        assert_eq!(
            "SELF_REFLECTION".parse::<SkillArea>().unwrap(),
            SkillArea::SelfReflection
        );
        assert!(matches!(
            "juggling".parse::<SkillArea>(),
            Err(CoachError::Validation(_))
        ));
    }

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Beginner < Level::Intermediate);
        assert!(Level::Intermediate < Level::Advanced);
        assert_eq!(" advanced ".parse::<Level>().unwrap(), Level::Advanced);
    }

    #[test]
    fn oversized_goal_is_rejected() {
        let params = SessionParameters::new(
            SkillArea::Influencing,
            Level::Advanced,
            "x".repeat(MAX_GOAL_CHARS + 1),
        );
        assert!(matches!(params.validate(), Err(CoachError::Validation(_))));

        let params = SessionParameters::new(
            SkillArea::Influencing,
            Level::Advanced,
            "x".repeat(MAX_GOAL_CHARS),
        );
        assert!(params.validate().is_ok());
    }

    #[test]
    fn blank_goal_reads_as_unspecified() {
        let params = SessionParameters::new(SkillArea::Collaboration, Level::Beginner, "   ");
        assert_eq!(params.goal(), None);
    }
}

//! # Methodology corpus
//!
//! The fixed reference set the retriever searches. Six coaching methodologies, each
//! keyed by a unique title. The table is compiled in and never changes at runtime,
//! so the embedding index built over it never needs rebuilding.

use serde::{Deserialize, Serialize};

/// One retrievable methodology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    /// Unique key, shown to the user when a methodology is cited.
    pub title: String,
    /// Descriptive text spliced into prompts.
    pub content: String,
}

impl CorpusEntry {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

const METHODOLOGIES: [(&str, &str); 6] = [
    (
        "Active Listening",
        "Active listening means giving the speaker your full attention and showing that you \
         understood. Techniques: keep eye contact and open posture, let the speaker finish \
         without interrupting, paraphrase what you heard (\"So what you're saying is...\"), \
         reflect the emotion behind the words (\"It sounds like that was frustrating\"), ask \
         open questions to go deeper, and summarise before responding with your own view. \
         Avoid planning your reply while the other person is still talking.",
    ),
    (
        "Nonviolent Communication",
        "Nonviolent Communication (NVC) structures difficult conversations in four steps: \
         observation (state the facts without judgement), feelings (name how you feel), \
         needs (identify the unmet need behind the feeling) and request (make a concrete, \
         doable request rather than a demand). It helps de-escalate conflict, express \
         disagreement without blame and hear criticism as an expression of someone's needs.",
    ),
    (
        "SBI Feedback Model",
        "The Situation-Behaviour-Impact model makes feedback specific and actionable. \
         Describe the situation (when and where), the observable behaviour (what the person \
         actually did or said, not your interpretation) and the impact (how it affected you, \
         the team or the outcome). Follow with a question to invite their perspective. Use \
         it for both praise and constructive criticism, and deliver feedback close to the event.",
    ),
    (
        "GROW Coaching Model",
        "GROW is a four-stage structure for coaching conversations and personal development: \
         Goal (what do you want to achieve?), Reality (where are you now, what have you \
         tried?), Options (what could you do, what else?) and Will or Way forward (what will \
         you do, by when, how committed are you?). It keeps conversations focused on the \
         learner's own thinking and ends with a concrete commitment.",
    ),
    (
        "Thomas-Kilmann Conflict Modes",
        "The Thomas-Kilmann model describes five ways of handling conflict along two axes, \
         assertiveness and cooperativeness: competing (assertive, uncooperative), \
         accommodating (cooperative, unassertive), avoiding (neither), collaborating (both, \
         seeking a win-win that satisfies everyone's concerns) and compromising (partly both, \
         splitting the difference). Effective people diagnose the situation and choose the \
         mode deliberately instead of defaulting to habit.",
    ),
    (
        "Principles of Influence",
        "Influence without authority rests on a few well-studied principles: reciprocity \
         (people return favours), commitment and consistency (small agreements lead to larger \
         ones), social proof (people follow what peers do), authority (credible expertise \
         persuades), liking (we agree with people we relate to) and scarcity (rare \
         opportunities feel more valuable). Combine them with a clear story about the \
         listener's own interests and always influence ethically.",
    ),
];

/// The six built-in methodologies, in their fixed insertion order.
///
/// Insertion order matters: the embedding index breaks score ties by it.
pub fn methodologies() -> Vec<CorpusEntry> {
    METHODOLOGIES
        .iter()
        .map(|(title, content)| CorpusEntry::new(*title, *content))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn corpus_has_six_uniquely_titled_entries() {
        let entries = methodologies();
        assert_eq!(entries.len(), 6);

        let titles: HashSet<_> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles.len(), 6, "titles must be unique keys");
        assert!(entries.iter().all(|e| !e.content.trim().is_empty()));
    }

    #[test]
    fn corpus_order_is_stable() {
        assert_eq!(methodologies(), methodologies());
        assert_eq!(methodologies()[0].title, "Active Listening");
    }
}

//! Conversation turns and the per-session history they accumulate into.

use serde::{Deserialize, Serialize};

/// Reserved message the front-end sends after the user has been quiet for a while.
pub const PROACTIVE_NUDGE_SENTINEL: &str = "[USER_IS_QUIET_YUKI_PLEASE_SPEAK]";

/// Placeholder user turn used when a nudge arrives before any real conversation.
pub const NUDGE_PLACEHOLDER_PROMPT: &str = "What's on your mind?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message, shaped the way chat-completion APIs expect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Ordered, append-only list of turns. The first turn, when present, is the persona.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
}

impl ConversationHistory {
    /// Start a history seeded with the persona's system prompt.
    pub fn with_persona(system_prompt: impl Into<String>) -> Self {
        Self { turns: vec![Turn::system(system_prompt)] }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// True when nothing but (at most) the persona turn has been recorded.
    pub fn has_no_exchange(&self) -> bool {
        self.turns.iter().all(|t| t.role == Role::System)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// What the client asked for on this turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserInput {
    Message(String),
    /// No new input: the assistant should speak unprompted.
    ProactiveNudge,
}

impl UserInput {
    /// Classify a raw client message. Returns `None` when it is missing or blank.
    pub fn from_raw(raw: Option<&str>) -> Option<Self> {
        let raw = raw?;
        if raw.trim().is_empty() {
            return None;
        }
        if raw.trim() == PROACTIVE_NUDGE_SENTINEL {
            Some(UserInput::ProactiveNudge)
        } else {
            Some(UserInput::Message(raw.to_string()))
        }
    }
}

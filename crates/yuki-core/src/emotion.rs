//! Avatar presentation metadata: the closed emotion set and free-form motion labels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expression the front-end avatar should show for a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    Happy,
    Joyful,
    Excited,
    Caring,
    Thoughtful,
    Curious,
    ShyBlush,
    #[default]
    Neutral,
    SlightlySad,
    Giggle,
    /// Reserved for fallback replies; never accepted from a model tag.
    Confused,
}

impl Emotion {
    /// Emotions the model is allowed to request through a trailing tag.
    pub const TAGGED: [Emotion; 10] = [
        Emotion::Happy,
        Emotion::Joyful,
        Emotion::Excited,
        Emotion::Caring,
        Emotion::Thoughtful,
        Emotion::Curious,
        Emotion::ShyBlush,
        Emotion::Neutral,
        Emotion::SlightlySad,
        Emotion::Giggle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Happy => "happy",
            Emotion::Joyful => "joyful",
            Emotion::Excited => "excited",
            Emotion::Caring => "caring",
            Emotion::Thoughtful => "thoughtful",
            Emotion::Curious => "curious",
            Emotion::ShyBlush => "shy_blush",
            Emotion::Neutral => "neutral",
            Emotion::SlightlySad => "slightly_sad",
            Emotion::Giggle => "giggle",
            Emotion::Confused => "confused",
        }
    }

    /// Resolve a tag value. Case and surrounding whitespace are ignored;
    /// anything outside [`Emotion::TAGGED`] yields `None`.
    pub fn from_tag(value: &str) -> Option<Emotion> {
        let wanted = value.trim().to_lowercase();
        Self::TAGGED.into_iter().find(|e| e.as_str() == wanted)
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Avatar motion label. The model may name any motion, so this stays a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Motion(String);

impl Motion {
    pub const IDLE: &'static str = "Idle";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn idle() -> Self {
        Self(Self::IDLE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Motion {
    fn default() -> Self {
        Self::idle()
    }
}

impl fmt::Display for Motion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

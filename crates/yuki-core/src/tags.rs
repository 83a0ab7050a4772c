//! Tag parsing: turns a raw model reply into speakable text plus avatar metadata.
//!
//! The persona is asked to end every reply with `*[emotion: E; motion: M]*`. The
//! trailing tag drives the avatar; any other `*...*` span (giggles, blushes, stage
//! directions) is stripped so the speech engine never reads it aloud.

use crate::emotion::{Emotion, Motion};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

/// Spoken when the reply held nothing but the trailing tag.
pub const TAG_ONLY_FALLBACK: &str = "Hehe~";
/// Spoken when every word of an untagged reply was an emote.
pub const EMOTE_ONLY_FALLBACK: &str = "Hmm, what should I say?";

static TRAILING_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\*\[\s*emotion:\s*([\w-]+)\s*;\s*motion:\s*([\w\s-]+)\s*\]\*$")
        .expect("trailing tag pattern compiles")
});

static EMOTE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*.*?\*").expect("emote span pattern compiles"));

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern compiles"));

/// Reply split into what gets spoken and what drives the avatar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedResponse {
    pub spoken_text: String,
    pub emotion: Emotion,
    pub motion: Motion,
    /// Whether a trailing structured tag was found.
    #[serde(skip)]
    pub tagged: bool,
}

/// Pure parser over immutable reply text. Never fails.
#[derive(Debug, Clone)]
pub struct TagParser {
    pub default_emotion: Emotion,
    pub default_motion: Motion,
    pub tag_only_fallback: String,
    pub emote_only_fallback: String,
}

impl Default for TagParser {
    fn default() -> Self {
        Self {
            default_emotion: Emotion::Neutral,
            default_motion: Motion::idle(),
            tag_only_fallback: TAG_ONLY_FALLBACK.to_string(),
            emote_only_fallback: EMOTE_ONLY_FALLBACK.to_string(),
        }
    }
}

impl TagParser {
    pub fn parse(&self, raw: &str) -> ParsedResponse {
        let raw = raw.trim();
        let mut emotion = self.default_emotion;
        let mut motion = self.default_motion.clone();

        let (candidate, tagged) = match TRAILING_TAG.captures(raw) {
            Some(caps) => {
                let start = caps.get(0).map(|m| m.start()).unwrap_or(raw.len());
                let emotion_value = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let motion_value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();

                match Emotion::from_tag(emotion_value) {
                    Some(e) => emotion = e,
                    None => warn!(
                        "Unknown emotion tag '{}', defaulting to '{}'",
                        emotion_value.trim().to_lowercase(),
                        self.default_emotion
                    ),
                }
                if motion_value.is_empty() {
                    warn!(
                        "Empty motion tag for emotion '{}', defaulting motion to '{}'",
                        emotion, self.default_motion
                    );
                } else {
                    motion = Motion::new(motion_value);
                }
                debug!("Parsed trailing tag: emotion='{}', motion='{}'", emotion, motion);
                (raw[..start].trim(), true)
            }
            None => {
                debug!("No trailing emotion/motion tag; using defaults");
                (raw, false)
            }
        };

        let mut spoken_text = strip_emotes(candidate);
        if spoken_text.is_empty() {
            spoken_text = if tagged {
                warn!("Reply was only tags; using tag-only fallback for speech");
                self.tag_only_fallback.clone()
            } else {
                warn!("Stripping emotes left no text; using emote-only fallback for speech");
                self.emote_only_fallback.clone()
            };
        }

        ParsedResponse {
            spoken_text,
            emotion,
            motion,
            tagged,
        }
    }
}

/// Remove every `*...*` span, collapse whitespace runs, trim.
pub fn strip_emotes(text: &str) -> String {
    let stripped = EMOTE_SPAN.replace_all(text, "");
    let stripped = stripped.trim();
    WHITESPACE_RUN.replace_all(stripped, " ").trim().to_string()
}

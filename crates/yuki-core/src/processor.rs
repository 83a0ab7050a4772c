//! Turn processor: one request from input to payload.
//!
//! `ReceiveInput → InvokeChat → ParseTags → InvokeAudioPipeline → reply`, with a
//! rejection for blank input before any backend is touched.

use crate::audio::AudioPipeline;
use crate::chat::{ChatAdapter, ChatTurn};
use crate::emotion::{Emotion, Motion};
use crate::history::UserInput;
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Spoken when the chat stage produced no usable text.
pub const UNSURE_REPLY: &str = "I'm not sure what to say right now!";

/// Why a request was refused before any backend call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnRejected {
    #[error("No message received")]
    EmptyMessage,
}

/// Everything the client needs to render one reply.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReply {
    pub text: String,
    pub emotion: Emotion,
    pub motion: Motion,
    /// File name inside the audio cache, when voice generation succeeded.
    pub audio_file: Option<String>,
    /// Set only when voice generation was attempted and failed.
    pub audio_error: Option<String>,
}

pub struct TurnProcessor {
    chat: ChatAdapter,
    audio: AudioPipeline,
    sessions: Arc<SessionStore>,
    persona_name: String,
}

impl TurnProcessor {
    pub fn new(
        chat: ChatAdapter,
        audio: AudioPipeline,
        sessions: Arc<SessionStore>,
        persona_name: impl Into<String>,
    ) -> Self {
        Self {
            chat,
            audio,
            sessions,
            persona_name: persona_name.into(),
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn audio(&self) -> &AudioPipeline {
        &self.audio
    }

    /// Handle one client message for `session_id`.
    pub async fn handle(&self, session_id: &str, message: Option<&str>) -> Result<TurnReply, TurnRejected> {
        let input = UserInput::from_raw(message).ok_or(TurnRejected::EmptyMessage)?;
        info!("User ({}): {:?}", session_id, input);

        let session = self.sessions.get_or_create(session_id);
        let mut history = session.lock_history().await;
        let turn = self.chat.respond(&mut history, &input).await;
        let reply = self.deliver(turn).await;
        session.touch();
        Ok(reply)
    }

    /// Attach audio to a chat result. A blank text is replaced with
    /// [`UNSURE_REPLY`] and no audio is generated for it.
    pub async fn deliver(&self, turn: ChatTurn) -> TurnReply {
        if turn.spoken_text.trim().is_empty() {
            warn!("Chat produced no text; skipping voice generation");
            return TurnReply {
                text: UNSURE_REPLY.to_string(),
                emotion: Emotion::Confused,
                motion: Motion::idle(),
                audio_file: None,
                audio_error: None,
            };
        }

        let audio_file = self.audio.render(&turn.spoken_text).await;
        let audio_error = if audio_file.is_none() {
            let msg = format!("{}'s RVC voice generation failed.", self.persona_name);
            warn!("{}", msg);
            Some(msg)
        } else {
            None
        };

        TurnReply {
            text: turn.spoken_text,
            emotion: turn.emotion,
            motion: turn.motion,
            audio_file,
            audio_error,
        }
    }
}

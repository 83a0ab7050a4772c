//! Yuki core library.
//! Conversation turns, tag parsing, and the chat → speech → voice-conversion pipeline
//! behind the companion chat gateway.

pub mod audio;
pub mod chat;
pub mod config;
pub mod conversion;
pub mod emotion;
pub mod error;
pub mod history;
pub mod processor;
pub mod session;
pub mod speech;
pub mod tags;

pub use audio::{AudioCache, AudioPipeline, PurgeReport};
pub use chat::{ChatAdapter, ChatBackend, ChatTurn, OllamaChat};
pub use config::{SpeechBackendKind, YukiConfig};
pub use conversion::{ApplioCommand, ConversionParams, ConversionRequest, VoiceConversionBackend};
pub use emotion::{Emotion, Motion};
pub use error::{YukiError, YukiResult};
pub use history::{ConversationHistory, Role, Turn, UserInput, PROACTIVE_NUDGE_SENTINEL};
pub use processor::{TurnProcessor, TurnRejected, TurnReply};
pub use session::{SessionStore, DEFAULT_SESSION_ID};
pub use speech::{speech_from_config, EdgeTtsCommand, OpenAiSpeech, SpeechBackend};
pub use tags::{ParsedResponse, TagParser};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

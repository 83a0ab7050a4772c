//! Chat bridge: Ollama `/api/chat` client and the turn-assembly adapter around it.
//!
//! The adapter owns failure translation: whatever the backend does, the caller gets
//! a speakable reply, and the history is only extended when the backend answered.

use crate::config::ChatConfig;
use crate::emotion::{Emotion, Motion};
use crate::error::{YukiError, YukiResult};
use crate::history::{ConversationHistory, Turn, UserInput, NUDGE_PLACEHOLDER_PROMPT};
use crate::tags::{ParsedResponse, TagParser};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

pub const TRANSPORT_FAILURE_REPLY: &str = "My connection to the thinking-verse is a bit staticky!";
pub const PROCESSING_FAILURE_REPLY: &str = "Oopsie! My thoughts got a little tangled!";
pub const EMPTY_REPLY: &str = "Oh dear, I seem to be a bit tongue-tied!";

/// Chat-completion backend: ordered turns in, one assistant reply out.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, turns: &[Turn]) -> YukiResult<String>;
}

/// Ollama chat request body.
#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: &'a [Turn],
    stream: bool,
}

/// Ollama non-streamed response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaMessage>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessage {
    content: Option<String>,
}

/// Local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaChat {
    endpoint: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> YukiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| YukiError::Config(format!("chat client: {}", e)))?;
        Ok(Self {
            endpoint: format!("{}/api/chat", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ChatBackend for OllamaChat {
    async fn complete(&self, turns: &[Turn]) -> YukiResult<String> {
        let body = OllamaChatRequest {
            model: &self.model,
            messages: turns,
            stream: false,
        };

        let res = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| YukiError::ChatTransport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(YukiError::ChatTransport(format!("Ollama {}: {}", status, text)));
        }

        let text = res
            .text()
            .await
            .map_err(|e| YukiError::ChatTransport(e.to_string()))?;
        let parsed: OllamaChatResponse =
            serde_json::from_str(&text).map_err(|e| YukiError::ChatParse(e.to_string()))?;

        Ok(parsed
            .message
            .and_then(|m| m.content)
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

/// Result of one chat exchange, already split for speech and avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub spoken_text: String,
    pub emotion: Emotion,
    pub motion: Motion,
}

impl ChatTurn {
    fn fallback(text: &str, emotion: Emotion) -> Self {
        Self {
            spoken_text: text.to_string(),
            emotion,
            motion: Motion::idle(),
        }
    }

    fn from_parsed(parsed: ParsedResponse) -> Self {
        Self {
            spoken_text: parsed.spoken_text,
            emotion: parsed.emotion,
            motion: parsed.motion,
        }
    }
}

/// Wraps a [`ChatBackend`] with turn assembly, tag parsing and failure translation.
pub struct ChatAdapter {
    backend: std::sync::Arc<dyn ChatBackend>,
    parser: TagParser,
}

impl ChatAdapter {
    pub fn new(backend: std::sync::Arc<dyn ChatBackend>, parser: TagParser) -> Self {
        Self { backend, parser }
    }

    /// Turns submitted to the backend for this input.
    pub fn assemble(history: &ConversationHistory, input: &UserInput) -> ConversationHistory {
        let mut submitted = history.clone();
        match input {
            UserInput::Message(text) => submitted.push(Turn::user(text.clone())),
            UserInput::ProactiveNudge => {
                if history.has_no_exchange() {
                    submitted.push(Turn::user(NUDGE_PLACEHOLDER_PROMPT));
                }
            }
        }
        submitted
    }

    /// Run one exchange. `history` is replaced by the submitted turns plus the raw
    /// (tagged) reply on success and left as-is on any failure.
    pub async fn respond(&self, history: &mut ConversationHistory, input: &UserInput) -> ChatTurn {
        if matches!(input, UserInput::ProactiveNudge) {
            info!("Responding to proactive nudge (user was quiet)");
        }
        let mut submitted = Self::assemble(history, input);

        let raw = match self.backend.complete(submitted.turns()).await {
            Ok(raw) => raw,
            Err(e) if e.is_transport() => {
                warn!("Chat backend transport failure: {}", e);
                return ChatTurn::fallback(TRANSPORT_FAILURE_REPLY, Emotion::Confused);
            }
            Err(e) => {
                error!("Chat backend processing failure: {}", e);
                return ChatTurn::fallback(PROCESSING_FAILURE_REPLY, Emotion::Confused);
            }
        };

        let raw = raw.trim();
        if raw.is_empty() {
            warn!("Chat backend returned an empty reply");
            return ChatTurn::fallback(EMPTY_REPLY, Emotion::Neutral);
        }

        let parsed = self.parser.parse(raw);
        info!("Reply parsed: spoken='{}', emotion='{}', motion='{}'", parsed.spoken_text, parsed.emotion, parsed.motion);

        submitted.push(Turn::assistant(raw));
        *history = submitted;
        ChatTurn::from_parsed(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Scripted backend that records what it was sent.
    struct ScriptedChat {
        reply: Mutex<Option<YukiResult<String>>>,
        seen: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedChat {
        fn new(reply: YukiResult<String>) -> Arc<Self> {
            Arc::new(Self {
                reply: Mutex::new(Some(reply)),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        async fn complete(&self, turns: &[Turn]) -> YukiResult<String> {
            self.seen.lock().unwrap().push(turns.to_vec());
            self.reply
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Ok("again *[emotion: happy; motion: wave]*".into()))
        }
    }

    fn adapter(backend: Arc<ScriptedChat>) -> ChatAdapter {
        ChatAdapter::new(backend, TagParser::default())
    }

    #[tokio::test]
    async fn success_appends_user_and_raw_reply() {
        let raw = "Hi! *giggles* *[emotion: happy; motion: wave]*";
        let backend = ScriptedChat::new(Ok(raw.to_string()));
        let mut history = ConversationHistory::with_persona("persona");

        let turn = adapter(backend.clone())
            .respond(&mut history, &UserInput::Message("hello".into()))
            .await;

        assert_eq!(turn.spoken_text, "Hi!");
        assert_eq!(turn.emotion, Emotion::Happy);
        assert_eq!(history.len(), 3);
        assert_eq!(history.turns()[1], Turn::user("hello"));
        assert_eq!(history.turns()[2], Turn::assistant(raw));
        assert_eq!(backend.seen.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn transport_failure_leaves_history_untouched() {
        let backend = ScriptedChat::new(Err(YukiError::ChatTransport("refused".into())));
        let mut history = ConversationHistory::with_persona("persona");

        let turn = adapter(backend)
            .respond(&mut history, &UserInput::Message("hello".into()))
            .await;

        assert_eq!(turn.spoken_text, TRANSPORT_FAILURE_REPLY);
        assert_eq!(turn.emotion, Emotion::Confused);
        assert_eq!(turn.motion, Motion::idle());
        assert_eq!(history, ConversationHistory::with_persona("persona"));
    }

    #[tokio::test]
    async fn parse_failure_uses_tangled_reply() {
        let backend = ScriptedChat::new(Err(YukiError::ChatParse("bad json".into())));
        let mut history = ConversationHistory::with_persona("persona");

        let turn = adapter(backend)
            .respond(&mut history, &UserInput::Message("hello".into()))
            .await;

        assert_eq!(turn.spoken_text, PROCESSING_FAILURE_REPLY);
        assert_eq!(turn.emotion, Emotion::Confused);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn empty_reply_is_tongue_tied() {
        let backend = ScriptedChat::new(Ok("   ".into()));
        let mut history = ConversationHistory::with_persona("persona");

        let turn = adapter(backend)
            .respond(&mut history, &UserInput::Message("hello".into()))
            .await;

        assert_eq!(turn.spoken_text, EMPTY_REPLY);
        assert_eq!(turn.emotion, Emotion::Neutral);
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn nudge_on_fresh_history_adds_placeholder_prompt() {
        let backend = ScriptedChat::new(Ok("So quiet! *[emotion: curious; motion: tilt]*".into()));
        let mut history = ConversationHistory::with_persona("persona");

        adapter(backend.clone())
            .respond(&mut history, &UserInput::ProactiveNudge)
            .await;

        let sent = &backend.seen.lock().unwrap()[0];
        assert_eq!(sent.last(), Some(&Turn::user(NUDGE_PLACEHOLDER_PROMPT)));
        assert_eq!(history.len(), 3);
    }

    #[tokio::test]
    async fn nudge_mid_conversation_sends_history_unchanged() {
        let backend = ScriptedChat::new(Ok("Still there? *[emotion: caring; motion: Idle]*".into()));
        let mut history = ConversationHistory::with_persona("persona");
        history.push(Turn::user("hi"));
        history.push(Turn::assistant("hello *[emotion: happy; motion: wave]*"));

        adapter(backend.clone())
            .respond(&mut history, &UserInput::ProactiveNudge)
            .await;

        let sent = &backend.seen.lock().unwrap()[0];
        assert_eq!(sent.len(), 3);
        assert_eq!(sent.last().map(|t| t.role), Some(Role::Assistant));
        // Two assistant turns in a row are tolerated.
        assert_eq!(history.len(), 4);
        assert_eq!(history.last().map(|t| t.role), Some(Role::Assistant));
    }

    #[tokio::test]
    async fn ollama_request_shape_and_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3",
                "stream": false,
                "messages": [{ "role": "user", "content": "hi" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": { "role": "assistant", "content": "  Hello!  " },
                "done": true
            })))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&ChatConfig {
            base_url: server.uri(),
            ..ChatConfig::default()
        })
        .unwrap();
        let reply = chat.complete(&[Turn::user("hi")]).await.unwrap();
        assert_eq!(reply, "Hello!");
    }

    #[tokio::test]
    async fn ollama_error_status_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&ChatConfig {
            base_url: server.uri(),
            ..ChatConfig::default()
        })
        .unwrap();
        let err = chat.complete(&[Turn::user("hi")]).await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn ollama_garbage_body_is_parse_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let chat = OllamaChat::new(&ChatConfig {
            base_url: server.uri(),
            ..ChatConfig::default()
        })
        .unwrap();
        let err = chat.complete(&[Turn::user("hi")]).await.unwrap_err();
        assert!(matches!(err, YukiError::ChatParse(_)));
    }
}

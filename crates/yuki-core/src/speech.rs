//! Base speech synthesis: text + voice in, audio file out.

use crate::config::SpeechConfig;
use crate::error::{YukiError, YukiResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Backend that writes synthesized speech for `text` to `dest`.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn synthesize(&self, text: &str, voice: &str, dest: &Path) -> YukiResult<()>;
}

/// Microsoft Edge neural voices through the `edge-tts` command-line tool.
#[derive(Debug, Clone)]
pub struct EdgeTtsCommand {
    program: String,
}

impl EdgeTtsCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }
}

#[async_trait]
impl SpeechBackend for EdgeTtsCommand {
    async fn synthesize(&self, text: &str, voice: &str, dest: &Path) -> YukiResult<()> {
        // `--opt=value` keeps text starting with '-' from being read as an option.
        let output = Command::new(&self.program)
            .arg(format!("--voice={}", voice))
            .arg(format!("--text={}", text))
            .arg(format!("--write-media={}", dest.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| YukiError::Speech(format!("failed to spawn {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(YukiError::Speech(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        info!("Base audio saved to {}", dest.display());
        Ok(())
    }
}

/// OpenAI-compatible `/audio/speech` endpoint (OpenAI, OpenRouter, local servers).
#[derive(Debug, Clone)]
pub struct OpenAiSpeech {
    /// Base URL without trailing slash (e.g. https://api.openai.com/v1).
    pub base_url: String,
    pub api_key: Option<String>,
    /// TTS model: tts-1 (fast) or tts-1-hd (higher quality).
    pub model: String,
    client: reqwest::Client,
}

impl OpenAiSpeech {
    pub fn new(config: &SpeechConfig) -> YukiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| YukiError::Speech(e.to_string()))?;
        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client,
        })
    }
}

#[async_trait]
impl SpeechBackend for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: &str, dest: &Path) -> YukiResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Err(YukiError::Speech("nothing to synthesize".to_string()));
        }
        let url = format!("{}/audio/speech", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": voice,
            "response_format": "wav",
        });
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.map_err(|e| YukiError::Speech(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(YukiError::Speech(format!("TTS API error {}: {}", status, body)));
        }
        let bytes = res.bytes().await.map_err(|e| YukiError::Speech(e.to_string()))?;
        debug!("TTS API returned {} bytes", bytes.len());
        tokio::fs::write(dest, &bytes).await?;
        info!("Base audio saved to {}", dest.display());
        Ok(())
    }
}

/// Build the configured speech backend.
pub fn speech_from_config(config: &SpeechConfig) -> YukiResult<std::sync::Arc<dyn SpeechBackend>> {
    use crate::config::SpeechBackendKind;
    Ok(match config.backend {
        SpeechBackendKind::EdgeTts => std::sync::Arc::new(EdgeTtsCommand::new(config.program.clone())),
        SpeechBackendKind::OpenAi => std::sync::Arc::new(OpenAiSpeech::new(config)?),
    })
}

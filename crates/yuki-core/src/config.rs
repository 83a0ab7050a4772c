//! Yuki configuration loaded from TOML and environment.
//!
//! Precedence: environment (`YUKI_<SECTION>__<KEY>`, e.g. `YUKI_CHAT__MODEL=llama3`) >
//! file at `YUKI_CONFIG` (default `config/yuki.toml`) > built-in defaults.
//!
//! | Section | Key | Default |
//! |---------|-----|---------|
//! | server | host / port / static_dir | 0.0.0.0 / 5000 / static |
//! | chat | base_url / model / timeout_secs | http://localhost:11434 / llama3 / 60 |
//! | speech | backend / voice / program | edge-tts / en-US-AnaNeural / edge-tts |
//! | conversion | python / applio_root / model_path / index_path | python / . / (required) |
//! | audio | cache_subdir / stem / max_age_secs / max_files | rvc_audio_cache / yuki_rvc_output / 86400 / 200 |
//! | maintenance | interval_secs / session_idle_secs | 600 / 21600 |

use crate::error::YukiResult;
use crate::tags::{TagParser, EMOTE_ONLY_FALLBACK, TAG_ONLY_FALLBACK};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_PATH: &str = "config/yuki.toml";

const DEFAULT_SYSTEM_PROMPT: &str = "You are Yuki Shinagawa, a cheerful, caring and slightly shy companion. \
Reply in one to three short, natural sentences meant to be spoken aloud. \
Do not use markdown, lists or code blocks. You may describe small actions between asterisks, like *smiles*. \
Always finish every reply with exactly one tag of the form *[emotion: E; motion: M]* where E is one of \
happy, joyful, excited, caring, thoughtful, curious, shy_blush, neutral, slightly_sad, giggle \
and M is a short motion name such as Idle, wave, nod or tilt_head.";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YukiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub persona: PersonaConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/static`; the audio cache lives inside it.
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Ollama base URL without trailing slash.
    pub base_url: String,
    pub model: String,
    /// Upper bound on one chat call; exceeding it counts as a transport failure.
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            timeout_secs: 60,
        }
    }
}

impl ChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// Character name, used in user-facing error strings.
    pub name: String,
    pub system_prompt: String,
    pub tag_only_fallback: String,
    pub emote_only_fallback: String,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "Yuki".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            tag_only_fallback: TAG_ONLY_FALLBACK.to_string(),
            emote_only_fallback: EMOTE_ONLY_FALLBACK.to_string(),
        }
    }
}

impl PersonaConfig {
    pub fn tag_parser(&self) -> TagParser {
        TagParser {
            tag_only_fallback: self.tag_only_fallback.clone(),
            emote_only_fallback: self.emote_only_fallback.clone(),
            ..TagParser::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechBackendKind {
    #[serde(rename = "edge-tts")]
    EdgeTts,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub backend: SpeechBackendKind,
    /// Base voice the synthesized speech is generated with before conversion.
    pub voice: String,
    /// `edge-tts` executable.
    pub program: String,
    /// OpenAI-compatible base URL (backend = "openai").
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: SpeechBackendKind::EdgeTts,
            voice: "en-US-AnaNeural".to_string(),
            program: "edge-tts".to_string(),
            api_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "tts-1".to_string(),
        }
    }
}

/// Applio installation plus the fixed inference settings used for every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub python: String,
    pub applio_root: PathBuf,
    /// CLI entry point, relative to `applio_root`.
    pub script: String,
    /// Trained voice model (.pth).
    pub model_path: PathBuf,
    /// Feature index (.index) produced alongside the model.
    pub index_path: PathBuf,
    pub pitch: i32,
    pub f0_method: String,
    pub index_rate: f32,
    pub protect: f32,
    pub sid: u32,
    pub embedder_model: String,
    pub export_format: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            applio_root: PathBuf::from("."),
            script: "core.py".to_string(),
            model_path: PathBuf::new(),
            index_path: PathBuf::new(),
            pitch: 0,
            f0_method: "rmvpe".to_string(),
            index_rate: 0.75,
            protect: 0.5,
            sid: 0,
            embedder_model: "contentvec".to_string(),
            export_format: "WAV".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Subdirectory of `server.static_dir` holding generated audio.
    pub cache_subdir: String,
    /// Filename stem for generated audio (`{stem}_{millis}.wav`).
    pub stem: String,
    /// Final audio older than this is purged.
    pub max_age_secs: u64,
    /// At most this many final audio files are kept (newest win).
    pub max_files: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            cache_subdir: "rvc_audio_cache".to_string(),
            stem: "yuki_rvc_output".to_string(),
            max_age_secs: 24 * 60 * 60,
            max_files: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_secs: u64,
    /// Sessions idle for longer than this are dropped.
    pub session_idle_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            session_idle_secs: 6 * 60 * 60,
        }
    }
}

impl YukiConfig {
    /// Load config from file and environment. See module docs for precedence.
    pub fn load() -> YukiResult<Self> {
        let config_path =
            std::env::var("YUKI_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    /// Load from an explicit file path (skipped when missing) plus environment.
    pub fn load_from(path: &Path) -> YukiResult<Self> {
        let builder = config::Config::builder();
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("YUKI")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(built.try_deserialize()?)
    }

    /// Directory generated audio is written to.
    pub fn audio_cache_dir(&self) -> PathBuf {
        self.server.static_dir.join(&self.audio.cache_subdir)
    }

    /// URL prefix under which the audio cache is served.
    pub fn audio_url_prefix(&self) -> String {
        format!("/static/{}", self.audio.cache_subdir.trim_matches('/'))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

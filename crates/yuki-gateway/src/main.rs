//! Yuki Gateway: chat UI, conversation turns and character voice over HTTP.
//! Ollama for replies, edge-tts (or an OpenAI-compatible endpoint) for base speech,
//! Applio RVC for the character voice.

mod maintenance;
mod routes;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yuki_core::{
    speech_from_config, ApplioCommand, AudioCache, AudioPipeline, ChatAdapter, ConversionParams,
    OllamaChat, SessionStore, TurnProcessor, VoiceConversionBackend, YukiConfig,
};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match YukiConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let processor = match build_processor(&config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            tracing::error!("Startup check failed: {}", e);
            std::process::exit(1);
        }
    };

    let _maintenance = maintenance::start(
        processor.clone(),
        maintenance::MaintenancePolicy::from_config(&config.maintenance, &config.audio),
    );

    let state = routes::AppState {
        processor,
        audio_url_prefix: config.audio_url_prefix(),
    };
    let app = routes::router(state, config.server.static_dir.clone());

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Could not bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!(
        "Yuki gateway v{} listening on http://{} (chat model: {})",
        yuki_core::version(),
        addr,
        config.chat.model
    );

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Wire backends from config. Fails when the voice conversion install is
/// unusable or the audio cache directory cannot be created.
fn build_processor(config: &YukiConfig) -> yuki_core::YukiResult<TurnProcessor> {
    let chat = OllamaChat::new(&config.chat)?;
    tracing::info!("Chat backend: {} ({})", chat.endpoint(), config.chat.model);

    let speech = speech_from_config(&config.speech)?;

    let params = ConversionParams::from(&config.conversion);
    let converter = ApplioCommand::new(&config.conversion);
    converter.ensure_ready(&params)?;
    tracing::info!(
        "Voice conversion ready: model {}",
        params.model_path.display()
    );

    let cache = AudioCache::new(config.audio_cache_dir(), config.audio.stem.clone());
    cache.prepare()?;

    let audio = AudioPipeline::new(
        speech,
        Arc::new(converter),
        cache,
        config.speech.voice.clone(),
        params,
    );

    Ok(TurnProcessor::new(
        ChatAdapter::new(Arc::new(chat), config.persona.tag_parser()),
        audio,
        Arc::new(SessionStore::new(config.persona.system_prompt.clone())),
        config.persona.name.clone(),
    ))
}

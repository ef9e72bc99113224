//! Docent service binary.
//!
//! Wires the pipeline together from static config: safety gate,
//! retriever, tiered generation, tiered synthesis, and the HTTP gateway,
//! plus the poller that keeps the dynamic config snapshot fresh.

use std::sync::Arc;
use std::time::Duration;

use secrecy::Secret;

use docent_core::config::AppConfig;
use docent_core::snapshot::ConfigStore;
use docent_core::telemetry::configure_tracing;
use docent_core::traits::{LlmTier, ModerationClient, TtsTier};
use docent_gateway::{build_router, run, AppState, ChatPipeline, GatewaySettings};
use docent_generation::{GenerationOrchestrator, OllamaTier, OpenAiTier};
use docent_retrieval::{HttpVectorSearch, Retriever};
use docent_safety::{OpenAiModeration, SafetyGate};
use docent_synthesis::{ElevenLabsTts, KokoroTts, OpenAiTts, SynthesisOrchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_tracing()?;

    // =========================================================================
    // Configuration
    // =========================================================================
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Static config unavailable, using defaults");
            AppConfig::default()
        }
    };

    let (config_store, poller) = ConfigStore::new(
        &config.dynamic.config_path,
        Duration::from_secs(config.dynamic.poll_interval_secs),
    );
    tokio::spawn(poller.run());

    let openai_key = config
        .generation
        .openai_api_key
        .clone()
        .unwrap_or_else(|| Secret::new(String::new()));

    // =========================================================================
    // Safety
    // =========================================================================
    let moderation: Arc<dyn ModerationClient> = Arc::new(OpenAiModeration::new(
        &config.safety.moderation_base_url,
        openai_key.clone(),
        Duration::from_millis(config.safety.moderation_timeout_ms),
    )?);
    let gate = Arc::new(SafetyGate::new(config.safety.max_input_chars, moderation));

    // =========================================================================
    // Retrieval
    // =========================================================================
    let search = Arc::new(HttpVectorSearch::new(
        &config.retrieval.search_url,
        Duration::from_millis(config.retrieval.timeout_ms),
    )?);
    let retriever = Arc::new(Retriever::new(search, config.retrieval.top_k));

    // =========================================================================
    // Generation tiers
    // =========================================================================
    let local_llm: Option<Arc<dyn LlmTier>> = if config.generation.local_enabled {
        Some(Arc::new(OllamaTier::new(
            &config.generation.local_url,
            &config.generation.local_model,
        )))
    } else {
        None
    };
    let cloud_llm: Option<Arc<dyn LlmTier>> = Some(Arc::new(OpenAiTier::new(
        &config.generation.cloud_base_url,
        openai_key.clone(),
    )));
    let generation = Arc::new(GenerationOrchestrator::new(
        local_llm,
        cloud_llm,
        Duration::from_millis(config.generation.local_timeout_ms),
        Duration::from_millis(config.generation.cloud_timeout_ms),
    ));

    // =========================================================================
    // Synthesis tiers
    // =========================================================================
    let call_timeout = Duration::from_millis(config.synthesis.call_timeout_ms);
    let kokoro: Arc<dyn TtsTier> = Arc::new(KokoroTts::new(&config.synthesis.local_url, call_timeout)?);
    let openai_tts: Arc<dyn TtsTier> = Arc::new(OpenAiTts::new(
        &config.synthesis.cloud_base_url,
        openai_key,
        call_timeout,
    )?);
    let elevenlabs: Option<Arc<dyn TtsTier>> = match config.synthesis.elevenlabs_api_key.clone() {
        Some(key) => Some(Arc::new(ElevenLabsTts::new(
            &config.synthesis.elevenlabs_base_url,
            key,
            "Rachel",
            call_timeout,
        )?)),
        None => None,
    };
    let synthesis = Arc::new(SynthesisOrchestrator::new(
        Some(kokoro),
        Some(openai_tts),
        elevenlabs,
        config.synthesis.worker_permits,
        call_timeout,
    ));

    // =========================================================================
    // Gateway
    // =========================================================================
    let pipeline = Arc::new(ChatPipeline::new(
        gate,
        retriever,
        generation,
        synthesis.clone(),
        config_store.clone(),
    ));
    let state = AppState {
        pipeline,
        synthesis,
        config: config_store,
    };
    let settings = GatewaySettings {
        allowed_origins: config.gateway.allowed_origins.clone(),
        enable_cors: config.gateway.enable_cors,
        enable_tracing: config.gateway.enable_tracing,
        enable_metrics: config.gateway.enable_metrics,
    };

    let router = build_router(state, &settings);
    run(&config.server.host, config.server.port, router).await?;
    Ok(())
}

//! Static application configuration.
//!
//! Loaded once at startup from layered config files plus `APP__`-prefixed
//! environment overrides. Hot-reloadable settings (prompts, model/voice
//! selection) live in [`crate::snapshot`] instead.

use config::{Config, ConfigError, Environment, File};
use secrecy::Secret;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    pub safety: SafetyConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub synthesis: SynthesisConfig,
    pub dynamic: DynamicConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    pub allowed_origins: Vec<String>,
    pub enable_cors: bool,
    pub enable_tracing: bool,
    pub enable_metrics: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    /// Maximum accepted input length in characters.
    pub max_input_chars: usize,
    /// OpenAI-compatible moderation endpoint base URL.
    pub moderation_base_url: String,
    pub moderation_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Vector-search sidecar base URL.
    pub search_url: String,
    /// Number of chunks to retrieve per request.
    pub top_k: usize,
    pub timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// Whether the local tier is wired in at all.
    pub local_enabled: bool,
    /// Ollama-style local sidecar base URL.
    pub local_url: String,
    /// Model name served by the local tier.
    pub local_model: String,
    pub local_timeout_ms: u64,
    /// OpenAI-compatible cloud base URL.
    pub cloud_base_url: String,
    pub cloud_timeout_ms: u64,
    pub openai_api_key: Option<Secret<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SynthesisConfig {
    /// Kokoro-style local TTS sidecar base URL.
    pub local_url: String,
    /// OpenAI-compatible cloud TTS base URL.
    pub cloud_base_url: String,
    /// ElevenLabs-compatible base URL.
    pub elevenlabs_base_url: String,
    pub elevenlabs_api_key: Option<Secret<String>>,
    /// Worker-pool permits shared across concurrent requests.
    pub worker_permits: usize,
    /// Per synthesis call timeout.
    pub call_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DynamicConfig {
    /// Path of the hot-reloadable JSON snapshot file.
    pub config_path: String,
    /// Poll interval for the backing file's mtime, in seconds.
    pub poll_interval_secs: u64,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("DOCENT_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map APP__SERVER__PORT=8000 to app.server.port
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8000,
            },
            gateway: GatewayConfig {
                allowed_origins: vec!["*".into()],
                enable_cors: true,
                enable_tracing: true,
                enable_metrics: false,
            },
            safety: SafetyConfig {
                max_input_chars: 500,
                moderation_base_url: "https://api.openai.com/v1".into(),
                moderation_timeout_ms: 5_000,
            },
            retrieval: RetrievalConfig {
                search_url: "http://localhost:7700".into(),
                top_k: 5,
                timeout_ms: 5_000,
            },
            generation: GenerationConfig {
                local_enabled: true,
                local_url: "http://localhost:11434".into(),
                local_model: "llama3.2".into(),
                local_timeout_ms: 8_000,
                cloud_base_url: "https://api.openai.com/v1".into(),
                cloud_timeout_ms: 30_000,
                openai_api_key: None,
            },
            synthesis: SynthesisConfig {
                local_url: "http://localhost:8880".into(),
                cloud_base_url: "https://api.openai.com/v1".into(),
                elevenlabs_base_url: "https://api.elevenlabs.io".into(),
                elevenlabs_api_key: None,
                worker_permits: 3,
                call_timeout_ms: 30_000,
            },
            dynamic: DynamicConfig {
                config_path: "config/admin_config.json".into(),
                poll_interval_secs: 5,
            },
        }
    }
}

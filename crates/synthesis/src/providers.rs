//! HTTP synthesis tiers: Kokoro sidecar, OpenAI TTS, ElevenLabs.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use secrecy::{ExposeSecret, Secret};
use serde_json::json;

use docent_core::traits::TtsTier;
use docent_core::{Error, Result};

fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::internal(format!("tts client: {e}")))
}

// =============================================================================
// Kokoro sidecar
// =============================================================================

/// Local synthesis sidecar speaking the OpenAI-compatible
/// `/v1/audio/speech` shape.
pub struct KokoroTts {
    base_url: String,
    client: reqwest::Client,
}

impl KokoroTts {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl TtsTier for KokoroTts {
    fn name(&self) -> &str {
        "kokoro"
    }

    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Bytes> {
        let url = format!("{}/v1/audio/speech", self.base_url);
        let body = json!({
            "model": "kokoro",
            "input": text,
            "voice": voice,
            "speed": speed,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("kokoro request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "kokoro returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::provider(format!("kokoro body: {e}")))
    }
}

// =============================================================================
// OpenAI TTS
// =============================================================================

/// Cloud synthesis via the OpenAI `/audio/speech` endpoint.
pub struct OpenAiTts {
    base_url: String,
    api_key: Secret<String>,
    client: reqwest::Client,
}

impl OpenAiTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: build_client(timeout)?,
        })
    }

    /// OpenAI has its own voice roster; the configured voice name is for
    /// the local tier, so map anything unknown to a sensible default.
    fn map_voice(voice: &str) -> &str {
        match voice {
            "alloy" | "echo" | "fable" | "onyx" | "nova" | "shimmer" => voice,
            _ => "nova",
        }
    }
}

#[async_trait]
impl TtsTier for OpenAiTts {
    fn name(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Bytes> {
        let url = format!("{}/audio/speech", self.base_url);
        let body = json!({
            "model": "tts-1",
            "input": text,
            "voice": Self::map_voice(voice),
            "speed": speed,
            "response_format": "mp3",
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("openai tts request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "openai tts returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::provider(format!("openai tts body: {e}")))
    }
}

// =============================================================================
// ElevenLabs
// =============================================================================

/// Last-resort cloud synthesis via the ElevenLabs text-to-speech API.
pub struct ElevenLabsTts {
    base_url: String,
    api_key: Secret<String>,
    voice_id: String,
    client: reqwest::Client,
}

impl ElevenLabsTts {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Secret<String>,
        voice_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            voice_id: voice_id.into(),
            client: build_client(timeout)?,
        })
    }
}

#[async_trait]
impl TtsTier for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, _voice: &str, _speed: f32) -> Result<Bytes> {
        // ElevenLabs selects voice by account voice id, not by name, and
        // does not take a speed parameter on this endpoint.
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id);
        let body = json!({
            "text": text,
            "model_id": "eleven_turbo_v2",
        });

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("elevenlabs request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "elevenlabs returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| Error::provider(format!("elevenlabs body: {e}")))
    }
}

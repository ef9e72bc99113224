//! Synthesis tier traits.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// One candidate speech-synthesis backend.
#[async_trait]
pub trait TtsTier: Send + Sync {
    /// Short name used in logs ("kokoro", "openai", "elevenlabs").
    fn name(&self) -> &str;

    /// Synthesize `text` to audio bytes with the given voice and speed.
    /// The audio container format is backend-defined (WAV/MP3/PCM).
    async fn synthesize(&self, text: &str, voice: &str, speed: f32) -> Result<Bytes>;
}

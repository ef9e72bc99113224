//! Generation tier traits.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::ChatMessage;

/// Stream of generated text chunks from a tier.
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A generation request passed to a tier, fully resolved from the current
/// config snapshot.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// System prompt with retrieved context already injected.
    pub system_prompt: String,
    /// Conversation history, newest last.
    pub messages: Vec<ChatMessage>,
    /// Model name for this tier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Token cap for the reply.
    pub max_tokens: u32,
}

/// One candidate generation backend (local or cloud).
///
/// A tier either yields its whole reply as a token stream or fails; the
/// orchestrator decides whether a failure is recoverable based on how many
/// tokens were already forwarded to the client.
#[async_trait]
pub trait LlmTier: Send + Sync {
    /// Short name used in logs ("ollama", "openai", ...).
    fn name(&self) -> &str;

    /// Open a streaming chat completion. The returned stream yields text
    /// chunks in generation order and terminates when the reply is complete.
    async fn stream_chat(&self, request: GenerationRequest) -> Result<TokenStream>;
}

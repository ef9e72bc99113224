//! HTTP generation tiers: Ollama (local sidecar) and OpenAI-compatible
//! chat completions.

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use docent_core::traits::{GenerationRequest, LlmTier, TokenStream};
use docent_core::types::ChatMessage;
use docent_core::{Error, Result};

fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage::system(request.system_prompt.clone()));
    messages.extend(request.messages.iter().cloned());
    messages
}

// =============================================================================
// Ollama
// =============================================================================

/// Local generation tier speaking the Ollama `/api/chat` NDJSON protocol.
pub struct OllamaTier {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: OllamaMessage,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize, Default)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

impl OllamaTier {
    /// `model` overrides the per-request model name, since the snapshot's
    /// model setting names the cloud model.
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmTier for OllamaTier {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn stream_chat(&self, request: GenerationRequest) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": build_messages(&request),
            "stream": true,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("ollama request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buf = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(Error::provider(format!("ollama stream: {e}")))).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<OllamaChunk>(&line) {
                        Ok(parsed) => {
                            if !parsed.message.content.is_empty()
                                && tx.send(Ok(parsed.message.content)).await.is_err()
                            {
                                return;
                            }
                            if parsed.done {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(Error::provider(format!("ollama chunk: {e}"))))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

/// Cloud generation tier speaking the OpenAI `/chat/completions` SSE
/// protocol.
pub struct OpenAiTier {
    base_url: String,
    api_key: Secret<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct CompletionChunk {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    delta: CompletionDelta,
}

#[derive(Deserialize, Default)]
struct CompletionDelta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiTier {
    pub fn new(base_url: impl Into<String>, api_key: Secret<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmTier for OpenAiTier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn stream_chat(&self, request: GenerationRequest) -> Result<TokenStream> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "messages": build_messages(&request),
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "stream": true,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::provider(format!("openai request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "openai returned {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel::<Result<String>>(32);
        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut buf = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(Error::provider(format!("openai stream: {e}")))).await;
                        return;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    match serde_json::from_str::<CompletionChunk>(data) {
                        Ok(parsed) => {
                            let content = parsed
                                .choices
                                .first()
                                .and_then(|c| c.delta.content.clone())
                                .unwrap_or_default();
                            if !content.is_empty() && tx.send(Ok(content)).await.is_err() {
                                return;
                            }
                        }
                        Err(e) => {
                            let _ = tx
                                .send(Err(Error::provider(format!("openai chunk: {e}"))))
                                .await;
                            return;
                        }
                    }
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ollama_chunk_parses() {
        let raw = r#"{"message":{"content":"Hello"},"done":false}"#;
        let parsed: OllamaChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.message.content, "Hello");
        assert!(!parsed.done);

        let final_chunk = r#"{"done":true}"#;
        let parsed: OllamaChunk = serde_json::from_str(final_chunk).unwrap();
        assert!(parsed.done);
        assert!(parsed.message.content.is_empty());
    }

    #[test]
    fn completion_chunk_parses() {
        let raw = r#"{"choices":[{"delta":{"content":"Hi"}}]}"#;
        let parsed: CompletionChunk = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.choices[0].delta.content.as_deref(), Some("Hi"));

        let role_only = r#"{"choices":[{"delta":{"role":"assistant"}}]}"#;
        let parsed: CompletionChunk = serde_json::from_str(role_only).unwrap();
        assert!(parsed.choices[0].delta.content.is_none());
    }

    #[test]
    fn system_prompt_leads_the_message_list() {
        let request = GenerationRequest {
            system_prompt: "guide".to_string(),
            messages: vec![ChatMessage::user("hi")],
            model: "m".to_string(),
            temperature: 0.7,
            max_tokens: 100,
        };
        let messages = build_messages(&request);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }
}

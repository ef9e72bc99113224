//! Mock implementations of the collaborator traits for testing.
//!
//! These cover the failure shapes the orchestrators care about: success,
//! failure before any output, failure mid-stream, hangs (for timeout
//! paths), and per-call delays (for reorder testing). All mocks count
//! their calls so tests can assert what was and was not invoked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

use crate::error::{Error, Result};
use crate::traits::{
    GenerationRequest, LlmTier, ModerationClient, ModerationVerdict, TokenStream, TtsTier,
    VectorSearch,
};
use crate::types::ContextChunk;

// =============================================================================
// Mock generation tier
// =============================================================================

/// Behavior of a [`MockLlmTier`] call.
pub enum MockLlmBehavior {
    /// Yield these tokens, then end the stream.
    Tokens(Vec<String>),
    /// Fail when opening the stream (connection refused shape).
    ConnectError,
    /// Open the stream, then fail before yielding any token.
    ErrorBeforeOutput,
    /// Yield these tokens, then fail mid-stream.
    TokensThenError(Vec<String>),
    /// Open a stream that never yields (timeout shape).
    Hang,
}

/// Scripted mock generation tier.
pub struct MockLlmTier {
    name: String,
    behavior: MockLlmBehavior,
    calls: AtomicUsize,
}

impl MockLlmTier {
    pub fn new(name: impl Into<String>, behavior: MockLlmBehavior) -> Self {
        Self {
            name: name.into(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    /// A tier that streams the given tokens successfully.
    pub fn streaming(name: impl Into<String>, tokens: &[&str]) -> Self {
        Self::new(
            name,
            MockLlmBehavior::Tokens(tokens.iter().map(|t| t.to_string()).collect()),
        )
    }

    /// A tier that fails before producing any output.
    pub fn failing(name: impl Into<String>) -> Self {
        Self::new(name, MockLlmBehavior::ErrorBeforeOutput)
    }

    /// A tier that hangs until the caller's timeout fires.
    pub fn hanging(name: impl Into<String>) -> Self {
        Self::new(name, MockLlmBehavior::Hang)
    }

    /// Number of `stream_chat` calls made against this tier.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmTier for MockLlmTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_chat(&self, _request: GenerationRequest) -> Result<TokenStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.behavior {
            MockLlmBehavior::Tokens(tokens) => {
                let items: Vec<Result<String>> = tokens.iter().cloned().map(Ok).collect();
                Ok(stream::iter(items).boxed())
            }
            MockLlmBehavior::ConnectError => {
                Err(Error::provider(format!("{}: connect refused", self.name)))
            }
            MockLlmBehavior::ErrorBeforeOutput => {
                let name = self.name.clone();
                Ok(stream::iter(vec![Err(Error::provider(format!(
                    "{name}: upstream 500"
                )))])
                .boxed())
            }
            MockLlmBehavior::TokensThenError(tokens) => {
                let mut items: Vec<Result<String>> = tokens.iter().cloned().map(Ok).collect();
                items.push(Err(Error::provider(format!(
                    "{}: connection reset mid-stream",
                    self.name
                ))));
                Ok(stream::iter(items).boxed())
            }
            MockLlmBehavior::Hang => Ok(stream::pending().boxed()),
        }
    }
}

// =============================================================================
// Mock synthesis tier
// =============================================================================

/// Mock synthesis tier; audio bytes are `b"audio[{text}]"` so tests can
/// assert which sentence produced which payload.
pub struct MockTtsTier {
    name: String,
    fail: bool,
    /// Per-call delays popped front-to-back; empty means no delay.
    delays_ms: Mutex<VecDeque<u64>>,
    calls: AtomicUsize,
}

impl MockTtsTier {
    /// A tier that always succeeds immediately.
    pub fn ok(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: false,
            delays_ms: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A tier that always fails.
    pub fn failing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fail: true,
            delays_ms: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A succeeding tier that sleeps the given number of milliseconds on
    /// each successive call, to force out-of-order completion.
    pub fn with_delays(name: impl Into<String>, delays_ms: &[u64]) -> Self {
        Self {
            name: name.into(),
            fail: false,
            delays_ms: Mutex::new(delays_ms.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Render the payload this mock would produce for `text`.
    pub fn payload_for(text: &str) -> Bytes {
        Bytes::from(format!("audio[{text}]"))
    }
}

#[async_trait]
impl TtsTier for MockTtsTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, text: &str, _voice: &str, _speed: f32) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays_ms.lock().unwrap().pop_front();
        if let Some(ms) = delay {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }

        if self.fail {
            return Err(Error::provider(format!("{}: synthesis failed", self.name)));
        }
        Ok(Self::payload_for(text))
    }
}

// =============================================================================
// Mock moderation
// =============================================================================

/// Mock moderation client flagging any text containing one of the
/// configured substrings.
pub struct MockModeration {
    flagged_substrings: Vec<String>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockModeration {
    /// Everything passes.
    pub fn allowing() -> Self {
        Self {
            flagged_substrings: Vec::new(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Flag any text containing one of these substrings.
    pub fn flagging(substrings: &[&str]) -> Self {
        Self {
            flagged_substrings: substrings.iter().map(|s| s.to_string()).collect(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// The moderation service is down (transport error on every call).
    pub fn unavailable() -> Self {
        Self {
            flagged_substrings: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModerationClient for MockModeration {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(Error::provider("moderation: service unavailable"));
        }

        let flagged = self
            .flagged_substrings
            .iter()
            .any(|needle| text.contains(needle.as_str()));

        Ok(ModerationVerdict {
            flagged,
            categories: if flagged {
                vec!["mock/policy".to_string()]
            } else {
                Vec::new()
            },
        })
    }
}

// =============================================================================
// Mock vector search
// =============================================================================

/// Mock vector index returning a fixed hit list.
pub struct MockVectorSearch {
    hits: Vec<ContextChunk>,
    fail: bool,
    calls: AtomicUsize,
}

impl MockVectorSearch {
    /// Return these chunks for every query.
    pub fn with_hits(hits: Vec<ContextChunk>) -> Self {
        Self {
            hits,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// The index is unreachable.
    pub fn unavailable() -> Self {
        Self {
            hits: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorSearch for MockVectorSearch {
    async fn search(&self, _query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.fail {
            return Err(Error::retrieval_unavailable("index unreachable"));
        }
        Ok(self.hits.iter().take(k).cloned().collect())
    }
}

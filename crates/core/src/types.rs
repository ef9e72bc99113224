//! Domain types shared across the Docent pipeline.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

// =============================================================================
// Utterance & retrieval
// =============================================================================

/// How the user's utterance entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceOrigin {
    /// Typed into the chat box.
    Typed,
    /// Produced by speech-to-text.
    Transcribed,
}

/// A user utterance. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    /// The utterance text.
    pub text: String,
    /// Where the text came from.
    pub origin: UtteranceOrigin,
}

impl Utterance {
    /// Create a typed utterance.
    pub fn typed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: UtteranceOrigin::Typed,
        }
    }

    /// Create a transcribed utterance.
    pub fn transcribed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: UtteranceOrigin::Transcribed,
        }
    }
}

/// One ranked chunk of retrieved context. Lifetime is a single request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextChunk {
    /// Chunk text.
    pub content: String,
    /// Human-readable label of the source document.
    pub source_label: String,
    /// Vector distance from the query (smaller is closer).
    pub distance: f32,
}

/// Ranked context chunks plus a derived confidence score.
///
/// Chunks are ordered by ascending distance. Confidence is informational
/// only; no threshold rejection happens here.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    /// Chunks, closest first.
    pub chunks: Vec<ContextChunk>,
    /// `clamp(1 - mean(distance), 0, 1)`; 0 when there are no chunks.
    pub confidence: f32,
}

impl RetrievalResult {
    /// Build a result from raw chunks: sorts by ascending distance and
    /// derives the confidence score.
    pub fn from_chunks(mut chunks: Vec<ContextChunk>) -> Self {
        chunks.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let confidence = if chunks.is_empty() {
            0.0
        } else {
            let mean: f32 =
                chunks.iter().map(|c| c.distance).sum::<f32>() / chunks.len() as f32;
            (1.0 - mean).clamp(0.0, 1.0)
        };

        Self { chunks, confidence }
    }

    /// An empty result, used when retrieval is unavailable.
    pub fn empty() -> Self {
        Self::default()
    }
}

// =============================================================================
// Generation
// =============================================================================

/// Chat message for generation calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role (system, user, assistant).
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Which generation backend a request is (or ended up) being served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationTierKind {
    /// Local inference (Ollama-style sidecar).
    Local,
    /// Cloud inference (OpenAI-compatible API).
    Cloud,
}

/// Why the orchestrator abandoned a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// The tier did not produce output within its budget.
    Timeout,
    /// The tier returned an error.
    Error,
    /// The tier was not configured or not reachable.
    Unavailable,
}

/// Phase of the per-request generation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPhase {
    Idle,
    TryLocal,
    FallbackToCloud(FallbackReason),
    TryCloud,
    Success(GenerationTierKind),
    Exhausted,
}

/// Tracks which tier is serving a request and why a fallback occurred.
/// One per request, short-lived; at most one tier is active at a time.
#[derive(Debug, Clone)]
pub struct GenerationTierState {
    phase: TierPhase,
    fallback_reason: Option<FallbackReason>,
}

impl GenerationTierState {
    /// Fresh state for a new request.
    pub fn new() -> Self {
        Self {
            phase: TierPhase::Idle,
            fallback_reason: None,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> TierPhase {
        self.phase
    }

    /// Reason the local tier was abandoned, if it was.
    pub fn fallback_reason(&self) -> Option<FallbackReason> {
        self.fallback_reason
    }

    /// Move to the next phase, recording the fallback reason when leaving
    /// the local tier.
    pub fn transition(&mut self, next: TierPhase) {
        if let TierPhase::FallbackToCloud(reason) = next {
            self.fallback_reason = Some(reason);
        }
        self.phase = next;
    }

    /// Whether a tier ultimately served the request.
    pub fn served_by(&self) -> Option<GenerationTierKind> {
        match self.phase {
            TierPhase::Success(tier) => Some(tier),
            _ => None,
        }
    }
}

impl Default for GenerationTierState {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Synthesis
// =============================================================================

/// A text segment split at sentence boundaries for synthesis dispatch.
/// Sequence indices are strictly increasing within a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceUnit {
    /// Monotonically increasing index preserving audio ordering.
    pub sequence: u64,
    /// Sentence text.
    pub text: String,
}

/// Candidate synthesis backends, in fallback order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisTier {
    /// Local fast sidecar (Kokoro-style).
    Local,
    /// First cloud fallback (OpenAI-compatible).
    CloudA,
    /// Second cloud fallback (ElevenLabs-compatible).
    CloudB,
}

/// Lifecycle of a synthesis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done,
    Failed,
}

/// One sentence's synthesis attempt. Created by the orchestrator, consumed
/// by the responder, discarded after delivery.
#[derive(Debug, Clone)]
pub struct SynthesisJob {
    /// The sentence being synthesized.
    pub sentence: SentenceUnit,
    /// Tier that produced the audio (or the last one tried on failure).
    pub tier: Option<SynthesisTier>,
    /// Synthesized audio, if any.
    pub audio: Option<Bytes>,
    /// Job status.
    pub status: JobStatus,
}

impl SynthesisJob {
    /// A freshly dispatched job.
    pub fn pending(sentence: SentenceUnit) -> Self {
        Self {
            sentence,
            tier: None,
            audio: None,
            status: JobStatus::Pending,
        }
    }

    /// Mark done with audio from the given tier.
    pub fn done(mut self, tier: SynthesisTier, audio: Bytes) -> Self {
        self.tier = Some(tier);
        self.audio = Some(audio);
        self.status = JobStatus::Done;
        self
    }

    /// Mark failed on all tiers.
    pub fn failed(mut self) -> Self {
        self.audio = None;
        self.status = JobStatus::Failed;
        self
    }
}

// =============================================================================
// Stream events
// =============================================================================

/// The canonical unit crossing the system boundary, multiplexing text and
/// audio over one logical channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A generated text token or span, in generation order.
    Text { content: String },
    /// Synthesized audio for one sentence, base64-framed, in strictly
    /// ascending sequence order.
    Audio { sequence: u64, data: String },
    /// Source labels backing the answer.
    Sources { items: Vec<String> },
    /// Terminal event on a successful or fallback-completed response.
    Done { followup_questions: Vec<String> },
    /// Terminal error event; nothing follows it.
    Error { message: String },
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(distance: f32) -> ContextChunk {
        ContextChunk {
            content: "c".to_string(),
            source_label: "s".to_string(),
            distance,
        }
    }

    #[test]
    fn retrieval_result_orders_by_distance() {
        let result = RetrievalResult::from_chunks(vec![chunk(0.9), chunk(0.1), chunk(0.5)]);
        let distances: Vec<f32> = result.chunks.iter().map(|c| c.distance).collect();
        assert_eq!(distances, vec![0.1, 0.5, 0.9]);
    }

    #[test]
    fn confidence_is_one_minus_mean_distance() {
        let result = RetrievalResult::from_chunks(vec![chunk(0.2), chunk(0.4)]);
        assert!((result.confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn confidence_clamped_to_unit_interval() {
        let high = RetrievalResult::from_chunks(vec![chunk(-0.5)]);
        assert_eq!(high.confidence, 1.0);

        let low = RetrievalResult::from_chunks(vec![chunk(3.0)]);
        assert_eq!(low.confidence, 0.0);
    }

    #[test]
    fn confidence_non_increasing_in_mean_distance() {
        let mut last = f32::MAX;
        for step in 0..20 {
            let d = step as f32 * 0.1;
            let result = RetrievalResult::from_chunks(vec![chunk(d), chunk(d + 0.05)]);
            assert!(result.confidence <= last);
            assert!((0.0..=1.0).contains(&result.confidence));
            last = result.confidence;
        }
    }

    #[test]
    fn empty_retrieval_has_zero_confidence() {
        let result = RetrievalResult::empty();
        assert!(result.chunks.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn tier_state_records_fallback_reason() {
        let mut state = GenerationTierState::new();
        assert_eq!(state.phase(), TierPhase::Idle);

        state.transition(TierPhase::TryLocal);
        state.transition(TierPhase::FallbackToCloud(FallbackReason::Timeout));
        state.transition(TierPhase::TryCloud);
        state.transition(TierPhase::Success(GenerationTierKind::Cloud));

        assert_eq!(state.fallback_reason(), Some(FallbackReason::Timeout));
        assert_eq!(state.served_by(), Some(GenerationTierKind::Cloud));
    }

    #[test]
    fn stream_event_serde_shape() {
        let event = StreamEvent::Text {
            content: "hi".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["content"], "hi");

        let done = StreamEvent::Done {
            followup_questions: vec!["Why?".to_string()],
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["type"], "done");
        assert!(done.is_terminal());
    }
}

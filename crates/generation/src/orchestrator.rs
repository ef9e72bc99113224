//! Local-first, cloud-fallback generation.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use docent_core::traits::{GenerationRequest, LlmTier};
use docent_core::types::{FallbackReason, GenerationTierKind, GenerationTierState, TierPhase};
use docent_core::{Error, Result};

/// What a finished generation produced.
#[derive(Debug)]
pub struct GenerationOutcome {
    /// The complete reply text, as forwarded to the client.
    pub full_text: String,
    /// Final tier state for this request.
    pub state: GenerationTierState,
    /// True when every tier failed and the configured fallback message was
    /// substituted for a model reply.
    pub degraded: bool,
}

impl GenerationOutcome {
    /// Tier that served the request, if any did.
    pub fn served_by(&self) -> Option<GenerationTierKind> {
        self.state.served_by()
    }
}

/// How one tier attempt ended.
enum TierRun {
    /// Stream completed; all chunks were forwarded.
    Completed(String),
    /// The tier produced nothing before failing. Fallback is allowed.
    FailedBeforeOutput(FallbackReason),
    /// The tier failed after output had already reached the client.
    /// Terminal; no other tier may be consulted.
    FailedMidStream(Error),
    /// The client went away while we were forwarding chunks.
    Disconnected,
}

/// Drives the per-request tier chain: local first, cloud on a pre-output
/// failure, configured fallback text when both are exhausted.
pub struct GenerationOrchestrator {
    local: Option<Arc<dyn LlmTier>>,
    cloud: Option<Arc<dyn LlmTier>>,
    local_timeout: Duration,
    cloud_timeout: Duration,
}

impl GenerationOrchestrator {
    pub fn new(
        local: Option<Arc<dyn LlmTier>>,
        cloud: Option<Arc<dyn LlmTier>>,
        local_timeout: Duration,
        cloud_timeout: Duration,
    ) -> Self {
        Self {
            local,
            cloud,
            local_timeout,
            cloud_timeout,
        }
    }

    /// Generate a reply for `request`, forwarding text chunks to `token_tx`
    /// as they arrive.
    ///
    /// Returns `Ok` with the assembled text on success, or with
    /// `degraded = true` and `fallback_response` as the text when every
    /// tier failed before producing output. Returns `Err` on a mid-stream
    /// failure or when the client disconnects.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        fallback_response: &str,
        token_tx: &mpsc::Sender<String>,
    ) -> Result<GenerationOutcome> {
        let mut state = GenerationTierState::new();

        if let Some(local) = &self.local {
            state.transition(TierPhase::TryLocal);
            match self
                .run_tier(local.as_ref(), request.clone(), self.local_timeout, token_tx)
                .await
            {
                TierRun::Completed(text) => {
                    state.transition(TierPhase::Success(GenerationTierKind::Local));
                    metrics::counter!("docent_generation_total", "tier" => "local").increment(1);
                    return Ok(GenerationOutcome {
                        full_text: text,
                        state,
                        degraded: false,
                    });
                }
                TierRun::FailedBeforeOutput(reason) => {
                    tracing::warn!(tier = local.name(), ?reason, "Local tier failed, falling back");
                    metrics::counter!("docent_generation_fallbacks_total").increment(1);
                    state.transition(TierPhase::FallbackToCloud(reason));
                }
                TierRun::FailedMidStream(e) => {
                    tracing::error!(tier = local.name(), error = %e, "Mid-stream failure");
                    return Err(e);
                }
                TierRun::Disconnected => return Err(Error::ClientDisconnected),
            }
        } else {
            state.transition(TierPhase::TryLocal);
            state.transition(TierPhase::FallbackToCloud(FallbackReason::Unavailable));
        }

        if let Some(cloud) = &self.cloud {
            state.transition(TierPhase::TryCloud);
            match self
                .run_tier(cloud.as_ref(), request, self.cloud_timeout, token_tx)
                .await
            {
                TierRun::Completed(text) => {
                    state.transition(TierPhase::Success(GenerationTierKind::Cloud));
                    metrics::counter!("docent_generation_total", "tier" => "cloud").increment(1);
                    return Ok(GenerationOutcome {
                        full_text: text,
                        state,
                        degraded: false,
                    });
                }
                TierRun::FailedBeforeOutput(reason) => {
                    tracing::warn!(tier = cloud.name(), ?reason, "Cloud tier failed");
                }
                TierRun::FailedMidStream(e) => {
                    tracing::error!(tier = cloud.name(), error = %e, "Mid-stream failure");
                    return Err(e);
                }
                TierRun::Disconnected => return Err(Error::ClientDisconnected),
            }
        }

        // Every tier failed before producing output. Serve the configured
        // fallback message as a normal degraded reply.
        state.transition(TierPhase::Exhausted);
        tracing::error!("All generation tiers exhausted, serving fallback response");
        metrics::counter!("docent_generation_exhausted_total").increment(1);

        if token_tx.send(fallback_response.to_string()).await.is_err() {
            return Err(Error::ClientDisconnected);
        }

        Ok(GenerationOutcome {
            full_text: fallback_response.to_string(),
            state,
            degraded: true,
        })
    }

    /// Run a single tier, forwarding chunks as they arrive. The timeout is
    /// a per-chunk budget: a tier that goes quiet longer than `timeout` is
    /// abandoned (recoverably if it had not produced output yet).
    async fn run_tier(
        &self,
        tier: &dyn LlmTier,
        request: GenerationRequest,
        timeout: Duration,
        token_tx: &mpsc::Sender<String>,
    ) -> TierRun {
        let mut stream = match tokio::time::timeout(timeout, tier.stream_chat(request)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::debug!(tier = tier.name(), error = %e, "Tier refused the request");
                return TierRun::FailedBeforeOutput(FallbackReason::Error);
            }
            Err(_) => return TierRun::FailedBeforeOutput(FallbackReason::Timeout),
        };

        let mut full_text = String::new();
        let mut emitted = false;

        loop {
            match tokio::time::timeout(timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if token_tx.send(chunk.clone()).await.is_err() {
                        return TierRun::Disconnected;
                    }
                    full_text.push_str(&chunk);
                    emitted = true;
                }
                Ok(Some(Err(e))) => {
                    return if emitted {
                        TierRun::FailedMidStream(e)
                    } else {
                        tracing::debug!(tier = tier.name(), error = %e, "Tier failed before output");
                        TierRun::FailedBeforeOutput(FallbackReason::Error)
                    };
                }
                Ok(None) => {
                    return if emitted {
                        TierRun::Completed(full_text)
                    } else {
                        // An empty reply counts as a failure, not a success.
                        TierRun::FailedBeforeOutput(FallbackReason::Error)
                    };
                }
                Err(_) => {
                    return if emitted {
                        TierRun::FailedMidStream(Error::timeout(format!(
                            "{} stalled mid-stream",
                            tier.name()
                        )))
                    } else {
                        TierRun::FailedBeforeOutput(FallbackReason::Timeout)
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::mocks::{MockLlmBehavior, MockLlmTier};
    use docent_core::types::ChatMessage;

    const FALLBACK: &str = "I'm having trouble right now, ask me again in a moment!";

    fn request() -> GenerationRequest {
        GenerationRequest {
            system_prompt: "You are a zoo guide.".to_string(),
            messages: vec![ChatMessage::user("Tell me about lemurs")],
            model: "test-model".to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    fn orchestrator(
        local: Option<Arc<MockLlmTier>>,
        cloud: Option<Arc<MockLlmTier>>,
    ) -> GenerationOrchestrator {
        GenerationOrchestrator::new(
            local.map(|t| t as Arc<dyn LlmTier>),
            cloud.map(|t| t as Arc<dyn LlmTier>),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
    }

    async fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(token) = rx.try_recv() {
            out.push(token);
        }
        out
    }

    #[tokio::test]
    async fn local_success_never_touches_cloud() {
        let local = Arc::new(MockLlmTier::streaming("local", &["Lemurs ", "are ", "great."]));
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["cloud reply"]));
        let orch = orchestrator(Some(local.clone()), Some(cloud.clone()));

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert_eq!(outcome.full_text, "Lemurs are great.");
        assert_eq!(outcome.served_by(), Some(GenerationTierKind::Local));
        assert!(!outcome.degraded);
        assert_eq!(cloud.calls(), 0);
        assert_eq!(drain(&mut rx).await, vec!["Lemurs ", "are ", "great."]);
    }

    #[tokio::test]
    async fn local_error_before_output_falls_back_to_cloud() {
        let local = Arc::new(MockLlmTier::failing("local"));
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["From the cloud."]));
        let orch = orchestrator(Some(local), Some(cloud.clone()));

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert_eq!(outcome.served_by(), Some(GenerationTierKind::Cloud));
        assert_eq!(outcome.state.fallback_reason(), Some(FallbackReason::Error));
        assert_eq!(cloud.calls(), 1);
        assert_eq!(drain(&mut rx).await, vec!["From the cloud."]);
    }

    #[tokio::test]
    async fn local_hang_times_out_and_falls_back() {
        let local = Arc::new(MockLlmTier::hanging("local"));
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["From the cloud."]));
        let orch = orchestrator(Some(local), Some(cloud));

        let (tx, _rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert_eq!(outcome.served_by(), Some(GenerationTierKind::Cloud));
        assert_eq!(outcome.state.fallback_reason(), Some(FallbackReason::Timeout));
    }

    #[tokio::test]
    async fn mid_stream_failure_is_terminal() {
        let local = Arc::new(MockLlmTier::new(
            "local",
            MockLlmBehavior::TokensThenError(vec!["Partial ".to_string()]),
        ));
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["never sent"]));
        let orch = orchestrator(Some(local), Some(cloud.clone()));

        let (tx, mut rx) = mpsc::channel(32);
        let result = orch.generate(request(), FALLBACK, &tx).await;

        assert!(result.is_err());
        // The partial output already reached the client, so the cloud tier
        // must never be consulted.
        assert_eq!(cloud.calls(), 0);
        assert_eq!(drain(&mut rx).await, vec!["Partial "]);
    }

    #[tokio::test]
    async fn all_tiers_exhausted_serves_fallback_text() {
        let local = Arc::new(MockLlmTier::failing("local"));
        let cloud = Arc::new(MockLlmTier::new("cloud", MockLlmBehavior::ConnectError));
        let orch = orchestrator(Some(local), Some(cloud));

        let (tx, mut rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert!(outcome.degraded);
        assert_eq!(outcome.full_text, FALLBACK);
        assert_eq!(outcome.served_by(), None);
        assert_eq!(outcome.state.phase(), TierPhase::Exhausted);
        assert_eq!(drain(&mut rx).await, vec![FALLBACK]);
    }

    #[tokio::test]
    async fn missing_local_tier_goes_straight_to_cloud() {
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["Cloud only."]));
        let orch = orchestrator(None, Some(cloud.clone()));

        let (tx, _rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert_eq!(outcome.served_by(), Some(GenerationTierKind::Cloud));
        assert_eq!(
            outcome.state.fallback_reason(),
            Some(FallbackReason::Unavailable)
        );
        assert_eq!(cloud.calls(), 1);
    }

    #[tokio::test]
    async fn dropped_receiver_is_client_disconnect() {
        let local = Arc::new(MockLlmTier::streaming("local", &["token"]));
        let orch = orchestrator(Some(local), None);

        let (tx, rx) = mpsc::channel(32);
        drop(rx);
        let result = orch.generate(request(), FALLBACK, &tx).await;

        assert!(matches!(result, Err(Error::ClientDisconnected)));
    }

    #[tokio::test]
    async fn empty_stream_counts_as_failure() {
        let local = Arc::new(MockLlmTier::streaming("local", &[]));
        let cloud = Arc::new(MockLlmTier::streaming("cloud", &["Recovered."]));
        let orch = orchestrator(Some(local), Some(cloud));

        let (tx, _rx) = mpsc::channel(32);
        let outcome = orch.generate(request(), FALLBACK, &tx).await.unwrap();

        assert_eq!(outcome.served_by(), Some(GenerationTierKind::Cloud));
    }
}

//! Concurrent, tiered sentence synthesis.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Semaphore};

use docent_core::traits::TtsTier;
use docent_core::types::{SentenceUnit, SynthesisTier};

/// Completion of one sentence: its sequence and the audio, or `None` when
/// every tier failed.
pub type SentenceResult = (u64, Option<Bytes>);

/// Runs sentence synthesis on a bounded worker pool, trying each tier in
/// order per sentence. The hot config's preferred provider is tried first;
/// per-sentence fallback never affects other sentences.
pub struct SynthesisOrchestrator {
    tiers: Vec<(SynthesisTier, Arc<dyn TtsTier>)>,
    permits: Arc<Semaphore>,
    call_timeout: Duration,
}

impl SynthesisOrchestrator {
    pub fn new(
        local: Option<Arc<dyn TtsTier>>,
        cloud_a: Option<Arc<dyn TtsTier>>,
        cloud_b: Option<Arc<dyn TtsTier>>,
        worker_permits: usize,
        call_timeout: Duration,
    ) -> Self {
        let mut tiers = Vec::new();
        if let Some(tier) = local {
            tiers.push((SynthesisTier::Local, tier));
        }
        if let Some(tier) = cloud_a {
            tiers.push((SynthesisTier::CloudA, tier));
        }
        if let Some(tier) = cloud_b {
            tiers.push((SynthesisTier::CloudB, tier));
        }
        Self {
            tiers,
            permits: Arc::new(Semaphore::new(worker_permits.max(1))),
            call_timeout,
        }
    }

    /// Tier chain with the provider named `preferred` moved to the front.
    /// An unknown or empty name leaves the default order.
    fn tier_chain(&self, preferred: &str) -> Vec<(SynthesisTier, Arc<dyn TtsTier>)> {
        let mut chain: Vec<_> = self.tiers.clone();
        if let Some(pos) = chain.iter().position(|(_, t)| t.name() == preferred) {
            chain.rotate_left(pos);
        }
        chain
    }

    /// Synthesize one sentence, walking the tier chain in default order.
    /// Returns the first successful tier's audio, or `None` when all fail.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Option<(SynthesisTier, Bytes)> {
        self.synthesize_preferring("", text, voice, speed).await
    }

    /// Synthesize with the named provider tried first.
    pub async fn synthesize_preferring(
        &self,
        preferred: &str,
        text: &str,
        voice: &str,
        speed: f32,
    ) -> Option<(SynthesisTier, Bytes)> {
        for (kind, tier) in &self.tier_chain(preferred) {
            match tokio::time::timeout(self.call_timeout, tier.synthesize(text, voice, speed)).await
            {
                Ok(Ok(audio)) => {
                    metrics::counter!("docent_synthesis_total", "tier" => tier.name().to_string())
                        .increment(1);
                    return Some((*kind, audio));
                }
                Ok(Err(e)) => {
                    tracing::warn!(tier = tier.name(), error = %e, "Synthesis tier failed");
                }
                Err(_) => {
                    tracing::warn!(tier = tier.name(), "Synthesis tier timed out");
                }
            }
            metrics::counter!("docent_synthesis_fallbacks_total").increment(1);
        }
        tracing::error!(text_len = text.len(), "All synthesis tiers failed for sentence");
        None
    }

    /// Open a session for one response's sentences, preferring the named
    /// provider (the hot config's `tts_provider`). Completions arrive on
    /// the returned receiver in whatever order synthesis finishes; feed
    /// them through a [`crate::ReorderBuffer`] to restore sentence order.
    pub fn session(
        self: &Arc<Self>,
        provider: &str,
        voice: &str,
        speed: f32,
    ) -> (SynthesisSession, mpsc::Receiver<SentenceResult>) {
        let (tx, rx) = mpsc::channel(32);
        (
            SynthesisSession {
                orchestrator: Arc::clone(self),
                provider: provider.to_string(),
                voice: voice.to_string(),
                speed,
                tx,
                dispatched: 0,
            },
            rx,
        )
    }
}

/// Per-response handle for dispatching sentences.
///
/// Dropping the session (after the last dispatch) closes the result
/// channel once in-flight sentences complete.
pub struct SynthesisSession {
    orchestrator: Arc<SynthesisOrchestrator>,
    provider: String,
    voice: String,
    speed: f32,
    tx: mpsc::Sender<SentenceResult>,
    dispatched: u64,
}

impl SynthesisSession {
    /// Queue a sentence for synthesis. Waits for a worker permit inside
    /// the spawned task, so dispatch itself never blocks generation.
    pub fn dispatch(&mut self, sentence: SentenceUnit) {
        self.dispatched += 1;

        let orchestrator = Arc::clone(&self.orchestrator);
        let provider = self.provider.clone();
        let voice = self.voice.clone();
        let speed = self.speed;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let Ok(_permit) = orchestrator.permits.clone().acquire_owned().await else {
                return;
            };
            // Receiver gone means the client disconnected; drop the audio.
            let audio = orchestrator
                .synthesize_preferring(&provider, &sentence.text, &voice, speed)
                .await
                .map(|(_, bytes)| bytes);
            let _ = tx.send((sentence.sequence, audio)).await;
        });
    }

    /// Number of sentences dispatched so far.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }
}

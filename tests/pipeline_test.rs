//! End-to-end pipeline scenarios against mocked backends.

use std::sync::Arc;
use std::time::Duration;

use docent_core::mocks::{MockLlmTier, MockModeration, MockTtsTier, MockVectorSearch};
use docent_core::snapshot::{ConfigSnapshot, ConfigStore};
use docent_core::traits::{LlmTier, TtsTier};
use docent_core::types::{ContextChunk, StreamEvent, Utterance};
use docent_gateway::ChatPipeline;
use docent_generation::GenerationOrchestrator;
use docent_retrieval::Retriever;
use docent_safety::SafetyGate;
use docent_synthesis::SynthesisOrchestrator;

fn chunk(label: &str, content: &str, distance: f32) -> ContextChunk {
    ContextChunk {
        content: content.to_string(),
        source_label: label.to_string(),
        distance,
    }
}

fn build_pipeline(
    local: MockLlmTier,
    cloud: MockLlmTier,
    tts: MockTtsTier,
    hits: Vec<ContextChunk>,
) -> Arc<ChatPipeline> {
    let gate = Arc::new(SafetyGate::new(500, Arc::new(MockModeration::allowing())));
    let retriever = Arc::new(Retriever::new(Arc::new(MockVectorSearch::with_hits(hits)), 5));
    let generation = Arc::new(GenerationOrchestrator::new(
        Some(Arc::new(local) as Arc<dyn LlmTier>),
        Some(Arc::new(cloud) as Arc<dyn LlmTier>),
        Duration::from_millis(100),
        Duration::from_millis(100),
    ));
    let synthesis = Arc::new(SynthesisOrchestrator::new(
        Some(Arc::new(tts) as Arc<dyn TtsTier>),
        None,
        None,
        3,
        Duration::from_millis(500),
    ));
    Arc::new(ChatPipeline::new(
        gate,
        retriever,
        generation,
        synthesis,
        ConfigStore::fixed(ConfigSnapshot::default()),
    ))
}

#[tokio::test]
async fn grounded_question_gets_sourced_answer_with_followups() {
    let reply = "Ring-tailed lemurs live in Madagascar. They sunbathe in groups.\n\n\
        Want to explore more?\n\
        1. What do lemurs eat?\n\
        2. How far can a lemur leap?\n";
    let pipeline = build_pipeline(
        MockLlmTier::streaming("local", &[reply]),
        MockLlmTier::streaming("cloud", &["unused"]),
        MockTtsTier::ok("kokoro"),
        vec![chunk("Lemurs", "Lemurs are primates from Madagascar.", 0.15)],
    );

    let answer = pipeline
        .answer(Utterance::typed("Tell me about lemurs"), Vec::new())
        .await
        .unwrap();

    let fallback = ConfigSnapshot::default().fallback_response;
    assert!(!answer.reply.contains(&fallback));
    assert_eq!(answer.sources, vec!["Lemurs"]);
    assert_eq!(answer.followup_questions.len(), 2);
    assert!(answer.followup_questions.len() <= 3);
    assert!((answer.confidence - 0.85).abs() < 1e-6);
}

#[tokio::test]
async fn total_backend_outage_degrades_to_exact_fallback() {
    let pipeline = build_pipeline(
        MockLlmTier::hanging("local"),
        MockLlmTier::hanging("cloud"),
        MockTtsTier::ok("kokoro"),
        vec![chunk("Lemurs", "Lemurs are primates.", 0.15)],
    );

    let answer = pipeline
        .answer(Utterance::typed("Tell me about lemurs"), Vec::new())
        .await
        .unwrap();

    assert_eq!(answer.reply, ConfigSnapshot::default().fallback_response);
    assert!(answer.followup_questions.is_empty());
    assert!(answer.sources.is_empty());
    assert_eq!(answer.confidence, 0.0);
}

#[tokio::test]
async fn streamed_audio_sequences_are_strictly_ascending() {
    // Per-call delays force synthesis to finish out of dispatch order.
    let pipeline = build_pipeline(
        MockLlmTier::streaming("local", &["One. ", "Two. ", "Three. ", "Four."]),
        MockLlmTier::streaming("cloud", &["unused"]),
        MockTtsTier::with_delays("kokoro", &[70, 10, 45, 5]),
        vec![chunk("Lemurs", "Lemurs are primates.", 0.15)],
    );

    let mut rx = pipeline.stream(Utterance::typed("count for me"), Vec::new());
    let mut audio_seqs = Vec::new();
    let mut saw_done = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Audio { sequence, .. } => audio_seqs.push(sequence),
            StreamEvent::Done { .. } => saw_done = true,
            _ => {}
        }
    }

    assert!(saw_done);
    assert_eq!(audio_seqs, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn dropping_the_stream_receiver_cancels_cleanly() {
    let pipeline = build_pipeline(
        MockLlmTier::streaming("local", &["One. ", "Two. ", "Three."]),
        MockLlmTier::streaming("cloud", &["unused"]),
        MockTtsTier::ok("kokoro"),
        vec![chunk("Lemurs", "Lemurs are primates.", 0.15)],
    );

    let rx = pipeline.stream(Utterance::typed("count"), Vec::new());
    drop(rx);

    // The pipeline task notices the closed channel and stops on its own;
    // give it a moment and make sure nothing panicked by running another
    // request on the same pipeline.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let answer = pipeline
        .answer(Utterance::typed("still alive?"), Vec::new())
        .await
        .unwrap();
    assert!(!answer.reply.is_empty());
}

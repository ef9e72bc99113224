//! The request pipeline: safety gate, retrieval, generation, synthesis,
//! streaming delivery.

use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use docent_core::snapshot::{ConfigSnapshot, ConfigStore};
use docent_core::traits::GenerationRequest;
use docent_core::types::{ChatMessage, SentenceUnit, StreamEvent, Utterance};
use docent_core::Result;
use docent_generation::{extract_followups, GenerationOrchestrator};
use docent_retrieval::Retriever;
use docent_safety::{Direction, SafetyGate};
use docent_synthesis::{strip_markdown, ReorderBuffer, SentenceSplitter, SynthesisOrchestrator};

/// A chat request from the client.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    /// The user's message.
    pub message: String,
    /// Client session identifier, echoed into the request span. Sessions
    /// are not stored server-side.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Prior conversation turns, oldest first.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// A complete non-streaming answer.
#[derive(Debug, Clone, Serialize)]
pub struct ChatAnswer {
    pub reply: String,
    pub sources: Vec<String>,
    pub followup_questions: Vec<String>,
    pub confidence: f32,
}

/// Wires the pipeline stages together for one deployment.
pub struct ChatPipeline {
    gate: Arc<SafetyGate>,
    retriever: Arc<Retriever>,
    generation: Arc<GenerationOrchestrator>,
    synthesis: Arc<SynthesisOrchestrator>,
    config: ConfigStore,
}

impl ChatPipeline {
    pub fn new(
        gate: Arc<SafetyGate>,
        retriever: Arc<Retriever>,
        generation: Arc<GenerationOrchestrator>,
        synthesis: Arc<SynthesisOrchestrator>,
        config: ConfigStore,
    ) -> Self {
        Self {
            gate,
            retriever,
            generation,
            synthesis,
            config,
        }
    }

    fn build_request(
        snapshot: &ConfigSnapshot,
        context: &str,
        utterance: &Utterance,
        history: &[ChatMessage],
    ) -> GenerationRequest {
        let mut messages = history.to_vec();
        messages.push(ChatMessage::user(utterance.text.clone()));
        GenerationRequest {
            system_prompt: snapshot.system_prompt_with_context(context),
            messages,
            model: snapshot.model_name.clone(),
            temperature: snapshot.model_temperature,
            max_tokens: snapshot.model_max_tokens,
        }
    }

    // =========================================================================
    // Non-streaming
    // =========================================================================

    /// Answer a request in one shot, without audio.
    pub async fn answer(&self, utterance: Utterance, history: Vec<ChatMessage>) -> Result<ChatAnswer> {
        let snapshot = self.config.current();

        let verdict = self.gate.check(&utterance.text, Direction::Input).await;
        if !verdict.allowed {
            return Ok(ChatAnswer {
                reply: snapshot.blocked_input_response.clone(),
                sources: Vec::new(),
                followup_questions: Vec::new(),
                confidence: 0.0,
            });
        }

        let retrieval = self.retriever.retrieve(&utterance.text).await;
        let context = Retriever::context_block(&retrieval);
        let request = Self::build_request(&snapshot, &context, &utterance, &history);

        // Tokens are forwarded nowhere for the one-shot path; the drain
        // keeps the sender from blocking.
        let (token_tx, mut token_rx) = mpsc::channel(64);
        let drain = tokio::spawn(async move { while token_rx.recv().await.is_some() {} });

        let outcome = self
            .generation
            .generate(request, &snapshot.fallback_response, &token_tx)
            .await;
        drop(token_tx);
        let _ = drain.await;
        let outcome = outcome?;

        if outcome.degraded {
            return Ok(ChatAnswer {
                reply: outcome.full_text,
                sources: Vec::new(),
                followup_questions: Vec::new(),
                confidence: 0.0,
            });
        }

        // Output moderation: the reply is not streamed yet, so a flagged
        // answer can still be replaced wholesale.
        let out_verdict = self.gate.check(&outcome.full_text, Direction::Output).await;
        if !out_verdict.allowed {
            tracing::warn!(categories = ?out_verdict.categories, "Reply blocked by output moderation");
            return Ok(ChatAnswer {
                reply: snapshot.fallback_response.clone(),
                sources: Vec::new(),
                followup_questions: Vec::new(),
                confidence: retrieval.confidence,
            });
        }

        let (reply, followup_questions) = extract_followups(&outcome.full_text);
        Ok(ChatAnswer {
            reply,
            sources: Retriever::source_labels(&retrieval),
            followup_questions,
            confidence: retrieval.confidence,
        })
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Run the full streaming pipeline. Events arrive on the returned
    /// receiver: text in generation order, audio in strictly ascending
    /// sentence order (never before the sentence's text), then sources and
    /// a single terminal event. Dropping the receiver cancels the request.
    pub fn stream(self: &Arc<Self>, utterance: Utterance, history: Vec<ChatMessage>) -> mpsc::Receiver<StreamEvent> {
        let (event_tx, event_rx) = mpsc::channel(64);
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            pipeline.run_stream(utterance, history, event_tx).await;
        });
        event_rx
    }

    async fn run_stream(
        &self,
        utterance: Utterance,
        history: Vec<ChatMessage>,
        event_tx: mpsc::Sender<StreamEvent>,
    ) {
        let snapshot = self.config.current();

        let verdict = self.gate.check(&utterance.text, Direction::Input).await;
        if !verdict.allowed {
            self.speak_canned(&snapshot, snapshot.blocked_input_response.clone(), &event_tx)
                .await;
            return;
        }

        let retrieval = self.retriever.retrieve(&utterance.text).await;
        let context = Retriever::context_block(&retrieval);
        let request = Self::build_request(&snapshot, &context, &utterance, &history);

        let (token_tx, mut token_rx) = mpsc::channel::<String>(64);
        let generation = Arc::clone(&self.generation);
        let fallback = snapshot.fallback_response.clone();
        let gen_task = tokio::spawn(async move {
            generation.generate(request, &fallback, &token_tx).await
        });

        let (mut session, synth_rx) =
            self.synthesis
                .session(&snapshot.tts_provider, &snapshot.tts_default_voice, snapshot.tts_speed);
        let audio_task = spawn_audio_forwarder(synth_rx, event_tx.clone());

        // Forward tokens as text and cut sentences for synthesis. A
        // sentence is dispatched only after its last token went out as
        // text, which is what keeps audio behind text.
        let mut splitter = SentenceSplitter::new();
        let mut speaking = true;
        let mut client_gone = false;
        while let Some(token) = token_rx.recv().await {
            if event_tx
                .send(StreamEvent::Text { content: token.clone() })
                .await
                .is_err()
            {
                client_gone = true;
                break;
            }
            if speaking {
                for unit in splitter.push(&token) {
                    if is_followup_heading(&unit.text) {
                        // The follow-up list is shown, not spoken.
                        speaking = false;
                        break;
                    }
                    dispatch_clean(&mut session, unit);
                }
            }
        }
        drop(token_rx);

        let outcome = match gen_task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "Generation task panicked");
                drop(session);
                let _ = audio_task.await;
                let _ = event_tx
                    .send(StreamEvent::Error {
                        message: "internal error".to_string(),
                    })
                    .await;
                return;
            }
        };

        if client_gone {
            drop(session);
            let _ = audio_task.await;
            return;
        }

        match outcome {
            Ok(outcome) => {
                if speaking {
                    if let Some(unit) = splitter.flush() {
                        if !is_followup_heading(&unit.text) {
                            dispatch_clean(&mut session, unit);
                        }
                    }
                }
                drop(session);
                let _ = audio_task.await;

                let sources = Retriever::source_labels(&retrieval);
                if !sources.is_empty() && !outcome.degraded {
                    let _ = event_tx.send(StreamEvent::Sources { items: sources }).await;
                }

                // The text already reached the client, so a late moderation
                // hit is recorded but not retracted.
                let out_verdict = self.gate.check(&outcome.full_text, Direction::Output).await;
                if !out_verdict.allowed {
                    tracing::warn!(
                        categories = ?out_verdict.categories,
                        "Streamed reply flagged by output moderation"
                    );
                }

                let followup_questions = if outcome.degraded {
                    Vec::new()
                } else {
                    extract_followups(&outcome.full_text).1
                };
                let _ = event_tx.send(StreamEvent::Done { followup_questions }).await;
            }
            Err(e) => {
                drop(session);
                let _ = audio_task.await;
                if e.is_cancellation() {
                    tracing::debug!("Client disconnected mid-stream");
                    return;
                }
                tracing::error!(error = %e, "Streaming pipeline failed");
                let _ = event_tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
        }
    }

    /// Deliver a canned reply (blocked input) as a normal spoken turn.
    async fn speak_canned(
        &self,
        snapshot: &ConfigSnapshot,
        text: String,
        event_tx: &mpsc::Sender<StreamEvent>,
    ) {
        if event_tx
            .send(StreamEvent::Text { content: text.clone() })
            .await
            .is_err()
        {
            return;
        }

        let (mut session, synth_rx) =
            self.synthesis
                .session(&snapshot.tts_provider, &snapshot.tts_default_voice, snapshot.tts_speed);
        let audio_task = spawn_audio_forwarder(synth_rx, event_tx.clone());

        let mut splitter = SentenceSplitter::new();
        for unit in splitter.push(&text) {
            dispatch_clean(&mut session, unit);
        }
        if let Some(unit) = splitter.flush() {
            dispatch_clean(&mut session, unit);
        }
        drop(session);
        let _ = audio_task.await;

        let _ = event_tx
            .send(StreamEvent::Done {
                followup_questions: Vec::new(),
            })
            .await;
    }
}

/// Forward synthesis completions as ordered audio events.
fn spawn_audio_forwarder(
    mut synth_rx: mpsc::Receiver<docent_synthesis::SentenceResult>,
    event_tx: mpsc::Sender<StreamEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer = ReorderBuffer::new();
        while let Some((sequence, audio)) = synth_rx.recv().await {
            for (seq, bytes) in buffer.complete(sequence, audio) {
                let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
                if event_tx
                    .send(StreamEvent::Audio { sequence: seq, data })
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    })
}

fn dispatch_clean(session: &mut docent_synthesis::SynthesisSession, unit: SentenceUnit) {
    let text = strip_markdown(&unit.text);
    if text.trim().is_empty() {
        return;
    }
    session.dispatch(SentenceUnit {
        sequence: unit.sequence,
        text,
    });
}

fn is_followup_heading(text: &str) -> bool {
    text.to_ascii_lowercase().contains("want to explore more")
}

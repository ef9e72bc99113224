//! Tiered speech synthesis for Docent.
//!
//! Splits generated text into sentences, synthesizes them concurrently on
//! a bounded worker pool with per-sentence tier fallback, and releases
//! audio strictly in sentence order. A sentence that fails on every tier
//! becomes silence; the rest of the reply still plays.

mod orchestrator;
mod providers;
mod reorder;
mod sentence;

pub use orchestrator::{SentenceResult, SynthesisOrchestrator, SynthesisSession};
pub use providers::{ElevenLabsTts, KokoroTts, OpenAiTts};
pub use reorder::ReorderBuffer;
pub use sentence::{strip_markdown, SentenceSplitter};

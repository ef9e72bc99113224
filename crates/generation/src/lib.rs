//! Tiered text generation for Docent.
//!
//! Runs a local-first, cloud-fallback tier chain behind an explicit
//! per-request state machine. The hard rule: tiers may only be switched
//! before the first output chunk reaches the client. Once output has
//! started, a tier failure is terminal; the client never sees a reply
//! restart mid-stream.

mod followup;
mod orchestrator;
mod providers;

pub use followup::extract_followups;
pub use orchestrator::{GenerationOrchestrator, GenerationOutcome};
pub use providers::{OllamaTier, OpenAiTier};

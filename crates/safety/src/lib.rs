//! Content safety gate for Docent.
//!
//! Validates user input (length, PII, content policy) and moderates model
//! output before it is marked final. The moderation backend is advisory:
//! on a moderation-service outage the gate fails open and logs, because a
//! domain-specific topic filter upstream already bounds the conversation.

mod gate;
mod moderation;

pub use gate::{Direction, PiiScanner, SafetyGate, SafetyVerdict};
pub use moderation::OpenAiModeration;

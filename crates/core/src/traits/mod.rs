//! Collaborator traits for Docent.
//!
//! Traits are organized by pipeline seam:
//! - `llm`: generation tiers (LlmTier)
//! - `tts`: synthesis tiers (TtsTier)
//! - `moderation`: content-policy moderation (ModerationClient)
//! - `search`: external vector-search capability (VectorSearch)

pub mod llm;
pub mod moderation;
pub mod search;
pub mod tts;

pub use llm::*;
pub use moderation::*;
pub use search::*;
pub use tts::*;

//! Content-policy moderation trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Verdict from the external moderation capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModerationVerdict {
    /// Whether the content was flagged.
    pub flagged: bool,
    /// Flagged category names, empty when not flagged.
    pub categories: Vec<String>,
}

/// External moderation capability. A transport failure here is handled by
/// the safety gate (fail-open), not by the client itself.
#[async_trait]
pub trait ModerationClient: Send + Sync {
    /// Classify `text` against the content policy.
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}

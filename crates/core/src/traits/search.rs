//! External vector-search capability.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ContextChunk;

/// The external vector index, reduced to its one operation. The indexing
/// algorithm behind it is out of scope.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `k` chunks ranked by ascending distance.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>>;
}

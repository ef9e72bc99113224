//! Query-time retrieval over the knowledge base.

use std::sync::Arc;

use docent_core::traits::VectorSearch;
use docent_core::types::RetrievalResult;

/// Separator between chunks in the assembled context block.
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieves context chunks for a user query.
pub struct Retriever {
    search: Arc<dyn VectorSearch>,
    top_k: usize,
}

impl Retriever {
    pub fn new(search: Arc<dyn VectorSearch>, top_k: usize) -> Self {
        Self { search, top_k }
    }

    /// Fetch the top-k chunks for `query`. A failed search degrades to an
    /// empty result rather than failing the request; the generation prompt
    /// handles the no-context case.
    pub async fn retrieve(&self, query: &str) -> RetrievalResult {
        match self.search.search(query, self.top_k).await {
            Ok(chunks) => {
                let result = RetrievalResult::from_chunks(chunks);
                tracing::debug!(
                    hits = result.chunks.len(),
                    confidence = result.confidence,
                    "Retrieved context"
                );
                metrics::histogram!("docent_retrieval_confidence").record(result.confidence as f64);
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "Retrieval failed, continuing without context");
                metrics::counter!("docent_retrieval_failures_total").increment(1);
                RetrievalResult::empty()
            }
        }
    }

    /// Assemble the chunks into the prompt context block. Each chunk gets
    /// an `[About: label]` header so the model can attribute facts.
    pub fn context_block(result: &RetrievalResult) -> String {
        result
            .chunks
            .iter()
            .map(|chunk| format!("[About: {}]\n{}", chunk.source_label, chunk.content))
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR)
    }

    /// Distinct source labels in rank order, for the sources event.
    pub fn source_labels(result: &RetrievalResult) -> Vec<String> {
        let mut labels = Vec::new();
        for chunk in &result.chunks {
            if !labels.contains(&chunk.source_label) {
                labels.push(chunk.source_label.clone());
            }
        }
        labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::mocks::MockVectorSearch;
    use docent_core::types::ContextChunk;

    fn chunk(label: &str, content: &str, distance: f32) -> ContextChunk {
        ContextChunk {
            content: content.to_string(),
            source_label: label.to_string(),
            distance,
        }
    }

    #[tokio::test]
    async fn retrieve_ranks_by_distance_and_scores_confidence() {
        let search = Arc::new(MockVectorSearch::with_hits(vec![
            chunk("Lemurs", "Lemurs live in Madagascar.", 0.4),
            chunk("Habitats", "Rainforest canopy.", 0.1),
        ]));
        let retriever = Retriever::new(search, 5);

        let result = retriever.retrieve("where do lemurs live?").await;

        assert_eq!(result.chunks[0].source_label, "Habitats");
        assert_eq!(result.chunks[1].source_label, "Lemurs");
        // mean distance 0.25 -> confidence 0.75
        assert!((result.confidence - 0.75).abs() < 1e-6);
    }

    #[tokio::test]
    async fn search_failure_degrades_to_empty() {
        let search = Arc::new(MockVectorSearch::unavailable());
        let retriever = Retriever::new(search, 5);

        let result = retriever.retrieve("anything").await;

        assert!(result.chunks.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn context_block_labels_and_separates_chunks() {
        let result = RetrievalResult::from_chunks(vec![
            chunk("Lemurs", "Lemurs live in Madagascar.", 0.1),
            chunk("Diet", "They eat fruit and leaves.", 0.2),
        ]);

        let block = Retriever::context_block(&result);
        assert_eq!(
            block,
            "[About: Lemurs]\nLemurs live in Madagascar.\n\n---\n\n[About: Diet]\nThey eat fruit and leaves."
        );
    }

    #[test]
    fn source_labels_dedupe_in_rank_order() {
        let result = RetrievalResult::from_chunks(vec![
            chunk("Lemurs", "a", 0.1),
            chunk("Diet", "b", 0.2),
            chunk("Lemurs", "c", 0.3),
        ]);

        assert_eq!(Retriever::source_labels(&result), vec!["Lemurs", "Diet"]);
    }

    #[test]
    fn empty_result_renders_empty_block() {
        let result = RetrievalResult::empty();
        assert_eq!(Retriever::context_block(&result), "");
        assert!(Retriever::source_labels(&result).is_empty());
    }
}

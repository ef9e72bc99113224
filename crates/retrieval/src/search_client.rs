//! HTTP client for the vector search sidecar.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use docent_core::traits::VectorSearch;
use docent_core::types::ContextChunk;
use docent_core::{Error, Result};

/// Vector search over the index sidecar's `/search` endpoint.
pub struct HttpVectorSearch {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    content: String,
    source_label: String,
    distance: f32,
}

impl HttpVectorSearch {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("search client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<ContextChunk>> {
        let url = format!("{}/search", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "query": query, "k": k }))
            .send()
            .await
            .map_err(|e| Error::retrieval_unavailable(format!("search request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::retrieval_unavailable(format!(
                "search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::retrieval_unavailable(format!("search response: {e}")))?;

        Ok(body
            .hits
            .into_iter()
            .map(|hit| ContextChunk {
                content: hit.content,
                source_label: hit.source_label,
                distance: hit.distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_response_parses() {
        let raw = r#"{
            "hits": [
                {"content": "Lemurs live in Madagascar.", "source_label": "Lemurs", "distance": 0.12}
            ]
        }"#;
        let parsed: SearchResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.hits.len(), 1);
        assert_eq!(parsed.hits[0].source_label, "Lemurs");
    }
}

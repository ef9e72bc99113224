//! OpenAI moderation API client.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use serde_json::json;

use docent_core::traits::{ModerationClient, ModerationVerdict};
use docent_core::{Error, Result};

/// Client for the `/moderations` endpoint.
pub struct OpenAiModeration {
    base_url: String,
    api_key: Secret<String>,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationEntry>,
}

#[derive(Deserialize)]
struct ModerationEntry {
    flagged: bool,
    #[serde(default)]
    categories: serde_json::Map<String, serde_json::Value>,
}

impl OpenAiModeration {
    pub fn new(base_url: impl Into<String>, api_key: Secret<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("moderation client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ModerationClient for OpenAiModeration {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        let url = format!("{}/moderations", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({ "input": text }))
            .send()
            .await
            .map_err(|e| Error::provider(format!("moderation request: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::provider(format!(
                "moderation returned {}",
                response.status()
            )));
        }

        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("moderation response: {e}")))?;

        let entry = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| Error::provider("moderation returned no results"))?;

        let categories = entry
            .categories
            .into_iter()
            .filter(|(_, hit)| hit.as_bool().unwrap_or(false))
            .map(|(name, _)| name)
            .collect();

        Ok(ModerationVerdict {
            flagged: entry.flagged,
            categories,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_parsing_collects_flagged_categories() {
        let raw = r#"{
            "results": [{
                "flagged": true,
                "categories": {"harassment": true, "violence": false, "hate": true}
            }]
        }"#;
        let parsed: ModerationResponse = serde_json::from_str(raw).unwrap();
        let entry = parsed.results.into_iter().next().unwrap();

        assert!(entry.flagged);
        let mut hits: Vec<String> = entry
            .categories
            .into_iter()
            .filter(|(_, hit)| hit.as_bool().unwrap_or(false))
            .map(|(name, _)| name)
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["harassment", "hate"]);
    }

    #[test]
    fn response_without_categories_field_parses() {
        let raw = r#"{"results": [{"flagged": false}]}"#;
        let parsed: ModerationResponse = serde_json::from_str(raw).unwrap();
        assert!(!parsed.results[0].flagged);
        assert!(parsed.results[0].categories.is_empty());
    }
}

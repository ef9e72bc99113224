//! Input/output safety checks.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use docent_core::traits::ModerationClient;

/// Which side of the pipeline a check applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// User text entering the pipeline: length, PII, then moderation.
    Input,
    /// Assembled answer leaving the pipeline: moderation only.
    Output,
}

/// Result of a safety check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Whether the content may pass.
    pub allowed: bool,
    /// Reason for rejection, if any.
    pub reason: Option<String>,
    /// Flagged category or PII names.
    pub categories: Vec<String>,
}

impl SafetyVerdict {
    /// Create a passing verdict.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            categories: Vec::new(),
        }
    }

    /// Create a rejecting verdict.
    pub fn reject(reason: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            categories,
        }
    }
}

/// PII scanner using compiled regex patterns.
pub struct PiiScanner {
    patterns: Vec<(&'static str, Regex)>,
}

impl PiiScanner {
    /// Create a scanner with the default patterns: email, phone, SSN,
    /// street address.
    pub fn new() -> Self {
        let patterns = vec![
            (
                "email",
                Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").unwrap(),
            ),
            ("phone", Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").unwrap()),
            ("ssn", Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap()),
            (
                "address",
                Regex::new(
                    r"(?i)\b\d+\s+[\w\s]+(?:street|st|avenue|ave|road|rd|drive|dr|lane|ln|way|court|ct|boulevard|blvd)\b",
                )
                .unwrap(),
            ),
        ];
        Self { patterns }
    }

    /// Names of PII patterns present in `text`.
    pub fn scan(&self, text: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|(_, regex)| regex.is_match(text))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

impl Default for PiiScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// The safety gate. Checks short-circuit on first failure; a rejection
/// tells the caller to substitute the configured safe fallback message.
pub struct SafetyGate {
    max_input_chars: usize,
    moderation: Arc<dyn ModerationClient>,
    pii: PiiScanner,
}

impl SafetyGate {
    pub fn new(max_input_chars: usize, moderation: Arc<dyn ModerationClient>) -> Self {
        Self {
            max_input_chars,
            moderation,
            pii: PiiScanner::new(),
        }
    }

    /// Run the checks for the given direction.
    pub async fn check(&self, text: &str, direction: Direction) -> SafetyVerdict {
        match direction {
            Direction::Input => self.check_input(text).await,
            Direction::Output => self.moderate(text).await,
        }
    }

    async fn check_input(&self, text: &str) -> SafetyVerdict {
        // 1. Length limit, before anything that costs a network call.
        if text.chars().count() > self.max_input_chars {
            tracing::info!(
                len = text.chars().count(),
                max = self.max_input_chars,
                "Input rejected: too long"
            );
            metrics::counter!("docent_safety_rejections_total", "check" => "length").increment(1);
            return SafetyVerdict::reject(
                format!(
                    "Message too long - please keep it under {} characters",
                    self.max_input_chars
                ),
                Vec::new(),
            );
        }

        // 2. PII patterns, fast and local.
        let found = self.pii.scan(text);
        if !found.is_empty() {
            tracing::warn!(patterns = ?found, "Input rejected: PII detected");
            metrics::counter!("docent_safety_rejections_total", "check" => "pii").increment(1);
            return SafetyVerdict::reject(
                "Personal information detected - please don't share personal details",
                found,
            );
        }

        // 3. Content-policy moderation.
        self.moderate(text).await
    }

    /// Moderation call shared by both directions. Fails open on transport
    /// errors: availability wins over blocking on a safety-infra outage.
    async fn moderate(&self, text: &str) -> SafetyVerdict {
        if text.trim().is_empty() {
            return SafetyVerdict::allow();
        }

        match self.moderation.moderate(text).await {
            Ok(verdict) if verdict.flagged => {
                tracing::warn!(categories = ?verdict.categories, "Content flagged by moderation");
                metrics::counter!("docent_safety_rejections_total", "check" => "moderation")
                    .increment(1);
                SafetyVerdict::reject("Content flagged by safety filter", verdict.categories)
            }
            Ok(_) => SafetyVerdict::allow(),
            Err(e) => {
                tracing::warn!(error = %e, "Moderation unavailable, failing open");
                metrics::counter!("docent_safety_moderation_failures_total").increment(1);
                SafetyVerdict::allow()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::mocks::MockModeration;

    fn gate_with(moderation: Arc<MockModeration>) -> SafetyGate {
        SafetyGate::new(500, moderation)
    }

    #[tokio::test]
    async fn over_length_input_rejected_before_moderation() {
        let moderation = Arc::new(MockModeration::allowing());
        let gate = gate_with(moderation.clone());

        let long = "a".repeat(501);
        let verdict = gate.check(&long, Direction::Input).await;

        assert!(!verdict.allowed);
        assert!(verdict.reason.unwrap().contains("too long"));
        // Length check short-circuits: the moderation API was never called.
        assert_eq!(moderation.calls(), 0);
    }

    #[tokio::test]
    async fn input_at_limit_passes() {
        let gate = gate_with(Arc::new(MockModeration::allowing()));
        let verdict = gate.check(&"a".repeat(500), Direction::Input).await;
        assert!(verdict.allowed);
    }

    #[tokio::test]
    async fn pii_patterns_rejected() {
        let moderation = Arc::new(MockModeration::allowing());
        let gate = gate_with(moderation.clone());

        let cases = [
            ("my email is kid@example.com", "email"),
            ("call me at 555-123-4567", "phone"),
            ("ssn 123-45-6789", "ssn"),
            ("I live at 42 Maple Street", "address"),
        ];
        for (text, expected) in cases {
            let verdict = gate.check(text, Direction::Input).await;
            assert!(!verdict.allowed, "should reject: {text}");
            assert!(verdict.categories.iter().any(|c| c == expected));
        }
        // PII checks short-circuit before moderation too.
        assert_eq!(moderation.calls(), 0);
    }

    #[tokio::test]
    async fn flagged_content_rejected() {
        let gate = gate_with(Arc::new(MockModeration::flagging(&["forbidden"])));
        let verdict = gate.check("something forbidden here", Direction::Input).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.categories, vec!["mock/policy"]);
    }

    #[tokio::test]
    async fn moderation_outage_fails_open() {
        let gate = gate_with(Arc::new(MockModeration::unavailable()));
        let verdict = gate.check("is a lemur a primate?", Direction::Input).await;
        assert!(verdict.allowed);
    }

    #[tokio::test]
    async fn output_direction_skips_length_and_pii() {
        let moderation = Arc::new(MockModeration::allowing());
        let gate = gate_with(moderation.clone());

        // Long and PII-bearing, but output only runs moderation.
        let mut output = "Contact zoo@example.com. ".repeat(40);
        output.push_str("Lemurs are great.");
        let verdict = gate.check(&output, Direction::Output).await;

        assert!(verdict.allowed);
        assert_eq!(moderation.calls(), 1);
    }

    #[tokio::test]
    async fn clean_input_passes_all_checks() {
        let moderation = Arc::new(MockModeration::allowing());
        let gate = gate_with(moderation.clone());

        let verdict = gate.check("Tell me about lemurs", Direction::Input).await;
        assert!(verdict.allowed);
        assert_eq!(moderation.calls(), 1);
    }
}

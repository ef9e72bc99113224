//! Follow-up question extraction.
//!
//! The system prompt asks the model to end its reply with a short
//! "Want to explore more?" section holding numbered follow-up questions.
//! This module strips that section from the reply and returns the
//! questions separately. When the model skips the section, the reply is
//! left untouched and no questions are offered; nothing is invented.

use std::sync::OnceLock;

use regex::Regex;

/// Maximum number of follow-up questions surfaced to the client.
const MAX_FOLLOWUPS: usize = 3;

fn section_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Heading line plus everything after it. Tolerates markdown bold
        // and a missing question mark.
        Regex::new(r"(?is)\n\s*(?:\*\*)?\s*want to explore more\??\s*(?:\*\*)?\s*:?\s*\n(.*)$")
            .expect("followup section regex")
    })
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+[.)]\s*(.+?)\s*$").expect("followup item regex"))
}

/// Split a reply into the spoken text and its follow-up questions.
///
/// Returns the reply with the follow-up section removed (trailing
/// whitespace trimmed) and at most [`MAX_FOLLOWUPS`] questions, verbatim.
pub fn extract_followups(reply: &str) -> (String, Vec<String>) {
    let Some(section) = section_regex().find(reply) else {
        return (reply.to_string(), Vec::new());
    };

    let tail = &reply[section.start()..];
    let questions: Vec<String> = item_regex()
        .captures_iter(tail)
        .take(MAX_FOLLOWUPS)
        .map(|cap| cap[1].trim_matches('*').trim().to_string())
        .filter(|q| !q.is_empty())
        .collect();

    if questions.is_empty() {
        // A heading with no numbered items is left in place; better an odd
        // trailing line than silently eating reply text.
        return (reply.to_string(), Vec::new());
    }

    let text = reply[..section.start()].trim_end().to_string();
    (text, questions)
}

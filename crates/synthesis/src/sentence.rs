//! Sentence segmentation and text cleanup for synthesis.

use std::sync::OnceLock;

use regex::Regex;

use docent_core::types::SentenceUnit;

/// Strip markdown decoration so the synthesizer does not read asterisks
/// aloud. Links keep their label, headings keep their text.
pub fn strip_markdown(text: &str) -> String {
    static LINK: OnceLock<Regex> = OnceLock::new();
    static STAR_EMPHASIS: OnceLock<Regex> = OnceLock::new();
    static UNDERSCORE_EMPHASIS: OnceLock<Regex> = OnceLock::new();
    static HEADING: OnceLock<Regex> = OnceLock::new();
    static CODE: OnceLock<Regex> = OnceLock::new();

    let link = LINK.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").expect("link regex"));
    let star_emphasis = STAR_EMPHASIS
        .get_or_init(|| Regex::new(r"\*{1,3}([^*]+)\*{1,3}").expect("star emphasis regex"));
    let underscore_emphasis = UNDERSCORE_EMPHASIS
        .get_or_init(|| Regex::new(r"_{1,3}([^_]+)_{1,3}").expect("underscore emphasis regex"));
    let heading = HEADING.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s*").expect("heading regex"));
    let code = CODE.get_or_init(|| Regex::new(r"`([^`]*)`").expect("code regex"));

    let text = link.replace_all(text, "$1");
    let text = star_emphasis.replace_all(&text, "$1");
    let text = underscore_emphasis.replace_all(&text, "$1");
    let text = heading.replace_all(&text, "");
    let text = code.replace_all(&text, "$1");
    text.into_owned()
}

/// Incremental sentence splitter.
///
/// Feed it text chunks as they stream in; it emits a [`SentenceUnit`] each
/// time a sentence boundary (`.`, `!` or `?` followed by whitespace)
/// completes, assigning strictly increasing sequence numbers. Call
/// [`flush`](Self::flush) once the stream ends to get the trailing
/// fragment.
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    buffer: String,
    next_sequence: u64,
}

impl SentenceSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns any sentences completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SentenceUnit> {
        self.buffer.push_str(chunk);

        let mut out = Vec::new();
        loop {
            let Some(split_at) = self.find_boundary() else {
                break;
            };
            let rest = self.buffer.split_off(split_at);
            let sentence = std::mem::replace(&mut self.buffer, rest);
            if let Some(unit) = self.emit(&sentence) {
                out.push(unit);
            }
        }
        out
    }

    /// Emit whatever remains in the buffer as a final sentence.
    pub fn flush(&mut self) -> Option<SentenceUnit> {
        let rest = std::mem::take(&mut self.buffer);
        self.emit(&rest)
    }

    /// Byte offset just past the first complete sentence, if one exists.
    /// A terminator at the very end of the buffer is not a boundary yet;
    /// the next chunk may continue the token (e.g. "3.14").
    fn find_boundary(&self) -> Option<usize> {
        let mut chars = self.buffer.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if matches!(c, '.' | '!' | '?') {
                if let Some(&(_, next)) = chars.peek() {
                    if next.is_whitespace() {
                        return Some(i + c.len_utf8());
                    }
                }
            }
        }
        None
    }

    fn emit(&mut self, raw: &str) -> Option<SentenceUnit> {
        let text = raw.trim();
        if text.is_empty() || text.chars().all(|c| c.is_ascii_punctuation()) {
            return None;
        }
        let unit = SentenceUnit {
            sequence: self.next_sequence,
            text: text.to_string(),
        };
        self.next_sequence += 1;
        Some(unit)
    }
}

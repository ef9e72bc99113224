//! Sequence reordering for concurrently synthesized sentences.

use std::collections::BTreeMap;

use bytes::Bytes;

/// Buffers out-of-order synthesis completions and releases audio in
/// strictly ascending sequence order.
///
/// A failed sentence is recorded as `None` and skipped when its turn
/// comes, so one bad sentence never stalls the sentences behind it.
#[derive(Debug, Default)]
pub struct ReorderBuffer {
    next: u64,
    pending: BTreeMap<u64, Option<Bytes>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completion for `sequence` (`None` means the sentence
    /// failed on every tier). Returns the audio now releasable, in
    /// ascending sequence order.
    pub fn complete(&mut self, sequence: u64, audio: Option<Bytes>) -> Vec<(u64, Bytes)> {
        self.pending.insert(sequence, audio);

        let mut released = Vec::new();
        while let Some(audio) = self.pending.remove(&self.next) {
            if let Some(bytes) = audio {
                released.push((self.next, bytes));
            }
            self.next += 1;
        }
        released
    }

    /// Number of completions held back waiting for an earlier sequence.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

//! Knowledge-base retrieval for Docent.
//!
//! Wraps a vector index behind [`docent_core::traits::VectorSearch`] and
//! turns raw hits into a ranked, labelled context block for the
//! generation prompt. Retrieval failures degrade to an empty result so
//! the conversation continues without grounding.

mod retriever;
mod search_client;

pub use retriever::Retriever;
pub use search_client::HttpVectorSearch;

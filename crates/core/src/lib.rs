//! Core types, traits, and error definitions for Docent.
//!
//! This crate provides the foundational building blocks shared across all
//! layers of the assistant pipeline: the error taxonomy, the request data
//! model, the collaborator traits (generation, synthesis, moderation,
//! vector search), static and hot-reloadable configuration, and mock
//! implementations for testing.

pub mod config;
pub mod error;
pub mod mocks;
pub mod snapshot;
pub mod telemetry;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use snapshot::{ConfigSnapshot, ConfigStore};
pub use traits::*;
pub use types::*;

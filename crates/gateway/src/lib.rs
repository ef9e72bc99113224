//! HTTP/WebSocket gateway for Docent.
//!
//! Exposes the chat pipeline over a JSON endpoint, a Server-Sent Events
//! stream, and a WebSocket synthesis endpoint, plus health and optional
//! Prometheus metrics.

mod pipeline;
mod server;
mod ws;

pub use pipeline::{ChatAnswer, ChatPipeline, ChatRequest};
pub use server::{build_router, run, AppState, GatewaySettings};

//! OpenRouter integration for gofr-iq.
//!
//! OpenRouter exposes an OpenAI-compatible surface; this crate speaks the
//! two endpoints the core needs — chat completions (JSON mode) and batch
//! embeddings — with exponential-backoff retries that honour
//! `Retry-After` on 429.
//!
//! [`ExtractionService`] sits on top of the chat endpoint and turns raw
//! news text into structured impact, event, instrument and theme data.

pub mod client;
pub mod extraction;

pub use client::{ChatCompletion, ChatMessage, EmbeddingBatch, OpenRouterClient};
pub use extraction::{ChatClient, ExtractionService};

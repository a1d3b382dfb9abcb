//! # lore-inference
//!
//! AI provider implementations for the lorekeeper enrichment pipeline.
//!
//! Two providers implement [`lore_core::AiProvider`]:
//!
//! - [`OpenAiProvider`]: calls any OpenAI-compatible chat-completions
//!   endpoint.
//! - [`HeuristicProvider`]: deterministic keyword heuristics, used in tests
//!   and offline environments.

pub mod heuristic;
pub mod openai;

pub use heuristic::HeuristicProvider;
pub use openai::{OpenAiConfig, OpenAiProvider};

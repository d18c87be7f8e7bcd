//! Language-model provider implementations for stepwise.
//!
//! All providers implement the `stepwise_core::Provider` trait.

pub mod openai_compat;
pub mod router;

pub use openai_compat::{OpenAiCompatProvider, SseDecoder};
pub use router::build_from_config;

//! Streaming completion clients for Themis.
//!
//! Currently one implementation: any OpenAI-compatible `/v1/chat/completions`
//! endpoint, which covers OpenRouter, OpenAI, Ollama, vLLM, and most other
//! hosted services.

mod openai_compat;

pub use openai_compat::OpenAiCompatClient;

//! proctor-providers: Advisory essay graders.
//!
//! Implements the `EssayGrader` trait for Anthropic, OpenAI and Ollama, plus
//! a deterministic mock, and loads grader configuration from `proctor.toml`.

pub mod anthropic;
pub mod config;
mod http;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{create_grader, load_config, GraderConfig, ProctorConfig};
pub use proctor_core::error::ProviderError;

//! medrbench-providers: LLM provider integrations.
//!
//! Implements `TextCompletionProvider` for OpenAI-compatible endpoints and
//! Ollama, and loads the `medrbench.toml` configuration that wires a model
//! under test and a judge to them.

pub mod config;
pub mod error;
pub mod mock;
pub mod ollama;
pub mod openai;

pub use config::{
    create_judge, create_named_provider, create_provider, load_config, load_config_from,
    MedrbenchConfig, ProviderConfig,
};
pub use error::ProviderError;

//! LLM Provider implementations for Tandem.
//!
//! All providers implement the `tandem_core::Provider` trait.
//! The router binds each agent to a backend based on configuration.

pub mod openai_compat;
pub mod retry;
pub mod router;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::{RetryPolicy, RetryingProvider};
pub use router::{ModelBinding, ProviderRouter, build_from_config};

//! # Tandem Core
//!
//! Domain types, traits, and error definitions for the Tandem multi-agent
//! workflow. This crate has **no framework dependencies**: it defines the
//! domain model that the other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator at a seam is a trait here (model backend, action,
//! retriever, code executor). Implementations live in their own crates, so
//! the orchestrator can be exercised with scripted stand-ins.

pub mod action;
pub mod agent;
pub mod chat;
pub mod error;
pub mod event;
pub mod execution;
pub mod message;
pub mod provider;
pub mod retrieval;

// Re-export key types at crate root for ergonomics
pub use action::{Action, ActionKind, ActionRequest};
pub use agent::{AgentProfile, AgentRole, HumanInputMode, LlmSettings, TerminationPolicy};
pub use chat::{ActionCall, ActionResultRef, AgentId, ChatMessage, Conversation, ConversationId};
pub use error::{ActionError, ChatError, ExecutionError, ProviderError, RetrievalError};
pub use event::{DomainEvent, EventBus};
pub use execution::{CodeBlock, CodeExecutor, ExecutionReport};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use retrieval::{Passage, Retriever};

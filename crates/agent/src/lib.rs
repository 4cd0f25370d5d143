//! Conversable agents and the chat loop that connects them.
//!
//! A run is a chat between two [`ConversableAgent`]s driven by a
//! [`ChatOrchestrator`]:
//!
//! 1. **Open** the chat with the initiator's message
//! 2. **Reply policy**: the receiver checks termination, its auto-reply
//!    budget and, depending on its mode, asks a human
//! 3. **Auto-reply**: dispatch an action call, execute code, ask the model,
//!    or fall back to the default reply
//! 4. **Alternate** until one side terminates
//!
//! Actions (`ask_planner`, `retrieve_content`) may open nested chats of
//! their own; those never share history with the outer one.

pub mod actions;
pub mod compose;
pub mod conversable;
pub mod dispatcher;
pub mod human;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval_proxy;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use actions::{AskPlannerAction, RetrieveContentAction};
pub use compose::{Workforce, compose};
pub use conversable::{ConversableAgent, ReplyDecision, TerminationReason};
pub use dispatcher::ActionDispatcher;
pub use human::{HumanInput, NoHumanInput, StdinHumanInput};
pub use orchestrator::{ChatOrchestrator, ChatOutcome};
pub use prompts::RetrievalTask;
pub use retrieval_proxy::{ContextUpdatePolicy, RetrievalProxy};

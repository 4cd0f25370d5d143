//! `ask_planner` — a nested chat between the planner proxy and the planner.

use std::sync::Arc;

use async_trait::async_trait;
use tandem_core::action::{Action, ActionKind, ActionRequest};
use tandem_core::error::ActionError;
use tandem_core::event::EventBus;
use tracing::info;

use crate::conversable::ConversableAgent;
use crate::orchestrator::ChatOrchestrator;

/// Relays a question to the planner and returns its answer.
///
/// Every invocation runs in a fresh orchestrator, so the planner never sees
/// the conversation of whoever asked.
pub struct AskPlannerAction {
    planner_proxy: Arc<ConversableAgent>,
    planner: Arc<ConversableAgent>,
    event_bus: Option<Arc<EventBus>>,
}

impl AskPlannerAction {
    pub fn new(planner_proxy: Arc<ConversableAgent>, planner: Arc<ConversableAgent>) -> Self {
        Self {
            planner_proxy,
            planner,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    async fn ask(&self, message: String) -> Result<String, ActionError> {
        let failed = |reason: String| ActionError::ExecutionFailed {
            action: ActionKind::AskPlanner.name().into(),
            reason,
        };

        let mut orchestrator = ChatOrchestrator::new();
        if let Some(bus) = &self.event_bus {
            orchestrator = orchestrator.with_event_bus(bus.clone());
        }

        let outcome = orchestrator
            .initiate_chat(&self.planner_proxy, &self.planner, message, true)
            .await
            .map_err(|e| failed(e.to_string()))?;

        info!(
            planner = %self.planner.name(),
            messages = outcome.conversation.messages.len(),
            "Planner answered"
        );

        if outcome.final_message.trim().is_empty() {
            return Err(failed("planner returned an empty reply".into()));
        }
        Ok(outcome.final_message)
    }
}

#[async_trait]
impl Action for AskPlannerAction {
    fn kind(&self) -> ActionKind {
        ActionKind::AskPlanner
    }

    async fn invoke(&self, request: ActionRequest) -> Result<String, ActionError> {
        match request {
            ActionRequest::AskPlanner { message } => self.ask(message).await,
            other => Err(ActionError::InvalidArguments {
                action: ActionKind::AskPlanner.name().into(),
                reason: format!("unexpected payload for {}", other.kind()),
            }),
        }
    }
}

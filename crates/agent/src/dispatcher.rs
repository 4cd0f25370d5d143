//! Action dispatcher — routes action calls to their bound implementations.
//!
//! Names coming from a model are resolved to an [`ActionKind`], the JSON
//! arguments are parsed into a typed [`ActionRequest`], and the bound
//! [`Action`] is invoked. Failures are never fatal: [`ActionDispatcher::dispatch`]
//! renders them as `Error: ...` text for the conversation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tandem_core::action::{Action, ActionKind, ActionRequest};
use tandem_core::chat::ActionCall;
use tandem_core::error::ActionError;
use tandem_core::event::{DomainEvent, EventBus};
use tandem_core::provider::ToolDefinition;
use tracing::{debug, warn};

/// Maps action kinds to their implementations.
#[derive(Default, Clone)]
pub struct ActionDispatcher {
    actions: HashMap<ActionKind, Arc<dyn Action>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Bind an action. A later binding of the same kind replaces the earlier one.
    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.kind(), action);
    }

    pub fn is_bound(&self, kind: ActionKind) -> bool {
        self.actions.contains_key(&kind)
    }

    /// Bound kinds in declaration order.
    pub fn kinds(&self) -> Vec<ActionKind> {
        ActionKind::ALL
            .into_iter()
            .filter(|k| self.actions.contains_key(k))
            .collect()
    }

    /// Function definitions of every bound action.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.kinds().iter().map(|k| k.definition()).collect()
    }

    /// Resolve, parse and invoke an action.
    pub async fn try_dispatch(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<String, ActionError> {
        let kind =
            ActionKind::from_name(name).ok_or_else(|| ActionError::UnknownAction(name.into()))?;
        let action = self
            .actions
            .get(&kind)
            .ok_or_else(|| ActionError::UnknownAction(name.into()))?;
        let request = ActionRequest::parse(kind, arguments)?;

        debug!(action = name, "Dispatching action");
        action.invoke(request).await
    }

    /// Like [`try_dispatch`](Self::try_dispatch), with errors rendered as text.
    pub async fn dispatch(&self, name: &str, arguments: &serde_json::Value) -> String {
        let start = Instant::now();
        let result = self.try_dispatch(name, arguments).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ActionDispatched {
                action: name.to_string(),
                success: result.is_ok(),
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        match result {
            Ok(text) => text,
            Err(e) => {
                warn!(action = name, error = %e, "Action failed");
                format!("Error: {e}")
            }
        }
    }

    /// Dispatch a model-emitted call whose arguments are a JSON string.
    pub async fn dispatch_call(&self, call: &ActionCall) -> String {
        let arguments = if call.arguments.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.arguments) {
                Ok(v) => v,
                Err(e) => {
                    let err = ActionError::InvalidArguments {
                        action: call.name.clone(),
                        reason: format!("arguments are not valid JSON: {e}"),
                    };
                    warn!(action = %call.name, error = %err, "Action failed");
                    return format!("Error: {err}");
                }
            }
        };
        self.dispatch(&call.name, &arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct EchoPlanner;

    #[async_trait]
    impl Action for EchoPlanner {
        fn kind(&self) -> ActionKind {
            ActionKind::AskPlanner
        }

        async fn invoke(&self, request: ActionRequest) -> Result<String, ActionError> {
            match request {
                ActionRequest::AskPlanner { message } => Ok(format!("plan for: {message}")),
                other => Err(ActionError::InvalidArguments {
                    action: "ask_planner".into(),
                    reason: format!("unexpected request {other:?}"),
                }),
            }
        }
    }

    struct BrokenRetriever;

    #[async_trait]
    impl Action for BrokenRetriever {
        fn kind(&self) -> ActionKind {
            ActionKind::RetrieveContent
        }

        async fn invoke(&self, _request: ActionRequest) -> Result<String, ActionError> {
            Err(ActionError::ExecutionFailed {
                action: "retrieve_content".into(),
                reason: "corpus unavailable".into(),
            })
        }
    }

    fn dispatcher() -> ActionDispatcher {
        let mut d = ActionDispatcher::new();
        d.register(Arc::new(EchoPlanner));
        d
    }

    #[tokio::test]
    async fn dispatches_bound_action() {
        let out = dispatcher()
            .dispatch("ask_planner", &serde_json::json!({"message": "how?"}))
            .await;
        assert_eq!(out, "plan for: how?");
    }

    #[tokio::test]
    async fn unknown_name_is_typed_error() {
        let err = dispatcher()
            .try_dispatch("summon_dragon", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(name) if name == "summon_dragon"));
    }

    #[tokio::test]
    async fn known_but_unbound_kind_is_unknown() {
        let err = dispatcher()
            .try_dispatch("retrieve_content", &serde_json::json!({"message": "x"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(_)));
    }

    #[tokio::test]
    async fn invalid_arguments_rendered_as_error_text() {
        let out = dispatcher()
            .dispatch("ask_planner", &serde_json::json!({"question": "wrong key"}))
            .await;
        assert!(out.starts_with("Error: Invalid arguments for ask_planner"));
    }

    #[tokio::test]
    async fn failing_action_becomes_error_text() {
        let mut d = dispatcher();
        d.register(Arc::new(BrokenRetriever));
        let out = d
            .dispatch("retrieve_content", &serde_json::json!({"message": "x"}))
            .await;
        assert_eq!(out, "Error: Action retrieve_content failed: corpus unavailable");
    }

    #[tokio::test]
    async fn malformed_json_string_arguments() {
        let call = ActionCall {
            id: "call_1".into(),
            name: "ask_planner".into(),
            arguments: "{not json".into(),
        };
        let out = dispatcher().dispatch_call(&call).await;
        assert!(out.starts_with("Error: Invalid arguments for ask_planner"));
    }

    #[tokio::test]
    async fn dispatch_publishes_event() {
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let d = dispatcher().with_event_bus(bus);

        d.dispatch("nope", &serde_json::json!({})).await;

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::ActionDispatched { action, success, .. } => {
                assert_eq!(action, "nope");
                assert!(!success);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn definitions_follow_bindings() {
        let defs = dispatcher().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "ask_planner");
    }
}

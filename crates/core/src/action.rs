//! Actions — named capabilities a model may invoke mid-conversation.
//!
//! The set of actions is closed: [`ActionKind`] names them and
//! [`ActionRequest`] carries the typed payload of each. Free-form names coming
//! back from a model are resolved through [`ActionKind::from_name`]; anything
//! else is an unknown action.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;
use crate::provider::ToolDefinition;

/// Default number of passages `retrieve_content` asks for.
pub const DEFAULT_N_RESULTS: usize = 3;

/// Largest `n_results` a `retrieve_content` call may ask for.
pub const MAX_N_RESULTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AskPlanner,
    RetrieveContent,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::AskPlanner, ActionKind::RetrieveContent];

    /// Wire name exposed to the model.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AskPlanner => "ask_planner",
            Self::RetrieveContent => "retrieve_content",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// The function definition declared to the model backend.
    pub fn definition(&self) -> ToolDefinition {
        match self {
            Self::AskPlanner => ToolDefinition {
                name: self.name().into(),
                description: "ask planner to: 1. get a plan for finishing a task, \
                              2. verify the execution result of the plan and potentially suggest new plan."
                    .into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "question to ask planner. Make sure the question include enough context, \
                                            such as the code and the execution result. The planner does not know the \
                                            conversation between you and the user, unless you share the conversation \
                                            with the planner."
                        }
                    },
                    "required": ["message"]
                }),
            },
            Self::RetrieveContent => ToolDefinition {
                name: self.name().into(),
                description: "retrieve content for code generation and question answering.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "message": {
                            "type": "string",
                            "description": "Refined message which keeps the original meaning and can be used to \
                                            retrieve content for code generation and question answering."
                        },
                        "n_results": {
                            "type": "integer",
                            "description": "Number of passages to retrieve (default 3, at most 100)",
                            "minimum": 1,
                            "maximum": MAX_N_RESULTS
                        }
                    },
                    "required": ["message"]
                }),
            },
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Typed payload of an action invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    AskPlanner { message: String },
    RetrieveContent { message: String, n_results: usize },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::AskPlanner { .. } => ActionKind::AskPlanner,
            Self::RetrieveContent { .. } => ActionKind::RetrieveContent,
        }
    }

    /// Build the typed payload for `kind` from a JSON argument object.
    pub fn parse(kind: ActionKind, args: &serde_json::Value) -> Result<Self, ActionError> {
        let invalid = |reason: &str| ActionError::InvalidArguments {
            action: kind.name().into(),
            reason: reason.into(),
        };

        let message = args["message"]
            .as_str()
            .ok_or_else(|| invalid("missing 'message' argument"))?
            .to_string();

        match kind {
            ActionKind::AskPlanner => Ok(Self::AskPlanner { message }),
            ActionKind::RetrieveContent => {
                let n_results = match &args["n_results"] {
                    serde_json::Value::Null => DEFAULT_N_RESULTS,
                    v => v
                        .as_u64()
                        .filter(|n| (1..=MAX_N_RESULTS as u64).contains(n))
                        .ok_or_else(|| {
                            invalid(&format!(
                                "'n_results' must be an integer between 1 and {MAX_N_RESULTS}"
                            ))
                        })? as usize,
                };
                Ok(Self::RetrieveContent { message, n_results })
            }
        }
    }
}

/// A local callable bound to one [`ActionKind`].
///
/// The returned text is appended to the conversation as the action result.
#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> ActionKind;

    async fn invoke(&self, request: ActionRequest) -> Result<String, ActionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_lookup() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("python"), None);
    }

    #[test]
    fn definitions_mark_message_required() {
        for kind in ActionKind::ALL {
            let def = kind.definition();
            assert_eq!(def.name, kind.name());
            assert_eq!(def.parameters["required"][0], "message");
        }
    }

    #[test]
    fn parse_retrieve_defaults_to_three_results() {
        let req = ActionRequest::parse(
            ActionKind::RetrieveContent,
            &serde_json::json!({"message": "autogen install"}),
        )
        .unwrap();
        assert_eq!(
            req,
            ActionRequest::RetrieveContent {
                message: "autogen install".into(),
                n_results: 3
            }
        );
    }

    #[test]
    fn parse_rejects_missing_message() {
        let err = ActionRequest::parse(ActionKind::AskPlanner, &serde_json::json!({})).unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments { .. }));
    }

    #[test]
    fn parse_rejects_zero_results() {
        let err = ActionRequest::parse(
            ActionKind::RetrieveContent,
            &serde_json::json!({"message": "x", "n_results": 0}),
        )
        .unwrap_err();
        assert!(err.to_string().contains("n_results"));
    }

    #[test]
    fn parse_rejects_oversized_results() {
        let err = ActionRequest::parse(
            ActionKind::RetrieveContent,
            &serde_json::json!({"message": "x", "n_results": 9223372036854775807u64}),
        )
        .unwrap_err();
        assert!(matches!(err, ActionError::InvalidArguments { .. }));

        let req = ActionRequest::parse(
            ActionKind::RetrieveContent,
            &serde_json::json!({"message": "x", "n_results": MAX_N_RESULTS}),
        )
        .unwrap();
        assert!(matches!(req, ActionRequest::RetrieveContent { n_results: 100, .. }));
    }
}

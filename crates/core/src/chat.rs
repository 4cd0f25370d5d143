//! Chat domain types: agent identities, chat messages and conversations.
//!
//! A [`Conversation`] is the two-party record kept by the orchestrator. Every
//! agent sees it from its own side: what it sent is `assistant`, what it
//! received is `user`, and results of its own action calls are `tool`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Message, MessageToolCall, Role};

/// Unique name of an agent within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A structured action invocation requested by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCall {
    /// Call ID, echoed back by the result
    pub id: String,

    /// Action name as emitted by the model
    pub name: String,

    /// Arguments as a JSON string
    pub arguments: String,
}

impl From<MessageToolCall> for ActionCall {
    fn from(tc: MessageToolCall) -> Self {
        Self {
            id: tc.id,
            name: tc.name,
            arguments: tc.arguments,
        }
    }
}

impl From<&ActionCall> for MessageToolCall {
    fn from(call: &ActionCall) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

/// Marks a message as the result of an earlier [`ActionCall`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResultRef {
    pub call_id: String,
    pub name: String,
}

/// One message exchanged between two agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender: AgentId,
    pub recipient: AgentId,

    /// Text content (may be empty when the message is only an action call)
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_call: Option<ActionCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_result: Option<ActionResultRef>,

    /// The turn that produced this message failed; content holds the error text
    #[serde(default)]
    pub failed: bool,

    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A plain text message.
    pub fn text(sender: &AgentId, recipient: &AgentId, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender: sender.clone(),
            recipient: recipient.clone(),
            content: content.into(),
            action_call: None,
            action_result: None,
            failed: false,
            timestamp: Utc::now(),
        }
    }

    /// A message carrying an action call (and optional accompanying text).
    pub fn action_call(
        sender: &AgentId,
        recipient: &AgentId,
        content: impl Into<String>,
        call: ActionCall,
    ) -> Self {
        let mut msg = Self::text(sender, recipient, content);
        msg.action_call = Some(call);
        msg
    }

    /// The result of an action call, sent back to the caller.
    pub fn action_result(
        sender: &AgentId,
        recipient: &AgentId,
        call: &ActionCall,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::text(sender, recipient, content);
        msg.action_result = Some(ActionResultRef {
            call_id: call.id.clone(),
            name: call.name.clone(),
        });
        msg
    }

    /// A turn that could not produce a reply.
    pub fn failure(sender: &AgentId, recipient: &AgentId, error: impl std::fmt::Display) -> Self {
        let mut msg = Self::text(sender, recipient, format!("Error: {error}"));
        msg.failed = true;
        msg
    }
}

/// A bounded, two-party, turn-ordered exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub initiator: AgentId,
    pub responder: AgentId,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new(initiator: AgentId, responder: AgentId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            initiator,
            responder,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: ChatMessage) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages `agent` has sent.
    pub fn turns_of(&self, agent: &AgentId) -> usize {
        self.messages.iter().filter(|m| &m.sender == agent).count()
    }

    /// The other party of this conversation.
    pub fn counterpart(&self, agent: &AgentId) -> &AgentId {
        if agent == &self.initiator {
            &self.responder
        } else {
            &self.initiator
        }
    }
}

/// Project a chat history into model messages from `agent`'s point of view.
///
/// Results of `agent`'s own action calls become `tool` messages; action calls
/// made by the counterpart are rendered as text so the model can read them.
pub fn to_model_messages(agent: &AgentId, history: &[ChatMessage]) -> Vec<Message> {
    let own_calls: HashSet<&str> = history
        .iter()
        .filter(|m| &m.sender == agent)
        .filter_map(|m| m.action_call.as_ref().map(|c| c.id.as_str()))
        .collect();

    history
        .iter()
        .map(|m| {
            if &m.sender == agent {
                let mut msg = Message::assistant(&m.content);
                if let Some(call) = &m.action_call {
                    msg.tool_calls.push(call.into());
                }
                return msg;
            }

            match (&m.action_result, &m.action_call) {
                (Some(result), _) if own_calls.contains(result.call_id.as_str()) => {
                    Message::tool_result(&result.call_id, &m.content)
                }
                (_, Some(call)) => {
                    let rendered = format!(
                        "***** Suggested action call: {}({}) *****",
                        call.name, call.arguments
                    );
                    if m.content.is_empty() {
                        Message::user(rendered)
                    } else {
                        Message::user(format!("{}\n{rendered}", m.content))
                    }
                }
                _ => Message::user(&m.content),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (AgentId, AgentId) {
        (AgentId::from("user_proxy"), AgentId::from("assistant"))
    }

    #[test]
    fn conversation_tracks_updates() {
        let (proxy, assistant) = ids();
        let mut conv = Conversation::new(proxy.clone(), assistant.clone());
        let created = conv.created_at;

        conv.push(ChatMessage::text(&proxy, &assistant, "First message"));
        assert_eq!(conv.messages.len(), 1);
        assert!(conv.updated_at >= created);
        assert_eq!(conv.turns_of(&proxy), 1);
        assert_eq!(conv.turns_of(&assistant), 0);
        assert_eq!(conv.counterpart(&proxy), &assistant);
    }

    #[test]
    fn projection_flips_roles_per_agent() {
        let (proxy, assistant) = ids();
        let history = vec![
            ChatMessage::text(&proxy, &assistant, "write a script"),
            ChatMessage::text(&assistant, &proxy, "```python\nprint(1)\n```"),
        ];

        let for_assistant = to_model_messages(&assistant, &history);
        assert_eq!(for_assistant[0].role, Role::User);
        assert_eq!(for_assistant[1].role, Role::Assistant);

        let for_proxy = to_model_messages(&proxy, &history);
        assert_eq!(for_proxy[0].role, Role::Assistant);
        assert_eq!(for_proxy[1].role, Role::User);
    }

    #[test]
    fn own_action_results_become_tool_messages() {
        let (proxy, assistant) = ids();
        let call = ActionCall {
            id: "call_1".into(),
            name: "ask_planner".into(),
            arguments: r#"{"message":"plan?"}"#.into(),
        };
        let history = vec![
            ChatMessage::text(&proxy, &assistant, "task"),
            ChatMessage::action_call(&assistant, &proxy, "", call.clone()),
            ChatMessage::action_result(&proxy, &assistant, &call, "1. do it"),
        ];

        let for_assistant = to_model_messages(&assistant, &history);
        assert_eq!(for_assistant[1].tool_calls.len(), 1);
        assert_eq!(for_assistant[2].role, Role::Tool);
        assert_eq!(for_assistant[2].tool_call_id.as_deref(), Some("call_1"));

        // The proxy sees the call as readable text, not a dangling tool call.
        let for_proxy = to_model_messages(&proxy, &history);
        assert_eq!(for_proxy[1].role, Role::User);
        assert!(for_proxy[1].content.contains("ask_planner"));
        assert_eq!(for_proxy[2].role, Role::Assistant);
    }

    #[test]
    fn failure_message_is_flagged() {
        let (proxy, assistant) = ids();
        let msg = ChatMessage::failure(&assistant, &proxy, "backend down");
        assert!(msg.failed);
        assert_eq!(msg.content, "Error: backend down");
    }
}

//! Agent identity, roles and reply-policy settings.

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::chat::AgentId;

/// Default termination token.
pub const TERMINATE: &str = "TERMINATE";

/// Default auto-reply budget for agents that don't configure one.
pub const DEFAULT_MAX_CONSECUTIVE_AUTO_REPLY: u32 = 100;

/// The fixed set of roles in the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    PlannerProxy,
    RetrievalProxy,
    Assistant,
    UserProxy,
}

/// When a human is consulted before an agent replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HumanInputMode {
    /// Every turn
    Always,
    /// Only when the chat would otherwise terminate
    Terminate,
    /// Never; terminate directly
    #[default]
    Never,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMatch {
    /// Content must equal the token
    #[default]
    Exact,
    /// Content must end with the token (trailing whitespace ignored)
    Suffix,
}

/// Decides whether a received message ends the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminationPolicy {
    #[serde(default = "default_token")]
    pub token: String,

    #[serde(default, rename = "match")]
    pub match_mode: TerminationMatch,
}

fn default_token() -> String {
    TERMINATE.into()
}

impl Default for TerminationPolicy {
    fn default() -> Self {
        Self {
            token: default_token(),
            match_mode: TerminationMatch::Exact,
        }
    }
}

impl TerminationPolicy {
    pub fn is_termination(&self, content: &str) -> bool {
        match self.match_mode {
            TerminationMatch::Exact => content == self.token,
            TerminationMatch::Suffix => content.trim_end().ends_with(&self.token),
        }
    }
}

/// Request-level model settings for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
}

impl LlmSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: None,
            seed: None,
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// Everything that identifies an agent and shapes its replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: AgentId,
    pub role: AgentRole,

    #[serde(default)]
    pub system_message: String,

    /// Consecutive auto-replies allowed before the reply policy kicks in
    pub max_consecutive_auto_reply: u32,

    #[serde(default)]
    pub human_input_mode: HumanInputMode,

    #[serde(default)]
    pub termination: TerminationPolicy,

    /// Sent when no other reply source produced anything
    #[serde(default)]
    pub default_auto_reply: String,

    /// Actions declared to this agent's model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSettings>,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            name: AgentId(name.into()),
            role,
            system_message: String::new(),
            max_consecutive_auto_reply: DEFAULT_MAX_CONSECUTIVE_AUTO_REPLY,
            human_input_mode: HumanInputMode::Never,
            termination: TerminationPolicy::default(),
            default_auto_reply: String::new(),
            actions: Vec::new(),
            llm: None,
        }
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = message.into();
        self
    }

    pub fn with_max_consecutive_auto_reply(mut self, max: u32) -> Self {
        self.max_consecutive_auto_reply = max;
        self
    }

    pub fn with_human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.human_input_mode = mode;
        self
    }

    pub fn with_llm(mut self, llm: LlmSettings) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_actions(mut self, actions: Vec<ActionKind>) -> Self {
        self.actions = actions;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_termination_requires_whole_message() {
        let policy = TerminationPolicy::default();
        assert!(policy.is_termination("TERMINATE"));
        assert!(!policy.is_termination("Done. TERMINATE"));
        assert!(!policy.is_termination("terminate"));
    }

    #[test]
    fn suffix_termination_accepts_trailing_token() {
        let policy = TerminationPolicy {
            token: TERMINATE.into(),
            match_mode: TerminationMatch::Suffix,
        };
        assert!(policy.is_termination("All done.\nTERMINATE\n"));
        assert!(!policy.is_termination("TERMINATE? not yet"));
    }

    #[test]
    fn human_input_mode_defaults_to_never() {
        assert_eq!(HumanInputMode::default(), HumanInputMode::Never);
        let mode: HumanInputMode = serde_json::from_str("\"terminate\"").unwrap();
        assert_eq!(mode, HumanInputMode::Terminate);
    }

    #[test]
    fn profile_builder_defaults() {
        let profile = AgentProfile::new("planner", AgentRole::Planner);
        assert_eq!(profile.max_consecutive_auto_reply, DEFAULT_MAX_CONSECUTIVE_AUTO_REPLY);
        assert!(profile.llm.is_none());
        assert!(profile.actions.is_empty());
    }
}

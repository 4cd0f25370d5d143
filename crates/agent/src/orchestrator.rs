//! Chat orchestrator — runs a two-party conversation turn by turn.
//!
//! The initiator's message opens the chat; after that the two agents reply
//! to each other until one of them decides to terminate. The orchestrator
//! keeps one conversation per agent pair so a later chat can continue where
//! the previous one stopped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tandem_core::chat::{AgentId, ChatMessage, Conversation};
use tandem_core::error::ChatError;
use tandem_core::event::{DomainEvent, EventBus};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::conversable::{ConversableAgent, ReplyDecision, TerminationReason};

/// Result of a finished chat.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub conversation: Conversation,

    /// Content of the last message exchanged
    pub final_message: String,

    pub termination: TerminationReason,

    /// Automatic replies sent by each agent during this chat
    pub auto_replies: HashMap<AgentId, u32>,
}

impl ChatOutcome {
    pub fn auto_replies_of(&self, agent: &AgentId) -> u32 {
        self.auto_replies.get(agent).copied().unwrap_or(0)
    }
}

struct Session {
    conversation: Conversation,
    counters: HashMap<AgentId, u32>,
}

impl Session {
    fn new(initiator: &AgentId, responder: &AgentId) -> Self {
        Self {
            conversation: Conversation::new(initiator.clone(), responder.clone()),
            counters: HashMap::new(),
        }
    }
}

/// Runs chats and remembers their history per agent pair.
#[derive(Default)]
pub struct ChatOrchestrator {
    sessions: Mutex<HashMap<(AgentId, AgentId), Session>>,
    event_bus: Option<Arc<EventBus>>,
}

impl ChatOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// The stored conversation between two agents, if any.
    pub async fn conversation(&self, a: &AgentId, b: &AgentId) -> Option<Conversation> {
        self.sessions
            .lock()
            .await
            .get(&pair_key(a, b))
            .map(|s| s.conversation.clone())
    }

    /// Open a chat from `initiator` to `responder` with `message` and run it
    /// until one side terminates.
    ///
    /// With `clear_history` false, the pair's earlier conversation is
    /// continued. Auto-reply counters always start from zero.
    pub async fn initiate_chat(
        &self,
        initiator: &ConversableAgent,
        responder: &ConversableAgent,
        message: impl Into<String>,
        clear_history: bool,
    ) -> Result<ChatOutcome, ChatError> {
        if initiator.name() == responder.name() {
            return Err(ChatError::SelfChat(initiator.name().to_string()));
        }

        let key = pair_key(initiator.name(), responder.name());
        let mut session = {
            let mut sessions = self.sessions.lock().await;
            match sessions.remove(&key) {
                Some(session) if !clear_history => session,
                _ => Session::new(initiator.name(), responder.name()),
            }
        };
        session.counters.clear();

        let result = self.run(&mut session, initiator, responder, message.into()).await;
        self.sessions.lock().await.insert(key, session);
        result
    }

    async fn run(
        &self,
        session: &mut Session,
        initiator: &ConversableAgent,
        responder: &ConversableAgent,
        message: String,
    ) -> Result<ChatOutcome, ChatError> {
        let conversation_id = session.conversation.id.to_string();
        info!(
            conversation_id = %conversation_id,
            initiator = %initiator.name(),
            responder = %responder.name(),
            history = session.conversation.messages.len(),
            "Chat started"
        );
        self.publish(DomainEvent::ChatStarted {
            conversation_id: conversation_id.clone(),
            initiator: initiator.name().to_string(),
            responder: responder.name().to_string(),
            timestamp: Utc::now(),
        });

        let opening = ChatMessage::text(initiator.name(), responder.name(), message);
        self.append(&mut session.conversation, opening);

        let agents = [responder, initiator];
        let mut auto_replies: HashMap<AgentId, u32> = HashMap::new();
        let mut turn = 0;

        let termination = loop {
            let speaker = agents[turn % 2];
            let counter = session.counters.entry(speaker.name().clone()).or_insert(0);

            match speaker.generate_reply(&session.conversation, counter).await? {
                ReplyDecision::Terminate(reason) => break reason,
                ReplyDecision::Reply { message, auto } => {
                    if auto {
                        *auto_replies.entry(speaker.name().clone()).or_insert(0) += 1;
                    }
                    debug!(
                        conversation_id = %conversation_id,
                        turn,
                        sender = %message.sender,
                        auto,
                        action_call = message.action_call.is_some(),
                        failed = message.failed,
                        "Turn completed"
                    );
                    self.append(&mut session.conversation, message);
                }
            }
            turn += 1;
        };

        let conversation = session.conversation.clone();
        let final_message = conversation
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        info!(
            conversation_id = %conversation_id,
            reason = %termination,
            messages = conversation.messages.len(),
            "Chat terminated"
        );
        self.publish(DomainEvent::ChatTerminated {
            conversation_id,
            reason: termination.to_string(),
            messages: conversation.messages.len(),
            timestamp: Utc::now(),
        });

        Ok(ChatOutcome {
            conversation,
            final_message,
            termination,
            auto_replies,
        })
    }

    fn append(&self, conversation: &mut Conversation, message: ChatMessage) {
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::MessageAppended {
                conversation_id: conversation.id.to_string(),
                message: message.clone(),
            });
        }
        conversation.push(message);
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

/// Order-independent key of an agent pair.
fn pair_key(a: &AgentId, b: &AgentId) -> (AgentId, AgentId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

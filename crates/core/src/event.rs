//! Domain event system — observe a run without coupling to the orchestrator.
//!
//! Events are published when something interesting happens in a chat.
//! Subscribers (the CLI transcript printer, tests) react without the
//! orchestrator knowing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::chat::ChatMessage;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A conversation was opened
    ChatStarted {
        conversation_id: String,
        initiator: String,
        responder: String,
        timestamp: DateTime<Utc>,
    },

    /// A message was appended to a conversation
    MessageAppended {
        conversation_id: String,
        message: ChatMessage,
    },

    /// An action call was dispatched
    ActionDispatched {
        action: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Code blocks were executed
    CodeExecuted {
        executor: String,
        exit_code: i32,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A conversation ended
    ChatTerminated {
        conversation_id: String,
        reason: String,
        messages: usize,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

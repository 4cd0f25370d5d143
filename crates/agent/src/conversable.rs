//! Conversable agent — one participant of a two-party chat.
//!
//! Given the conversation so far, an agent decides whether to end it, hand
//! the turn to a human, or produce an automatic reply. Automatic replies
//! are tried in order:
//!
//! 1. **Action call**: the received message invokes an action → dispatch it
//! 2. **Code**: the received message contains fenced code → execute it
//! 3. **Model**: a model is bound → ask it
//! 4. **Default**: the configured default auto-reply text

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tandem_core::agent::{AgentProfile, HumanInputMode};
use tandem_core::chat::{AgentId, ChatMessage, Conversation, to_model_messages};
use tandem_core::error::ChatError;
use tandem_core::event::{DomainEvent, EventBus};
use tandem_core::execution::{CodeBlock, CodeExecutor, ExecutionReport};
use tandem_core::message::Message;
use tandem_core::provider::ProviderRequest;
use tandem_providers::ModelBinding;
use tandem_tools::extract_code;
use tracing::{debug, warn};

use crate::dispatcher::ActionDispatcher;
use crate::human::{HumanInput, NoHumanInput};
use crate::prompts;

/// Why a conversation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// The received message matched the receiver's termination token
    TerminationToken,
    /// The receiver used up its consecutive auto-replies
    AutoReplyLimit,
    /// A human asked to stop
    HumanExit,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TerminationToken => "termination token",
            Self::AutoReplyLimit => "auto-reply limit",
            Self::HumanExit => "human exit",
        })
    }
}

/// What an agent does with the turn it was given.
#[derive(Debug, Clone)]
pub enum ReplyDecision {
    /// Send `message`; `auto` is false when a human wrote it
    Reply { message: ChatMessage, auto: bool },
    Terminate(TerminationReason),
}

enum PolicyOutcome {
    Terminate(TerminationReason),
    Human(String),
    Auto,
}

pub struct ConversableAgent {
    profile: AgentProfile,
    model: Option<ModelBinding>,
    executor: Option<Arc<dyn CodeExecutor>>,
    dispatcher: ActionDispatcher,
    human: Arc<dyn HumanInput>,
    event_bus: Option<Arc<EventBus>>,
}

impl ConversableAgent {
    pub fn new(profile: AgentProfile) -> Self {
        Self {
            profile,
            model: None,
            executor: None,
            dispatcher: ActionDispatcher::new(),
            human: Arc::new(NoHumanInput),
            event_bus: None,
        }
    }

    /// Bind a model. The binding's settings become the profile's LLM settings.
    pub fn with_model(mut self, model: ModelBinding) -> Self {
        self.profile.llm = Some(model.settings.clone());
        self.model = Some(model);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn CodeExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: ActionDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn with_human_input(mut self, human: Arc<dyn HumanInput>) -> Self {
        self.human = human;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn name(&self) -> &AgentId {
        &self.profile.name
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    pub fn executor(&self) -> Option<&Arc<dyn CodeExecutor>> {
        self.executor.as_ref()
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    /// Decide this agent's next turn.
    ///
    /// `counter` is the agent's consecutive auto-reply count in this chat;
    /// it is advanced for automatic replies and reset by human replies and
    /// termination.
    pub async fn generate_reply(
        &self,
        conversation: &Conversation,
        counter: &mut u32,
    ) -> Result<ReplyDecision, ChatError> {
        let received = conversation
            .last()
            .ok_or_else(|| ChatError::NoMessage(self.name().to_string()))?;

        match self.check_termination_and_human_reply(received, counter).await? {
            PolicyOutcome::Terminate(reason) => {
                *counter = 0;
                debug!(agent = %self.name(), reason = %reason, "Terminating conversation");
                Ok(ReplyDecision::Terminate(reason))
            }
            PolicyOutcome::Human(text) => {
                *counter = 0;
                let message = match &received.action_call {
                    // A call must still get exactly one result
                    Some(call) => {
                        ChatMessage::action_result(self.name(), &received.sender, call, text)
                    }
                    None => ChatMessage::text(self.name(), &received.sender, text),
                };
                Ok(ReplyDecision::Reply {
                    message,
                    auto: false,
                })
            }
            PolicyOutcome::Auto => {
                *counter += 1;
                let message = self.auto_reply(conversation, received).await;
                Ok(ReplyDecision::Reply {
                    message,
                    auto: true,
                })
            }
        }
    }

    async fn check_termination_and_human_reply(
        &self,
        received: &ChatMessage,
        counter: &u32,
    ) -> Result<PolicyOutcome, ChatError> {
        let sender = &received.sender;
        let is_termination = self.profile.termination.is_termination(&received.content);
        let at_limit = *counter >= self.profile.max_consecutive_auto_reply;
        let reason = if is_termination {
            TerminationReason::TerminationToken
        } else {
            TerminationReason::AutoReplyLimit
        };

        match self.profile.human_input_mode {
            HumanInputMode::Never => {
                if is_termination || at_limit {
                    return Ok(PolicyOutcome::Terminate(reason));
                }
            }
            HumanInputMode::Terminate => {
                if is_termination || at_limit {
                    let input = self.human.prompt(&prompts::feedback_prompt(sender)).await?;
                    return Ok(if input == "exit" {
                        PolicyOutcome::Terminate(TerminationReason::HumanExit)
                    } else if input.is_empty() {
                        PolicyOutcome::Terminate(reason)
                    } else {
                        PolicyOutcome::Human(input)
                    });
                }
            }
            HumanInputMode::Always => {
                // Skipping is only offered while an auto-reply is still allowed
                let prompt = if is_termination || at_limit {
                    prompts::feedback_prompt(sender)
                } else {
                    prompts::always_prompt(sender)
                };
                let input = self.human.prompt(&prompt).await?;
                if input == "exit" {
                    return Ok(PolicyOutcome::Terminate(TerminationReason::HumanExit));
                }
                if !input.is_empty() {
                    return Ok(PolicyOutcome::Human(input));
                }
                // Skipped: auto-reply, unless the chat would end anyway
                if is_termination || at_limit {
                    return Ok(PolicyOutcome::Terminate(reason));
                }
            }
        }

        Ok(PolicyOutcome::Auto)
    }

    async fn auto_reply(&self, conversation: &Conversation, received: &ChatMessage) -> ChatMessage {
        let to = &received.sender;

        if let Some(call) = &received.action_call {
            let result = self.dispatcher.dispatch_call(call).await;
            return ChatMessage::action_result(self.name(), to, call, result);
        }

        if let Some(executor) = &self.executor {
            let blocks = extract_code(&received.content);
            if !blocks.is_empty() {
                let report = self.execute(executor.as_ref(), &blocks).await;
                return ChatMessage::text(self.name(), to, report.transcript());
            }
        }

        if let Some(model) = &self.model {
            return self.model_reply(model, conversation, to).await;
        }

        ChatMessage::text(self.name(), to, &self.profile.default_auto_reply)
    }

    async fn execute(&self, executor: &dyn CodeExecutor, blocks: &[CodeBlock]) -> ExecutionReport {
        debug!(
            agent = %self.name(),
            blocks = blocks.len(),
            executor = executor.name(),
            "Executing code"
        );

        let start = Instant::now();
        let report = match executor.execute(blocks).await {
            Ok(report) => report,
            Err(e) => {
                warn!(agent = %self.name(), error = %e, "Code execution unavailable");
                ExecutionReport {
                    exit_code: 1,
                    output: e.to_string(),
                }
            }
        };

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::CodeExecuted {
                executor: executor.name().to_string(),
                exit_code: report.exit_code,
                duration_ms: start.elapsed().as_millis() as u64,
                timestamp: Utc::now(),
            });
        }

        report
    }

    async fn model_reply(
        &self,
        model: &ModelBinding,
        conversation: &Conversation,
        to: &AgentId,
    ) -> ChatMessage {
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if !self.profile.system_message.is_empty() {
            messages.push(Message::system(&self.profile.system_message));
        }
        messages.extend(to_model_messages(self.name(), &conversation.messages));

        let settings = &model.settings;
        let mut request = ProviderRequest::new(&settings.model, messages);
        request.temperature = settings.temperature;
        request.seed = settings.seed;
        request.max_tokens = settings.max_tokens;
        request.stop = settings.stop.clone();
        request.tools = self.profile.actions.iter().map(|k| k.definition()).collect();

        debug!(
            agent = %self.name(),
            provider = model.provider.name(),
            model = %settings.model,
            messages = request.messages.len(),
            "Requesting model reply"
        );

        match model.provider.complete(request).await {
            Ok(response) => {
                let Message {
                    content, tool_calls, ..
                } = response.message;
                if tool_calls.len() > 1 {
                    warn!(
                        agent = %self.name(),
                        calls = tool_calls.len(),
                        "Model requested several actions, only the first is run"
                    );
                }
                match tool_calls.into_iter().next() {
                    Some(call) => ChatMessage::action_call(self.name(), to, content, call.into()),
                    None => ChatMessage::text(self.name(), to, content),
                }
            }
            Err(e) => {
                warn!(agent = %self.name(), error = %e, "Model call failed");
                ChatMessage::failure(self.name(), to, e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::test_helpers::{
        RecordingProvider, ScriptedHumanInput, SequentialMockProvider, bind, make_tool_call,
        make_tool_call_response,
    };
    use tandem_core::action::ActionKind;
    use tandem_core::agent::{AgentRole, LlmSettings};
    use tandem_core::chat::ActionCall;
    use tandem_core::message::Role;
    use tandem_tools::LocalExecutor;

    fn user_proxy() -> AgentProfile {
        AgentProfile::new("user_proxy", AgentRole::UserProxy).with_max_consecutive_auto_reply(2)
    }

    fn conversation_with(content: &str) -> Conversation {
        let assistant = AgentId::from("assistant");
        let proxy = AgentId::from("user_proxy");
        let mut conv = Conversation::new(proxy.clone(), assistant.clone());
        conv.push(ChatMessage::text(&proxy, &assistant, "task"));
        conv.push(ChatMessage::text(&assistant, &proxy, content));
        conv
    }

    fn assert_terminated(decision: ReplyDecision, expected: TerminationReason) {
        match decision {
            ReplyDecision::Terminate(reason) => assert_eq!(reason, expected),
            other => panic!("expected termination, got {other:?}"),
        }
    }

    fn reply_text(decision: ReplyDecision) -> (String, bool) {
        match decision {
            ReplyDecision::Reply { message, auto } => (message.content, auto),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn never_mode_terminates_on_exact_token() {
        let agent = ConversableAgent::new(user_proxy());
        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("TERMINATE"), &mut counter)
            .await
            .unwrap();
        assert_terminated(decision, TerminationReason::TerminationToken);
    }

    #[tokio::test]
    async fn token_must_match_exactly() {
        let agent = ConversableAgent::new(user_proxy().with_max_consecutive_auto_reply(5));
        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("All done. TERMINATE"), &mut counter)
            .await
            .unwrap();
        assert!(matches!(decision, ReplyDecision::Reply { auto: true, .. }));
        assert_eq!(counter, 1);
    }

    #[tokio::test]
    async fn never_mode_terminates_at_limit() {
        let agent = ConversableAgent::new(user_proxy());
        let conv = conversation_with("keep going");
        let mut counter = 0;

        for expected in 1..=2 {
            let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
            assert!(matches!(decision, ReplyDecision::Reply { auto: true, .. }));
            assert_eq!(counter, expected);
        }

        let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
        assert_terminated(decision, TerminationReason::AutoReplyLimit);
        assert_eq!(counter, 0);
    }

    #[tokio::test]
    async fn zero_budget_never_replies() {
        let profile = AgentProfile::new("planner_user", AgentRole::PlannerProxy)
            .with_max_consecutive_auto_reply(0);
        let agent = ConversableAgent::new(profile);
        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("a plan"), &mut counter)
            .await
            .unwrap();
        assert_terminated(decision, TerminationReason::AutoReplyLimit);
    }

    #[tokio::test]
    async fn terminate_mode_asks_human_at_limit() {
        let human = Arc::new(ScriptedHumanInput::new(["try a smaller range"]));
        let agent = ConversableAgent::new(
            user_proxy()
                .with_max_consecutive_auto_reply(0)
                .with_human_input_mode(HumanInputMode::Terminate),
        )
        .with_human_input(human.clone());

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("result"), &mut counter)
            .await
            .unwrap();
        let (text, auto) = reply_text(decision);
        assert_eq!(text, "try a smaller range");
        assert!(!auto);
        assert_eq!(counter, 0);
        assert!(human.prompts()[0].contains("Press enter or type 'exit' to stop the conversation"));
    }

    #[tokio::test]
    async fn terminate_mode_enter_at_limit_ends_chat() {
        let human = Arc::new(ScriptedHumanInput::new([""]));
        let agent = ConversableAgent::new(
            user_proxy()
                .with_max_consecutive_auto_reply(0)
                .with_human_input_mode(HumanInputMode::Terminate),
        )
        .with_human_input(human.clone());

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("result"), &mut counter)
            .await
            .unwrap();
        assert_terminated(decision, TerminationReason::AutoReplyLimit);
        let prompt = &human.prompts()[0];
        assert!(prompt.contains("Press enter or type 'exit' to stop the conversation"));
        assert!(!prompt.contains("auto-reply"));
    }

    #[tokio::test]
    async fn terminate_mode_empty_input_ends_chat() {
        let human = Arc::new(ScriptedHumanInput::new([""]));
        let agent = ConversableAgent::new(
            user_proxy().with_human_input_mode(HumanInputMode::Terminate),
        )
        .with_human_input(human.clone());

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("TERMINATE"), &mut counter)
            .await
            .unwrap();
        assert_terminated(decision, TerminationReason::TerminationToken);
        assert!(human.prompts()[0].contains("type 'exit' to stop"));
    }

    #[tokio::test]
    async fn terminate_mode_does_not_ask_before_limit() {
        let human = Arc::new(ScriptedHumanInput::new(Vec::<String>::new()));
        let agent = ConversableAgent::new(
            user_proxy().with_human_input_mode(HumanInputMode::Terminate),
        )
        .with_human_input(human.clone());

        let mut counter = 0;
        agent
            .generate_reply(&conversation_with("working on it"), &mut counter)
            .await
            .unwrap();
        assert!(human.prompts().is_empty());
    }

    #[tokio::test]
    async fn always_mode_exit_and_skip() {
        let human = Arc::new(ScriptedHumanInput::new(["", "exit"]));
        let agent = ConversableAgent::new(
            user_proxy()
                .with_max_consecutive_auto_reply(5)
                .with_human_input_mode(HumanInputMode::Always),
        )
        .with_human_input(human.clone());
        let conv = conversation_with("next step");
        let mut counter = 0;

        let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
        assert!(matches!(decision, ReplyDecision::Reply { auto: true, .. }));

        let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
        assert_terminated(decision, TerminationReason::HumanExit);
        assert_eq!(human.prompts().len(), 2);
        assert!(human.prompts()[0].contains("Press enter to skip and use auto-reply"));
    }

    #[tokio::test]
    async fn always_mode_skip_at_limit_ends_chat() {
        let human = Arc::new(ScriptedHumanInput::new([""]));
        let agent = ConversableAgent::new(
            user_proxy()
                .with_max_consecutive_auto_reply(1)
                .with_human_input_mode(HumanInputMode::Always),
        )
        .with_human_input(human.clone());

        let mut counter = 1;
        let decision = agent
            .generate_reply(&conversation_with("next step"), &mut counter)
            .await
            .unwrap();
        assert_terminated(decision, TerminationReason::AutoReplyLimit);
        assert!(!human.prompts()[0].contains("auto-reply"));
    }

    #[tokio::test]
    async fn executes_code_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(LocalExecutor::new(dir.path(), Duration::from_secs(30)));
        let bus = Arc::new(EventBus::new(8));
        let mut rx = bus.subscribe();
        let agent = ConversableAgent::new(user_proxy())
            .with_executor(executor)
            .with_event_bus(bus);

        let mut counter = 0;
        let decision = agent
            .generate_reply(
                &conversation_with("```sh\n# filename: hello.sh\necho hello\n```"),
                &mut counter,
            )
            .await
            .unwrap();
        let (text, _) = reply_text(decision);
        assert_eq!(text, "exitcode: 0 (execution succeeded)\nCode output: hello\n");
        assert!(dir.path().join("hello.sh").exists());

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            DomainEvent::CodeExecuted { exit_code: 0, .. }
        ));
    }

    #[tokio::test]
    async fn text_without_code_falls_through_to_model() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(LocalExecutor::new(dir.path(), Duration::from_secs(30)));
        let provider = Arc::new(SequentialMockProvider::single_text("CONTINUE"));
        let agent = ConversableAgent::new(user_proxy())
            .with_executor(executor)
            .with_model(bind(provider.clone()));

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("no code here"), &mut counter)
            .await
            .unwrap();
        assert_eq!(reply_text(decision).0, "CONTINUE");
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn model_request_carries_system_message_settings_and_actions() {
        let provider = Arc::new(RecordingProvider::new("ok"));
        let profile = AgentProfile::new("assistant", AgentRole::Assistant)
            .with_system_message("You write code.")
            .with_actions(vec![ActionKind::AskPlanner]);
        let mut binding = bind(provider.clone());
        binding.settings = LlmSettings {
            seed: Some(42),
            temperature: Some(0.0),
            ..LlmSettings::new("gpt-3.5-turbo")
        };
        let agent = ConversableAgent::new(profile).with_model(binding);

        let proxy = AgentId::from("user_proxy");
        let mut conv = Conversation::new(proxy.clone(), agent.name().clone());
        conv.push(ChatMessage::text(&proxy, agent.name(), "write a script"));

        let mut counter = 0;
        agent.generate_reply(&conv, &mut counter).await.unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.seed, Some(42));
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "ask_planner");
        assert_eq!(agent.profile().llm.as_ref().unwrap().seed, Some(42));
    }

    #[tokio::test]
    async fn model_tool_call_becomes_action_call() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_tool_call_response(
            vec![make_tool_call(
                "ask_planner",
                serde_json::json!({"message": "how to start?"}),
            )],
            "",
        )]));
        let agent = ConversableAgent::new(AgentProfile::new("assistant", AgentRole::Assistant))
            .with_model(bind(provider));
        let proxy = AgentId::from("user_proxy");
        let mut conv = Conversation::new(proxy.clone(), agent.name().clone());
        conv.push(ChatMessage::text(&proxy, agent.name(), "task"));

        let mut counter = 0;
        let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
        match decision {
            ReplyDecision::Reply { message, .. } => {
                let call = message.action_call.unwrap();
                assert_eq!(call.name, "ask_planner");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn model_failure_becomes_failed_message() {
        let provider = Arc::new(SequentialMockProvider::failing("connection refused"));
        let agent = ConversableAgent::new(user_proxy()).with_model(bind(provider));

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("hello"), &mut counter)
            .await
            .unwrap();
        match decision {
            ReplyDecision::Reply { message, auto } => {
                assert!(message.failed);
                assert!(message.content.contains("connection refused"));
                assert!(auto);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn action_call_is_answered_with_one_result() {
        let agent = ConversableAgent::new(user_proxy());
        let assistant = AgentId::from("assistant");
        let call = ActionCall {
            id: "call_9".into(),
            name: "ask_planner".into(),
            arguments: r#"{"message":"plan?"}"#.into(),
        };
        let mut conv = Conversation::new(agent.name().clone(), assistant.clone());
        conv.push(ChatMessage::text(agent.name(), &assistant, "task"));
        conv.push(ChatMessage::action_call(&assistant, agent.name(), "", call));

        let mut counter = 0;
        let decision = agent.generate_reply(&conv, &mut counter).await.unwrap();
        match decision {
            ReplyDecision::Reply { message, .. } => {
                assert_eq!(message.action_result.unwrap().call_id, "call_9");
                assert_eq!(message.content, "Error: Unknown action: ask_planner");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn default_auto_reply_when_nothing_else_applies() {
        let mut profile = user_proxy();
        profile.default_auto_reply = "Reply TERMINATE when done.".into();
        let agent = ConversableAgent::new(profile);

        let mut counter = 0;
        let decision = agent
            .generate_reply(&conversation_with("thinking"), &mut counter)
            .await
            .unwrap();
        assert_eq!(reply_text(decision).0, "Reply TERMINATE when done.");
    }

    #[tokio::test]
    async fn empty_conversation_is_an_error() {
        let agent = ConversableAgent::new(user_proxy());
        let conv = Conversation::new(AgentId::from("a"), AgentId::from("b"));
        let mut counter = 0;
        assert!(matches!(
            agent.generate_reply(&conv, &mut counter).await,
            Err(ChatError::NoMessage(_))
        ));
    }
}

//! Workforce composition — builds every agent of a run from configuration.

use std::sync::Arc;

use tandem_config::{AgentConfig, AppConfig, ConfigError};
use tandem_core::agent::{AgentProfile, AgentRole};
use tandem_core::error::ChatError;
use tandem_core::event::EventBus;
use tandem_providers::ProviderRouter;
use tandem_retrieval::LazyKeywordIndex;
use tandem_tools::executor_from_config;
use tracing::info;

use crate::actions::{AskPlannerAction, RetrieveContentAction};
use crate::conversable::ConversableAgent;
use crate::dispatcher::ActionDispatcher;
use crate::human::HumanInput;
use crate::orchestrator::{ChatOrchestrator, ChatOutcome};
use crate::prompts::RetrievalTask;
use crate::retrieval_proxy::{ContextUpdatePolicy, RetrievalProxy};

/// The agents of one run, wired together.
pub struct Workforce {
    pub planner: Arc<ConversableAgent>,
    pub planner_proxy: Arc<ConversableAgent>,
    pub assistant: Arc<ConversableAgent>,
    pub user_proxy: Arc<ConversableAgent>,
    pub retrieval_proxy: Option<Arc<RetrievalProxy>>,
    pub event_bus: Arc<EventBus>,
    orchestrator: ChatOrchestrator,
}

impl Workforce {
    /// The user proxy hands `task` to the assistant and the chat runs to
    /// completion.
    pub async fn run(&self, task: &str) -> Result<ChatOutcome, ChatError> {
        self.orchestrator
            .initiate_chat(&self.user_proxy, &self.assistant, task, true)
            .await
    }

    /// Names of every agent, retrieval proxy last.
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = [
            &self.planner,
            &self.planner_proxy,
            &self.assistant,
            &self.user_proxy,
        ]
        .iter()
        .map(|a| a.name().to_string())
        .collect();
        if let Some(proxy) = &self.retrieval_proxy {
            names.push(proxy.profile().name.to_string());
        }
        names
    }
}

fn profile(config: &AgentConfig, role: AgentRole) -> AgentProfile {
    let mut profile = AgentProfile::new(&config.name, role)
        .with_system_message(&config.system_message)
        .with_max_consecutive_auto_reply(config.max_consecutive_auto_reply)
        .with_human_input_mode(config.human_input_mode);
    profile.termination = config.termination.clone();
    profile.default_auto_reply = config.default_auto_reply.clone();
    profile
}

struct Builder<'a> {
    config: &'a AppConfig,
    router: &'a ProviderRouter,
    human: Arc<dyn HumanInput>,
    event_bus: Arc<EventBus>,
}

impl Builder<'_> {
    fn agent(
        &self,
        config: &AgentConfig,
        profile: AgentProfile,
    ) -> Result<ConversableAgent, ConfigError> {
        let mut agent = ConversableAgent::new(profile)
            .with_human_input(self.human.clone())
            .with_event_bus(self.event_bus.clone());
        if let Some(llm) = &config.llm {
            agent = agent.with_model(self.router.bind(self.config, llm)?);
        }
        Ok(agent)
    }

    fn retrieval_proxy(&self) -> Result<Option<RetrievalProxy>, ConfigError> {
        let settings = &self.config.retrieval;
        if !settings.enabled {
            return Ok(None);
        }

        let task = RetrievalTask::parse(&settings.task).ok_or_else(|| {
            ConfigError::ValidationError(format!("unknown retrieval task '{}'", settings.task))
        })?;
        let retriever = Arc::new(LazyKeywordIndex::new(&settings.docs_path, settings.chunk_chars));
        let policy = ContextUpdatePolicy {
            update_context: settings.update_context,
            marker: settings.update_marker.clone(),
            marker_window: settings.marker_window,
            answer_prefix: settings.answer_prefix.clone(),
        };

        Ok(Some(
            RetrievalProxy::new(
                profile(&self.config.agents.retrieval_proxy, AgentRole::RetrievalProxy),
                retriever,
            )
            .with_policy(policy)
            .with_task(task)
            .with_context_max_chars(settings.context_max_chars),
        ))
    }
}

/// Build the workforce for a run.
///
/// The assistant declares every bound action to its model; the user proxy
/// runs those actions and executes code when execution is enabled.
pub fn compose(
    config: &AppConfig,
    router: &ProviderRouter,
    human: Arc<dyn HumanInput>,
) -> Result<Workforce, ConfigError> {
    let event_bus = Arc::new(EventBus::new(256));
    let builder = Builder {
        config,
        router,
        human,
        event_bus: event_bus.clone(),
    };
    let agents = &config.agents;

    let planner = Arc::new(builder.agent(
        &agents.planner,
        profile(&agents.planner, AgentRole::Planner),
    )?);
    let planner_proxy = Arc::new(builder.agent(
        &agents.planner_proxy,
        profile(&agents.planner_proxy, AgentRole::PlannerProxy),
    )?);
    let retrieval_proxy = builder.retrieval_proxy()?.map(Arc::new);

    let mut dispatcher = ActionDispatcher::new().with_event_bus(event_bus.clone());
    dispatcher.register(Arc::new(
        AskPlannerAction::new(planner_proxy.clone(), planner.clone())
            .with_event_bus(event_bus.clone()),
    ));
    if let Some(proxy) = &retrieval_proxy {
        dispatcher.register(Arc::new(RetrieveContentAction::new(proxy.clone())));
    }

    let assistant = builder.agent(
        &agents.assistant,
        profile(&agents.assistant, AgentRole::Assistant).with_actions(dispatcher.kinds()),
    )?;
    let assistant = Arc::new(assistant.with_dispatcher(dispatcher.clone()));

    let mut user_proxy = builder
        .agent(&agents.user_proxy, profile(&agents.user_proxy, AgentRole::UserProxy))?
        .with_dispatcher(dispatcher);
    if let Some(executor) = executor_from_config(&config.execution) {
        user_proxy = user_proxy.with_executor(executor);
    }
    let user_proxy = Arc::new(user_proxy);

    info!(
        retrieval = retrieval_proxy.is_some(),
        execution = user_proxy.executor().map(|e| e.name()).unwrap_or("disabled"),
        actions = assistant.profile().actions.len(),
        "Workforce composed"
    );

    Ok(Workforce {
        planner,
        planner_proxy,
        assistant,
        user_proxy,
        retrieval_proxy,
        orchestrator: ChatOrchestrator::new().with_event_bus(event_bus.clone()),
        event_bus,
    })
}

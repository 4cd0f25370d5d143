//! Configuration loading, validation, and management for Tandem.
//!
//! Loads configuration from `~/.tandem/config.toml` with environment
//! variable overrides. Validates all settings at startup. A missing file
//! yields defaults that wire the stock workflow: planner, planner proxy,
//! assistant, user proxy and a retrieval proxy over the autogen README.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tandem_core::agent::{HumanInputMode, TerminationPolicy};

/// The task the stock workflow runs when no message is given.
pub const DEFAULT_TASK: &str = "write python script create a list of numbers from 1 to 100, \
and print all the numbers that are divisible by 3 and 5 and save the script to test.py";

/// The root configuration structure.
///
/// Maps directly to `~/.tandem/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Backend used by agents that don't name one
    #[serde(default = "default_backend")]
    pub default_backend: String,

    /// Task message the user proxy opens the chat with
    #[serde(default = "default_task")]
    pub task: String,

    /// Named model backends
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,

    /// Per-role agent settings
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Retrieval proxy settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Sandboxed code execution settings
    #[serde(default)]
    pub execution: ExecutionConfig,
}

fn default_backend() -> String {
    "hosted".into()
}
fn default_task() -> String {
    DEFAULT_TASK.into()
}
fn default_true() -> bool {
    true
}

fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(
        "local".into(),
        BackendConfig {
            api_key: Some("any string here is fine".into()),
            api_base: "http://localhost:1234/v1".into(),
            model: "WizardCoder-Python-34B-V1.0".into(),
        },
    );
    backends.insert(
        "hosted".into(),
        BackendConfig {
            api_key: None,
            api_base: "https://api.openai.com/v1".into(),
            model: "gpt-3.5-turbo".into(),
        },
    );
    backends
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

/// An OpenAI-compatible model endpoint.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_base: String,

    pub model: String,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .finish()
    }
}

impl BackendConfig {
    /// Backends on the loopback interface accept any key.
    pub fn is_local(&self) -> bool {
        let rest = self
            .api_base
            .strip_prefix("http://")
            .or_else(|| self.api_base.strip_prefix("https://"))
            .unwrap_or(&self.api_base);
        rest.starts_with("localhost") || rest.starts_with("127.0.0.1") || rest.starts_with("[::1]")
    }
}

/// Model settings of one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend name; falls back to `default_backend`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Overrides the backend's model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Timeout of a single request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Wait between retries of a failed request
    #[serde(default = "default_retry_wait")]
    pub retry_wait_secs: u64,

    /// Total time allowed for retrying a failed request
    #[serde(default = "default_max_retry_period")]
    pub max_retry_period_secs: u64,
}

fn default_request_timeout() -> u64 {
    60
}
fn default_retry_wait() -> u64 {
    10
}
fn default_max_retry_period() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: None,
            model: None,
            temperature: None,
            seed: None,
            max_tokens: None,
            request_timeout_secs: default_request_timeout(),
            retry_wait_secs: default_retry_wait(),
            max_retry_period_secs: default_max_retry_period(),
        }
    }
}

/// Settings of one agent.
///
/// In a config file, an `[agents.<role>]` table only overrides the fields it
/// names and the rest keep the role's defaults. The same holds for its `llm`
/// table; `llm = false` takes the model away.
#[derive(Debug, Clone, Serialize)]
pub struct AgentConfig {
    pub name: String,
    pub system_message: String,
    pub max_consecutive_auto_reply: u32,
    pub human_input_mode: HumanInputMode,
    pub termination: TerminationPolicy,
    pub default_auto_reply: String,

    /// `None` means the agent never calls a model
    #[serde(serialize_with = "serialize_llm")]
    pub llm: Option<LlmConfig>,
}

fn serialize_llm<S: serde::Serializer>(llm: &Option<LlmConfig>, s: S) -> Result<S::Ok, S::Error> {
    match llm {
        Some(llm) => llm.serialize(s),
        None => s.serialize_bool(false),
    }
}

fn default_max_auto_reply() -> u32 {
    tandem_core::agent::DEFAULT_MAX_CONSECUTIVE_AUTO_REPLY
}

impl AgentConfig {
    fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            system_message: String::new(),
            max_consecutive_auto_reply: default_max_auto_reply(),
            human_input_mode: HumanInputMode::Never,
            termination: TerminationPolicy::default(),
            default_auto_reply: String::new(),
            llm: None,
        }
    }
}

/// One `[agents.<role>]` table as written in the file.
#[derive(Debug, Default, Deserialize)]
struct AgentOverrides {
    name: Option<String>,
    system_message: Option<String>,
    max_consecutive_auto_reply: Option<u32>,
    human_input_mode: Option<HumanInputMode>,
    termination: Option<TerminationPolicy>,
    default_auto_reply: Option<String>,
    llm: Option<LlmOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LlmOverride {
    Enabled(bool),
    Settings(LlmOverrides),
}

#[derive(Debug, Default, Deserialize)]
struct LlmOverrides {
    backend: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    seed: Option<u64>,
    max_tokens: Option<u32>,
    request_timeout_secs: Option<u64>,
    retry_wait_secs: Option<u64>,
    max_retry_period_secs: Option<u64>,
}

impl LlmOverrides {
    fn apply(self, mut llm: LlmConfig) -> LlmConfig {
        llm.backend = self.backend.or(llm.backend);
        llm.model = self.model.or(llm.model);
        llm.temperature = self.temperature.or(llm.temperature);
        llm.seed = self.seed.or(llm.seed);
        llm.max_tokens = self.max_tokens.or(llm.max_tokens);
        llm.request_timeout_secs = self.request_timeout_secs.unwrap_or(llm.request_timeout_secs);
        llm.retry_wait_secs = self.retry_wait_secs.unwrap_or(llm.retry_wait_secs);
        llm.max_retry_period_secs = self
            .max_retry_period_secs
            .unwrap_or(llm.max_retry_period_secs);
        llm
    }
}

impl AgentOverrides {
    fn apply(self, mut agent: AgentConfig) -> AgentConfig {
        if let Some(name) = self.name {
            agent.name = name;
        }
        if let Some(message) = self.system_message {
            agent.system_message = message;
        }
        if let Some(max) = self.max_consecutive_auto_reply {
            agent.max_consecutive_auto_reply = max;
        }
        if let Some(mode) = self.human_input_mode {
            agent.human_input_mode = mode;
        }
        if let Some(termination) = self.termination {
            agent.termination = termination;
        }
        if let Some(reply) = self.default_auto_reply {
            agent.default_auto_reply = reply;
        }
        agent.llm = match self.llm {
            None => agent.llm,
            Some(LlmOverride::Enabled(false)) => None,
            Some(LlmOverride::Enabled(true)) => Some(agent.llm.unwrap_or_default()),
            Some(LlmOverride::Settings(overrides)) => {
                Some(overrides.apply(agent.llm.unwrap_or_default()))
            }
        };
        agent
    }
}

/// Settings for every role of the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "AgentsFile")]
pub struct AgentsConfig {
    pub planner: AgentConfig,
    pub planner_proxy: AgentConfig,
    pub assistant: AgentConfig,
    pub user_proxy: AgentConfig,
    pub retrieval_proxy: AgentConfig,
}

#[derive(Debug, Default, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    planner: AgentOverrides,
    #[serde(default)]
    planner_proxy: AgentOverrides,
    #[serde(default)]
    assistant: AgentOverrides,
    #[serde(default)]
    user_proxy: AgentOverrides,
    #[serde(default)]
    retrieval_proxy: AgentOverrides,
}

impl From<AgentsFile> for AgentsConfig {
    fn from(file: AgentsFile) -> Self {
        Self {
            planner: file.planner.apply(default_planner()),
            planner_proxy: file.planner_proxy.apply(default_planner_proxy()),
            assistant: file.assistant.apply(default_assistant()),
            user_proxy: file.user_proxy.apply(default_user_proxy()),
            retrieval_proxy: file.retrieval_proxy.apply(default_retrieval_proxy()),
        }
    }
}

const PLANNER_SYSTEM_MESSAGE: &str = "\
You are a dedicated AI for data science and machine learning tasks. Your role is to suggest algorithmic approaches, \
data preprocessing steps, and statistical methods to another AI assistant working on a specific task.
Avoid providing concrete code, but instead, offer high-level methodologies and the reasoning behind them. For actions \
not inherently related to coding or algorithmic reasoning, convert them into steps that can be implemented algorithmically.
For instance, building ML models could be translated to writing code that acquires, processes, and structures the \
required data, followed by selecting, training, and evaluating appropriate algorithms.
Once a task is executed, inspect the results critically. Evaluate the performance using appropriate metrics, and \
suggest optimizations or alternative approaches if the results are not satisfactory.
If there's an error in execution, help in diagnosing the error and propose potential fixes. Your goal is to guide the \
other AI towards achieving the best possible outcome on the task at hand.";

const ASSISTANT_SYSTEM_MESSAGE: &str = "\
You are responsible for executing a task at hand and writing the necessary full code to complete it.
You can ask user_proxy to execute the code you write, and ask planner for help in planning the task and evaluating the results.
Run a test on a subset of the original data to ensure the code is working as expected.";

const USER_PROXY_SYSTEM_MESSAGE: &str = "\
Reply TERMINATE if the task has been solved at full satisfaction.
Otherwise, reply CONTINUE, or the reason why the task is not solved yet.";

const RETRIEVAL_PROXY_SYSTEM_MESSAGE: &str =
    "Assistant who has extra content retrieval power for solving difficult problems.";

fn default_planner() -> AgentConfig {
    AgentConfig {
        system_message: PLANNER_SYSTEM_MESSAGE.into(),
        llm: Some(LlmConfig::default()),
        ..AgentConfig::named("planner")
    }
}

fn default_planner_proxy() -> AgentConfig {
    AgentConfig {
        max_consecutive_auto_reply: 0,
        ..AgentConfig::named("planner_user")
    }
}

fn default_assistant() -> AgentConfig {
    AgentConfig {
        system_message: ASSISTANT_SYSTEM_MESSAGE.into(),
        llm: Some(LlmConfig {
            seed: Some(42),
            request_timeout_secs: 200,
            retry_wait_secs: 5,
            max_retry_period_secs: 60,
            ..LlmConfig::default()
        }),
        ..AgentConfig::named("assistant")
    }
}

fn default_user_proxy() -> AgentConfig {
    AgentConfig {
        system_message: USER_PROXY_SYSTEM_MESSAGE.into(),
        max_consecutive_auto_reply: 10,
        human_input_mode: HumanInputMode::Terminate,
        llm: Some(LlmConfig::default()),
        ..AgentConfig::named("user_proxy")
    }
}

fn default_retrieval_proxy() -> AgentConfig {
    AgentConfig {
        system_message: RETRIEVAL_PROXY_SYSTEM_MESSAGE.into(),
        max_consecutive_auto_reply: 3,
        ..AgentConfig::named("rag_proxy")
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            planner: default_planner(),
            planner_proxy: default_planner_proxy(),
            assistant: default_assistant(),
            user_proxy: default_user_proxy(),
            retrieval_proxy: default_retrieval_proxy(),
        }
    }
}

impl AgentsConfig {
    pub fn all(&self) -> [&AgentConfig; 5] {
        [
            &self.planner,
            &self.planner_proxy,
            &self.assistant,
            &self.user_proxy,
            &self.retrieval_proxy,
        ]
    }
}

/// Retrieval proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Wire the retrieval proxy and expose `retrieve_content`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prompt template: "qa" or "code"
    #[serde(default = "default_retrieval_task")]
    pub task: String,

    /// File, directory or http(s) URL of the corpus
    #[serde(default = "default_docs_path")]
    pub docs_path: String,

    /// Maximum characters per passage
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,

    /// Maximum characters of context placed in one message
    #[serde(default = "default_context_max_chars")]
    pub context_max_chars: usize,

    /// Allow `retrieve_content` to refresh stale context
    #[serde(default = "default_true")]
    pub update_context: bool,

    /// Marker a model emits to ask for more context
    #[serde(default = "default_update_marker")]
    pub update_marker: String,

    /// How many leading/trailing characters are searched for the marker
    #[serde(default = "default_marker_window")]
    pub marker_window: usize,

    /// Answers lacking this prefix count as needing more context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer_prefix: Option<String>,
}

fn default_retrieval_task() -> String {
    "qa".into()
}
fn default_docs_path() -> String {
    "https://raw.githubusercontent.com/microsoft/autogen/main/README.md".into()
}
fn default_chunk_chars() -> usize {
    2000
}
fn default_context_max_chars() -> usize {
    16000
}
fn default_update_marker() -> String {
    "UPDATE CONTEXT".into()
}
fn default_marker_window() -> usize {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            task: default_retrieval_task(),
            docs_path: default_docs_path(),
            chunk_chars: default_chunk_chars(),
            context_max_chars: default_context_max_chars(),
            update_context: true,
            update_marker: default_update_marker(),
            marker_window: default_marker_window(),
            answer_prefix: None,
        }
    }
}

/// Sandboxed code execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Whether the user proxy executes code blocks at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Run code inside a container instead of a local process
    #[serde(default)]
    pub use_docker: bool,

    #[serde(default = "default_docker_image")]
    pub docker_image: String,

    /// Per-block timeout
    #[serde(default = "default_execution_timeout")]
    pub timeout_secs: u64,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("_output")
}
fn default_docker_image() -> String {
    "python:3".into()
}
fn default_execution_timeout() -> u64 {
    600
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            work_dir: default_work_dir(),
            use_docker: false,
            docker_image: default_docker_image(),
            timeout_secs: default_execution_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tandem/config.toml).
    ///
    /// Environment variable overrides:
    /// - `TANDEM_API_KEY`, then `OPENAI_API_KEY` — key for backends without one
    /// - `TANDEM_BACKEND` — default backend
    /// - `TANDEM_MODEL` — model of the default backend
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load a specific file, then apply environment overrides and validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let api_key = lookup("TANDEM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        if let Some(key) = api_key {
            for backend in self.backends.values_mut() {
                if backend.api_key.is_none() {
                    backend.api_key = Some(key.clone());
                }
            }
        }

        if let Some(backend) = lookup("TANDEM_BACKEND") {
            self.default_backend = backend;
        }

        if let Some(model) = lookup("TANDEM_MODEL")
            && let Some(backend) = self.backends.get_mut(&self.default_backend)
        {
            backend.model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tandem")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.backends.contains_key(&self.default_backend) {
            return Err(ConfigError::UnknownBackend(self.default_backend.clone()));
        }

        for (name, backend) in &self.backends {
            if !backend.api_base.starts_with("http://")
                && !backend.api_base.starts_with("https://")
            {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{name}': api_base must start with http:// or https://"
                )));
            }
            if backend.model.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{name}': model must not be empty"
                )));
            }
        }

        let mut names = std::collections::HashSet::new();
        for agent in self.agents.all() {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::ValidationError("agent names must not be empty".into()));
            }
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "agent name '{}' is used twice",
                    agent.name
                )));
            }

            let Some(llm) = &agent.llm else { continue };
            if let Some(backend) = &llm.backend
                && !self.backends.contains_key(backend)
            {
                return Err(ConfigError::UnknownBackend(backend.clone()));
            }
            if let Some(t) = llm.temperature
                && !(0.0..=2.0).contains(&t)
            {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}': temperature must be between 0.0 and 2.0",
                    agent.name
                )));
            }
            if llm.max_retry_period_secs > 0 && llm.retry_wait_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "agent '{}': retry_wait_secs must be > 0 when retries are enabled",
                    agent.name
                )));
            }
        }

        if self.retrieval.enabled {
            if self.retrieval.docs_path.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "retrieval.docs_path must be set when retrieval is enabled".into(),
                ));
            }
            if self.retrieval.chunk_chars == 0 {
                return Err(ConfigError::ValidationError(
                    "retrieval.chunk_chars must be > 0".into(),
                ));
            }
            if !["qa", "code", "default"].contains(&self.retrieval.task.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "retrieval.task must be one of qa, code, default (got '{}')",
                    self.retrieval.task
                )));
            }
        }

        Ok(())
    }

    /// Resolve the backend an agent's model settings point at.
    pub fn backend_for(&self, llm: &LlmConfig) -> Result<(&str, &BackendConfig), ConfigError> {
        let name = llm.backend.as_deref().unwrap_or(&self.default_backend);
        self.backends
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownBackend(name.to_string()))
    }

    /// The API key for a backend, required unless the backend is local.
    pub fn require_api_key(&self, backend: &str) -> Result<String, ConfigError> {
        let config = self
            .backends
            .get(backend)
            .ok_or_else(|| ConfigError::UnknownBackend(backend.to_string()))?;
        match &config.api_key {
            Some(key) if !key.trim().is_empty() => Ok(key.clone()),
            _ if config.is_local() => Ok(String::new()),
            _ => Err(ConfigError::MissingApiKey(backend.to_string())),
        }
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            task: default_task(),
            backends: default_backends(),
            agents: AgentsConfig::default(),
            retrieval: RetrievalConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("No API key for backend '{0}' (set TANDEM_API_KEY or OPENAI_API_KEY)")]
    MissingApiKey(String),

    #[error("Backend '{0}' has no registered provider")]
    UnregisteredBackend(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

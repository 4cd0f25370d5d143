//! Retrieval proxy — turns questions into context-carrying prompts.
//!
//! The proxy remembers the problem it is working on and which passages it
//! has already handed out. When a model answers `UPDATE CONTEXT` (or
//! answers without the configured prefix) the next call serves fresh
//! passages instead of repeating the same ones.

use std::collections::HashSet;
use std::sync::Arc;

use tandem_core::agent::AgentProfile;
use tandem_core::error::RetrievalError;
use tandem_core::retrieval::{Passage, Retriever};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::prompts::RetrievalTask;

/// When a message means the current context was not good enough.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextUpdatePolicy {
    /// Whether stale context may be refreshed at all
    pub update_context: bool,

    /// Marker a model emits to ask for more context
    pub marker: String,

    /// Characters at each end of the message searched for the marker
    pub marker_window: usize,

    /// Answers lacking this prefix count as needing more context
    pub answer_prefix: Option<String>,
}

impl Default for ContextUpdatePolicy {
    fn default() -> Self {
        Self {
            update_context: true,
            marker: "UPDATE CONTEXT".into(),
            marker_window: 20,
            answer_prefix: None,
        }
    }
}

impl ContextUpdatePolicy {
    /// `(marker_present, prefix_missing)` for a message.
    pub fn check(&self, message: &str) -> (bool, bool) {
        let upper = message.to_uppercase();
        let marker = self.marker.to_uppercase();

        let chars: Vec<char> = upper.chars().collect();
        let window = self.marker_window.min(chars.len());
        let head: String = chars[..window].iter().collect();
        let tail: String = chars[chars.len() - window..].iter().collect();
        let marker_present =
            !marker.is_empty() && (head.contains(&marker) || tail.contains(&marker));

        let prefix_missing = self
            .answer_prefix
            .as_ref()
            .is_some_and(|p| !upper.contains(&p.to_uppercase()));

        (marker_present, prefix_missing)
    }
}

#[derive(Debug, Default)]
struct RetrievalState {
    problem: Option<String>,
    n_results: usize,
    /// Results of the latest search, best first
    results: Vec<Passage>,
    /// Passages already placed into a context
    used_ids: HashSet<String>,
    /// Contents of every passage handed out since the last reset
    contents: Vec<String>,
}

impl RetrievalState {
    fn reset(&mut self) {
        self.results.clear();
        self.used_ids.clear();
        self.contents.clear();
    }
}

/// Retrieval proxy over a [`Retriever`].
pub struct RetrievalProxy {
    profile: AgentProfile,
    retriever: Arc<dyn Retriever>,
    policy: ContextUpdatePolicy,
    task: RetrievalTask,
    context_max_chars: usize,
    state: Mutex<RetrievalState>,
}

impl RetrievalProxy {
    pub fn new(profile: AgentProfile, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            profile,
            retriever,
            policy: ContextUpdatePolicy::default(),
            task: RetrievalTask::Qa,
            context_max_chars: 16_000,
            state: Mutex::new(RetrievalState {
                n_results: tandem_core::action::DEFAULT_N_RESULTS,
                ..RetrievalState::default()
            }),
        }
    }

    pub fn with_policy(mut self, policy: ContextUpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_task(mut self, task: RetrievalTask) -> Self {
        self.task = task;
        self
    }

    pub fn with_context_max_chars(mut self, max: usize) -> Self {
        self.context_max_chars = max;
        self
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn policy(&self) -> &ContextUpdatePolicy {
        &self.policy
    }

    /// The problem the proxy is currently gathering context for.
    pub async fn problem(&self) -> Option<String> {
        self.state.lock().await.problem.clone()
    }

    pub fn check_update_context(&self, message: &str) -> (bool, bool) {
        self.policy.check(message)
    }

    /// Answer a `retrieve_content` call.
    ///
    /// Returns the rendered prompt, or `message` unchanged when no passage
    /// could be found.
    pub async fn retrieve_content(
        &self,
        message: &str,
        n_results: usize,
    ) -> Result<String, RetrievalError> {
        self.state.lock().await.n_results = n_results;

        let (marker_present, prefix_missing) = self.check_update_context(message);
        let rendered = if (marker_present || prefix_missing) && self.policy.update_context {
            {
                let mut state = self.state.lock().await;
                if state.problem.is_none() {
                    state.problem = Some(message.to_string());
                }
            }
            self.regenerate_context(message, marker_present).await?
        } else {
            self.generate_init_message(message, n_results).await?
        };

        Ok(rendered.unwrap_or_else(|| message.to_string()))
    }

    /// Start over: retrieve passages for `problem` and render the prompt.
    ///
    /// `None` when nothing in the corpus matched.
    pub async fn generate_init_message(
        &self,
        problem: &str,
        n_results: usize,
    ) -> Result<Option<String>, RetrievalError> {
        let results = self.retriever.query(problem, n_results).await?;

        let mut state = self.state.lock().await;
        state.reset();
        state.problem = Some(problem.to_string());
        state.n_results = n_results;
        state.results = results;

        let context = self.take_context(&mut state);
        info!(
            agent = %self.profile.name,
            passages = state.used_ids.len(),
            "Generated retrieval context"
        );
        Ok(self.render(problem, context))
    }

    /// Serve new passages after the model found the current ones lacking.
    async fn regenerate_context(
        &self,
        message: &str,
        marker_present: bool,
    ) -> Result<Option<String>, RetrievalError> {
        let (problem, n_results) = {
            let state = self.state.lock().await;
            (state.problem.clone().unwrap_or_else(|| message.to_string()), state.n_results)
        };

        if marker_present {
            // Next unused passages of the latest search, then wider searches
            let mut context = {
                let mut state = self.state.lock().await;
                self.take_context(&mut state)
            };
            let mut round = 1;
            while context.is_empty() && round < 5 {
                let limit = n_results.saturating_mul(2 * round + 1);
                let results = self.retriever.query(&problem, limit).await?;
                let mut state = self.state.lock().await;
                state.results = results;
                context = self.take_context(&mut state);
                round += 1;
            }
            debug!(agent = %self.profile.name, rounds = round, "Refreshed context for problem");
            Ok(self.render(&problem, context))
        } else {
            // Query by the intermediate answer, accumulating passages
            let query = intermediate_answer(message);
            let mut context = String::new();
            for round in 0..5 {
                let limit = n_results.saturating_mul(2 * round + 1);
                let results = self.retriever.query(&query, limit).await?;
                let mut state = self.state.lock().await;
                state.results = results;
                self.take_context(&mut state);
                context = state.contents.join("\n");
                if !context.is_empty() {
                    break;
                }
            }
            debug!(agent = %self.profile.name, query = %query, "Refreshed context for answer");
            Ok(self.render(&problem, context))
        }
    }

    /// Move the next unused passages of the latest results into a context,
    /// bounded by the character budget.
    fn take_context(&self, state: &mut RetrievalState) -> String {
        let mut context = String::new();
        let mut taken = 0;
        let results = std::mem::take(&mut state.results);

        for passage in &results {
            if taken >= state.n_results.max(1) {
                break;
            }
            if state.used_ids.contains(&passage.id) {
                continue;
            }
            let len = passage.content.chars().count();
            if len > self.context_max_chars {
                debug!(passage = %passage.id, "Skipping passage longer than the context budget");
                continue;
            }
            if context.chars().count() + len > self.context_max_chars {
                break;
            }
            context.push_str(&passage.content);
            context.push('\n');
            state.used_ids.insert(passage.id.clone());
            state.contents.push(passage.content.clone());
            taken += 1;
        }

        state.results = results;
        context
    }

    fn render(&self, problem: &str, context: String) -> Option<String> {
        if context.trim().is_empty() {
            None
        } else {
            Some(self.task.render(problem, &context))
        }
    }
}

/// The first sentence of the first line of a message.
fn intermediate_answer(message: &str) -> String {
    let first_line = message.lines().next().unwrap_or("").trim();
    let end = first_line
        .char_indices()
        .find(|(i, c)| {
            matches!(c, '.' | '!' | '?')
                && first_line[i + c.len_utf8()..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace)
        })
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(first_line.len());
    first_line[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::agent::AgentRole;
    use tandem_retrieval::KeywordIndex;

    fn passage(id: &str, content: &str) -> Passage {
        Passage {
            id: id.into(),
            source: "README.md".into(),
            content: content.into(),
            score: 0.0,
        }
    }

    fn proxy() -> RetrievalProxy {
        let index = KeywordIndex::new(vec![
            passage("p0", "AutoGen agents converse to solve tasks."),
            passage("p1", "AutoGen agents can execute code."),
            passage("p2", "AutoGen agents support human feedback."),
            passage("p3", "AutoGen agents integrate retrieval."),
            passage("p4", "Install with pip install pyautogen."),
        ]);
        RetrievalProxy::new(
            AgentProfile::new("rag_proxy", AgentRole::RetrievalProxy),
            Arc::new(index),
        )
    }

    #[test]
    fn marker_detected_at_either_end() {
        let policy = ContextUpdatePolicy::default();
        assert_eq!(policy.check("UPDATE CONTEXT"), (true, false));
        assert_eq!(policy.check("update context please"), (true, false));
        assert_eq!(
            policy.check("I could not find it in the passages. Update context"),
            (true, false)
        );
        let buried = format!("{}UPDATE CONTEXT{}", "x".repeat(30), "y".repeat(30));
        assert_eq!(policy.check(&buried), (false, false));
    }

    #[test]
    fn missing_prefix_detected() {
        let policy = ContextUpdatePolicy {
            answer_prefix: Some("Answer:".into()),
            ..ContextUpdatePolicy::default()
        };
        assert_eq!(policy.check("answer: 42"), (false, false));
        assert_eq!(policy.check("Maybe 42?"), (false, true));
    }

    #[test]
    fn short_messages_do_not_panic() {
        let policy = ContextUpdatePolicy::default();
        assert_eq!(policy.check(""), (false, false));
        assert_eq!(policy.check("é"), (false, false));
    }

    #[test]
    fn intermediate_answer_is_first_sentence() {
        assert_eq!(intermediate_answer("It uses pip. Then more.\nSecond line"), "It uses pip.");
        assert_eq!(intermediate_answer("No terminator here"), "No terminator here");
        assert_eq!(intermediate_answer("v1.2 is out! Yes"), "v1.2 is out!");
    }

    #[tokio::test]
    async fn no_match_returns_message_unchanged() {
        let proxy = proxy();
        let out = proxy.retrieve_content("quantum chromodynamics", 3).await.unwrap();
        assert_eq!(out, "quantum chromodynamics");
    }

    #[tokio::test]
    async fn initial_message_includes_passages() {
        let proxy = proxy();
        let out = proxy.retrieve_content("How do I install pyautogen?", 3).await.unwrap();
        assert!(out.starts_with("You're a retrieve augmented chatbot."));
        assert!(out.contains("User's question is: How do I install pyautogen?"));
        assert!(out.contains("pip install pyautogen"));
        assert_eq!(proxy.problem().await.as_deref(), Some("How do I install pyautogen?"));
    }

    #[tokio::test]
    async fn n_results_bounds_passages() {
        let proxy = proxy();
        let out = proxy.retrieve_content("autogen agents", 2).await.unwrap();
        let count = ["converse", "execute", "human", "retrieval"]
            .iter()
            .filter(|w| out.contains(*w))
            .count();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn update_marker_serves_fresh_passages_for_stored_problem() {
        let proxy = proxy();
        let first = proxy.retrieve_content("autogen agents", 2).await.unwrap();

        let second = proxy.retrieve_content("UPDATE CONTEXT", 2).await.unwrap();
        assert!(second.contains("User's question is: autogen agents"));

        for w in ["converse", "execute", "human", "retrieval"] {
            assert!(
                !(first.contains(w) && second.contains(w)),
                "passage containing '{w}' was served twice"
            );
        }
    }

    #[tokio::test]
    async fn update_marker_without_more_passages_returns_message() {
        let proxy = proxy();
        proxy.retrieve_content("pyautogen", 3).await.unwrap();
        let out = proxy.retrieve_content("UPDATE CONTEXT", 3).await.unwrap();
        assert_eq!(out, "UPDATE CONTEXT");
    }

    #[tokio::test]
    async fn update_marker_ignored_when_updates_disabled() {
        let proxy = proxy().with_policy(ContextUpdatePolicy {
            update_context: false,
            ..ContextUpdatePolicy::default()
        });
        proxy.retrieve_content("autogen agents", 2).await.unwrap();
        let out = proxy.retrieve_content("UPDATE CONTEXT", 2).await.unwrap();
        // Treated as a fresh question with no matching passages
        assert_eq!(out, "UPDATE CONTEXT");
        assert_eq!(proxy.problem().await.as_deref(), Some("UPDATE CONTEXT"));
    }

    #[tokio::test]
    async fn missing_prefix_queries_by_first_sentence() {
        let proxy = proxy().with_policy(ContextUpdatePolicy {
            answer_prefix: Some("ANSWER:".into()),
            ..ContextUpdatePolicy::default()
        });
        proxy.retrieve_content("how to install", 1).await.unwrap();

        let out = proxy
            .retrieve_content("Agents execute code. Not sure how.", 1)
            .await
            .unwrap();
        assert!(out.contains("User's question is: how to install"));
        assert!(out.contains("execute code"));
    }

    #[tokio::test]
    async fn context_budget_skips_oversized_passages() {
        let index = KeywordIndex::new(vec![
            passage("big", &format!("autogen {}", "x ".repeat(100))),
            passage("small", "autogen small"),
        ]);
        let proxy = RetrievalProxy::new(
            AgentProfile::new("rag_proxy", AgentRole::RetrievalProxy),
            Arc::new(index),
        )
        .with_context_max_chars(50);

        let out = proxy.retrieve_content("autogen", 3).await.unwrap();
        assert!(out.contains("autogen small"));
        assert!(!out.contains("x x x"));
    }

    #[tokio::test]
    async fn widening_search_saturates_huge_result_counts() {
        let proxy = proxy();
        proxy.retrieve_content("pyautogen", usize::MAX).await.unwrap();
        let out = proxy.retrieve_content("UPDATE CONTEXT", usize::MAX).await.unwrap();
        assert_eq!(out, "UPDATE CONTEXT");

        let proxy = self::proxy().with_policy(ContextUpdatePolicy {
            answer_prefix: Some("ANSWER:".into()),
            ..ContextUpdatePolicy::default()
        });
        proxy.retrieve_content("how to install", 1).await.unwrap();
        let out = proxy
            .retrieve_content("Agents execute code.", usize::MAX)
            .await
            .unwrap();
        assert!(out.contains("execute code"));
    }
}

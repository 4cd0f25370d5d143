//! `tandem` — run the task through the workforce.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tandem_agent::{HumanInput, NoHumanInput, StdinHumanInput, compose};
use tandem_config::AppConfig;
use tandem_core::event::DomainEvent;
use tandem_providers::build_from_config;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub message: Option<String>,
    pub backend: Option<String>,
    pub no_retrieval: bool,
    pub interactive: bool,
}

/// Load the config from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

pub async fn run(options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(backend) = options.backend {
        config.default_backend = backend;
    }
    if options.no_retrieval {
        config.retrieval.enabled = false;
    }
    config.validate()?;

    let router = build_from_config(&config)?;
    let human: Arc<dyn HumanInput> = if options.interactive {
        Arc::new(StdinHumanInput::new())
    } else {
        Arc::new(NoHumanInput)
    };
    let workforce = compose(&config, &router, human)?;
    let task = options.message.unwrap_or_else(|| config.task.clone());
    info!(
        backends = ?router.list(),
        agents = ?workforce.agent_names(),
        retrieval = config.retrieval.enabled,
        interactive = options.interactive,
        "Starting workforce"
    );

    let mut events = workforce.event_bus.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => eprintln!("  ({skipped} events not shown)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let outcome = workforce.run(&task).await;
    // Dropping the agents closes the event bus and lets the printer finish
    drop(workforce);
    let _ = printer.await;
    let outcome = outcome?;

    println!();
    println!("  Chat ended: {}", outcome.termination);
    println!("  Messages:   {}", outcome.conversation.messages.len());
    let mut counts: Vec<_> = outcome.auto_replies.iter().collect();
    counts.sort();
    for (agent, replies) in counts {
        println!("  {agent:<12} {replies} auto-replies");
    }

    Ok(())
}

fn print_event(event: &DomainEvent) {
    match event {
        DomainEvent::MessageAppended { message, .. } => {
            println!("{} (to {}):\n", message.sender, message.recipient);
            if let Some(result) = &message.action_result {
                println!("***** Response from calling action \"{}\" *****", result.name);
            }
            if !message.content.is_empty() {
                println!("{}", message.content);
            }
            if let Some(call) = &message.action_call {
                println!("***** Suggested action call: {} *****", call.name);
                println!("Arguments: {}", call.arguments);
            }
            println!("\n{}", "-".repeat(80));
        }
        DomainEvent::CodeExecuted {
            executor, exit_code, ..
        } => {
            println!(">>>>>>>> EXECUTING CODE BLOCKS ({executor}, exit code {exit_code})...");
        }
        _ => {}
    }
}

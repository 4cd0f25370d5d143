//! Tandem CLI — the main entry point.
//!
//! Running `tandem` with no arguments hands the configured task to the
//! assistant and prints the conversation as it happens.
//!
//! Commands:
//! - `init`    — Write the default config file
//! - `config`  — Validate the config and print a summary

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tandem",
    about = "Tandem — a planner, an assistant and a user proxy working one task together",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file to use instead of ~/.tandem/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Task to hand to the assistant instead of the configured one
    #[arg(short, long)]
    message: Option<String>,

    /// Default model backend (e.g. `local` or `hosted`)
    #[arg(short, long)]
    backend: Option<String>,

    /// Run without the retrieval proxy
    #[arg(long)]
    no_retrieval: bool,

    /// Ask on stdin for feedback when the user proxy would stop
    #[arg(short, long)]
    interactive: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Validate and print a summary (default)
    Validate,
    /// Print the effective configuration as TOML
    Show,
    /// Print the default config file path
    Path,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        None => {
            commands::run::run(commands::run::RunOptions {
                config: cli.config.clone(),
                message: cli.message,
                backend: cli.backend,
                no_retrieval: cli.no_retrieval,
                interactive: cli.interactive,
            })
            .await?
        }
        Some(Commands::Init { force }) => commands::init::run(config_path, force)?,
        Some(Commands::Config { action }) => match action.unwrap_or(ConfigAction::Validate) {
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
        },
    }

    Ok(())
}

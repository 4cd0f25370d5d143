//! Sandboxed code execution for Tandem.
//!
//! Extracts fenced code blocks from agent messages and runs them in a
//! working directory, either as local processes or inside a container.

pub mod code_blocks;
pub mod executor;

use std::sync::Arc;
use std::time::Duration;

use tandem_config::ExecutionConfig;
use tandem_core::execution::CodeExecutor;

pub use code_blocks::{extract_code, infer_language, requested_filename};
pub use executor::{DockerExecutor, LocalExecutor};

/// Build the executor selected by the execution settings.
///
/// Returns `None` when code execution is disabled.
pub fn executor_from_config(config: &ExecutionConfig) -> Option<Arc<dyn CodeExecutor>> {
    if !config.enabled {
        return None;
    }
    let timeout = Duration::from_secs(config.timeout_secs);
    let executor: Arc<dyn CodeExecutor> = if config.use_docker {
        Arc::new(DockerExecutor::new(&config.work_dir, &config.docker_image, timeout))
    } else {
        Arc::new(LocalExecutor::new(&config.work_dir, timeout))
    };
    Some(executor)
}

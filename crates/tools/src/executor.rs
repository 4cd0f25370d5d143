//! Code executors — run extracted code blocks in a working directory.
//!
//! Each block is written to a file in the working directory and run with
//! an interpreter chosen by its language tag. Blocks run in order and
//! execution stops at the first failing block.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tandem_core::error::ExecutionError;
use tandem_core::execution::{CodeBlock, CodeExecutor, ExecutionReport};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::code_blocks::requested_filename;

/// Interpreter and file extension for a language tag.
fn interpreter(language: &str) -> Option<(&'static str, &'static str)> {
    match language {
        "python" | "py" | "python3" => Some(("python3", "py")),
        "sh" | "bash" | "shell" | "console" => Some(("sh", "sh")),
        _ => None,
    }
}

/// A block written to disk and ready to run.
#[derive(Debug)]
struct PreparedBlock {
    program: &'static str,
    /// Path relative to the working directory
    file_name: String,
}

/// Validate a requested file name: relative, no parent or root components.
fn checked_relative(name: &str) -> Result<PathBuf, ExecutionError> {
    let path = Path::new(name);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe || path.as_os_str().is_empty() {
        return Err(ExecutionError::PathEscape(name.to_string()));
    }
    Ok(path.to_path_buf())
}

fn generated_name(code: &str, ext: &str) -> String {
    let mut hasher = DefaultHasher::new();
    code.hash(&mut hasher);
    format!("tmp_code_{:016x}.{ext}", hasher.finish())
}

async fn prepare_block(
    work_dir: &Path,
    block: &CodeBlock,
) -> Result<Option<PreparedBlock>, ExecutionError> {
    let Some((program, ext)) = interpreter(&block.language) else {
        return Ok(None);
    };

    let relative = match requested_filename(&block.code) {
        Some(name) => checked_relative(name)?,
        None => PathBuf::from(generated_name(&block.code, ext)),
    };

    let path = work_dir.join(&relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExecutionError::WorkDir(e.to_string()))?;
    }
    tokio::fs::write(&path, &block.code)
        .await
        .map_err(|e| ExecutionError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    debug!(file = %path.display(), program, "Wrote code block");

    Ok(Some(PreparedBlock {
        program,
        file_name: relative.to_string_lossy().replace('\\', "/"),
    }))
}

/// Run a prepared command under a timeout and fold its output into a report.
async fn run_command(
    mut command: Command,
    program: &str,
    timeout: Duration,
) -> Result<ExecutionReport, ExecutionError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| ExecutionError::Spawn {
        program: program.to_string(),
        reason: e.to_string(),
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let exit_code = output.status.code().unwrap_or(-1);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let text = if exit_code == 0 || stderr.trim().is_empty() {
                format!("{stdout}{stderr}")
            } else {
                stderr.to_string()
            };
            Ok(ExecutionReport {
                exit_code,
                output: text,
            })
        }
        Ok(Err(e)) => Err(ExecutionError::Spawn {
            program: program.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => {
            warn!(program, timeout_secs = timeout.as_secs(), "Code execution timed out");
            Ok(ExecutionReport {
                exit_code: 1,
                output: "Timeout".into(),
            })
        }
    }
}

/// Shared block loop: run each block, stop at the first failure.
async fn execute_blocks<F>(
    work_dir: &Path,
    blocks: &[CodeBlock],
    mut command_for: F,
    timeout: Duration,
) -> Result<ExecutionReport, ExecutionError>
where
    F: FnMut(&PreparedBlock) -> Command,
{
    tokio::fs::create_dir_all(work_dir)
        .await
        .map_err(|e| ExecutionError::WorkDir(format!("{}: {e}", work_dir.display())))?;

    let mut output = String::new();
    let mut exit_code = 0;

    for (i, block) in blocks.iter().enumerate() {
        let Some(prepared) = prepare_block(work_dir, block).await? else {
            exit_code = 1;
            output.push_str(&format!("unknown language {}", block.language));
            break;
        };

        debug!(
            block = i,
            language = %block.language,
            file = %prepared.file_name,
            "Executing code block"
        );
        let report = run_command(command_for(&prepared), prepared.program, timeout).await?;
        output.push_str(&report.output);
        exit_code = report.exit_code;
        if exit_code != 0 {
            break;
        }
    }

    Ok(ExecutionReport { exit_code, output })
}

/// Runs code blocks as local processes inside the working directory.
pub struct LocalExecutor {
    work_dir: PathBuf,
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            timeout,
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }
}

#[async_trait]
impl CodeExecutor for LocalExecutor {
    fn name(&self) -> &str {
        "local"
    }

    async fn execute(&self, blocks: &[CodeBlock]) -> Result<ExecutionReport, ExecutionError> {
        let started = Instant::now();
        let work_dir = self.work_dir.clone();
        let report = execute_blocks(
            &self.work_dir,
            blocks,
            |prepared| {
                let mut cmd = Command::new(prepared.program);
                cmd.arg(&prepared.file_name).current_dir(&work_dir);
                cmd
            },
            self.timeout,
        )
        .await?;

        debug!(
            exit_code = report.exit_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "Local execution finished"
        );
        Ok(report)
    }
}

/// Runs code blocks inside a throwaway container with the working
/// directory mounted at `/workspace`.
pub struct DockerExecutor {
    work_dir: PathBuf,
    image: String,
    timeout: Duration,
}

impl DockerExecutor {
    pub fn new(work_dir: impl Into<PathBuf>, image: impl Into<String>, timeout: Duration) -> Self {
        Self {
            work_dir: work_dir.into(),
            image: image.into(),
            timeout,
        }
    }

    /// Arguments passed to `docker` for one prepared block.
    fn docker_args(&self, mount: &Path, program: &str, file_name: &str) -> Vec<String> {
        vec![
            "run".into(),
            "--rm".into(),
            "-v".into(),
            format!("{}:/workspace", mount.display()),
            "-w".into(),
            "/workspace".into(),
            self.image.clone(),
            program.into(),
            file_name.into(),
        ]
    }
}

#[async_trait]
impl CodeExecutor for DockerExecutor {
    fn name(&self) -> &str {
        "docker"
    }

    async fn execute(&self, blocks: &[CodeBlock]) -> Result<ExecutionReport, ExecutionError> {
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| ExecutionError::WorkDir(e.to_string()))?;
        let mount = tokio::fs::canonicalize(&self.work_dir)
            .await
            .map_err(|e| ExecutionError::WorkDir(e.to_string()))?;

        execute_blocks(
            &self.work_dir,
            blocks,
            |prepared| {
                let mut cmd = Command::new("docker");
                cmd.args(self.docker_args(&mount, prepared.program, &prepared.file_name));
                cmd
            },
            self.timeout,
        )
        .await
    }
}

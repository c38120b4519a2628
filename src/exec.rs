//! Execution engine — runs one job as an isolated child process.

use crate::error::{Result, SupervisorError};
use crate::job::JobDescriptor;
use crate::secrets::SecretStore;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::Duration;

/// Environment variable prefixes stripped before spawn — a defense against
/// leaking the supervisor's own interpreter configuration into the child.
const SANITIZED_ENV_PREFIXES: &[&str] = &["RUBY_", "GEM_"];

/// Captured stdout+stderr is bounded at this many bytes while the child is
/// running, well above the 1000-character slice ultimately stored in
/// history, to avoid OOM on pathological jobs.
const CAPTURE_LIMIT_BYTES: usize = 1 << 20;

/// Grace period between SIGTERM and SIGKILL on timeout.
const KILL_GRACE: Duration = Duration::from_secs(2);

pub struct ExecutionOutcome {
    pub success: bool,
    pub output: String,
    pub execution_time_seconds: f64,
}

/// Runs a single [`JobDescriptor`] to completion, applying environment
/// resolution, sanitization, timeout enforcement, and exit-code mapping.
pub struct ExecutionEngine {
    interpreter: String,
}

impl ExecutionEngine {
    /// `interpreter` is the external command used to run `execute.rb`
    /// (e.g. `"ruby"`), letting the supervisor delegate the scripting
    /// runtime rather than embed it.
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    pub async fn run(&self, job: &JobDescriptor, secrets: &SecretStore) -> Result<ExecutionOutcome> {
        // Re-validate presence and safety; guards against swap-out between
        // load and fire.
        let executable_path = job.path.join("execute.rb");
        if !executable_path.is_file() {
            return Err(SupervisorError::execution(format!(
                "Execution failed: executable missing at {}",
                executable_path.display()
            )));
        }

        let resolved = secrets
            .resolve(&job.environment)
            .map_err(|e| SupervisorError::execution(format!("Execution failed: {e}")))?;

        let sanitized = resolved
            .into_iter()
            .filter(|(k, _)| !SANITIZED_ENV_PREFIXES.iter().any(|p| k.starts_with(p)))
            .collect::<Vec<_>>();

        let started = Instant::now();

        let mut command = Command::new(&self.interpreter);
        command
            .arg(&executable_path)
            .current_dir(&job.path)
            .env_clear()
            .envs(sanitized)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Ok(path) = std::env::var("PATH") {
            command.env("PATH", path);
        }

        let mut child = command
            .spawn()
            .map_err(|e| SupervisorError::execution(format!("Execution failed: {e}")))?;

        let mut stdout = child.stdout.take().expect("piped stdout");
        let mut stderr = child.stderr.take().expect("piped stderr");

        // Drain both pipes on their own tasks concurrently with the wait.
        // A job whose combined output exceeds the OS pipe buffer would
        // otherwise block on write with nothing reading, wedging
        // `child.wait()` until the timeout fires and misreporting an
        // otherwise-successful job as timed out.
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let wait_result = tokio::time::timeout(
            Duration::from_secs(job.timeout_seconds),
            child.wait(),
        )
        .await;

        let status = match wait_result {
            Ok(status) => status.map_err(|e| {
                SupervisorError::execution(format!("Execution failed: {e}"))
            })?,
            Err(_) => {
                terminate(&mut child).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(SupervisorError::timeout(format!(
                    "Job timed out after {} seconds",
                    job.timeout_seconds
                )));
            }
        };

        let mut output = stdout_task.await.unwrap_or_default();
        let stderr_buf = stderr_task.await.unwrap_or_default();
        output.extend_from_slice(&stderr_buf);
        output.truncate(CAPTURE_LIMIT_BYTES);
        let output = String::from_utf8_lossy(&output).into_owned();

        let execution_time_seconds = started.elapsed().as_secs_f64();

        if status.success() {
            Ok(ExecutionOutcome {
                success: true,
                output,
                execution_time_seconds,
            })
        } else {
            let code = status.code().unwrap_or(-1);
            Err(SupervisorError::execution(format!(
                "Job failed with exit code {code}: {output}"
            )))
        }
    }
}

/// SIGTERM the child, then escalate to SIGKILL if it hasn't exited within
/// the grace period.
async fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            let _ = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM);
        }
        if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

#[cfg(test)]
#[path = "exec_tests.rs"]
mod tests;

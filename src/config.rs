//! Configuration — resolved paths and tunables for one supervisor run.
//!
//! There is no persisted configuration file: every setting here is either
//! a CLI flag or a compiled-in default, per spec.md's enumeration of the
//! scheduler and secrets CLI surfaces as the only configuration inputs.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_JOBS_DIR: &str = "./jobs";
pub const DEFAULT_HISTORY_PATH: &str = "./job_history.json";
pub const DEFAULT_SECRETS_FILE: &str = "./secrets.json.enc";
pub const DEFAULT_KEY_FILE: &str = "./secrets.key";
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Resolved configuration for one run of the scheduler supervisor binary.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub repo_url: String,
    pub jobs_dir: PathBuf,
    pub history_path: PathBuf,
    pub secrets_file: PathBuf,
    pub key_file: PathBuf,
    pub sync_interval: Duration,
    pub verbose: bool,
    pub force_sync: bool,
    /// External command used to run `execute.rb` (the job-runner
    /// interface of spec.md §6). Overridable via `GITJOB_INTERPRETER` so
    /// the supervisor need not embed the scripting runtime itself.
    pub interpreter: String,
}

impl SupervisorConfig {
    pub fn new(repo_url: String, jobs_dir: PathBuf, verbose: bool, force_sync: bool) -> Self {
        let interpreter =
            std::env::var("GITJOB_INTERPRETER").unwrap_or_else(|_| "ruby".to_string());
        Self {
            repo_url,
            jobs_dir,
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            secrets_file: PathBuf::from(DEFAULT_SECRETS_FILE),
            key_file: PathBuf::from(DEFAULT_KEY_FILE),
            sync_interval: DEFAULT_SYNC_INTERVAL,
            verbose,
            force_sync,
            interpreter,
        }
    }
}

/// Resolved configuration for one run of the secrets management binary.
#[derive(Debug, Clone)]
pub struct SecretsCliConfig {
    pub secrets_file: PathBuf,
    pub key_file: PathBuf,
}

impl SecretsCliConfig {
    pub fn new(secrets_file: PathBuf, key_file: PathBuf) -> Self {
        Self {
            secrets_file,
            key_file,
        }
    }
}

impl Default for SecretsCliConfig {
    fn default() -> Self {
        Self::new(
            PathBuf::from(DEFAULT_SECRETS_FILE),
            PathBuf::from(DEFAULT_KEY_FILE),
        )
    }
}

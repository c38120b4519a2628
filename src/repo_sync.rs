//! Repository sync — reconciles the jobs directory with a remote Git repo
//! by shelling out to the system `git` binary.

use crate::error::{Result, SupervisorError};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use url::Url;

/// Validates `repo_url` and `jobs_dir` once, at construction, then performs
/// clone-or-fast-forward-pull on demand.
#[derive(Clone)]
pub struct RepoSync {
    repo_url: String,
    jobs_dir: PathBuf,
}

impl RepoSync {
    pub fn new(repo_url: impl Into<String>, jobs_dir: impl Into<PathBuf>) -> Result<Self> {
        let repo_url = repo_url.into();
        let jobs_dir = jobs_dir.into();

        validate_repo_url(&repo_url)?;
        validate_jobs_dir(&jobs_dir)?;

        Ok(Self { repo_url, jobs_dir })
    }

    pub fn jobs_dir(&self) -> &Path {
        &self.jobs_dir
    }

    /// If `jobs_dir/.git` exists, fast-forward pull; otherwise clear any
    /// existing contents and clone fresh.
    pub async fn sync(&self) -> Result<()> {
        if self.jobs_dir.join(".git").exists() {
            self.pull().await
        } else {
            self.clone_fresh().await
        }
    }

    async fn pull(&self) -> Result<()> {
        let output = Command::new("git")
            .args(["pull", "--ff-only"])
            .current_dir(&self.jobs_dir)
            .output()
            .await
            .map_err(|e| SupervisorError::git(format!("Failed to sync repository: {e}")))?;

        if !output.status.success() {
            return Err(SupervisorError::git(format!(
                "Failed to sync repository: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    async fn clone_fresh(&self) -> Result<()> {
        if self.jobs_dir.exists() {
            let mut entries = tokio::fs::read_dir(&self.jobs_dir)
                .await
                .map_err(|e| SupervisorError::git(format!("Failed to sync repository: {e}")))?;
            if entries
                .next_entry()
                .await
                .map_err(|e| SupervisorError::git(format!("Failed to sync repository: {e}")))?
                .is_some()
            {
                tokio::fs::remove_dir_all(&self.jobs_dir)
                    .await
                    .map_err(|e| {
                        SupervisorError::git(format!("Failed to sync repository: {e}"))
                    })?;
            }
        }

        if let Some(parent) = self.jobs_dir.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SupervisorError::git(format!("Failed to sync repository: {e}")))?;
        }

        let output = Command::new("git")
            .args(["clone", &self.repo_url])
            .arg(&self.jobs_dir)
            .output()
            .await
            .map_err(|e| SupervisorError::git(format!("Failed to sync repository: {e}")))?;

        if !output.status.success() {
            return Err(SupervisorError::git(format!(
                "Failed to sync repository: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        Ok(())
    }

    /// `"not_cloned"` summary when `.git` is absent, the short commit sha
    /// and date when present, or an error summary if `git log` fails.
    pub async fn repository_status(&self) -> RepositoryStatus {
        if !self.jobs_dir.join(".git").exists() {
            return RepositoryStatus::NotCloned;
        }

        let output = Command::new("git")
            .args(["log", "-1", "--format=%h %cI"])
            .current_dir(&self.jobs_dir)
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                let text = String::from_utf8_lossy(&output.stdout);
                let mut parts = text.trim().splitn(2, ' ');
                match (parts.next(), parts.next()) {
                    (Some(sha), Some(date)) if !sha.is_empty() => RepositoryStatus::Healthy {
                        last_commit: sha.to_string(),
                        last_commit_date: date.to_string(),
                    },
                    _ => RepositoryStatus::Error {
                        message: "git log returned no commit".to_string(),
                    },
                }
            }
            Ok(output) => RepositoryStatus::Error {
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => RepositoryStatus::Error {
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryStatus {
    NotCloned,
    Healthy {
        last_commit: String,
        last_commit_date: String,
    },
    Error {
        message: String,
    },
}

fn validate_repo_url(repo_url: &str) -> Result<()> {
    if is_ssh_shorthand(repo_url) {
        return Ok(());
    }
    match Url::parse(repo_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https" | "git" | "ssh") => Ok(()),
        _ => Err(SupervisorError::validation(format!(
            "Invalid repository URL: {repo_url}"
        ))),
    }
}

/// `user@host:path`, the scp-like shorthand Git itself accepts.
fn is_ssh_shorthand(repo_url: &str) -> bool {
    let Some((user_host, path)) = repo_url.split_once(':') else {
        return false;
    };
    if path.is_empty() || path.starts_with("//") {
        return false;
    }
    let Some((user, host)) = user_host.split_once('@') else {
        return false;
    };
    !user.is_empty() && !host.is_empty() && !host.contains('/')
}

fn validate_jobs_dir(jobs_dir: &Path) -> Result<()> {
    if jobs_dir
        .components()
        .any(|c| c.as_os_str() == std::ffi::OsStr::new(".."))
    {
        return Err(SupervisorError::validation(format!(
            "jobs_dir must not contain '..' path segments: {}",
            jobs_dir.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "repo_sync_tests.rs"]
mod tests;

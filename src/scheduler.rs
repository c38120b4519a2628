//! Scheduler core — owns the cron engine, the sync cadence, active-job
//! tracking, and history integration.

use crate::error::{Result, SupervisorError};
use crate::exec::ExecutionEngine;
use crate::history::{FailureProjection, History, Stats};
use crate::job::JobDescriptor;
use crate::repo_sync::{RepoSync, RepositoryStatus};
use crate::secrets::SecretStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

/// How many of the most recent failures `health_check` surfaces.
const HEALTH_CHECK_FAILURE_SAMPLE: usize = 10;

#[allow(dead_code)]
struct ActiveExecution {
    job_name: String,
    started_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub active_jobs: usize,
    pub total_executions: usize,
    pub recent_failures: Vec<FailureProjection>,
    pub repository_status: RepositoryStatus,
}

/// Owns every moving part required to keep jobs registered and firing:
/// the cron dispatcher, the working-tree sync, the active-executions map,
/// and the shared history/secrets stores handed to each job it runs.
pub struct Scheduler {
    repo_sync: RepoSync,
    jobs_dir: PathBuf,
    history: Arc<History>,
    secrets: Arc<SecretStore>,
    engine: Arc<ExecutionEngine>,
    sched: tokio::sync::Mutex<JobScheduler>,
    /// job name -> its currently-registered (non-reserved) scheduler entry.
    entries: Mutex<HashMap<String, Uuid>>,
    active_jobs: Mutex<HashMap<String, ActiveExecution>>,
    reserved_entry_id: Mutex<Option<Uuid>>,
    /// Cadence of the reserved sync+reload entry. The single source of
    /// truth for that cadence: `register_reserved_entry` derives its cron
    /// expression from this field rather than a separate constant.
    sync_interval: Duration,
}

impl Scheduler {
    /// Validates `repo_url`/`jobs_dir`, creates `jobs_dir` if absent, and
    /// starts (but does not register anything on) the cron dispatcher.
    pub async fn new(
        repo_url: impl Into<String>,
        jobs_dir: impl Into<PathBuf>,
        history_path: impl Into<PathBuf>,
        secrets_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
        interpreter: impl Into<String>,
        sync_interval: Duration,
    ) -> Result<Arc<Self>> {
        let jobs_dir = jobs_dir.into();
        let repo_sync = RepoSync::new(repo_url, jobs_dir.clone())?;

        std::fs::create_dir_all(&jobs_dir)
            .map_err(|e| SupervisorError::configuration(format!("Cannot create jobs dir: {e}")))?;

        let sched = JobScheduler::new()
            .await
            .map_err(|e| SupervisorError::configuration(format!("Failed to start scheduler: {e}")))?;

        Ok(Arc::new(Self {
            repo_sync,
            jobs_dir,
            history: Arc::new(History::load(history_path)),
            secrets: Arc::new(SecretStore::new(secrets_path, key_path)),
            engine: Arc::new(ExecutionEngine::new(interpreter)),
            sched: tokio::sync::Mutex::new(sched),
            entries: Mutex::new(HashMap::new()),
            active_jobs: Mutex::new(HashMap::new()),
            reserved_entry_id: Mutex::new(None),
            sync_interval,
        }))
    }

    /// Registers the reserved sync+reload entry, performs one immediate
    /// sync+reload, starts the dispatcher, and blocks until interrupted.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        self.register_reserved_entry().await?;
        self.force_sync().await?;

        self.sched
            .lock()
            .await
            .start()
            .await
            .map_err(|e| SupervisorError::configuration(format!("Failed to start scheduler: {e}")))?;

        tracing::info!("Scheduler started, watching {}", self.jobs_dir.display());
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
        self.shutdown().await
    }

    pub async fn shutdown(self: &Arc<Self>) -> Result<()> {
        self.sched
            .lock()
            .await
            .shutdown()
            .await
            .map_err(|e| SupervisorError::configuration(format!("Failed to shut down scheduler: {e}")))
    }

    async fn register_reserved_entry(self: &Arc<Self>) -> Result<()> {
        let cron_expr = interval_to_cron(self.sync_interval);
        let this = Arc::clone(self);
        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _scheduler| {
            let this = Arc::clone(&this);
            Box::pin(async move {
                if let Err(e) = this.force_sync().await {
                    tracing::error!("Reserved sync+reload failed: {e}");
                }
            })
        })
        .map_err(|e| SupervisorError::configuration(format!("Failed to register reserved entry: {e}")))?;

        let id = self
            .sched
            .lock()
            .await
            .add(job)
            .await
            .map_err(|e| SupervisorError::configuration(format!("Failed to register reserved entry: {e}")))?;

        *self.reserved_entry_id.lock().unwrap() = Some(id);
        Ok(())
    }

    /// Performs one `sync()` + `reload()` synchronously.
    pub async fn force_sync(self: &Arc<Self>) -> Result<()> {
        self.repo_sync.sync().await?;
        self.reload().await
    }

    /// Cancels every non-reserved entry, then re-scans `jobs_dir` and
    /// registers a fresh entry per valid job directory. Jobs that fail to
    /// load are logged and skipped; other jobs continue to be considered.
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let reserved = *self.reserved_entry_id.lock().unwrap();
        let stale_entries: Vec<Uuid> = self
            .entries
            .lock()
            .unwrap()
            .drain()
            .map(|(_, id)| id)
            .collect();

        {
            let mut sched = self.sched.lock().await;
            for id in stale_entries {
                if Some(id) != reserved {
                    let _ = sched.remove(&id).await;
                }
            }
        }

        let dir_entries = match std::fs::read_dir(&self.jobs_dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Err(SupervisorError::configuration(format!(
                    "Failed to scan jobs directory: {e}"
                )));
            }
        };

        for entry in dir_entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !JobDescriptor::valid(&path) {
                continue;
            }

            match JobDescriptor::load(&name, &path) {
                Ok(descriptor) => {
                    if let Err(e) = self.register_job(descriptor).await {
                        tracing::error!("Failed to load job '{name}': {e}");
                    }
                }
                Err(SupervisorError::Configuration(msg)) => {
                    tracing::error!("Failed to load job '{name}': {msg}");
                }
                Err(SupervisorError::Security(msg)) => {
                    tracing::error!("Failed to load job '{name}': {msg}");
                }
                Err(e) => {
                    tracing::error!("Failed to load job '{name}': {e}");
                }
            }
        }
        Ok(())
    }

    async fn register_job(self: &Arc<Self>, descriptor: JobDescriptor) -> Result<()> {
        let name = descriptor.name.clone();
        let cron_expr = to_scheduler_cron(&descriptor.schedule);
        let this = Arc::clone(self);

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _scheduler| {
            let this = Arc::clone(&this);
            let descriptor = descriptor.clone();
            Box::pin(async move {
                this.dispatch(descriptor).await;
            })
        })
        .map_err(|e| SupervisorError::configuration(format!("Failed to register job '{name}': {e}")))?;

        let id = self
            .sched
            .lock()
            .await
            .add(job)
            .await
            .map_err(|e| SupervisorError::configuration(format!("Failed to register job '{name}': {e}")))?;

        self.entries.lock().unwrap().insert(name, id);
        Ok(())
    }

    /// Runs one firing of `descriptor`: allocate an execution id, track it
    /// as active, run it, then record the outcome in history.
    async fn dispatch(self: &Arc<Self>, descriptor: JobDescriptor) {
        let execution_id = Uuid::new_v4().to_string();
        self.active_jobs.lock().unwrap().insert(
            execution_id.clone(),
            ActiveExecution {
                job_name: descriptor.name.clone(),
                started_at: Instant::now(),
            },
        );

        let (success, elapsed, output) = match self.engine.run(&descriptor, &self.secrets).await {
            Ok(outcome) => (true, outcome.execution_time_seconds, outcome.output),
            Err(SupervisorError::Timeout(msg)) => {
                tracing::error!("{msg}");
                (false, descriptor.timeout_seconds as f64, msg)
            }
            Err(SupervisorError::Execution(msg)) => {
                tracing::error!("{msg}");
                (false, 0.0, msg)
            }
            Err(e) => {
                tracing::error!("Unexpected error executing job '{}': {e}", descriptor.name);
                (false, 0.0, e.to_string())
            }
        };

        self.history.add(&descriptor.name, success, elapsed, &output);
        self.active_jobs.lock().unwrap().remove(&execution_id);
    }

    pub async fn health_check(&self) -> HealthCheck {
        HealthCheck {
            status: "healthy",
            active_jobs: self.active_jobs.lock().unwrap().len(),
            total_executions: self.history.total(),
            recent_failures: self.history.recent_failures(HEALTH_CHECK_FAILURE_SAMPLE),
            repository_status: self.repo_sync.repository_status().await,
        }
    }

    pub fn job_stats(&self) -> Stats {
        self.history.stats()
    }
}

/// `tokio-cron-scheduler` expects a seconds-leading cron expression; job
/// schedules are authored in the conventional 5-field form, so a `0 ` is
/// prepended when needed.
fn to_scheduler_cron(schedule: &str) -> String {
    if schedule.split_whitespace().count() == 5 {
        format!("0 {schedule}")
    } else {
        schedule.to_string()
    }
}

/// Renders the reserved entry's cadence as a minute-stepped cron
/// expression. Sub-minute intervals round up to one minute.
fn interval_to_cron(interval: Duration) -> String {
    let minutes = (interval.as_secs() / 60).max(1);
    format!("0 */{minutes} * * * *")
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;

//! GitOps-driven cron supervisor — keeps a local working tree synchronized
//! with a remote repository and runs the jobs found in it on their declared
//! cron schedules, with per-execution isolation, bounded runtime, secret
//! injection, and durable execution history.

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names
)]

pub mod config;
pub mod error;
pub mod exec;
pub mod history;
pub mod job;
pub mod logging;
pub mod repo_sync;
pub mod scheduler;
pub mod secrets;

pub use config::{SecretsCliConfig, SupervisorConfig};
pub use error::{Result, SupervisorError};
pub use scheduler::Scheduler;

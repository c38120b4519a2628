//! Job definition — parses and validates one job directory into an
//! executable descriptor.

use crate::error::{Result, SupervisorError};
use crate::secrets::SecretStore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.yml";
const EXECUTABLE_FILE: &str = "execute.rb";

/// Executable bytes are scanned only up to this many bytes. A documented
/// shallow check, not a security boundary.
const EXECUTABLE_SCAN_LIMIT: usize = 1024;

const FORBIDDEN_EXECUTABLE_SUBSTRINGS: &[&str] = &["`", "system(", "exec("];

/// Standard YAML core-schema scalar/collection tags. Anything tagged `!!foo`
/// where `foo` isn't in this set (notably `ruby/…`, `python/…`) is rejected
/// before the document is ever handed to a parser.
const ALLOWED_YAML_TAGS: &[&str] = &[
    "str", "int", "float", "bool", "null", "map", "seq", "binary", "timestamp", "set", "omap",
    "pairs", "merge", "value",
];

const SCHEDULE_CHARS: &str = "0123456789 */,-";

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn is_valid_schedule(schedule: &str) -> bool {
    !schedule.is_empty() && schedule.chars().all(|c| SCHEDULE_CHARS.contains(c))
}

/// The closed shape accepted from `config.yml`. Unknown keys are rejected —
/// this is the "strict safe loader" the job-definition contract asks for.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    schedule: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    environment: Option<BTreeMap<String, String>>,
}

/// An immutable, validated job ready for scheduling. Produced once per
/// reload pass by [`JobDescriptor::load`]; discarded on the next reload.
#[derive(Debug, Clone)]
pub struct JobDescriptor {
    pub name: String,
    pub path: PathBuf,
    pub schedule: String,
    pub description: Option<String>,
    pub timeout_seconds: u64,
    /// Raw, unresolved value expressions keyed by environment variable name.
    pub environment: BTreeMap<String, String>,
}

impl JobDescriptor {
    /// Cheap existence check used to skip directories that aren't complete
    /// job definitions yet: both required files must exist.
    pub fn valid(path: &Path) -> bool {
        path.join(CONFIG_FILE).is_file() && path.join(EXECUTABLE_FILE).is_file()
    }

    /// Build and validate a descriptor from `path`, under job name `name`.
    pub fn load(name: &str, path: impl Into<PathBuf>) -> Result<Self> {
        if !is_valid_name(name) {
            return Err(SupervisorError::validation(format!(
                "Invalid job name: {name:?}"
            )));
        }

        let path = path.into();
        let path = path
            .canonicalize()
            .map_err(|e| SupervisorError::configuration(format!("Cannot resolve path: {e}")))?;
        if !path.is_dir() {
            return Err(SupervisorError::configuration(format!(
                "Job path is not a directory: {}",
                path.display()
            )));
        }

        let config_path = path.join(CONFIG_FILE);
        let executable_path = path.join(EXECUTABLE_FILE);

        let config_text = fs::read_to_string(&config_path).map_err(|e| {
            SupervisorError::configuration(format!("Cannot read {CONFIG_FILE}: {e}"))
        })?;
        scan_yaml_for_unsafe_tags(&config_text)?;

        let raw: RawConfig = serde_yaml::from_str(&config_text)
            .map_err(|e| SupervisorError::validation(format!("Invalid {CONFIG_FILE}: {e}")))?;

        if !is_valid_schedule(&raw.schedule) {
            return Err(SupervisorError::validation(format!(
                "Invalid schedule expression: {:?}",
                raw.schedule
            )));
        }

        let timeout_seconds = match raw.timeout {
            Some(t) if (1..=3600).contains(&t) => t,
            Some(t) => {
                return Err(SupervisorError::validation(format!(
                    "timeout out of range [1, 3600]: {t}"
                )));
            }
            None => 300,
        };

        let environment = raw.environment.unwrap_or_default();
        for key in environment.keys() {
            if !is_valid_env_name(key) {
                return Err(SupervisorError::validation(format!(
                    "Invalid environment variable name: {key}"
                )));
            }
        }

        scan_executable_for_unsafe_constructs(&executable_path)?;

        Ok(Self {
            name: name.to_string(),
            path,
            schedule: raw.schedule,
            description: raw.description,
            timeout_seconds,
            environment,
        })
    }

    /// Resolve this job's environment through `secrets`. Resolution failures
    /// (missing secret, unavailable store) never fail the descriptor: a
    /// warning is emitted to the log and the unresolved mapping is returned
    /// verbatim so the scheduler keeps the job registered.
    pub fn environment(&self, secrets: &SecretStore) -> BTreeMap<String, String> {
        match secrets.resolve(&self.environment) {
            Ok(resolved) => resolved.into_iter().collect(),
            Err(e) => {
                tracing::warn!("Warning: Failed to resolve secrets for job '{}': {e}", self.name);
                self.environment.clone()
            }
        }
    }
}

fn scan_yaml_for_unsafe_tags(text: &str) -> Result<()> {
    let mut rest = text;
    while let Some(idx) = rest.find("!!") {
        let after = &rest[idx + 2..];
        let tag: String = after
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '/' || *c == '_')
            .collect();
        let tag_name = tag.split('/').next().unwrap_or("");
        if !ALLOWED_YAML_TAGS.contains(&tag_name) {
            return Err(SupervisorError::security(format!(
                "Configuration contains unsafe type tag: !!{tag}"
            )));
        }
        rest = &after[tag.len()..];
    }
    Ok(())
}

fn scan_executable_for_unsafe_constructs(executable_path: &Path) -> Result<()> {
    let bytes = fs::read(executable_path).map_err(|e| {
        SupervisorError::configuration(format!("Cannot read {EXECUTABLE_FILE}: {e}"))
    })?;
    let prefix = &bytes[..bytes.len().min(EXECUTABLE_SCAN_LIMIT)];
    let text = String::from_utf8_lossy(prefix);
    for forbidden in FORBIDDEN_EXECUTABLE_SUBSTRINGS {
        if text.contains(forbidden) {
            return Err(SupervisorError::security(
                "Job script contains unsafe system calls",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

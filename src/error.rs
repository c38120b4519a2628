use thiserror::Error;

/// Stable error taxonomy used for control flow and operator reporting.
///
/// Each variant matches one kind from the supervisor's error taxonomy.
/// Components that the scheduler core needs to branch on (different log
/// level, retry policy, or propagation) return `Result<T>`; ad-hoc
/// internal plumbing still uses `anyhow::Result` and funnels into
/// `Other` at the boundary.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Input violates a documented rule (bad name, bad schedule, bad env name, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// A rule intended to prevent dangerous behaviour was violated. Never
    /// swallowed — always logged at error level by the caller.
    #[error("security error: {0}")]
    Security(String),

    /// Well-formed input that is nonetheless inconsistent with an invariant.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The job process ran and signaled failure.
    #[error("execution error: {0}")]
    Execution(String),

    /// The job process exceeded its timeout budget.
    #[error("timeout error: {0}")]
    Timeout(String),

    /// Repository synchronization failed.
    #[error("git error: {0}")]
    Git(String),

    /// Fallthrough for ad-hoc context chains built with `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SupervisorError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn security(msg: impl Into<String>) -> Self {
        Self::Security(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn git(msg: impl Into<String>) -> Self {
        Self::Git(msg.into())
    }

    /// Name of the kind, stable for matching/logging (`"validation"`, `"security"`, ...).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Security(_) => "security",
            Self::Configuration(_) => "configuration",
            Self::Execution(_) => "execution",
            Self::Timeout(_) => "timeout",
            Self::Git(_) => "git",
            Self::Other(_) => "other",
        }
    }
}

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, SupervisorError>;

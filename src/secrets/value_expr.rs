use std::path::PathBuf;

/// A job's environment value is one of a small, fixed set of shapes: a
/// literal string, or a reference to be resolved at execution time. This is
/// modeled as a discriminated union parsed once from the raw string rather
/// than re-matched with prefix checks at every point of use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueExpression {
    Literal(String),
    Secret(String),
    Env(String),
    File(PathBuf),
}

impl ValueExpression {
    /// Parse a raw config value. The prefix is matched exactly at the start
    /// of the string; anything that doesn't match `secret:`, `env:`, or
    /// `file:` is a literal.
    pub fn parse(raw: &str) -> Self {
        if let Some(key) = raw.strip_prefix("secret:") {
            Self::Secret(key.to_string())
        } else if let Some(var) = raw.strip_prefix("env:") {
            Self::Env(var.to_string())
        } else if let Some(path) = raw.strip_prefix("file:") {
            Self::File(PathBuf::from(path))
        } else {
            Self::Literal(raw.to_string())
        }
    }
}

impl std::fmt::Display for ValueExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(s) => write!(f, "{s}"),
            Self::Secret(k) => write!(f, "secret:{k}"),
            Self::Env(v) => write!(f, "env:{v}"),
            Self::File(p) => write!(f, "file:{}", p.display()),
        }
    }
}

use thiserror::Error;

use crate::core::params::ValueKind;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Config error: {0}")]
    Config(String),

    #[error("No default pipeline document configured")]
    NoDefaultDocument,

    #[error("Missing parameter: {key}")]
    MissingParameter { key: String },

    #[error("Type mismatch for parameter '{key}': expected {expected}, got {actual}")]
    TypeMismatch {
        key: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Invalid task '{name}': {}", .violations.join("; "))]
    InvalidNode {
        name: String,
        violations: Vec<String>,
    },

    #[error("Duplicate task name: {0}")]
    DuplicateName(String),

    #[error("Task '{node}' references unknown upstream '{missing}'")]
    UnknownUpstream { node: String, missing: String },

    #[error("Cycle detected: {}", .path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Pipeline graph is validated; no tasks can be added")]
    GraphFrozen,

    #[error("Pipeline graph has not been validated")]
    NotValidated,

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Malformed value for '{key}': {reason}")]
    MalformedValue { key: String, reason: String },

    #[error("Unexpected nesting: {0}")]
    UnknownNesting(String),

    #[error("Unknown task type: {0}")]
    UnknownTask(String),

    #[error("Syntax error: {0}")]
    Syntax(String),

    #[error("Pipeline document has {} issue(s):\n{}", .0.len(), format_issues(.0))]
    DocumentLoad(Vec<Issue>),
}

impl Error {
    /// Individual issues of a `DocumentLoad` failure, empty for every other kind.
    pub fn issues(&self) -> &[Issue] {
        match self {
            Error::DocumentLoad(issues) => issues,
            _ => &[],
        }
    }
}

/// One problem found while loading a pipeline document.
///
/// `section` names the offending task section when the problem belongs to one.
#[derive(Debug)]
pub struct Issue {
    pub section: Option<String>,
    pub error: Error,
}

impl Issue {
    pub fn new(section: impl Into<String>, error: Error) -> Self {
        Self {
            section: Some(section.into()),
            error,
        }
    }

    /// An issue outside of any task section (preamble keys, broken headers).
    pub fn global(error: Error) -> Self {
        Self {
            section: None,
            error,
        }
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.section {
            Some(section) => write!(f, "[{}] {}", section, self.error),
            None => write!(f, "{}", self.error),
        }
    }
}

fn format_issues(issues: &[Issue]) -> String {
    issues
        .iter()
        .map(|issue| format!("  - {}", issue))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, Error>;

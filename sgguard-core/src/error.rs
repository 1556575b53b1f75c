//! Tool-level errors
//!
//! These abort a run before any finding is produced. Problems with the
//! content of a well-formed request are findings, never `LoadError`s.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that prevent validation from running
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed YAML, or a policy that does not deserialize
    ///
    /// `message` already names the position when serde_yaml knows it.
    #[error("YAML error: {message}")]
    Parse {
        path: PathBuf,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    /// The request lacks a structure every check depends on
    #[error("{message}")]
    Schema { path: PathBuf, message: String },

    /// The guardrail policy parsed but is not usable
    #[error("invalid guardrail policy: {}", problems.join("; "))]
    Policy { path: PathBuf, problems: Vec<String> },

    /// The guardrail policy declares a version this tool does not know
    #[error("unsupported guardrail policy version {found} (supported: {supported})")]
    UnsupportedPolicyVersion {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// A request or policy file could not be located
    #[error("{message}")]
    NotFound { path: PathBuf, message: String },
}

impl LoadError {
    /// File the error refers to
    pub fn path(&self) -> &Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::Schema { path, .. }
            | LoadError::Policy { path, .. }
            | LoadError::UnsupportedPolicyVersion { path, .. }
            | LoadError::NotFound { path, .. } => path,
        }
    }

    pub fn schema(path: &Path, message: impl Into<String>) -> Self {
        Self::Schema {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn not_found(path: &Path, message: impl Into<String>) -> Self {
        Self::NotFound {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Wrap a serde_yaml error, keeping its position when known
    pub fn yaml(path: &Path, error: &serde_yaml::Error) -> Self {
        let location = error.location();
        Self::Parse {
            path: path.to_path_buf(),
            line: location.as_ref().map(|l| l.line()),
            column: location.as_ref().map(|l| l.column()),
            message: error.to_string(),
        }
    }
}

/// Result type for loading operations
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let error = LoadError::Parse {
            path: PathBuf::from("security-groups.yaml"),
            line: Some(3),
            column: Some(7),
            message: "did not find expected key at line 3 column 7".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "YAML error: did not find expected key at line 3 column 7"
        );
        assert_eq!(error.path(), Path::new("security-groups.yaml"));
    }

    #[test]
    fn policy_error_lists_problems() {
        let error = LoadError::Policy {
            path: PathBuf::from("guardrails.yaml"),
            problems: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(error.to_string(), "invalid guardrail policy: a; b");
    }
}

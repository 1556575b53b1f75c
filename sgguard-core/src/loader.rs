//! Loader - Read the request and guardrail policy documents
//!
//! Everything that makes a run impossible is decided here and returned as a
//! [`LoadError`]. Whatever survives is handed on as a parsed document for the
//! content checks, which report problems as findings instead.

use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{LoadError, LoadResult};
use crate::policy::{GuardrailPolicy, Guardrails};

/// File names searched for when a directory is given as the request path
pub const REQUEST_FILE_NAMES: [&str; 2] = ["security-groups.yaml", "security-groups.yml"];

/// File name searched for when no policy path is given
pub const POLICY_FILE_NAME: &str = "guardrails.yaml";

/// Top-level keys every request must carry
const REQUIRED_KEYS: [&str; 2] = ["account_id", "security_groups"];

/// A request that passed the fatal checks
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDocument {
    /// File the document was read from
    pub path: PathBuf,
    /// Normalised 12-digit account ID
    pub account_id: String,
    /// The document root, untyped below the fatal checks
    pub root: Mapping,
}

/// Resolve a request argument to a file
///
/// A directory is searched for the conventional request file names.
pub fn resolve_request_path(path: &Path) -> LoadResult<PathBuf> {
    if !path.exists() {
        return Err(LoadError::not_found(
            path,
            format!("no such file or directory: {}", path.display()),
        ));
    }
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    REQUEST_FILE_NAMES
        .iter()
        .map(|name| path.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| {
            LoadError::not_found(
                path,
                format!(
                    "no {} found in directory {}",
                    REQUEST_FILE_NAMES.join(" or "),
                    path.display()
                ),
            )
        })
}

/// Find the nearest `guardrails.yaml`, walking up from `start`
pub fn discover_policy(start: &Path) -> Option<PathBuf> {
    let start = if start.is_dir() {
        start
    } else {
        start.parent()?
    };
    start
        .ancestors()
        .map(|dir| dir.join(POLICY_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

fn read(path: &Path) -> LoadResult<String> {
    std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and check a guardrail policy file
pub fn load_policy(path: &Path) -> LoadResult<Guardrails> {
    log::debug!("Loading guardrail policy from {}", path.display());
    let content = read(path)?;
    parse_policy(&content, path)
}

/// Parse and check a guardrail policy document
pub fn parse_policy(content: &str, path: &Path) -> LoadResult<Guardrails> {
    // An empty file is an all-defaults policy
    let policy: GuardrailPolicy = if content.trim().is_empty() {
        GuardrailPolicy::default()
    } else {
        serde_yaml::from_str(content).map_err(|e| LoadError::yaml(path, &e))?
    };

    if policy.version > GuardrailPolicy::CURRENT_VERSION {
        return Err(LoadError::UnsupportedPolicyVersion {
            path: path.to_path_buf(),
            found: policy.version,
            supported: GuardrailPolicy::CURRENT_VERSION,
        });
    }

    policy.compile().map_err(|problems| LoadError::Policy {
        path: path.to_path_buf(),
        problems,
    })
}

/// Load a request file, or the request file inside a directory
pub fn load_request(path: &Path) -> LoadResult<RequestDocument> {
    let path = resolve_request_path(path)?;
    log::debug!("Loading security group request from {}", path.display());
    let content = read(&path)?;
    parse_request(&content, &path)
}

/// Parse a request document and apply the fatal checks
pub fn parse_request(content: &str, path: &Path) -> LoadResult<RequestDocument> {
    let value: Value = serde_yaml::from_str(content).map_err(|e| LoadError::yaml(path, &e))?;

    let root = match value {
        Value::Mapping(root) => root,
        Value::Null => return Err(LoadError::schema(path, "request document is empty")),
        other => {
            return Err(LoadError::schema(
                path,
                format!(
                    "request document must be a mapping, got {}",
                    crate::schema::value_type_name(&other)
                ),
            ));
        }
    };

    let missing: Vec<&str> = REQUIRED_KEYS
        .into_iter()
        .filter(|key| !root.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        let noun = if missing.len() == 1 { "key" } else { "keys" };
        return Err(LoadError::schema(
            path,
            format!("missing required top-level {}: {}", noun, missing.join(", ")),
        ));
    }

    let account_id = account_id(root.get("account_id"))
        .map_err(|message| LoadError::schema(path, message))?;

    Ok(RequestDocument {
        path: path.to_path_buf(),
        account_id,
        root,
    })
}

/// Normalise `account_id`, accepting an unquoted 12-digit number
fn account_id(value: Option<&Value>) -> Result<String, String> {
    let rendered = match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) if n.is_u64() => n.to_string(),
        Some(Value::Null) | None => return Err("account_id must not be empty".to_string()),
        Some(other) => {
            return Err(format!(
                "account_id must be a 12-digit string, got {}",
                crate::schema::value_type_name(other)
            ));
        }
    };

    if is_account_id(&rendered) {
        Ok(rendered)
    } else {
        Err(format!(
            "account_id '{}' must be exactly 12 digits (got {} characters)",
            rendered,
            rendered.chars().count()
        ))
    }
}

/// `^[0-9]{12}$`
pub fn is_account_id(s: &str) -> bool {
    s.len() == 12 && s.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> LoadResult<RequestDocument> {
        parse_request(yaml, Path::new("security-groups.yaml"))
    }

    #[test]
    fn parses_minimal_request() {
        let doc = parse("account_id: \"123456789012\"\nsecurity_groups: {}\n").unwrap();
        assert_eq!(doc.account_id, "123456789012");
        assert!(doc.root.contains_key("security_groups"));
    }

    #[test]
    fn unquoted_account_id_is_accepted() {
        let doc = parse("account_id: 123456789012\nsecurity_groups: {}\n").unwrap();
        assert_eq!(doc.account_id, "123456789012");
    }

    #[test]
    fn short_account_id_is_fatal() {
        let err = parse("account_id: \"12345\"\nsecurity_groups: {}\n").unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }));
        assert!(err.to_string().contains("12 digits"));
    }

    #[test]
    fn account_id_with_letters_is_fatal() {
        let err = parse("account_id: \"12345678901a\"\nsecurity_groups: {}\n").unwrap_err();
        assert!(matches!(err, LoadError::Schema { .. }));
    }

    #[test]
    fn missing_keys_are_listed() {
        let err = parse("environment: production\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required top-level keys: account_id, security_groups"
        );

        let err = parse("account_id: \"123456789012\"\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required top-level key: security_groups"
        );
    }

    #[test]
    fn empty_and_non_mapping_documents_are_fatal() {
        assert!(matches!(parse(""), Err(LoadError::Schema { .. })));
        assert!(matches!(parse("- a\n- b\n"), Err(LoadError::Schema { .. })));
    }

    #[test]
    fn malformed_yaml_reports_position() {
        let err = parse("account_id: \"123456789012\"\nsecurity_groups: [\n").unwrap_err();
        match err {
            LoadError::Parse { line, .. } => assert!(line.is_some()),
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn directory_resolves_conventional_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("security-groups.yml");
        fs::write(&file, "account_id: \"123456789012\"\nsecurity_groups: {}\n").unwrap();

        assert_eq!(resolve_request_path(dir.path()).unwrap(), file);
        let doc = load_request(dir.path()).unwrap();
        assert_eq!(doc.path, file);
    }

    #[test]
    fn directory_without_request_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = resolve_request_path(dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
        assert!(err.to_string().contains("security-groups.yaml"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_request(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::NotFound { .. }));
    }

    #[test]
    fn policy_is_discovered_in_ancestors() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("accounts").join("123456789012");
        fs::create_dir_all(&nested).unwrap();
        let policy = dir.path().join(POLICY_FILE_NAME);
        fs::write(&policy, "version: 1\n").unwrap();

        let request = nested.join("security-groups.yaml");
        fs::write(&request, "").unwrap();
        assert_eq!(discover_policy(&request), Some(policy.clone()));
        assert_eq!(discover_policy(&nested), Some(policy));
    }

    #[test]
    fn empty_policy_uses_defaults() {
        let guardrails = parse_policy("", Path::new("guardrails.yaml")).unwrap();
        assert_eq!(guardrails.policy, GuardrailPolicy::default());
    }

    #[test]
    fn future_policy_version_is_rejected() {
        let err = parse_policy("version: 2\n", Path::new("guardrails.yaml")).unwrap_err();
        assert!(matches!(
            err,
            LoadError::UnsupportedPolicyVersion {
                found: 2,
                supported: 1,
                ..
            }
        ));
    }

    #[test]
    fn invalid_policy_shape_is_fatal() {
        let err = parse_policy("blocked_portz: [23]\n", Path::new("guardrails.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Parse { .. }));

        let err = parse_policy("naming_pattern: '('\n", Path::new("guardrails.yaml")).unwrap_err();
        assert!(matches!(err, LoadError::Policy { .. }));
    }

    #[test]
    fn load_policy_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(POLICY_FILE_NAME);
        fs::write(&path, "blocked_ports: [23]\nmax_port_range: 100\n").unwrap();
        let guardrails = load_policy(&path).unwrap();
        assert_eq!(guardrails.policy.max_port_range, 100);
        assert_eq!(guardrails.policy.blocked_ports.len(), 1);
    }
}

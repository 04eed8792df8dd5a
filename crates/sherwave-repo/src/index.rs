//! Repository index types
//!
//! An `index.yaml` served at the repository root lists every pack version
//! with its download URLs and digest.

use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::error::{RepoError, Result};

/// Repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    #[serde(default = "default_api_version")]
    pub api_version: String,

    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Pack versions keyed by pack name
    #[serde(default)]
    pub entries: HashMap<String, Vec<PackEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for RepositoryIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: None,
            entries: HashMap::new(),
        }
    }
}

/// Semver ordering, unparsable versions sorting below parsable ones
fn compare_versions(a: &PackEntry, b: &PackEntry) -> Ordering {
    match (a.parsed_version(), b.parsed_version()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.version.cmp(&b.version),
    }
}

impl RepositoryIndex {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Highest version of a pack
    pub fn get_latest(&self, name: &str) -> Option<&PackEntry> {
        self.entries.get(name)?.iter().max_by(|a, b| compare_versions(a, b))
    }

    /// Highest version of a pack satisfying a semver constraint
    pub fn find_best_match(&self, name: &str, constraint: &str) -> Result<&PackEntry> {
        let req = VersionReq::parse(constraint).map_err(|e| RepoError::InvalidConstraint {
            constraint: constraint.to_string(),
            message: e.to_string(),
        })?;

        let entries = self.entries.get(name).map(Vec::as_slice).unwrap_or_default();
        entries
            .iter()
            .filter(|e| e.parsed_version().is_some_and(|v| req.matches(&v)))
            .max_by(|a, b| compare_versions(a, b))
            .ok_or_else(|| RepoError::UnsatisfiableConstraint {
                name: name.to_string(),
                constraint: constraint.to_string(),
                available: if entries.is_empty() {
                    "none".to_string()
                } else {
                    entries
                        .iter()
                        .map(|e| e.version.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                },
            })
    }

    /// `find_best_match` with a constraint, `get_latest` without
    pub fn resolve(&self, repo: &str, name: &str, constraint: Option<&str>) -> Result<&PackEntry> {
        match constraint {
            Some(c) if !c.trim().is_empty() => self.find_best_match(name, c),
            _ => self.get_latest(name).ok_or_else(|| RepoError::PackNotFound {
                name: name.to_string(),
                repo: repo.to_string(),
            }),
        }
    }
}

/// Pack entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackEntry {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Archive URLs, absolute or relative to the repository URL
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,
}

impl PackEntry {
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> RepositoryIndex {
        RepositoryIndex::from_yaml(
            r#"
apiVersion: v1
entries:
  postgres:
    - name: postgres
      version: "14.2.0"
      urls: [postgres-14.2.0.tgz]
    - name: postgres
      version: "15.1.0"
      urls: [postgres-15.1.0.tgz]
      digest: "sha256:abc"
    - name: postgres
      version: "14.10.1"
      urls: [postgres-14.10.1.tgz]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_latest_uses_semver_not_string_order() {
        let index = sample_index();
        assert_eq!(index.get_latest("postgres").unwrap().version, "15.1.0");
    }

    #[test]
    fn test_best_match() {
        let index = sample_index();
        assert_eq!(index.find_best_match("postgres", "^14").unwrap().version, "14.10.1");
        assert_eq!(index.find_best_match("postgres", "~14.2").unwrap().version, "14.2.0");
    }

    #[test]
    fn test_unsatisfiable() {
        let err = sample_index().find_best_match("postgres", "^16").unwrap_err();
        match err {
            RepoError::UnsatisfiableConstraint { available, .. } => {
                assert!(available.contains("15.1.0"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_resolve_without_constraint() {
        let index = sample_index();
        assert_eq!(index.resolve("stable", "postgres", None).unwrap().version, "15.1.0");
        assert!(matches!(
            index.resolve("stable", "mysql", None),
            Err(RepoError::PackNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_constraint() {
        let err = sample_index().find_best_match("postgres", "not a version").unwrap_err();
        assert!(matches!(err, RepoError::InvalidConstraint { .. }));
    }
}

//! Release identities
//!
//! A [`ReleaseId`] is the validated `(name, namespace, context)` triple that
//! uniquely names a release. Its canonical string form is the only
//! representation that leaves the process (CLI arguments, status output,
//! dependency references):
//!
//! ```text
//! name
//! name@namespace
//! name@namespace@context
//! ```
//!
//! Trailing empty segments are omitted; an interior empty segment is kept,
//! so `("app", "", "prod")` formats as `app@@prod`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the segments of a release id
pub const SEPARATOR: char = '@';

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

static CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-z0-9]([-a-z0-9_]*[a-z0-9])?$").expect("valid regex"));

/// Which part of a release id failed validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPart {
    Name,
    Namespace,
    Context,
    /// The serialized form had the wrong number of segments
    Whole,
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Name => "name",
            Self::Namespace => "namespace",
            Self::Context => "context",
            Self::Whole => "id",
        };
        f.write_str(s)
    }
}

/// A malformed release id segment or serialized id
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid release {part} '{input}'")]
pub struct ValidationError {
    /// The offending literal
    pub input: String,
    pub part: IdPart,
}

impl ValidationError {
    fn new(part: IdPart, input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            part,
        }
    }
}

/// Unique identity of a release
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReleaseId {
    name: String,
    namespace: String,
    context: String,
}

impl ReleaseId {
    /// Build and validate an id from its parts
    ///
    /// `name` must be non-empty. `namespace` and `context` may be empty.
    pub fn new(
        name: impl Into<String>,
        namespace: impl Into<String>,
        context: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let id = Self {
            name: name.into(),
            namespace: namespace.into(),
            context: context.into(),
        };
        id.validate()?;
        Ok(id)
    }

    /// Parse the canonical `name[@namespace[@context]]` form
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let parts: Vec<&str> = s.split(SEPARATOR).collect();
        match parts.as_slice() {
            [name] => Self::new(*name, "", ""),
            [name, namespace] => Self::new(*name, *namespace, ""),
            [name, namespace, context] => Self::new(*name, *namespace, *context),
            _ => Err(ValidationError::new(IdPart::Whole, s)),
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !NAME_RE.is_match(&self.name) {
            return Err(ValidationError::new(IdPart::Name, &self.name));
        }
        if !self.namespace.is_empty() && !NAMESPACE_RE.is_match(&self.namespace) {
            return Err(ValidationError::new(IdPart::Namespace, &self.namespace));
        }
        if !self.context.is_empty() && !CONTEXT_RE.is_match(&self.context) {
            return Err(ValidationError::new(IdPart::Context, &self.context));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    /// True when all three parts are empty
    ///
    /// Only reachable through `Default`, since constructors require a name.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.namespace.is_empty() && self.context.is_empty()
    }

    /// Fill an empty namespace and context from another id
    ///
    /// Used when a dependency reference omits the namespace of the release
    /// that declares it.
    pub fn with_defaults_from(mut self, other: &ReleaseId) -> Self {
        if self.namespace.is_empty() {
            self.namespace = other.namespace.clone();
            if self.context.is_empty() {
                self.context = other.context.clone();
            }
        }
        self
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.namespace.is_empty() && self.context.is_empty() {
            return Ok(());
        }
        write!(f, "{}{}", SEPARATOR, self.namespace)?;
        if !self.context.is_empty() {
            write!(f, "{}{}", SEPARATOR, self.context)?;
        }
        Ok(())
    }
}

impl FromStr for ReleaseId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReleaseId {
    type Error = ValidationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ReleaseId> for String {
    fn from(id: ReleaseId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_valid_name_only() {
        let id = ReleaseId::new("ok-name", "", "").unwrap();
        assert_eq!(id.to_string(), "ok-name");
    }

    #[test]
    fn test_new_rejects_uppercase() {
        let err = ReleaseId::new("Bad_Name", "", "").unwrap_err();
        assert_eq!(err.part, IdPart::Name);
        assert_eq!(err.input, "Bad_Name");
    }

    #[test]
    fn test_new_rejects_empty_name() {
        assert!(ReleaseId::new("", "ns", "").is_err());
    }

    #[test]
    fn test_new_rejects_bad_namespace() {
        let err = ReleaseId::new("app", "-ns", "").unwrap_err();
        assert_eq!(err.part, IdPart::Namespace);
        assert_eq!(err.input, "-ns");
    }

    #[test]
    fn test_context_allows_underscore() {
        let id = ReleaseId::new("app", "ns", "kind_local").unwrap();
        assert_eq!(id.to_string(), "app@ns@kind_local");

        // namespaces do not
        assert!(ReleaseId::new("app", "my_ns", "").is_err());
    }

    #[test]
    fn test_parse_canonical_forms() {
        assert_eq!(ReleaseId::parse("app@ns@ctx").unwrap().to_string(), "app@ns@ctx");
        assert_eq!(ReleaseId::parse("app@ns").unwrap().to_string(), "app@ns");
        assert_eq!(ReleaseId::parse("app").unwrap().to_string(), "app");
    }

    #[test]
    fn test_parse_too_many_segments() {
        let err = ReleaseId::parse("a@b@c@d").unwrap_err();
        assert_eq!(err.part, IdPart::Whole);
        assert_eq!(err.input, "a@b@c@d");

        assert!(ReleaseId::parse("a@b@c@d@e").is_err());
    }

    #[test]
    fn test_interior_empty_segment_is_kept() {
        let id = ReleaseId::new("app", "", "prod").unwrap();
        assert_eq!(id.to_string(), "app@@prod");

        let parsed = ReleaseId::parse("app@@prod").unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_roundtrip_through_string() {
        let cases = [
            ("app", "", ""),
            ("app", "ns", ""),
            ("app", "ns", "ctx"),
            ("a1-b2", "kube-system", "prod_eu-1"),
            ("x", "", "c"),
        ];
        for (name, ns, ctx) in cases {
            let id = ReleaseId::new(name, ns, ctx).unwrap();
            let parsed = ReleaseId::parse(&id.to_string()).unwrap();
            assert_eq!(parsed, id, "roundtrip of {}", id);
        }
    }

    #[test]
    fn test_equality_is_structural() {
        let a = ReleaseId::new("app", "ns", "").unwrap();
        let b = ReleaseId::parse("app@ns").unwrap();
        assert_eq!(a, b);

        assert_ne!(a, ReleaseId::new("app", "other", "").unwrap());
        assert_ne!(a, ReleaseId::new("app", "ns", "ctx").unwrap());
        assert_ne!(a, ReleaseId::new("app2", "ns", "").unwrap());
        assert_ne!(a, ReleaseId::parse("app").unwrap());
    }

    #[test]
    fn test_is_empty() {
        assert!(ReleaseId::default().is_empty());
        assert!(!ReleaseId::parse("app").unwrap().is_empty());
    }

    #[test]
    fn test_with_defaults_from() {
        let owner = ReleaseId::parse("app@prod@eu").unwrap();
        let dep = ReleaseId::parse("db").unwrap().with_defaults_from(&owner);
        assert_eq!(dep.to_string(), "db@prod@eu");

        let explicit = ReleaseId::parse("db@infra").unwrap().with_defaults_from(&owner);
        assert_eq!(explicit.to_string(), "db@infra");
    }

    #[test]
    fn test_serde_as_string() {
        let id: ReleaseId = serde_yaml::from_str("app@ns").unwrap();
        assert_eq!(id.namespace(), "ns");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"app@ns\"");

        let bad: Result<ReleaseId, _> = serde_yaml::from_str("\"Nope\"");
        assert!(bad.is_err());
    }
}

//! Rendered manifests and the workload specs trackers watch

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{EngineError, Result};

/// Workload kinds whose rollout can be tracked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
}

impl WorkloadKind {
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "Deployment" => Some(Self::Deployment),
            "StatefulSet" => Some(Self::StatefulSet),
            "DaemonSet" => Some(Self::DaemonSet),
            "Job" => Some(Self::Job),
            _ => None,
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
            Self::DaemonSet => "DaemonSet",
            Self::Job => "Job",
        };
        f.write_str(s)
    }
}

/// A workload a rollout tracker waits on
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackableSpec {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
}

impl fmt::Display for TrackableSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Output of rendering one release
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedManifestSet {
    /// `---`-joined documents
    pub manifest: String,

    pub specs: Vec<TrackableSpec>,
}

impl RenderedManifestSet {
    /// Build from rendered templates, in order
    ///
    /// Empty documents are dropped. Objects without `metadata.namespace`
    /// are placed in `default_namespace`.
    pub fn from_documents<'a, I>(documents: I, default_namespace: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut docs = Vec::new();
        let mut specs = Vec::new();

        for (template, rendered) in documents {
            for doc in split_documents(rendered) {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(doc).map_err(|e| EngineError::Manifest {
                        template: template.to_string(),
                        message: e.to_string(),
                    })?;
                if value.is_null() {
                    continue;
                }

                if let Some(spec) = trackable_spec(&value, default_namespace) {
                    specs.push(spec);
                }
                docs.push(doc.trim().to_string());
            }
        }

        Ok(Self {
            manifest: docs.join("\n---\n"),
            specs,
        })
    }

    /// Split the joined manifest back into documents
    pub fn documents(&self) -> impl Iterator<Item = &str> {
        split_documents(&self.manifest)
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.trim().is_empty()
    }
}

/// Split a multi-document YAML string on `---` separator lines
pub fn split_documents(content: &str) -> impl Iterator<Item = &str> {
    let mut docs = Vec::new();
    let mut start = 0;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if line.trim_end() == "---" {
            docs.push(&content[start..offset]);
            start = offset + line.len();
        }
        offset += line.len();
    }
    docs.push(&content[start..]);

    docs.into_iter().filter(|d| !d.trim().is_empty())
}

fn trackable_spec(value: &serde_yaml::Value, default_namespace: &str) -> Option<TrackableSpec> {
    let kind = WorkloadKind::from_kind(value.get("kind")?.as_str()?)?;
    let metadata = value.get("metadata")?;
    let name = metadata.get("name")?.as_str()?.to_string();
    let namespace = metadata
        .get("namespace")
        .and_then(|ns| ns.as_str())
        .unwrap_or(default_namespace)
        .to_string();

    Some(TrackableSpec {
        kind,
        name,
        namespace,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPLOY: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
"#;

    const MULTI: &str = r#"
apiVersion: v1
kind: Service
metadata:
  name: web
---
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  namespace: jobs
---
"#;

    #[test]
    fn test_collects_trackable_specs() {
        let set =
            RenderedManifestSet::from_documents([("deploy.yaml", DEPLOY), ("multi.yaml", MULTI)], "ns")
                .unwrap();

        assert_eq!(
            set.specs,
            vec![
                TrackableSpec {
                    kind: WorkloadKind::Deployment,
                    name: "web".into(),
                    namespace: "ns".into(),
                },
                TrackableSpec {
                    kind: WorkloadKind::Job,
                    name: "migrate".into(),
                    namespace: "jobs".into(),
                },
            ]
        );
        assert_eq!(set.documents().count(), 3);
    }

    #[test]
    fn test_skips_empty_documents() {
        let set = RenderedManifestSet::from_documents([("a.yaml", "---\n# nothing\n---\n")], "ns")
            .unwrap();
        assert!(set.is_empty());
        assert!(set.specs.is_empty());
    }

    #[test]
    fn test_invalid_yaml_names_template() {
        let err =
            RenderedManifestSet::from_documents([("bad.yaml", "a: [1, 2")], "ns").unwrap_err();
        match err {
            EngineError::Manifest { template, .. } => assert_eq!(template, "bad.yaml"),
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Kubernetes cluster client
//!
//! Manifests are applied with Server-Side Apply as dynamic objects resolved
//! through API discovery, so any installed resource type can be applied.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use kube::{
    Client, Config,
    api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PropagationPolicy},
    config::KubeConfigOptions,
    core::{GroupVersionKind, TypeMeta},
    discovery::{ApiCapabilities, ApiResource, Discovery, Scope},
};
use serde::de::DeserializeOwned;
use sherwave_engine::{split_documents, TrackableSpec, WorkloadKind};
use std::sync::Arc;

use crate::cluster::{ApplySummary, ClusterClient, Readiness, RolloutTracker};
use crate::error::{KubeError, Result};
use crate::health;
use crate::tracker::PollingTracker;

/// Field manager name for Server-Side Apply
const FIELD_MANAGER: &str = "sherwave";

/// Resource parsed from a manifest and resolved against discovery
struct ParsedResource {
    obj: DynamicObject,
    gvk: GroupVersionKind,
    api_resource: ApiResource,
    capabilities: ApiCapabilities,
}

impl ParsedResource {
    fn display_name(&self) -> String {
        let name = self.obj.metadata.name.as_deref().unwrap_or("unnamed");
        format!("{}/{}", self.gvk.kind, name)
    }
}

/// Creation order: namespaces and definitions before the objects that use them
fn apply_rank(kind: &str) -> u8 {
    match kind {
        "CustomResourceDefinition" => 0,
        "Namespace" => 1,
        "ServiceAccount" | "ClusterRole" | "ClusterRoleBinding" | "Role" | "RoleBinding" => 2,
        "ConfigMap" | "Secret" | "PersistentVolumeClaim" => 3,
        "Service" | "Ingress" | "NetworkPolicy" => 4,
        "Deployment" | "StatefulSet" | "DaemonSet" | "Job" | "CronJob" | "Pod" => 5,
        _ => 6,
    }
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

/// Cluster reached through a kubeconfig context
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
    discovery: Arc<Discovery>,
}

impl KubeCluster {
    /// Connect using the kubeconfig, optionally pinned to a context
    ///
    /// Without a context the in-cluster or current kubeconfig context is
    /// inferred.
    pub async fn connect(context: Option<&str>) -> Result<Self> {
        let config = match context.filter(|c| !c.is_empty()) {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_string()),
                    ..Default::default()
                };
                Config::from_kubeconfig(&options)
                    .await
                    .map_err(|e| KubeError::Kubeconfig(format!("context '{}': {}", context, e)))?
            }
            None => Config::infer()
                .await
                .map_err(|e| KubeError::Kubeconfig(e.to_string()))?,
        };

        let client = Client::try_from(config)?;
        Self::with_client(client).await
    }

    /// Wrap an existing client, running API discovery
    pub async fn with_client(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone()).run().await?;
        Ok(Self {
            client,
            discovery: Arc::new(discovery),
        })
    }

    fn namespace_or_default<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            self.client.default_namespace()
        } else {
            namespace
        }
    }

    fn parse_manifest(&self, manifest: &str, default_namespace: &str) -> Result<Vec<ParsedResource>> {
        split_documents(manifest)
            .enumerate()
            .filter(|(_, doc)| {
                !doc.lines()
                    .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
            })
            .map(|(index, doc)| {
                self.parse_document(doc, default_namespace).map_err(|e| {
                    KubeError::InvalidManifest(format!("document {}: {}", index, e))
                })
            })
            .collect()
    }

    fn parse_document(&self, doc: &str, default_namespace: &str) -> Result<ParsedResource> {
        let mut obj: DynamicObject = serde_yaml::from_str(doc)?;

        let type_meta = obj
            .types
            .as_ref()
            .ok_or_else(|| KubeError::InvalidManifest("missing apiVersion or kind".to_string()))?;
        let gvk = gvk_from_type_meta(type_meta);

        let (api_resource, capabilities) = self.discovery.resolve_gvk(&gvk).ok_or_else(|| {
            KubeError::InvalidManifest(format!(
                "unknown resource type {}/{}",
                type_meta.api_version, type_meta.kind
            ))
        })?;

        if obj.metadata.name.is_none() {
            return Err(KubeError::InvalidManifest(format!(
                "{} is missing metadata.name",
                gvk.kind
            )));
        }

        if capabilities.scope == Scope::Namespaced && obj.metadata.namespace.is_none() {
            obj.metadata.namespace = Some(default_namespace.to_string());
        }

        Ok(ParsedResource {
            obj,
            gvk,
            api_resource,
            capabilities,
        })
    }

    fn api_for_resource(&self, resource: &ParsedResource) -> Api<DynamicObject> {
        if resource.capabilities.scope == Scope::Namespaced {
            let ns = resource
                .obj
                .metadata
                .namespace
                .as_deref()
                .unwrap_or_else(|| self.client.default_namespace());
            Api::namespaced_with(self.client.clone(), ns, &resource.api_resource)
        } else {
            Api::all_with(self.client.clone(), &resource.api_resource)
        }
    }

    /// Fetch a typed workload, `None` when it does not exist yet
    async fn get_opt<K>(&self, spec: &TrackableSpec) -> Result<Option<K>>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + std::fmt::Debug,
        K::DynamicType: Default,
    {
        let namespace = self.namespace_or_default(&spec.namespace);
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(&spec.name).await?)
    }
}

fn not_found(spec: &TrackableSpec) -> Readiness {
    Readiness::Progressing(format!("waiting for {} to be created", spec))
}

#[async_trait]
impl ClusterClient for KubeCluster {
    async fn apply(&self, namespace: &str, manifest: &str, dry_run: bool) -> Result<ApplySummary> {
        let namespace = self.namespace_or_default(namespace);
        let mut resources = self.parse_manifest(manifest, namespace)?;
        resources.sort_by_key(|r| apply_rank(&r.gvk.kind));

        let mut params = PatchParams::apply(FIELD_MANAGER).force();
        params.dry_run = dry_run;

        let mut summary = ApplySummary {
            dry_run,
            ..Default::default()
        };
        let mut failures = Vec::new();
        for resource in &resources {
            let shown = resource.display_name();
            let name = resource.obj.metadata.name.as_deref().unwrap_or_default();
            let api = self.api_for_resource(resource);

            match api.patch(name, &params, &Patch::Apply(&resource.obj)).await {
                Ok(_) => {
                    tracing::debug!(resource = %shown, dry_run, "applied");
                    summary.succeeded.push(shown);
                }
                Err(e) => failures.push(format!("{}: {}", shown, e)),
            }
        }

        if !failures.is_empty() {
            return Err(KubeError::ApplyFailed {
                failed: failures.len(),
                total: resources.len(),
                message: failures.join("; "),
            });
        }
        Ok(summary)
    }

    async fn delete(&self, namespace: &str, manifest: &str) -> Result<ApplySummary> {
        let namespace = self.namespace_or_default(namespace);
        let mut resources = self.parse_manifest(manifest, namespace)?;
        resources.sort_by_key(|r| std::cmp::Reverse(apply_rank(&r.gvk.kind)));

        let params = DeleteParams {
            propagation_policy: Some(PropagationPolicy::Background),
            ..Default::default()
        };

        let mut summary = ApplySummary::default();
        for resource in &resources {
            let shown = resource.display_name();
            let name = resource.obj.metadata.name.as_deref().unwrap_or_default();
            match self.api_for_resource(resource).delete(name, &params).await {
                Ok(_) => summary.succeeded.push(shown),
                Err(kube::Error::Api(resp)) if resp.code == 404 => {
                    summary.skipped.push((shown, "not found".to_string()))
                }
                Err(e) => return Err(KubeError::Api(e)),
            }
        }
        Ok(summary)
    }

    async fn readiness(&self, spec: &TrackableSpec) -> Result<Readiness> {
        let readiness = match spec.kind {
            WorkloadKind::Deployment => self
                .get_opt::<Deployment>(spec)
                .await?
                .map(|d| health::deployment_readiness(&d)),
            WorkloadKind::StatefulSet => self
                .get_opt::<StatefulSet>(spec)
                .await?
                .map(|s| health::statefulset_readiness(&s)),
            WorkloadKind::DaemonSet => self
                .get_opt::<DaemonSet>(spec)
                .await?
                .map(|d| health::daemonset_readiness(&d)),
            WorkloadKind::Job => self
                .get_opt::<Job>(spec)
                .await?
                .map(|j| health::job_readiness(&j)),
        };
        Ok(readiness.unwrap_or_else(|| not_found(spec)))
    }

    async fn rollout_tracker(&self, namespace: &str) -> Result<Box<dyn RolloutTracker>> {
        let namespace = self.namespace_or_default(namespace).to_string();

        // Fails early on missing RBAC rather than on the first poll
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &namespace);
        api.list(&ListParams::default().limit(1)).await?;

        Ok(Box::new(PollingTracker::new(self.clone(), namespace)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_from_type_meta() {
        let gvk = gvk_from_type_meta(&TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        });
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");

        let core = gvk_from_type_meta(&TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        });
        assert_eq!(core.group, "");
        assert_eq!(core.version, "v1");
    }

    #[test]
    fn test_apply_rank() {
        let mut kinds = vec!["Deployment", "Service", "Namespace", "ConfigMap", "Widget"];
        kinds.sort_by_key(|k| apply_rank(k));
        assert_eq!(
            kinds,
            vec!["Namespace", "ConfigMap", "Service", "Deployment", "Widget"]
        );
    }
}

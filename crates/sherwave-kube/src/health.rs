//! Workload readiness rules
//!
//! - Deployment: every replica updated, ready and available
//! - StatefulSet: every replica ready and current, current revision equals
//!   update revision
//! - DaemonSet: every scheduled pod updated and ready
//! - Job: at least one success; a `Failed` condition or failures with no
//!   active pods is permanent
//!
//! Deployments, StatefulSets and DaemonSets stay progressing until the
//! controller has observed the latest generation, so a status left over from
//! the previous rollout never counts as ready.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::cluster::Readiness;

/// `Some` with a progress message while the controller lags behind the spec
fn stale_generation(metadata: &ObjectMeta, observed: Option<i64>) -> Option<Readiness> {
    let generation = metadata.generation?;
    let observed = observed.unwrap_or(0);
    (observed < generation).then(|| {
        Readiness::Progressing(format!(
            "waiting for controller to observe generation {} (observed {})",
            generation, observed
        ))
    })
}

pub fn deployment_readiness(deployment: &Deployment) -> Readiness {
    let spec = deployment.spec.as_ref();
    let status = deployment.status.as_ref();

    if let Some(stale) = stale_generation(
        &deployment.metadata,
        status.and_then(|s| s.observed_generation),
    ) {
        return stale;
    }

    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_replicas).unwrap_or(0);
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);

    if ready == desired && updated == desired && available == desired {
        return Readiness::Ready;
    }

    let conditions = status
        .and_then(|s| s.conditions.as_ref())
        .map(|c| {
            c.iter()
                .filter(|cond| cond.status == "False")
                .filter_map(|cond| {
                    cond.message
                        .as_ref()
                        .map(|m| format!("{}: {}", cond.type_, m))
                })
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|s| !s.is_empty());

    Readiness::Progressing(conditions.unwrap_or_else(|| {
        format!(
            "{}/{} ready, {}/{} updated, {}/{} available",
            ready, desired, updated, desired, available, desired
        )
    }))
}

pub fn statefulset_readiness(sts: &StatefulSet) -> Readiness {
    let spec = sts.spec.as_ref();
    let status = sts.status.as_ref();

    if let Some(stale) = stale_generation(&sts.metadata, status.and_then(|s| s.observed_generation)) {
        return stale;
    }

    let desired = spec.and_then(|s| s.replicas).unwrap_or(1);
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let current = status.and_then(|s| s.current_replicas).unwrap_or(0);
    let revision_match = status.and_then(|s| s.current_revision.as_ref())
        == status.and_then(|s| s.update_revision.as_ref());

    if ready == desired && current == desired && revision_match {
        Readiness::Ready
    } else {
        Readiness::Progressing(format!(
            "{}/{} ready, {}/{} current, revision match: {}",
            ready, desired, current, desired, revision_match
        ))
    }
}

pub fn daemonset_readiness(ds: &DaemonSet) -> Readiness {
    let status = ds.status.as_ref();

    if let Some(stale) = stale_generation(&ds.metadata, status.and_then(|s| s.observed_generation)) {
        return stale;
    }

    let desired = status.map(|s| s.desired_number_scheduled).unwrap_or(0);
    let ready = status.map(|s| s.number_ready).unwrap_or(0);
    let updated = status.and_then(|s| s.updated_number_scheduled).unwrap_or(0);

    if desired > 0 && ready == desired && updated == desired {
        Readiness::Ready
    } else {
        Readiness::Progressing(format!(
            "{}/{} ready, {}/{} updated",
            ready, desired, updated, desired
        ))
    }
}

pub fn job_readiness(job: &Job) -> Readiness {
    let status = job.status.as_ref();
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = status.and_then(|s| s.failed).unwrap_or(0);
    let active = status.and_then(|s| s.active).unwrap_or(0);

    let failed_condition = status
        .and_then(|s| s.conditions.as_ref())
        .and_then(|c| {
            c.iter()
                .find(|cond| cond.type_ == "Failed" && cond.status == "True")
        });

    if succeeded > 0 {
        return Readiness::Ready;
    }
    if let Some(cond) = failed_condition {
        return Readiness::Failed(
            cond.message
                .clone()
                .unwrap_or_else(|| format!("job failed with {} failures", failed)),
        );
    }
    if failed > 0 && active == 0 {
        return Readiness::Failed(format!("job failed with {} failures", failed));
    }
    Readiness::Progressing(format!("running: {} active, {} succeeded", active, succeeded))
}

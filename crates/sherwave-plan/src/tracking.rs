//! Per-namespace rollout tracking
//!
//! After the rehearsal, the workloads of every release are grouped by
//! namespace. [`launch_trackers`] creates one tracker per namespace up front,
//! then registers one tracking unit per namespace on the sync's
//! [`TaskGroup`]. Every unit shares the sync's [`CancelScope`].

use sherwave_core::TrackingConfig;
use sherwave_engine::TrackableSpec;
use sherwave_kube::{CancelScope, ClusterClient, KubeError, RolloutTracker, TrackOptions};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{PlanError, Result};
use crate::group::TaskGroup;
use crate::release::Release;

/// Trackable workloads per namespace
pub type NamespaceSpecs = BTreeMap<String, Vec<TrackableSpec>>;

/// Render every release and group its workloads by namespace
pub async fn namespace_specs(releases: &[Arc<dyn Release>]) -> Result<NamespaceSpecs> {
    let mut specs = NamespaceSpecs::new();
    for release in releases {
        let rendered = release.render().await?;
        for spec in rendered.specs {
            let workloads = specs.entry(spec.namespace.clone()).or_default();
            if !workloads.contains(&spec) {
                workloads.push(spec);
            }
        }
    }
    Ok(specs)
}

/// Track one namespace after `start_delay`
///
/// Returns [`PlanError::Cancelled`] if the scope is cancelled first, and
/// [`PlanError::Rollout`] for any tracking failure.
pub async fn track_namespace(
    tracker: &dyn RolloutTracker,
    specs: &[TrackableSpec],
    start_delay: Duration,
    options: &TrackOptions,
    scope: &CancelScope,
) -> Result<()> {
    let namespace = tracker.namespace().to_string();
    let cancelled = || PlanError::Cancelled {
        namespace: namespace.clone(),
    };

    if !start_delay.is_zero() {
        tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(cancelled()),
            _ = tokio::time::sleep(start_delay) => {}
        }
    }

    tracing::info!(namespace = %namespace, workloads = specs.len(), "tracking rollout");
    match tracker.track(specs, options, scope).await {
        Ok(()) => {
            tracing::info!(namespace = %namespace, "rollout complete");
            Ok(())
        }
        Err(KubeError::Cancelled { .. }) => Err(cancelled()),
        Err(e) => Err(PlanError::Rollout(e)),
    }
}

/// Start one tracking unit per namespace
///
/// Every tracker is created before any unit is registered: if one namespace
/// cannot be tracked, nothing is started and [`PlanError::TrackerInit`] is
/// returned. A unit stopped by cancellation counts as a success, since the
/// scope is only cancelled once the real apply has finished.
///
/// Returns the number of units registered.
pub async fn launch_trackers(
    cluster: &dyn ClusterClient,
    specs: &NamespaceSpecs,
    config: &TrackingConfig,
    scope: &CancelScope,
    group: &mut TaskGroup,
) -> Result<usize> {
    let mut trackers = Vec::with_capacity(specs.len());
    for (namespace, workloads) in specs {
        if workloads.is_empty() {
            tracing::debug!(namespace = %namespace, "nothing to track");
            continue;
        }
        let tracker = cluster
            .rollout_tracker(namespace)
            .await
            .map_err(|source| PlanError::TrackerInit {
                namespace: namespace.clone(),
                source,
            })?;
        trackers.push((tracker, workloads.clone()));
    }

    let options = TrackOptions::from(config);
    let launched = trackers.len();
    for (tracker, workloads) in trackers {
        let scope = scope.clone();
        let start_delay = config.start_delay;
        group.spawn(async move {
            match track_namespace(tracker.as_ref(), &workloads, start_delay, &options, &scope).await {
                Err(e) if e.is_cancellation() => {
                    tracing::debug!(namespace = %tracker.namespace(), "tracking stopped after apply");
                    Ok(())
                }
                outcome => outcome,
            }
        });
    }
    Ok(launched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRelease;
    use sherwave_core::ReleaseId;
    use sherwave_engine::WorkloadKind;
    use sherwave_kube::{FakeCluster, Readiness};

    fn id(s: &str) -> ReleaseId {
        ReleaseId::parse(s).unwrap()
    }

    fn spec(name: &str, namespace: &str) -> TrackableSpec {
        TrackableSpec {
            kind: WorkloadKind::Deployment,
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    fn config(start_delay: Duration) -> TrackingConfig {
        TrackingConfig {
            enabled: true,
            start_delay,
            timeout: Duration::from_secs(60),
            status_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_namespace_specs_groups_by_namespace() {
        let releases: Vec<Arc<dyn Release>> = vec![
            Arc::new(MockRelease::new(id("app@ns"))),
            Arc::new(MockRelease::new(id("db@ns")).with_workload(WorkloadKind::StatefulSet, "db-0")),
            Arc::new(MockRelease::new(id("web@edge"))),
            Arc::new(MockRelease::new(id("cfg@other")).without_workloads()),
        ];

        let specs = namespace_specs(&releases).await.unwrap();
        assert_eq!(specs.keys().collect::<Vec<_>>(), vec!["edge", "ns"]);
        assert_eq!(specs["ns"].len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_delay_applies_before_tracking() {
        let cluster = FakeCluster::new();
        let tracker = cluster.rollout_tracker("ns").await.unwrap();
        let started = tokio::time::Instant::now();

        track_namespace(
            tracker.as_ref(),
            &[spec("app", "ns")],
            Duration::from_secs(3),
            &TrackOptions::default(),
            &CancelScope::new(),
        )
        .await
        .unwrap();

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert_eq!(cluster.readiness_checks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_start_delay() {
        let cluster = FakeCluster::new();
        let tracker = cluster.rollout_tracker("ns").await.unwrap();
        let scope = CancelScope::new();

        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = track_namespace(
            tracker.as_ref(),
            &[spec("app", "ns")],
            Duration::from_secs(3600),
            &TrackOptions::default(),
            &scope,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PlanError::Cancelled { ref namespace } if namespace == "ns"));
        assert_eq!(cluster.readiness_checks(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollout_failure_is_reported() {
        let cluster = FakeCluster::new();
        cluster.set_default_readiness(Readiness::Failed("CrashLoopBackOff".into()));
        let tracker = cluster.rollout_tracker("ns").await.unwrap();

        let err = track_namespace(
            tracker.as_ref(),
            &[spec("app", "ns")],
            Duration::ZERO,
            &TrackOptions::default(),
            &CancelScope::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PlanError::Rollout(KubeError::RolloutFailed { .. })));
        assert!(!err.is_cancellation());
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_creates_every_tracker_first() {
        let cluster = FakeCluster::new();
        let specs = NamespaceSpecs::from([
            ("a".to_string(), vec![spec("one", "a")]),
            ("b".to_string(), vec![spec("two", "b")]),
            ("empty".to_string(), Vec::new()),
        ]);
        let mut group = TaskGroup::new();

        let launched = launch_trackers(
            &cluster,
            &specs,
            &config(Duration::from_secs(2)),
            &CancelScope::new(),
            &mut group,
        )
        .await
        .unwrap();

        assert_eq!(launched, 2);
        assert_eq!(cluster.trackers(), vec!["a", "b"]);
        // Units are registered but still inside their start delay
        assert_eq!(group.pending(), 2);
        assert_eq!(cluster.readiness_checks(), 0);

        group.wait().await.unwrap();
        assert_eq!(cluster.readiness_checks(), 2);
    }

    #[tokio::test]
    async fn test_launch_aborts_on_init_failure() {
        let cluster = FakeCluster::new();
        cluster.fail_tracker_init("b");
        let specs = NamespaceSpecs::from([
            ("a".to_string(), vec![spec("one", "a")]),
            ("b".to_string(), vec![spec("two", "b")]),
        ]);
        let mut group = TaskGroup::new();

        let err = launch_trackers(
            &cluster,
            &specs,
            &config(Duration::ZERO),
            &CancelScope::new(),
            &mut group,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PlanError::TrackerInit { ref namespace, .. } if namespace == "b"));
        assert_eq!(group.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_units_count_as_success() {
        let cluster = FakeCluster::new();
        cluster.set_default_readiness(Readiness::Progressing("0/1 ready".into()));
        let specs = NamespaceSpecs::from([("ns".to_string(), vec![spec("app", "ns")])]);
        let scope = CancelScope::new();
        let mut group = TaskGroup::new();

        launch_trackers(&cluster, &specs, &config(Duration::ZERO), &scope, &mut group)
            .await
            .unwrap();
        group.spawn({
            let scope = scope.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                scope.cancel();
                Ok(())
            }
        });

        group.wait().await.unwrap();
        assert!(scope.is_cancelled());
    }
}

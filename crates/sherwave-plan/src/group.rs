//! Fan-out/fan-in task group
//!
//! Units are spawned onto the runtime as they are registered. [`TaskGroup::wait`]
//! joins every unit, including ones registered after others already finished,
//! and returns the first error in completion order.

use std::future::Future;
use tokio::task::JoinSet;

use crate::error::{PlanError, Result};

#[derive(Default)]
pub struct TaskGroup {
    tasks: JoinSet<Result<()>>,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register and start one unit of work
    pub fn spawn<F>(&mut self, unit: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        self.tasks.spawn(unit);
    }

    /// Units registered and not yet joined
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Join every unit
    ///
    /// Never returns before all units have finished. A panicking unit counts
    /// as a failed one.
    pub async fn wait(mut self) -> Result<()> {
        let mut first: Option<PlanError> = None;

        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined.map_err(PlanError::from).and_then(|r| r);
            if let Err(e) = outcome {
                if first.is_none() {
                    first = Some(e);
                } else {
                    tracing::debug!(error = %e, "additional sync unit failed");
                }
            }
        }

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_error_after_all_units() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new();

        for unit in 1..=5u64 {
            let finished = finished.clone();
            group.spawn(async move {
                // Unit 3 fails first, the others finish after it
                let delay = if unit == 3 { 1 } else { 10 * unit };
                tokio::time::sleep(Duration::from_secs(delay)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                if unit == 3 {
                    Err(PlanError::UnknownRelease("unit-3".into()))
                } else {
                    Ok(())
                }
            });
        }
        assert_eq!(group.pending(), 5);

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, PlanError::UnknownRelease(ref name) if name == "unit-3"));
        assert_eq!(finished.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_empty_group() {
        TaskGroup::new().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_panicking_unit_is_an_error() {
        let mut group = TaskGroup::new();
        group.spawn(async { Ok(()) });
        group.spawn(async { panic!("boom") });

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, PlanError::Join(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_units_registered_late_are_joined() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new();

        let early = finished.clone();
        group.spawn(async move {
            early.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        let late = finished.clone();
        group.spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            late.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        group.wait().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }
}

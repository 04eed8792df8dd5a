//! In-memory storage driver for tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::StorageDriver;
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;

/// namespace -> name -> version -> release
type Store = HashMap<String, HashMap<String, HashMap<u32, StoredRelease>>>;

/// In-memory storage driver
#[derive(Clone, Default)]
pub struct MockStorageDriver {
    store: Arc<RwLock<Store>>,
    operations: Arc<RwLock<OperationCounts>>,
}

/// Counts of operations performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OperationCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
}

impl MockStorageDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated driver
    pub fn with_releases(releases: Vec<StoredRelease>) -> Self {
        let driver = Self::new();
        {
            let mut store = driver.store.write().unwrap_or_else(PoisonError::into_inner);
            for release in releases {
                insert(&mut store, release);
            }
        }
        driver
    }

    pub fn operation_counts(&self) -> OperationCounts {
        self.operations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every stored revision
    pub fn all_releases(&self) -> Vec<StoredRelease> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        store
            .values()
            .flat_map(|ns| ns.values())
            .flat_map(|name| name.values())
            .cloned()
            .collect()
    }

    fn count(&self, f: impl FnOnce(&mut OperationCounts)) {
        f(&mut self.operations.write().unwrap_or_else(PoisonError::into_inner));
    }

    fn revisions(&self, namespace: &str, name: &str) -> Vec<StoredRelease> {
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);
        let mut releases: Vec<StoredRelease> = store
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .map(|versions| versions.values().cloned().collect())
            .unwrap_or_default();
        releases.sort_by(|a, b| b.version.cmp(&a.version));
        releases
    }
}

fn insert(store: &mut Store, release: StoredRelease) {
    store
        .entry(release.namespace.clone())
        .or_default()
        .entry(release.name.clone())
        .or_default()
        .insert(release.version, release);
}

#[async_trait]
impl StorageDriver for MockStorageDriver {
    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<StoredRelease> {
        self.count(|ops| ops.gets += 1);
        self.revisions(namespace, name)
            .into_iter()
            .find(|r| r.version == version)
            .ok_or_else(|| KubeError::RevisionNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
                version,
            })
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease> {
        self.count(|ops| ops.gets += 1);
        self.revisions(namespace, name)
            .into_iter()
            .next()
            .ok_or_else(|| KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<StoredRelease>> {
        self.count(|ops| ops.lists += 1);
        let store = self.store.read().unwrap_or_else(PoisonError::into_inner);

        let mut releases = Vec::new();
        for (ns, names) in store.iter() {
            if namespace.is_some_and(|filter| filter != ns) {
                continue;
            }
            for versions in names.values() {
                let mut revisions: Vec<&StoredRelease> = versions.values().collect();
                revisions.sort_by(|a, b| b.version.cmp(&a.version));
                if include_superseded {
                    releases.extend(revisions.into_iter().cloned());
                } else if let Some(latest) = revisions.first() {
                    releases.push((*latest).clone());
                }
            }
        }

        releases.sort_by(|a, b| {
            (&a.namespace, &a.name)
                .cmp(&(&b.namespace, &b.name))
                .then(b.version.cmp(&a.version))
        });
        Ok(releases)
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        self.count(|ops| ops.gets += 1);
        let releases = self.revisions(namespace, name);
        if releases.is_empty() {
            return Err(KubeError::ReleaseNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }
        Ok(releases)
    }

    async fn create(&self, release: &StoredRelease) -> Result<()> {
        self.count(|ops| ops.creates += 1);
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        let exists = store
            .get(&release.namespace)
            .and_then(|ns| ns.get(&release.name))
            .is_some_and(|versions| versions.contains_key(&release.version));
        if exists {
            return Err(KubeError::ReleaseAlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            });
        }
        insert(&mut store, release.clone());
        Ok(())
    }

    async fn update(&self, release: &StoredRelease) -> Result<()> {
        self.count(|ops| ops.updates += 1);
        let mut store = self.store.write().unwrap_or_else(PoisonError::into_inner);
        insert(&mut store, release.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sherwave_core::{PackMetadata, Values};

    fn release(namespace: &str, name: &str, version: u32) -> StoredRelease {
        let metadata: PackMetadata =
            serde_yaml::from_str("name: test-pack\nversion: 1.0.0\n").unwrap();
        let mut release = StoredRelease::for_install(
            name.to_string(),
            namespace.to_string(),
            metadata,
            Values::new(),
            String::new(),
        );
        release.version = version;
        release
    }

    #[tokio::test]
    async fn test_latest_and_counts() {
        let driver = MockStorageDriver::with_releases(vec![
            release("prod", "web", 1),
            release("prod", "web", 2),
        ]);

        assert_eq!(driver.get_latest("prod", "web").await.unwrap().version, 2);
        driver.create(&release("prod", "web", 3)).await.unwrap();
        assert_eq!(driver.history("prod", "web").await.unwrap().len(), 3);

        let counts = driver.operation_counts();
        assert_eq!(counts.creates, 1);
        assert_eq!(counts.gets, 2);
    }

    #[tokio::test]
    async fn test_list_filters_namespace() {
        let driver = MockStorageDriver::with_releases(vec![
            release("prod", "web", 1),
            release("prod", "web", 2),
            release("dev", "web", 1),
        ]);

        let prod = driver.list(Some("prod"), false).await.unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].version, 2);

        assert_eq!(driver.list(None, true).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let driver = MockStorageDriver::new();
        driver.create(&release("prod", "web", 1)).await.unwrap();
        assert!(matches!(
            driver.create(&release("prod", "web", 1)).await,
            Err(KubeError::ReleaseAlreadyExists { .. })
        ));
    }
}

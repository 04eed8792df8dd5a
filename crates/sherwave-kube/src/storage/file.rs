//! File-based storage driver
//!
//! Layout: `<base>/<namespace>/<name>/v<version>.json`

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::{
    StorageConfig, StorageDriver, compress, decompress, deserialize_release, serialize_release,
};
use crate::error::{KubeError, Result};
use crate::release::StoredRelease;

pub struct FileDriver {
    base_dir: PathBuf,
    config: StorageConfig,
}

impl FileDriver {
    pub fn new(base_dir: PathBuf, config: StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir, config })
    }

    fn release_dir(&self, namespace: &str, name: &str) -> PathBuf {
        self.base_dir.join(namespace).join(name)
    }

    fn release_path(&self, namespace: &str, name: &str, version: u32) -> PathBuf {
        self.release_dir(namespace, name)
            .join(format!("v{}.json", version))
    }

    fn write_release(&self, release: &StoredRelease) -> Result<()> {
        let path = self.release_path(&release.namespace, &release.name, release.version);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serialize_release(release)?;
        let data = compress(&json, self.config.compression)?;
        std::fs::write(&path, data)?;
        Ok(())
    }

    fn read_release(&self, path: &Path) -> Result<StoredRelease> {
        let data = std::fs::read(path)?;
        let decompressed = decompress(&data, self.config.compression)?;
        deserialize_release(&decompressed)
    }

    /// Every readable revision file below `dir`
    fn read_revisions(&self, dir: &Path) -> Result<Vec<StoredRelease>> {
        let mut releases = Vec::new();
        for entry in std::fs::read_dir(dir)?.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                match self.read_release(&path) {
                    Ok(release) => releases.push(release),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping unreadable revision")
                    }
                }
            }
        }
        Ok(releases)
    }
}

fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect())
}

fn not_found(namespace: &str, name: &str) -> KubeError {
    KubeError::ReleaseNotFound {
        name: name.to_string(),
        namespace: namespace.to_string(),
    }
}

#[async_trait]
impl StorageDriver for FileDriver {
    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<StoredRelease> {
        let path = self.release_path(namespace, name, version);
        if !path.exists() {
            return Err(KubeError::RevisionNotFound {
                name: name.to_string(),
                namespace: namespace.to_string(),
                version,
            });
        }
        self.read_release(&path)
    }

    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease> {
        self.history(namespace, name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(namespace, name))
    }

    async fn list(
        &self,
        namespace: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<StoredRelease>> {
        let namespaces = match namespace {
            Some(ns) => {
                let path = self.base_dir.join(ns);
                if path.is_dir() { vec![path] } else { vec![] }
            }
            None => subdirs(&self.base_dir)?,
        };

        let mut releases = Vec::new();
        for ns_path in namespaces {
            for name_path in subdirs(&ns_path)? {
                releases.extend(self.read_revisions(&name_path)?);
            }
        }

        releases.sort_by(|a, b| {
            (&a.namespace, &a.name)
                .cmp(&(&b.namespace, &b.name))
                .then(b.version.cmp(&a.version))
        });

        if !include_superseded {
            let mut seen = HashSet::new();
            releases.retain(|r| seen.insert((r.namespace.clone(), r.name.clone())));
        }

        Ok(releases)
    }

    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>> {
        let dir = self.release_dir(namespace, name);
        if !dir.is_dir() {
            return Err(not_found(namespace, name));
        }

        let mut releases = self.read_revisions(&dir)?;
        if releases.is_empty() {
            return Err(not_found(namespace, name));
        }
        releases.sort_by(|a, b| b.version.cmp(&a.version));
        Ok(releases)
    }

    async fn create(&self, release: &StoredRelease) -> Result<()> {
        let path = self.release_path(&release.namespace, &release.name, release.version);
        if path.exists() {
            return Err(KubeError::ReleaseAlreadyExists {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
            });
        }
        self.write_release(release)
    }

    async fn update(&self, release: &StoredRelease) -> Result<()> {
        let path = self.release_path(&release.namespace, &release.name, release.version);
        if !path.exists() {
            return Err(KubeError::RevisionNotFound {
                name: release.name.clone(),
                namespace: release.namespace.clone(),
                version: release.version,
            });
        }
        self.write_release(release)
    }
}

//! Repository sync and pack acquisition
//!
//! `sync_repositories` refreshes every index into the cache directory.
//! `fetch_chart` and `update_dependencies` resolve packs against those cached
//! indexes and fall back to fetching an index that has not been synced yet.

use futures::future::try_join_all;
use sherwave_core::{ChartRef, LoadedPack, ReleaseId, RepositoryConfig, SyncSettings};
use std::path::{Path, PathBuf};

use crate::error::{RepoError, Result};
use crate::http::HttpRepository;
use crate::index::RepositoryIndex;

/// Where repository indexes are cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositorySettings {
    pub cache_dir: PathBuf,
}

impl RepositorySettings {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Path of the cached index for a repository
    pub fn index_path(&self, repo: &str) -> PathBuf {
        self.cache_dir
            .join("repositories")
            .join(repo)
            .join("index.yaml")
    }

    /// Load a cached index, `None` if the repository was never synced
    pub fn load_index(&self, repo: &str) -> Result<Option<RepositoryIndex>> {
        let path = self.index_path(repo);
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read(&path)?;
        RepositoryIndex::from_bytes(&data).map(Some)
    }

    fn store_index(&self, repo: &str, index: &RepositoryIndex) -> Result<()> {
        let path = self.index_path(repo);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, serde_yaml::to_string(index)?)?;
        Ok(())
    }
}

impl From<&SyncSettings> for RepositorySettings {
    fn from(settings: &SyncSettings) -> Self {
        Self::new(settings.cache_dir.clone())
    }
}

/// Refresh every repository index concurrently
///
/// Fails on the first repository that cannot be synced.
pub async fn sync_repositories(
    repositories: &[RepositoryConfig],
    settings: &RepositorySettings,
) -> Result<()> {
    let syncs = repositories.iter().map(|config| async move {
        let repo = HttpRepository::new(config.clone())?;
        let index = repo.fetch_index().await?;
        settings.store_index(repo.name(), &index)?;
        tracing::info!(
            repository = %config.name,
            packs = index.entries.len(),
            "repository synced"
        );
        Ok::<_, RepoError>(())
    });

    try_join_all(syncs).await?;
    Ok(())
}

fn find_repository<'a>(
    repositories: &'a [RepositoryConfig],
    name: &str,
) -> Result<&'a RepositoryConfig> {
    repositories
        .iter()
        .find(|r| r.name == name)
        .ok_or_else(|| RepoError::RepositoryNotFound {
            name: name.to_string(),
        })
}

async fn index_for(repo: &HttpRepository, settings: &RepositorySettings) -> Result<RepositoryIndex> {
    if let Some(index) = settings.load_index(repo.name())? {
        return Ok(index);
    }
    let index = repo.fetch_index().await?;
    settings.store_index(repo.name(), &index)?;
    Ok(index)
}

/// Make a release's pack available locally and return its directory
///
/// `base_dir` resolves relative local paths. Repository packs are extracted
/// into `<work_dir>/charts/<release-id>/`.
pub async fn fetch_chart(
    chart: &ChartRef,
    id: &ReleaseId,
    base_dir: &Path,
    repositories: &[RepositoryConfig],
    settings: &SyncSettings,
) -> Result<PathBuf> {
    let local = base_dir.join(&chart.name);
    if local.is_dir() {
        return Ok(local);
    }

    let Some((repo_name, pack_name)) = chart.repository_ref() else {
        return Err(RepoError::Core(sherwave_core::CoreError::PackNotFound {
            path: local.display().to_string(),
        }));
    };

    let repo = HttpRepository::new(find_repository(repositories, repo_name)?.clone())?;
    let index = index_for(&repo, &RepositorySettings::from(settings)).await?;
    let entry = index.resolve(repo_name, pack_name, chart.version.as_deref())?;

    let dest = settings.work_dir.join("charts").join(id.to_string());
    let root = repo.download_to(entry, &dest).await?;
    tracing::info!(
        release = %id,
        pack = %pack_name,
        version = %entry.version,
        "pack downloaded"
    );
    Ok(root)
}

/// Download the enabled dependencies of a pack into its `packs/` directory
///
/// Returns the number of dependencies downloaded.
pub async fn update_dependencies(
    pack: &LoadedPack,
    repositories: &[RepositoryConfig],
    settings: &RepositorySettings,
) -> Result<usize> {
    let mut count = 0;
    for dep in pack.enabled_dependencies() {
        let repo = HttpRepository::new(find_repository(repositories, &dep.repository)?.clone())?;
        let index = index_for(&repo, settings).await?;
        let entry = index.resolve(&dep.repository, &dep.name, Some(&dep.version))?;

        let dest = pack.packs_dir().join(&dep.name);
        repo.download_to(entry, &dest).await?;
        tracing::debug!(
            pack = %pack.pack.metadata.name,
            dependency = %dep.name,
            version = %entry.version,
            "dependency downloaded"
        );
        count += 1;
    }
    Ok(count)
}

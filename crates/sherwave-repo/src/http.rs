//! HTTP repository client
//!
//! A repository is a base URL serving `index.yaml` and gzipped pack tarballs.

use sha2::{Digest, Sha256};
use sherwave_core::RepositoryConfig;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{RepoError, Result};
use crate::index::{PackEntry, RepositoryIndex};

/// HTTP repository client
pub struct HttpRepository {
    config: RepositoryConfig,
    base: Url,
    client: reqwest::Client,
}

impl HttpRepository {
    pub fn new(config: RepositoryConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url).map_err(|e| RepoError::InvalidRepositoryUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .user_agent(concat!("sherwave/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            config,
            base,
            client,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    async fn get_bytes(&self, url: &Url) -> Result<Vec<u8>> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("GET {} failed", url),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Download and parse `index.yaml`
    pub async fn fetch_index(&self) -> Result<RepositoryIndex> {
        let url = self.base.join("index.yaml")?;
        tracing::debug!(repository = %self.config.name, %url, "fetching index");
        let data = self.get_bytes(&url).await?;
        RepositoryIndex::from_bytes(&data)
    }

    /// Download a pack archive, verifying its digest when the index has one
    pub async fn download(&self, entry: &PackEntry) -> Result<Vec<u8>> {
        let url = entry.download_url().ok_or_else(|| RepoError::PackNotFound {
            name: entry.name.clone(),
            repo: self.config.name.clone(),
        })?;
        let url = self.base.join(url)?;
        let data = self.get_bytes(&url).await?;

        if let Some(expected) = &entry.digest {
            let actual = compute_digest(&data);
            if !digest_matches(expected, &actual) {
                return Err(RepoError::IntegrityCheckFailed {
                    name: entry.name.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        Ok(data)
    }

    /// Download and extract a pack, returning the directory holding its `Pack.yaml`
    pub async fn download_to(&self, entry: &PackEntry, dest: &Path) -> Result<PathBuf> {
        let data = self.download(entry).await?;
        extract_pack_archive(&data, dest)?;
        find_pack_root(dest).ok_or_else(|| RepoError::InvalidArchive {
            name: entry.name.clone(),
        })
    }
}

pub(crate) fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Compare digests ignoring case and the `sha256:` prefix
fn digest_matches(expected: &str, actual: &str) -> bool {
    let normalize = |d: &str| d.trim().to_lowercase().replace("sha256:", "");
    normalize(expected) == normalize(actual)
}

fn extract_pack_archive(data: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    if dest.exists() {
        std::fs::remove_dir_all(dest)?;
    }
    std::fs::create_dir_all(dest)?;

    let mut archive = Archive::new(GzDecoder::new(std::io::Cursor::new(data)));
    archive.unpack(dest)?;
    Ok(())
}

/// The archive root itself, or its single top-level directory
fn find_pack_root(dir: &Path) -> Option<PathBuf> {
    if dir.join("Pack.yaml").is_file() {
        return Some(dir.to_path_buf());
    }
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| p.join("Pack.yaml").is_file())
}

//! Release history storage
//!
//! - **File**: one JSON document per revision under a local directory,
//!   optionally gzip or zstd compressed
//! - **Mock**: in-memory, with operation counters for tests

mod file;
mod mock;

pub use file::FileDriver;
pub use mock::{MockStorageDriver, OperationCounts};

use async_trait::async_trait;

use crate::error::{KubeError, Result};
use crate::release::StoredRelease;

/// Storage driver trait for release persistence
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// Get a specific revision
    async fn get(&self, namespace: &str, name: &str, version: u32) -> Result<StoredRelease>;

    /// Get the latest revision
    async fn get_latest(&self, namespace: &str, name: &str) -> Result<StoredRelease>;

    /// List releases, optionally filtered by namespace
    ///
    /// Without `include_superseded` only the latest revision of each release
    /// is returned.
    async fn list(
        &self,
        namespace: Option<&str>,
        include_superseded: bool,
    ) -> Result<Vec<StoredRelease>>;

    /// All revisions of a release, newest first
    async fn history(&self, namespace: &str, name: &str) -> Result<Vec<StoredRelease>>;

    /// Store a new revision
    async fn create(&self, release: &StoredRelease) -> Result<()>;

    /// Overwrite an existing revision
    async fn update(&self, release: &StoredRelease) -> Result<()>;

    async fn exists(&self, namespace: &str, name: &str) -> Result<bool> {
        match self.get_latest(namespace, name).await {
            Ok(_) => Ok(true),
            Err(KubeError::ReleaseNotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Default)]
pub struct StorageConfig {
    pub compression: CompressionMethod,
}

/// Compression method for release data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    None,

    Gzip { level: u32 },

    Zstd { level: i32 },
}

impl Default for CompressionMethod {
    fn default() -> Self {
        Self::Zstd { level: 3 }
    }
}

/// Compress data using the configured method
#[must_use = "compression result should be used"]
pub fn compress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { level } => {
            use std::io::Write;
            let mut encoder =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level));
            encoder
                .write_all(data)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            encoder
                .finish()
                .map_err(|e| KubeError::Compression(e.to_string()))
        }
        CompressionMethod::Zstd { level } => zstd::encode_all(std::io::Cursor::new(data), level)
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

/// Decompress data
#[must_use = "decompression result should be used"]
pub fn decompress(data: &[u8], method: CompressionMethod) -> Result<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(data.to_vec()),
        CompressionMethod::Gzip { .. } => {
            use std::io::Read;
            let mut decoder = flate2::read::GzDecoder::new(data);
            let mut decompressed = Vec::new();
            decoder
                .read_to_end(&mut decompressed)
                .map_err(|e| KubeError::Compression(e.to_string()))?;
            Ok(decompressed)
        }
        CompressionMethod::Zstd { .. } => zstd::decode_all(std::io::Cursor::new(data))
            .map_err(|e| KubeError::Compression(e.to_string())),
    }
}

pub fn serialize_release(release: &StoredRelease) -> Result<Vec<u8>> {
    serde_json::to_vec(release).map_err(|e| KubeError::Serialization(e.to_string()))
}

pub fn deserialize_release(data: &[u8]) -> Result<StoredRelease> {
    serde_json::from_slice(data).map_err(|e| KubeError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_shrinks_repetitive_manifests() {
        let manifest = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: web\n".repeat(200);
        let compressed = compress(manifest.as_bytes(), CompressionMethod::Zstd { level: 3 }).unwrap();
        assert!(compressed.len() < manifest.len() / 4);

        let restored = decompress(&compressed, CompressionMethod::Zstd { level: 3 }).unwrap();
        assert_eq!(restored, manifest.as_bytes());
    }

    #[test]
    fn test_gzip_output_is_gzip() {
        let compressed = compress(b"hello", CompressionMethod::Gzip { level: 6 }).unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_decompress_garbage_fails() {
        let err = decompress(b"not zstd", CompressionMethod::Zstd { level: 3 }).unwrap_err();
        assert!(matches!(err, KubeError::Compression(_)));
    }
}

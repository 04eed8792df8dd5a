//! Pack definition and loading
//!
//! A pack is the chart format releases deploy: a `Pack.yaml` descriptor, a
//! default `values.yaml` and a `templates/` directory of MiniJinja templates.

use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::values::Values;

/// Accepted `apiVersion` of a `Pack.yaml`
pub const PACK_API_VERSION: &str = "sherwave/v1";

/// A pack descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pack {
    pub api_version: String,

    pub metadata: PackMetadata,

    /// Packs this pack needs in its `packs/` directory
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

/// Pack metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackMetadata {
    pub name: String,

    #[serde(with = "version_serde")]
    pub version: Version,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub app_version: Option<String>,
}

/// Pack dependency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub name: String,

    /// Version constraint (semver)
    pub version: String,

    /// Repository name as declared in the plan's `repositories`
    pub repository: String,

    /// Static enable/disable flag
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Loaded pack with resolved paths
#[derive(Debug, Clone)]
pub struct LoadedPack {
    pub pack: Pack,

    /// Root directory of the pack
    pub root: PathBuf,

    pub templates_dir: PathBuf,

    pub values_path: PathBuf,
}

impl LoadedPack {
    /// Load a pack from a directory
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();

        if !root.exists() {
            return Err(CoreError::PackNotFound {
                path: root.display().to_string(),
            });
        }

        let pack_file = root.join("Pack.yaml");
        if !pack_file.exists() {
            return Err(CoreError::InvalidPack {
                message: format!("Pack.yaml not found in {}", root.display()),
            });
        }

        let pack_content = std::fs::read_to_string(&pack_file)?;
        let pack: Pack = serde_yaml::from_str(&pack_content)?;

        if pack.api_version != PACK_API_VERSION {
            return Err(CoreError::InvalidPack {
                message: format!(
                    "Unsupported API version: {}. Expected: {}",
                    pack.api_version, PACK_API_VERSION
                ),
            });
        }

        Ok(Self {
            pack,
            templates_dir: root.join("templates"),
            values_path: root.join("values.yaml"),
            root,
        })
    }

    /// Default values shipped with the pack, empty if there is no `values.yaml`
    pub fn default_values(&self) -> Result<Values> {
        if self.values_path.exists() {
            Values::from_file(&self.values_path)
        } else {
            Ok(Values::new())
        }
    }

    /// Directory pack dependencies are downloaded into
    pub fn packs_dir(&self) -> PathBuf {
        self.root.join("packs")
    }

    /// Template files, sorted for deterministic rendering order
    pub fn template_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.templates_dir.exists() {
            return Ok(files);
        }

        for entry in walkdir::WalkDir::new(&self.templates_dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = path.extension() else {
                continue;
            };
            let ext = ext.to_string_lossy().to_lowercase();
            if matches!(ext.as_str(), "yaml" | "yml" | "j2" | "jinja2") {
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        Ok(files)
    }

    /// Dependencies that are switched on
    pub fn enabled_dependencies(&self) -> impl Iterator<Item = &Dependency> {
        self.pack.dependencies.iter().filter(|d| d.enabled)
    }
}

mod version_serde {
    use semver::Version;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(version: &Version, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&version.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Version, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Version::parse(&s).map_err(serde::de::Error::custom)
    }
}

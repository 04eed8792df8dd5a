//! Release history records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sherwave_core::{PackMetadata, Values};

/// One revision of a deployed release
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRelease {
    pub name: String,

    pub namespace: String,

    /// Revision number (1-indexed, increments with each apply)
    pub version: u32,

    pub state: ReleaseState,

    /// Pack metadata at deploy time
    pub pack: PackMetadata,

    /// Effective values (pack defaults merged with release values)
    pub values: Values,

    /// Rendered manifest (all Kubernetes resources)
    pub manifest: String,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl StoredRelease {
    /// First revision of a release
    pub fn for_install(
        name: String,
        namespace: String,
        pack: PackMetadata,
        values: Values,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name,
            namespace,
            version: 1,
            state: ReleaseState::PendingInstall { started_at: now },
            pack,
            values,
            manifest,
            created_at: now,
            updated_at: now,
        }
    }

    /// Next revision after `previous`
    pub fn for_upgrade(
        previous: &StoredRelease,
        pack: PackMetadata,
        values: Values,
        manifest: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: previous.name.clone(),
            namespace: previous.namespace.clone(),
            version: previous.version + 1,
            state: ReleaseState::PendingUpgrade {
                started_at: now,
                previous_version: previous.version,
            },
            pack,
            values,
            manifest,
            created_at: now,
            updated_at: now,
        }
    }

    /// New revision re-applying the content of `target`
    pub fn for_rollback(latest: &StoredRelease, target: &StoredRelease) -> Self {
        let now = Utc::now();
        Self {
            name: latest.name.clone(),
            namespace: latest.namespace.clone(),
            version: latest.version + 1,
            state: ReleaseState::PendingRollback {
                started_at: now,
                target_version: target.version,
            },
            pack: target.pack.clone(),
            values: target.values.clone(),
            manifest: target.manifest.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state.is_pending()
    }

    pub fn mark_deployed(&mut self) {
        self.state = ReleaseState::Deployed;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, reason: String) {
        let now = Utc::now();
        self.state = ReleaseState::Failed {
            reason,
            failed_at: now,
        };
        self.updated_at = now;
    }

    /// Replaced by a newer revision
    pub fn mark_superseded(&mut self) {
        self.state = ReleaseState::Superseded;
        self.updated_at = Utc::now();
    }

    pub fn mark_uninstalled(&mut self) {
        self.state = ReleaseState::Uninstalled;
        self.updated_at = Utc::now();
    }
}

/// Release state, with timing information for pending operations
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "kebab-case")]
#[non_exhaustive]
pub enum ReleaseState {
    #[default]
    Deployed,

    Failed {
        reason: String,
        failed_at: DateTime<Utc>,
    },

    Uninstalled,

    Superseded,

    PendingInstall {
        started_at: DateTime<Utc>,
    },

    PendingUpgrade {
        started_at: DateTime<Utc>,
        previous_version: u32,
    },

    PendingRollback {
        started_at: DateTime<Utc>,
        target_version: u32,
    },
}

impl ReleaseState {
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Self::PendingInstall { .. } | Self::PendingUpgrade { .. } | Self::PendingRollback { .. }
        )
    }

    /// Human-readable status name
    pub fn status_name(&self) -> &'static str {
        match self {
            Self::Deployed => "deployed",
            Self::Failed { .. } => "failed",
            Self::Uninstalled => "uninstalled",
            Self::Superseded => "superseded",
            Self::PendingInstall { .. } => "pending-install",
            Self::PendingUpgrade { .. } => "pending-upgrade",
            Self::PendingRollback { .. } => "pending-rollback",
        }
    }
}

impl std::fmt::Display for ReleaseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Failed { reason, .. } => write!(f, "failed: {}", reason),
            other => write!(f, "{}", other.status_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> PackMetadata {
        serde_yaml::from_str("name: web\nversion: 1.2.0\n").unwrap()
    }

    fn install() -> StoredRelease {
        StoredRelease::for_install(
            "web".into(),
            "prod".into(),
            metadata(),
            Values::new(),
            "kind: ConfigMap\n".into(),
        )
    }

    #[test]
    fn test_install_starts_pending() {
        let release = install();
        assert_eq!(release.version, 1);
        assert!(release.is_pending());
        assert_eq!(release.state.status_name(), "pending-install");
    }

    #[test]
    fn test_upgrade_increments_version() {
        let mut first = install();
        first.mark_deployed();

        let second = StoredRelease::for_upgrade(&first, metadata(), Values::new(), "new".into());
        assert_eq!(second.version, 2);
        assert!(matches!(
            second.state,
            ReleaseState::PendingUpgrade {
                previous_version: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_rollback_copies_target_manifest() {
        let mut first = install();
        first.mark_superseded();
        let mut second = StoredRelease::for_upgrade(&first, metadata(), Values::new(), "v2".into());
        second.mark_deployed();

        let third = StoredRelease::for_rollback(&second, &first);
        assert_eq!(third.version, 3);
        assert_eq!(third.manifest, first.manifest);
        assert!(matches!(
            third.state,
            ReleaseState::PendingRollback {
                target_version: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_state_serialization() {
        let mut release = install();
        release.mark_failed("boom".into());

        let json = serde_json::to_value(&release).unwrap();
        assert_eq!(json["state"]["status"], "failed");
        assert_eq!(json["state"]["reason"], "boom");

        let back: StoredRelease = serde_json::from_value(json).unwrap();
        assert_eq!(back.state.to_string(), "failed: boom");
    }
}

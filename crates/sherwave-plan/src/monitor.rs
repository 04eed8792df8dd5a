//! Failure monitors
//!
//! A release lists the monitors to notify when it fails. Notification is
//! best-effort: failures are logged and never fail the sync.

use async_trait::async_trait;
use sherwave_core::{MonitorConfig, MonitorKind, MonitorReference, ReleaseId};
use std::sync::Arc;
use url::Url;

use crate::error::{PlanError, Result};

#[async_trait]
pub trait Monitor: Send + Sync {
    fn name(&self) -> &str;

    async fn notify_failure(&self, release: &ReleaseId, error: &str) -> Result<()>;
}

/// Emits an error event
pub struct LogMonitor {
    name: String,
}

impl LogMonitor {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Monitor for LogMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify_failure(&self, release: &ReleaseId, error: &str) -> Result<()> {
        tracing::error!(monitor = %self.name, release = %release, "release failed: {}", error);
        Ok(())
    }
}

/// POSTs `{"release": ..., "error": ...}` to a URL
pub struct WebhookMonitor {
    name: String,
    url: Url,
    client: reqwest::Client,
}

impl WebhookMonitor {
    pub fn new(name: impl Into<String>, url: &str) -> Result<Self> {
        let name = name.into();
        let url = Url::parse(url).map_err(|e| PlanError::Monitor {
            name: name.clone(),
            message: format!("invalid url '{}': {}", url, e),
        })?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("sherwave/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlanError::Monitor {
                name: name.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { name, url, client })
    }
}

#[async_trait]
impl Monitor for WebhookMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify_failure(&self, release: &ReleaseId, error: &str) -> Result<()> {
        let failed = |message: String| PlanError::Monitor {
            name: self.name.clone(),
            message,
        };

        let body = serde_json::json!({
            "release": release.to_string(),
            "error": error,
        });
        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("webhook answered {}", status)));
        }
        Ok(())
    }
}

/// Build the monitors a plan declares
pub fn build_monitors(configs: &[MonitorConfig]) -> Result<Vec<Arc<dyn Monitor>>> {
    configs
        .iter()
        .map(|config| -> Result<Arc<dyn Monitor>> {
            match (config.kind, config.url.as_deref()) {
                (MonitorKind::Log, _) => Ok(Arc::new(LogMonitor::new(&config.name))),
                (MonitorKind::Webhook, Some(url)) => {
                    Ok(Arc::new(WebhookMonitor::new(&config.name, url)?))
                }
                (MonitorKind::Webhook, None) => Err(PlanError::Monitor {
                    name: config.name.clone(),
                    message: "webhook monitor has no url".to_string(),
                }),
            }
        })
        .collect()
}

/// Notify the referenced monitors of a release failure
///
/// Returns how many monitors were notified successfully.
pub async fn notify_monitors(
    release: &ReleaseId,
    references: &[MonitorReference],
    monitors: &[Arc<dyn Monitor>],
    error: &str,
) -> usize {
    let mut notified = 0;
    for reference in references {
        let Some(monitor) = monitors.iter().find(|m| m.name() == reference.name) else {
            tracing::warn!(release = %release, monitor = %reference.name, "unknown monitor");
            continue;
        };
        match monitor.notify_failure(release, error).await {
            Ok(()) => notified += 1,
            Err(e) => {
                tracing::warn!(release = %release, monitor = %reference.name, error = %e, "monitor notification failed")
            }
        }
    }
    notified
}

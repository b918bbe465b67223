use crate::connection::manager::PoolManager;
use crate::core::{Result, ShardId};
use crate::topology::ShardDescriptor;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

/// Status of one shard, as seen by a probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HealthStatus {
    /// Reachable; carries the configured URL for operator visibility.
    Healthy { url: String },
    /// Unreachable; carries the captured error text.
    Unhealthy { detail: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthEntry {
    pub shard_id: ShardId,
    pub status: HealthStatus,
}

/// Per-shard status for every configured shard, in registry order.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    entries: Vec<HealthEntry>,
}

impl HealthReport {
    pub fn entries(&self) -> &[HealthEntry] {
        &self.entries
    }

    pub fn status_of(&self, shard_id: &ShardId) -> Option<&HealthStatus> {
        self.entries
            .iter()
            .find(|entry| &entry.shard_id == shard_id)
            .map(|entry| &entry.status)
    }

    pub fn all_healthy(&self) -> bool {
        self.entries.iter().all(|entry| entry.status.is_healthy())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Probes every configured shard's connectivity on demand.
///
/// Failures are data here, not errors: a dead shard becomes an unhealthy
/// entry so the report always covers the full registry.
pub struct HealthMonitor {
    manager: Arc<PoolManager>,
}

impl HealthMonitor {
    pub fn new(manager: Arc<PoolManager>) -> Self {
        Self { manager }
    }

    /// Probe all shards concurrently and report one entry per shard.
    pub async fn health_check(&self) -> HealthReport {
        let probes = self.manager.registry().iter().map(|descriptor| async move {
            let status = match self.probe(descriptor).await {
                Ok(()) => HealthStatus::Healthy {
                    url: descriptor.url.clone(),
                },
                Err(err) => {
                    warn!(shard_id = %descriptor.id, error = %err, "health probe failed");
                    HealthStatus::Unhealthy {
                        detail: err.to_string(),
                    }
                }
            };

            HealthEntry {
                shard_id: descriptor.id.clone(),
                status,
            }
        });

        HealthReport {
            entries: join_all(probes).await,
        }
    }

    async fn probe(&self, descriptor: &ShardDescriptor) -> Result<()> {
        let pool = self.manager.get_pool(&descriptor.id).await?;
        let mut guard = pool.acquire().await?;
        let result = guard.connection().ping().await;
        guard.release().await;
        result
    }
}

use super::Connector;
use super::pool::{PoolStats, ShardPool};
use crate::core::{Result, ShardError, ShardId};
use crate::topology::ShardRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Owns every connection pool in the process.
///
/// One pool per shard id, created on first use and cached until shutdown,
/// plus the eagerly-created main pool for operations not keyed by any
/// routing entity. Constructed once at startup and passed by reference;
/// there is no ambient global instance.
pub struct PoolManager {
    registry: ShardRegistry,
    connector: Arc<dyn Connector>,
    pools: RwLock<HashMap<ShardId, Arc<ShardPool>>>,
    main: Arc<ShardPool>,
    closed: AtomicBool,
}

impl PoolManager {
    /// Create the manager and its main pool. Shard pools stay lazy.
    pub async fn new(registry: ShardRegistry, connector: Arc<dyn Connector>) -> Result<Self> {
        let main = Arc::new(ShardPool::new(registry.main().clone(), Arc::clone(&connector)).await?);

        Ok(Self {
            registry,
            connector,
            pools: RwLock::new(HashMap::new()),
            main,
            closed: AtomicBool::new(false),
        })
    }

    pub fn registry(&self) -> &ShardRegistry {
        &self.registry
    }

    /// Get the pool for a shard, creating it on first use.
    ///
    /// Repeated calls return the same cached pool. Construction happens under
    /// the write lock, so concurrent first users of an uncached shard end up
    /// sharing one pool instead of racing to build two.
    pub async fn get_pool(&self, shard_id: &ShardId) -> Result<Arc<ShardPool>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ShardError::Closed(
                "pool manager is shut down".to_string(),
            ));
        }

        {
            let pools = self.pools.read().await;
            if let Some(pool) = pools.get(shard_id) {
                return Ok(Arc::clone(pool));
            }
        }

        let mut pools = self.pools.write().await;
        if let Some(pool) = pools.get(shard_id) {
            return Ok(Arc::clone(pool));
        }

        let descriptor = self
            .registry
            .get(shard_id)
            .ok_or_else(|| ShardError::UnknownShard(shard_id.to_string()))?;

        info!(shard_id = %shard_id, url = %descriptor.url, "creating connection pool");
        let pool = Arc::new(ShardPool::new(descriptor.clone(), Arc::clone(&self.connector)).await?);
        pools.insert(shard_id.clone(), Arc::clone(&pool));

        Ok(pool)
    }

    /// Pool for the first configured shard (the default band).
    pub async fn default_pool(&self) -> Result<Arc<ShardPool>> {
        let id = self.registry.default_shard().id.clone();
        self.get_pool(&id).await
    }

    /// The always-available pool for global, non-routed operations.
    pub fn main_pool(&self) -> Arc<ShardPool> {
        Arc::clone(&self.main)
    }

    /// Close every cached shard pool, then the main pool.
    ///
    /// Safe to call more than once; later calls are no-ops. After shutdown
    /// `get_pool` fails with [`ShardError::Closed`].
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("pool manager already shut down");
            return;
        }

        let pools = self.pools.read().await;
        for descriptor in self.registry.iter() {
            if let Some(pool) = pools.get(&descriptor.id) {
                pool.close().await;
            }
        }
        self.main.close().await;

        info!("all shard pools released");
    }

    /// Snapshot of every live pool's stats, shard pools in registry order,
    /// then the main pool under its own id.
    pub async fn stats(&self) -> Vec<(ShardId, PoolStats)> {
        let pools = self.pools.read().await;

        let mut snapshot = Vec::with_capacity(pools.len() + 1);
        for descriptor in self.registry.iter() {
            if let Some(pool) = pools.get(&descriptor.id) {
                snapshot.push((descriptor.id.clone(), pool.stats().await));
            }
        }
        snapshot.push((self.registry.main().id.clone(), self.main.stats().await));

        snapshot
    }
}

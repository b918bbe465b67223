use crate::connection::manager::PoolManager;
use crate::connection::pool::ShardPool;
use crate::core::{Result, ShardId, ShardOutcome};
use crate::routing::{KeyResolver, RoutingContext};
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Runs one operation against the pool selected for a routing context.
///
/// Selection order: forced shard verbatim, then resolved routing key, then
/// the default shard. Failures are logged with the shard id attached and
/// re-raised unchanged; retry policy belongs to the caller.
pub struct ShardExecutor {
    manager: Arc<PoolManager>,
    resolver: Arc<KeyResolver>,
}

impl ShardExecutor {
    pub fn new(manager: Arc<PoolManager>, resolver: Arc<KeyResolver>) -> Self {
        Self { manager, resolver }
    }

    /// The shard a context routes to, without executing anything.
    pub fn select_shard(&self, ctx: &RoutingContext) -> Result<ShardId> {
        match &ctx.forced_shard {
            Some(forced) => Ok(forced.clone()),
            None => self.resolver.resolve(ctx.routing_key.as_ref()),
        }
    }

    pub async fn execute<F, Fut, T>(&self, ctx: &RoutingContext, op: F) -> Result<T>
    where
        F: FnOnce(Arc<ShardPool>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let shard_id = self.select_shard(ctx)?;
        let pool = self.manager.get_pool(&shard_id).await?;

        match op(pool).await {
            Ok(value) => Ok(value),
            Err(err) => {
                error!(shard_id = %shard_id, error = %err, "shard operation failed");
                Err(err)
            }
        }
    }
}

/// Runs the same operation against every registered shard.
///
/// One [`ShardOutcome`] per shard, in registry order; a failing shard
/// (including one whose pool cannot be built) is recorded and never aborts
/// the remaining shards. Dispatch is concurrent, results are gathered.
pub struct CrossShardExecutor {
    manager: Arc<PoolManager>,
}

impl CrossShardExecutor {
    pub fn new(manager: Arc<PoolManager>) -> Self {
        Self { manager }
    }

    pub async fn execute_all<F, Fut, T>(&self, op: F) -> Vec<ShardOutcome<T>>
    where
        F: Fn(Arc<ShardPool>, ShardId) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let op = &op;
        let probes = self.manager.registry().iter().map(|descriptor| {
            let shard_id = descriptor.id.clone();
            async move {
                let outcome = match self.manager.get_pool(&shard_id).await {
                    Ok(pool) => op(pool, shard_id.clone()).await,
                    Err(err) => Err(err),
                };

                if let Err(err) = &outcome {
                    warn!(shard_id = %shard_id, error = %err, "cross-shard operation failed on shard");
                }

                ShardOutcome { shard_id, outcome }
            }
        });

        join_all(probes).await
    }
}

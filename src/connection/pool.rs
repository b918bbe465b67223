use super::{Connector, ShardConnection};
use crate::core::{Result, ShardError};
use crate::topology::ShardDescriptor;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

/// Bounded connection pool for one shard.
///
/// Pre-creates `min_connections` at construction (so a dead shard fails fast,
/// before the pool is cached), grows on demand up to `max_connections`, and
/// hands out connections through an RAII [`PoolGuard`].
pub struct ShardPool {
    descriptor: ShardDescriptor,
    connector: Arc<dyn Connector>,
    /// Available connections
    available: Arc<Mutex<VecDeque<Box<dyn ShardConnection>>>>,
    /// Total number of connections created
    total_connections: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for ShardPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardPool")
            .field("descriptor", &self.descriptor)
            .field(
                "total_connections",
                &self.total_connections.load(Ordering::SeqCst),
            )
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ShardPool {
    pub async fn new(descriptor: ShardDescriptor, connector: Arc<dyn Connector>) -> Result<Self> {
        descriptor
            .limits
            .validate()
            .map_err(ShardError::Configuration)?;

        let pool = Self {
            descriptor,
            connector,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        };

        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    pub fn descriptor(&self) -> &ShardDescriptor {
        &self.descriptor
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Get a connection from the pool
    pub async fn acquire(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if self.is_closed() {
                return Err(ShardError::Closed(format!(
                    "pool for shard '{}' is closed",
                    self.descriptor.id
                )));
            }

            // Try to get an available connection
            if let Some(connection) = self.try_get_available().await {
                return Ok(self.guard(connection));
            }

            // Try to create a new connection if under limit
            if let Some(connection) = self.try_create_connection().await? {
                return Ok(self.guard(connection));
            }

            // Check timeout
            if start.elapsed() > self.descriptor.limits.connect_timeout {
                return Err(ShardError::PoolTimeout(format!(
                    "no connections available for shard '{}'",
                    self.descriptor.id
                )));
            }

            // Wait a bit before retrying
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, connection: Box<dyn ShardConnection>) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            pool: Arc::clone(&self.available),
            total_connections: Arc::clone(&self.total_connections),
            closed: Arc::clone(&self.closed),
        }
    }

    async fn try_get_available(&self) -> Option<Box<dyn ShardConnection>> {
        let mut available = self.available.lock().await;
        available.pop_front()
    }

    /// Try to create a new connection if under limit
    async fn try_create_connection(&self) -> Result<Option<Box<dyn ShardConnection>>> {
        let total = self.total_connections.load(Ordering::SeqCst);
        if total >= self.descriptor.limits.max_connections {
            return Ok(None);
        }

        let connection = self.connector.connect(&self.descriptor).await?;
        self.total_connections.fetch_add(1, Ordering::SeqCst);

        Ok(Some(connection))
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) -> Result<()> {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.descriptor.limits.min_connections
        {
            let connection = self.connector.connect(&self.descriptor).await?;
            available.push_back(connection);
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    /// Close the pool and every idle connection in it.
    ///
    /// Idempotent: a second call is a no-op. Connections checked out at close
    /// time are dropped when their guards are.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut available = self.available.lock().await;
        while let Some(mut connection) = available.pop_front() {
            if let Err(err) = connection.close().await {
                warn!(shard_id = %self.descriptor.id, error = %err, "error closing pooled connection");
            }
        }
        self.total_connections.store(0, Ordering::SeqCst);
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.descriptor.limits.max_connections,
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped
pub struct PoolGuard {
    connection: Option<Box<dyn ShardConnection>>,
    pool: Arc<Mutex<VecDeque<Box<dyn ShardConnection>>>>,
    total_connections: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

impl PoolGuard {
    /// Get a reference to the connection
    pub fn connection(&mut self) -> &mut dyn ShardConnection {
        self.connection
            .as_deref_mut()
            .expect("Connection already returned to pool")
    }

    /// Execute a statement (convenience method)
    pub async fn execute(&mut self, statement: &str) -> Result<u64> {
        self.connection().execute(statement).await
    }

    /// Explicitly return the connection to the pool.
    ///
    /// Drop does the same via `try_lock`; this variant always succeeds.
    pub async fn release(mut self) {
        if let Some(connection) = self.connection.take() {
            if self.closed.load(Ordering::SeqCst) {
                // Pool already zeroed its count on close; just drop.
                drop(connection);
                return;
            }
            let mut pool = self.pool.lock().await;
            pool.push_back(connection);
        }
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            if self.closed.load(Ordering::SeqCst) {
                // Pool already zeroed its count on close; just drop.
                drop(connection);
                return;
            }

            // Try to return to pool if we can acquire the lock immediately
            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push_back(connection);
            } else {
                warn!("pool lock busy on guard drop, dropping connection");
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}

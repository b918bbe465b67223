pub mod manager;
pub mod memory;
pub mod pool;

use crate::core::Result;
use crate::topology::ShardDescriptor;
use async_trait::async_trait;

/// One live connection to a shard.
///
/// The ORM/query layer builds the statements; this layer only carries them to
/// the right shard. Implementations wrap the real driver for the deployment
/// (or [`memory::MemoryConnector`]'s in-process fake in tests).
#[async_trait]
pub trait ShardConnection: Send {
    /// Pass a statement through to the shard. Returns the affected row count.
    async fn execute(&mut self, statement: &str) -> Result<u64>;

    /// Minimal no-op round trip, used by health probes.
    async fn ping(&mut self) -> Result<()>;

    /// Close the connection. Closing twice is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// Factory for shard connections; the seam between this tier and the actual
/// database driver.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, descriptor: &ShardDescriptor) -> Result<Box<dyn ShardConnection>>;
}

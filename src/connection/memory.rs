use super::{Connector, ShardConnection};
use crate::core::{Result, ShardError};
use crate::topology::ShardDescriptor;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// What a [`MemoryConnector`] observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalEntry {
    Connected { shard: String },
    Statement { shard: String, statement: String },
    Ping { shard: String },
    Closed { shard: String },
}

#[derive(Default)]
struct MemoryState {
    refuse_connect: Mutex<HashSet<String>>,
    fail_ping: Mutex<HashSet<String>>,
    journal: Mutex<Vec<JournalEntry>>,
    live: Mutex<HashMap<String, usize>>,
}

/// In-process connector for tests and local development.
///
/// Simulates one database per shard id: journals every connect, statement,
/// ping, and close, tracks live connections per shard, and can be scripted to
/// refuse connections or fail pings for chosen shards.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    state: Arc<MemoryState>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `connect` fail for this shard until [`MemoryConnector::allow_connections`].
    pub fn refuse_connections(&self, shard_id: &str) {
        self.state
            .refuse_connect
            .lock()
            .unwrap()
            .insert(shard_id.to_string());
    }

    pub fn allow_connections(&self, shard_id: &str) {
        self.state.refuse_connect.lock().unwrap().remove(shard_id);
    }

    /// Make pings fail for this shard; existing connections stay usable.
    pub fn fail_pings(&self, shard_id: &str) {
        self.state
            .fail_ping
            .lock()
            .unwrap()
            .insert(shard_id.to_string());
    }

    /// Everything observed so far, in order.
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.state.journal.lock().unwrap().clone()
    }

    /// Statements executed against one shard, in order.
    pub fn statements_for(&self, shard_id: &str) -> Vec<String> {
        self.state
            .journal
            .lock()
            .unwrap()
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Statement { shard, statement } if shard == shard_id => {
                    Some(statement.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Currently open connections for one shard.
    pub fn live_connections(&self, shard_id: &str) -> usize {
        self.state
            .live
            .lock()
            .unwrap()
            .get(shard_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total connects observed for one shard.
    pub fn connects_for(&self, shard_id: &str) -> usize {
        self.state
            .journal
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| matches!(entry, JournalEntry::Connected { shard } if shard == shard_id))
            .count()
    }

    fn record(&self, entry: JournalEntry) {
        self.state.journal.lock().unwrap().push(entry);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, descriptor: &ShardDescriptor) -> Result<Box<dyn ShardConnection>> {
        let shard = descriptor.id.as_str().to_string();

        if self.state.refuse_connect.lock().unwrap().contains(&shard) {
            return Err(ShardError::Connectivity(format!(
                "connection refused by shard '{shard}'"
            )));
        }

        self.record(JournalEntry::Connected {
            shard: shard.clone(),
        });
        *self.state.live.lock().unwrap().entry(shard.clone()).or_insert(0) += 1;

        Ok(Box::new(MemoryConnection {
            shard,
            state: Arc::clone(&self.state),
            open: true,
        }))
    }
}

struct MemoryConnection {
    shard: String,
    state: Arc<MemoryState>,
    open: bool,
}

impl MemoryConnection {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(ShardError::Closed(format!(
                "connection to shard '{}' is closed",
                self.shard
            )))
        }
    }

    fn release_live(&mut self) {
        if self.open {
            self.open = false;
            let mut live = self.state.live.lock().unwrap();
            if let Some(count) = live.get_mut(&self.shard) {
                *count = count.saturating_sub(1);
            }
        }
    }
}

#[async_trait]
impl ShardConnection for MemoryConnection {
    async fn execute(&mut self, statement: &str) -> Result<u64> {
        self.ensure_open()?;
        self.state.journal.lock().unwrap().push(JournalEntry::Statement {
            shard: self.shard.clone(),
            statement: statement.to_string(),
        });
        Ok(1)
    }

    async fn ping(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.state.fail_ping.lock().unwrap().contains(&self.shard) {
            return Err(ShardError::Connectivity(format!(
                "ping failed for shard '{}'",
                self.shard
            )));
        }
        self.state.journal.lock().unwrap().push(JournalEntry::Ping {
            shard: self.shard.clone(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.state.journal.lock().unwrap().push(JournalEntry::Closed {
                shard: self.shard.clone(),
            });
            self.release_live();
        }
        Ok(())
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        // Dropped without an explicit close (e.g. guard drop after shutdown)
        self.release_live();
    }
}

use super::{Result, ShardError};
use serde::{Deserialize, Serialize};

/// Identifier of one database partition.
///
/// Shard ids are short stable strings ("shard_0", "shard_1", ...) declared in
/// the registry at startup and used as cache keys for connection pools.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ShardId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ShardId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Per-shard result of a fan-out execution.
///
/// A failure on one shard is captured here instead of aborting the fan-out,
/// so callers always receive one outcome per configured shard.
#[derive(Debug)]
pub struct ShardOutcome<T> {
    pub shard_id: ShardId,
    pub outcome: Result<T>,
}

impl<T> ShardOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The captured error, if this shard failed.
    pub fn err(&self) -> Option<&ShardError> {
        self.outcome.as_ref().err()
    }

    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }
}

use crate::core::{Result, ShardError, ShardId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default minimum pooled connections per shard.
pub const DEFAULT_MIN_CONNECTIONS: usize = 2;
/// Default maximum pooled connections per shard.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool bounds for one shard.
///
/// Timeouts live here rather than on the executors: waiting for a free
/// connection is a per-shard concern, configured per descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolLimits {
    pub min_connections: usize,
    pub max_connections: usize,
    /// Maximum time to wait for a connection when the pool is exhausted.
    pub connect_timeout: Duration,
}

impl PoolLimits {
    pub fn new(min_connections: usize, max_connections: usize) -> Self {
        Self {
            min_connections,
            max_connections,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Set minimum connections
    pub fn min_connections(mut self, min: usize) -> Self {
        self.min_connections = min;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the pool acquire timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        Ok(())
    }
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_CONNECTIONS, DEFAULT_MAX_CONNECTIONS)
    }
}

/// Connection parameters for one shard. Immutable after process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardDescriptor {
    pub id: ShardId,
    pub url: String,
    pub limits: PoolLimits,
}

impl ShardDescriptor {
    pub fn new(id: impl Into<ShardId>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            limits: PoolLimits::default(),
        }
    }

    /// Set pool limits
    pub fn limits(mut self, limits: PoolLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// The configured set of shards, plus the descriptor for the main pool.
///
/// Registry order is declaration order and is the order fan-out results and
/// health reports come back in. Read-only after construction.
#[derive(Debug, Clone)]
pub struct ShardRegistry {
    shards: Vec<ShardDescriptor>,
    main: ShardDescriptor,
}

impl ShardRegistry {
    pub fn new(shards: Vec<ShardDescriptor>, main: ShardDescriptor) -> Result<Self> {
        if shards.is_empty() {
            return Err(ShardError::Configuration(
                "shard registry cannot be empty".to_string(),
            ));
        }

        for (i, shard) in shards.iter().enumerate() {
            if shards[..i].iter().any(|other| other.id == shard.id) {
                return Err(ShardError::Configuration(format!(
                    "duplicate shard id '{}'",
                    shard.id
                )));
            }
            shard
                .limits
                .validate()
                .map_err(ShardError::Configuration)?;
        }
        main.limits.validate().map_err(ShardError::Configuration)?;

        Ok(Self { shards, main })
    }

    /// Load the registry from environment variables.
    ///
    /// Recognized variables:
    /// - `SHARD_<n>_URL` for n = 0, 1, ... (contiguous; stops at the first gap)
    /// - `DATABASE_URL` — generic fallback, used as shard 0 when no
    ///   `SHARD_<n>_URL` is set
    /// - `MAIN_DATABASE_URL` — main pool, falling back to `DATABASE_URL`,
    ///   then to shard 0's URL
    /// - `SHARD_POOL_MIN_CONNECTIONS` / `SHARD_POOL_MAX_CONNECTIONS`
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`ShardRegistry::from_env`] but with an injected variable
    /// lookup, so tests do not have to mutate process environment.
    pub fn from_env_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_count = |key: &str, default: usize| -> Result<usize> {
            match lookup(key) {
                None => Ok(default),
                Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                    ShardError::Configuration(format!("{key} must be an integer, got '{raw}'"))
                }),
            }
        };

        let min = parse_count("SHARD_POOL_MIN_CONNECTIONS", DEFAULT_MIN_CONNECTIONS)?;
        let max = parse_count("SHARD_POOL_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        let limits = PoolLimits::new(min, max);

        let generic = lookup("DATABASE_URL");

        let mut shards = Vec::new();
        let mut n = 0usize;
        while let Some(url) = lookup(&format!("SHARD_{n}_URL")) {
            shards.push(
                ShardDescriptor::new(format!("shard_{n}"), url).limits(limits.clone()),
            );
            n += 1;
        }

        if shards.is_empty() {
            match &generic {
                Some(url) => shards.push(
                    ShardDescriptor::new("shard_0", url.clone()).limits(limits.clone()),
                ),
                None => {
                    return Err(ShardError::Configuration(
                        "no shard connection URLs configured (set SHARD_0_URL or DATABASE_URL)"
                            .to_string(),
                    ));
                }
            }
        }

        let main_url = lookup("MAIN_DATABASE_URL")
            .or(generic)
            .unwrap_or_else(|| shards[0].url.clone());
        let main = ShardDescriptor::new("main", main_url).limits(limits);

        Self::new(shards, main)
    }

    pub fn get(&self, id: &ShardId) -> Option<&ShardDescriptor> {
        self.shards.iter().find(|shard| &shard.id == id)
    }

    pub fn contains(&self, id: &ShardId) -> bool {
        self.get(id).is_some()
    }

    /// The first configured shard. Anonymous and not-yet-assigned traffic
    /// lands here.
    pub fn default_shard(&self) -> &ShardDescriptor {
        &self.shards[0]
    }

    /// Descriptor for the main pool (global operations, outside the shard set).
    pub fn main(&self) -> &ShardDescriptor {
        &self.main
    }

    /// Iterate shards in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &ShardDescriptor> {
        self.shards.iter()
    }

    pub fn shard_ids(&self) -> impl Iterator<Item = &ShardId> {
        self.shards.iter().map(|shard| &shard.id)
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn descriptor(id: &str) -> ShardDescriptor {
        ShardDescriptor::new(id, format!("postgres://db/{id}"))
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_limits_builder() {
        let limits = PoolLimits::default()
            .min_connections(1)
            .max_connections(20)
            .connect_timeout(Duration::from_secs(5));

        assert_eq!(limits.min_connections, 1);
        assert_eq!(limits.max_connections, 20);
        assert_eq!(limits.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_limits_validate() {
        assert!(PoolLimits::default().validate().is_ok());
        assert!(PoolLimits::new(0, 0).validate().is_err());
        assert!(PoolLimits::new(10, 5).validate().is_err());
    }

    #[test]
    fn test_registry_rejects_empty() {
        let result = ShardRegistry::new(Vec::new(), descriptor("main"));
        assert!(matches!(result, Err(ShardError::Configuration(_))));
    }

    #[test]
    fn test_registry_rejects_duplicate_ids() {
        let result = ShardRegistry::new(
            vec![descriptor("shard_0"), descriptor("shard_0")],
            descriptor("main"),
        );
        assert!(matches!(result, Err(ShardError::Configuration(_))));
    }

    #[test]
    fn test_registry_lookup_and_order() {
        let registry = ShardRegistry::new(
            vec![descriptor("shard_0"), descriptor("shard_1")],
            descriptor("main"),
        )
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.default_shard().id, ShardId::new("shard_0"));
        assert!(registry.contains(&ShardId::new("shard_1")));
        assert!(!registry.contains(&ShardId::new("shard_9")));

        let ids: Vec<_> = registry.shard_ids().cloned().collect();
        assert_eq!(ids, vec![ShardId::new("shard_0"), ShardId::new("shard_1")]);
    }

    #[test]
    fn test_from_env_enumerated_shards() {
        let vars = env(&[
            ("SHARD_0_URL", "postgres://db0/app"),
            ("SHARD_1_URL", "postgres://db1/app"),
            ("SHARD_2_URL", "postgres://db2/app"),
            ("MAIN_DATABASE_URL", "postgres://main/app"),
        ]);

        let registry = ShardRegistry::from_env_with(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.get(&ShardId::new("shard_1")).unwrap().url, "postgres://db1/app");
        assert_eq!(registry.main().url, "postgres://main/app");
        assert_eq!(registry.main().limits.min_connections, DEFAULT_MIN_CONNECTIONS);
        assert_eq!(registry.main().limits.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_from_env_generic_fallback() {
        let vars = env(&[("DATABASE_URL", "postgres://solo/app")]);

        let registry = ShardRegistry::from_env_with(|key| vars.get(key).cloned()).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.default_shard().url, "postgres://solo/app");
        // Main pool falls back to the same generic URL
        assert_eq!(registry.main().url, "postgres://solo/app");
    }

    #[test]
    fn test_from_env_nothing_configured() {
        let result = ShardRegistry::from_env_with(|_| None);
        assert!(matches!(result, Err(ShardError::Configuration(_))));
    }

    #[test]
    fn test_from_env_pool_size_overrides() {
        let vars = env(&[
            ("SHARD_0_URL", "postgres://db0/app"),
            ("SHARD_POOL_MIN_CONNECTIONS", "4"),
            ("SHARD_POOL_MAX_CONNECTIONS", "32"),
        ]);

        let registry = ShardRegistry::from_env_with(|key| vars.get(key).cloned()).unwrap();

        let limits = &registry.default_shard().limits;
        assert_eq!(limits.min_connections, 4);
        assert_eq!(limits.max_connections, 32);
    }

    #[test]
    fn test_from_env_bad_pool_size() {
        let vars = env(&[
            ("SHARD_0_URL", "postgres://db0/app"),
            ("SHARD_POOL_MAX_CONNECTIONS", "many"),
        ]);

        let result = ShardRegistry::from_env_with(|key| vars.get(key).cloned());
        assert!(matches!(result, Err(ShardError::Configuration(_))));
    }

    #[test]
    fn test_from_env_stops_at_gap() {
        // shard_2 is missing, so shard_3 must not be picked up
        let vars = env(&[
            ("SHARD_0_URL", "postgres://db0/app"),
            ("SHARD_1_URL", "postgres://db1/app"),
            ("SHARD_3_URL", "postgres://db3/app"),
        ]);

        let registry = ShardRegistry::from_env_with(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(registry.len(), 2);
    }
}

use crate::core::{Result, ShardError, ShardId};
use crate::topology::ShardRegistry;
use tracing::{debug, warn};

/// Width of one routing-key band under the default partitioning plan.
pub const DEFAULT_BAND_WIDTH: u64 = 100_000;

/// A routing key as supplied by callers: either an already-numeric
/// user/client identifier or its string form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingKey {
    Numeric(u64),
    Text(String),
}

impl From<u64> for RoutingKey {
    fn from(id: u64) -> Self {
        Self::Numeric(id)
    }
}

impl From<&str> for RoutingKey {
    fn from(id: &str) -> Self {
        Self::Text(id.to_string())
    }
}

impl From<String> for RoutingKey {
    fn from(id: String) -> Self {
        Self::Text(id)
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoutingKey::Numeric(id) => write!(f, "{id}"),
            RoutingKey::Text(id) => write!(f, "{id}"),
        }
    }
}

/// How to treat string keys that do not parse as integers.
///
/// `DefaultBand` routes them to the first band, same as missing keys, so
/// anonymous or malformed callers stay routable. This is a deliberate policy
/// (guest traffic concentrates on the default band), not an accident; use
/// `Reject` to surface malformed keys to the caller instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedKeyPolicy {
    #[default]
    DefaultBand,
    Reject,
}

/// Contiguous numeric bands over the routing-key space, one band per shard
/// in registry order. The last band is open-ended, so every key maps to
/// exactly one shard.
#[derive(Debug, Clone)]
pub struct RangePartitioner {
    shard_ids: Vec<ShardId>,
    /// Exclusive upper bounds for every band except the last.
    boundaries: Vec<u64>,
}

impl RangePartitioner {
    /// Build a partitioner with explicit band boundaries.
    ///
    /// `boundaries[i]` is the exclusive upper bound of band `i`; there must be
    /// exactly one fewer boundary than shards, strictly increasing.
    pub fn with_boundaries(shard_ids: Vec<ShardId>, boundaries: Vec<u64>) -> Result<Self> {
        if shard_ids.is_empty() {
            return Err(ShardError::Configuration(
                "partitioner requires at least one shard".to_string(),
            ));
        }

        if boundaries.len() + 1 != shard_ids.len() {
            return Err(ShardError::Configuration(format!(
                "expected {} band boundaries for {} shards, got {}",
                shard_ids.len() - 1,
                shard_ids.len(),
                boundaries.len()
            )));
        }

        if boundaries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ShardError::Configuration(
                "band boundaries must be strictly increasing".to_string(),
            ));
        }

        Ok(Self {
            shard_ids,
            boundaries,
        })
    }

    /// Build bands of `width` keys each over the registry's shards, in
    /// registry order.
    pub fn with_band_width(registry: &ShardRegistry, width: u64) -> Result<Self> {
        if width == 0 {
            return Err(ShardError::Configuration(
                "band width must be > 0".to_string(),
            ));
        }

        let shard_ids: Vec<ShardId> = registry.shard_ids().cloned().collect();
        let boundaries = (1..shard_ids.len() as u64).map(|i| i * width).collect();
        Self::with_boundaries(shard_ids, boundaries)
    }

    /// Default plan: bands of [`DEFAULT_BAND_WIDTH`] keys.
    pub fn from_registry(registry: &ShardRegistry) -> Result<Self> {
        Self::with_band_width(registry, DEFAULT_BAND_WIDTH)
    }

    /// The shard owning `key`. Total: every key lands in some band.
    pub fn band_for(&self, key: u64) -> &ShardId {
        let band = self
            .boundaries
            .iter()
            .position(|upper| key < *upper)
            .unwrap_or(self.shard_ids.len() - 1);
        &self.shard_ids[band]
    }

    /// The first band, where missing keys are routed.
    pub fn default_band(&self) -> &ShardId {
        &self.shard_ids[0]
    }

    pub fn band_count(&self) -> usize {
        self.shard_ids.len()
    }
}

/// Maps routing keys to shard ids: numeric keys by range band, string keys
/// parsed first, missing keys to the default band.
#[derive(Debug, Clone)]
pub struct KeyResolver {
    partitioner: RangePartitioner,
    policy: MalformedKeyPolicy,
}

impl KeyResolver {
    pub fn new(partitioner: RangePartitioner, policy: MalformedKeyPolicy) -> Self {
        Self {
            partitioner,
            policy,
        }
    }

    /// Resolver over the registry's default band plan.
    pub fn from_registry(registry: &ShardRegistry) -> Result<Self> {
        Ok(Self::new(
            RangePartitioner::from_registry(registry)?,
            MalformedKeyPolicy::default(),
        ))
    }

    /// Set the malformed-key policy
    pub fn policy(mut self, policy: MalformedKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Resolve a routing key to its shard. A missing key routes to the
    /// default band; a non-numeric string key follows the configured
    /// [`MalformedKeyPolicy`].
    pub fn resolve(&self, key: Option<&RoutingKey>) -> Result<ShardId> {
        let shard_id = match key {
            None => {
                debug!("no routing key, using default band");
                self.partitioner.default_band().clone()
            }
            Some(RoutingKey::Numeric(id)) => self.partitioner.band_for(*id).clone(),
            Some(RoutingKey::Text(raw)) => match raw.trim().parse::<u64>() {
                Ok(id) => self.partitioner.band_for(id).clone(),
                Err(_) => match self.policy {
                    MalformedKeyPolicy::DefaultBand => {
                        warn!(routing_key = %raw, "non-numeric routing key, using default band");
                        self.partitioner.default_band().clone()
                    }
                    MalformedKeyPolicy::Reject => {
                        return Err(ShardError::MalformedKey(format!(
                            "routing key '{raw}' is not numeric"
                        )));
                    }
                },
            },
        };
        Ok(shard_id)
    }

    /// The shard for a user identifier.
    pub fn resolve_user(&self, user_id: u64) -> ShardId {
        self.partitioner.band_for(user_id).clone()
    }

    /// The shard for a service. Service placement follows the owning client's
    /// band; services never get an independent shard assignment.
    pub fn resolve_service(&self, _service_id: u64, client_id: u64) -> ShardId {
        self.resolve_user(client_id)
    }
}

/// Per-call routing input for single-shard execution.
///
/// A forced shard wins over key resolution; with neither, the operation runs
/// on the default shard.
#[derive(Debug, Clone, Default)]
pub struct RoutingContext {
    pub routing_key: Option<RoutingKey>,
    pub forced_shard: Option<ShardId>,
}

impl RoutingContext {
    /// Route by key.
    pub fn for_key(key: impl Into<RoutingKey>) -> Self {
        Self {
            routing_key: Some(key.into()),
            forced_shard: None,
        }
    }

    /// Route to a known shard, bypassing resolution. Used by callers that
    /// already hold the shard id, e.g. after a migration.
    pub fn forced(shard_id: impl Into<ShardId>) -> Self {
        Self {
            routing_key: None,
            forced_shard: Some(shard_id.into()),
        }
    }

    /// No key at all; resolves to the default shard.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::ShardDescriptor;

    fn registry(count: usize) -> ShardRegistry {
        let shards = (0..count)
            .map(|n| ShardDescriptor::new(format!("shard_{n}"), format!("postgres://db{n}/app")))
            .collect();
        ShardRegistry::new(shards, ShardDescriptor::new("main", "postgres://main/app")).unwrap()
    }

    fn resolver(count: usize) -> KeyResolver {
        KeyResolver::from_registry(&registry(count)).unwrap()
    }

    #[test]
    fn test_band_boundaries() {
        let resolver = resolver(3);

        assert_eq!(resolver.resolve_user(0), ShardId::new("shard_0"));
        assert_eq!(resolver.resolve_user(99_999), ShardId::new("shard_0"));
        assert_eq!(resolver.resolve_user(100_000), ShardId::new("shard_1"));
        assert_eq!(resolver.resolve_user(199_999), ShardId::new("shard_1"));
        assert_eq!(resolver.resolve_user(200_000), ShardId::new("shard_2"));
        assert_eq!(resolver.resolve_user(u64::MAX), ShardId::new("shard_2"));
    }

    #[test]
    fn test_missing_key_uses_default_band() {
        let resolver = resolver(3);
        assert_eq!(resolver.resolve(None).unwrap(), ShardId::new("shard_0"));
    }

    #[test]
    fn test_numeric_string_keys_are_parsed() {
        let resolver = resolver(3);
        let key = RoutingKey::from("150000");
        assert_eq!(resolver.resolve(Some(&key)).unwrap(), ShardId::new("shard_1"));
    }

    #[test]
    fn test_malformed_key_default_band_policy() {
        let resolver = resolver(3);
        let key = RoutingKey::from("not-a-number");
        assert_eq!(resolver.resolve(Some(&key)).unwrap(), ShardId::new("shard_0"));
    }

    #[test]
    fn test_malformed_key_reject_policy() {
        let resolver = resolver(3).policy(MalformedKeyPolicy::Reject);
        let key = RoutingKey::from("not-a-number");
        assert!(matches!(
            resolver.resolve(Some(&key)),
            Err(ShardError::MalformedKey(_))
        ));
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let resolver = resolver(3);
        for id in [0u64, 42, 99_999, 100_000, 150_000, 250_000] {
            assert_eq!(resolver.resolve_user(id), resolver.resolve_user(id));
        }
    }

    #[test]
    fn test_service_follows_owning_client() {
        let resolver = resolver(3);
        // Whatever the service id, placement is the client's band
        assert_eq!(
            resolver.resolve_service(7, 150_000),
            ShardId::new("shard_1")
        );
        assert_eq!(
            resolver.resolve_service(900_000, 150_000),
            ShardId::new("shard_1")
        );
    }

    #[test]
    fn test_single_shard_registry_gets_one_open_band() {
        let resolver = resolver(1);
        assert_eq!(resolver.resolve_user(0), ShardId::new("shard_0"));
        assert_eq!(resolver.resolve_user(5_000_000), ShardId::new("shard_0"));
    }

    #[test]
    fn test_partitioner_boundary_validation() {
        let ids = vec![ShardId::new("a"), ShardId::new("b"), ShardId::new("c")];

        assert!(RangePartitioner::with_boundaries(ids.clone(), vec![100, 50]).is_err());
        assert!(RangePartitioner::with_boundaries(ids.clone(), vec![100]).is_err());
        assert!(RangePartitioner::with_boundaries(ids, vec![100, 200]).is_ok());
        assert!(RangePartitioner::with_boundaries(Vec::new(), Vec::new()).is_err());
    }

    #[test]
    fn test_routing_context_constructors() {
        let by_key = RoutingContext::for_key(150_000u64);
        assert_eq!(by_key.routing_key, Some(RoutingKey::Numeric(150_000)));
        assert!(by_key.forced_shard.is_none());

        let forced = RoutingContext::forced("shard_2");
        assert_eq!(forced.forced_shard, Some(ShardId::new("shard_2")));
        assert!(forced.routing_key.is_none());

        let anonymous = RoutingContext::anonymous();
        assert!(anonymous.routing_key.is_none() && anonymous.forced_shard.is_none());
    }
}

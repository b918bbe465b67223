use crate::connection::manager::PoolManager;
use crate::core::{Result, ShardError, ShardId};
use crate::routing::RoutingKey;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Phases of moving one routing key's data between shards.
///
/// Happy path, strictly in order:
/// `Initiated → BackedUp → InsertedAtTarget → Verified → DeletedAtSource →
/// RoutingRepointed`. `Failed` is reachable from any non-terminal phase.
///
/// Ordering is what makes the move safe: the old copy must not be deleted
/// before the target copy is verified, and routing must not repoint before
/// verification. `RoutingRepointed` is the single durable commit point —
/// until it is reached, every reader still resolves to the source shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationPhase {
    Initiated,
    BackedUp,
    InsertedAtTarget,
    Verified,
    DeletedAtSource,
    RoutingRepointed,
    Failed,
}

impl MigrationPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationPhase::RoutingRepointed | MigrationPhase::Failed)
    }

    /// The next phase on the happy path, if any.
    pub fn next(&self) -> Option<MigrationPhase> {
        match self {
            MigrationPhase::Initiated => Some(MigrationPhase::BackedUp),
            MigrationPhase::BackedUp => Some(MigrationPhase::InsertedAtTarget),
            MigrationPhase::InsertedAtTarget => Some(MigrationPhase::Verified),
            MigrationPhase::Verified => Some(MigrationPhase::DeletedAtSource),
            MigrationPhase::DeletedAtSource => Some(MigrationPhase::RoutingRepointed),
            MigrationPhase::RoutingRepointed | MigrationPhase::Failed => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition: one step
    /// forward on the happy path, or `Failed` from any non-terminal phase.
    pub fn can_transition_to(&self, next: MigrationPhase) -> bool {
        if next == MigrationPhase::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(next)
    }
}

/// One requested move of a routing key's data from a source shard to a
/// target shard.
#[derive(Debug, Clone)]
pub struct MigrationTicket {
    pub id: Uuid,
    pub routing_key: RoutingKey,
    pub source: ShardId,
    pub target: ShardId,
}

impl MigrationTicket {
    pub fn new(
        routing_key: impl Into<RoutingKey>,
        source: impl Into<ShardId>,
        target: impl Into<ShardId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            routing_key: routing_key.into(),
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Coordinates inter-shard data moves.
///
/// Execution is not implemented yet: tickets are validated against the
/// registry and then rejected with [`ShardError::UnsupportedOperation`].
/// The phase machine above is the contract any future implementation must
/// honor.
pub struct MigrationCoordinator {
    manager: Arc<PoolManager>,
}

impl MigrationCoordinator {
    pub fn new(manager: Arc<PoolManager>) -> Self {
        Self { manager }
    }

    /// Validate a ticket and run the migration.
    ///
    /// Currently always fails with `UnsupportedOperation` after validation;
    /// callers must not treat this as a completed move.
    pub async fn migrate(&self, ticket: &MigrationTicket) -> Result<MigrationPhase> {
        self.validate(ticket)?;

        Err(ShardError::UnsupportedOperation(format!(
            "shard migration is not implemented (ticket {} moving key {} from '{}' to '{}')",
            ticket.id, ticket.routing_key, ticket.source, ticket.target
        )))
    }

    fn validate(&self, ticket: &MigrationTicket) -> Result<()> {
        let registry = self.manager.registry();

        for shard_id in [&ticket.source, &ticket.target] {
            if !registry.contains(shard_id) {
                return Err(ShardError::UnknownShard(shard_id.to_string()));
            }
        }

        if ticket.source == ticket.target {
            return Err(ShardError::Configuration(format!(
                "migration source and target are both '{}'",
                ticket.source
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::memory::MemoryConnector;
    use crate::topology::{ShardDescriptor, ShardRegistry};

    async fn coordinator() -> MigrationCoordinator {
        let shards = (0..2)
            .map(|n| ShardDescriptor::new(format!("shard_{n}"), format!("mem://shard_{n}")))
            .collect();
        let registry =
            ShardRegistry::new(shards, ShardDescriptor::new("main", "mem://main")).unwrap();
        let manager = Arc::new(
            PoolManager::new(registry, Arc::new(MemoryConnector::new()))
                .await
                .unwrap(),
        );
        MigrationCoordinator::new(manager)
    }

    #[test]
    fn test_happy_path_ordering() {
        use MigrationPhase::*;

        let mut phase = Initiated;
        let expected = [BackedUp, InsertedAtTarget, Verified, DeletedAtSource, RoutingRepointed];
        for next in expected {
            assert!(phase.can_transition_to(next));
            phase = next;
        }
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_no_skipping_phases() {
        use MigrationPhase::*;

        // Deleting the source copy before verification would lose data
        assert!(!InsertedAtTarget.can_transition_to(DeletedAtSource));
        // Repointing before the target copy is verified would split the key
        assert!(!BackedUp.can_transition_to(RoutingRepointed));
        assert!(!Initiated.can_transition_to(Verified));
    }

    #[test]
    fn test_failed_reachable_from_non_terminal_only() {
        use MigrationPhase::*;

        for phase in [Initiated, BackedUp, InsertedAtTarget, Verified, DeletedAtSource] {
            assert!(phase.can_transition_to(Failed));
        }
        assert!(!RoutingRepointed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_terminal_phases_go_nowhere() {
        use MigrationPhase::*;

        assert_eq!(RoutingRepointed.next(), None);
        assert_eq!(Failed.next(), None);
        assert!(!RoutingRepointed.can_transition_to(Initiated));
    }

    #[tokio::test]
    async fn test_migrate_reports_unsupported() {
        let coordinator = coordinator().await;
        let ticket = MigrationTicket::new(150_000u64, "shard_1", "shard_0");

        let result = coordinator.migrate(&ticket).await;
        assert!(matches!(result, Err(ShardError::UnsupportedOperation(_))));
    }

    #[tokio::test]
    async fn test_migrate_validates_shards_first() {
        let coordinator = coordinator().await;

        let unknown = MigrationTicket::new(1u64, "shard_0", "shard_9");
        assert!(matches!(
            coordinator.migrate(&unknown).await,
            Err(ShardError::UnknownShard(_))
        ));

        let same = MigrationTicket::new(1u64, "shard_0", "shard_0");
        assert!(matches!(
            coordinator.migrate(&same).await,
            Err(ShardError::Configuration(_))
        ));
    }
}

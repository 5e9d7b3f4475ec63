//! Ledger store interface and the in-memory implementation.

use crate::errors::{PoolResult, StorageError};
use crate::games::types::{ContributionEntry, GameInstance, GameVariant, SettlementRecord};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Durable record of game instances, their entries and settlements.
///
/// Every mutating call is all-or-nothing. Callers serialize writes per
/// variant, so implementations only need atomic multi-key writes, not
/// conflict detection.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Persist a fresh Active instance and make it the variant's current one
    async fn create_instance(&self, instance: &GameInstance) -> PoolResult<()>;

    /// Persist an admitted entry together with the instance's new total
    async fn append_entry(&self, entry: &ContributionEntry, new_total: u64) -> PoolResult<()>;

    /// Persist the ended instance and its settlement in one write
    async fn finalize(&self, instance: &GameInstance, settlement: &SettlementRecord) -> PoolResult<()>;

    /// Latest instance of the variant, active or most recently ended
    async fn current_instance(&self, variant: GameVariant) -> PoolResult<Option<GameInstance>>;

    async fn instance(&self, id: Uuid) -> PoolResult<Option<GameInstance>>;

    /// Entries of an instance in commit order
    async fn entries(&self, id: Uuid) -> PoolResult<Vec<ContributionEntry>>;

    async fn settlement(&self, id: Uuid) -> PoolResult<Option<SettlementRecord>>;
}

/// Per-instance row kept by `MemoryLedger`
#[derive(Debug, Clone)]
struct InstanceRow {
    instance: GameInstance,
    entries: Vec<ContributionEntry>,
    settlement: Option<SettlementRecord>,
}

/// Thread-safe in-process ledger
#[derive(Clone, Default)]
pub struct MemoryLedger {
    instances: Arc<DashMap<Uuid, InstanceRow>>,
    current: Arc<DashMap<GameVariant, Uuid>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of instances ever created
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    fn missing(id: Uuid) -> StorageError {
        StorageError::WriteFailed(format!("instance {} does not exist", id))
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn create_instance(&self, instance: &GameInstance) -> PoolResult<()> {
        self.instances.insert(
            instance.id,
            InstanceRow {
                instance: instance.clone(),
                entries: Vec::new(),
                settlement: None,
            },
        );
        self.current.insert(instance.variant, instance.id);
        Ok(())
    }

    async fn append_entry(&self, entry: &ContributionEntry, new_total: u64) -> PoolResult<()> {
        let mut row = self
            .instances
            .get_mut(&entry.game_instance_id)
            .ok_or_else(|| Self::missing(entry.game_instance_id))?;
        row.entries.push(entry.clone());
        row.instance.total = new_total;
        Ok(())
    }

    async fn finalize(&self, instance: &GameInstance, settlement: &SettlementRecord) -> PoolResult<()> {
        let mut row = self
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| Self::missing(instance.id))?;
        row.instance = instance.clone();
        row.settlement = Some(settlement.clone());
        Ok(())
    }

    async fn current_instance(&self, variant: GameVariant) -> PoolResult<Option<GameInstance>> {
        let Some(id) = self.current.get(&variant).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.instances.get(&id).map(|row| row.instance.clone()))
    }

    async fn instance(&self, id: Uuid) -> PoolResult<Option<GameInstance>> {
        Ok(self.instances.get(&id).map(|row| row.instance.clone()))
    }

    async fn entries(&self, id: Uuid) -> PoolResult<Vec<ContributionEntry>> {
        Ok(self
            .instances
            .get(&id)
            .map(|row| row.entries.clone())
            .unwrap_or_default())
    }

    async fn settlement(&self, id: Uuid) -> PoolResult<Option<SettlementRecord>> {
        Ok(self.instances.get(&id).and_then(|row| row.settlement.clone()))
    }
}

//! Persistent game ledger stored in RocksDB.
//!
//! Values are JSON. Entry keys end in the big-endian entry sequence so a
//! prefix scan returns an instance's entries in commit order.

use crate::{
    errors::{PoolResult, StorageError},
    games::{
        ledger::LedgerStore,
        types::{ContributionEntry, GameInstance, GameVariant, SettlementRecord},
    },
    storage::OptimizedStorage,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

const INSTANCE_PREFIX: &str = "game:instance:";
const CURRENT_PREFIX: &str = "game:current:";
const ENTRY_PREFIX: &str = "game:entry:";
const SETTLEMENT_PREFIX: &str = "game:settlement:";

fn instance_key(id: Uuid) -> Vec<u8> {
    format!("{}{}", INSTANCE_PREFIX, id).into_bytes()
}

fn current_key(variant: GameVariant) -> Vec<u8> {
    format!("{}{}", CURRENT_PREFIX, variant).into_bytes()
}

fn entry_prefix(instance_id: Uuid) -> Vec<u8> {
    format!("{}{}:", ENTRY_PREFIX, instance_id).into_bytes()
}

fn entry_key(instance_id: Uuid, sequence: u64) -> Vec<u8> {
    // Key layout: prefix | instance_id | ':' | sequence(be)
    let mut key = entry_prefix(instance_id);
    key.extend_from_slice(&sequence.to_be_bytes());
    key
}

fn settlement_key(id: Uuid) -> Vec<u8> {
    format!("{}{}", SETTLEMENT_PREFIX, id).into_bytes()
}

fn encode<T: Serialize>(value: &T, what: &str) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value)
        .map_err(|e| StorageError::WriteFailed(format!("Failed to encode {}: {}", what, e)))
}

fn decode<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, StorageError> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("Failed to decode {}: {}", what, e)))
}

/// `LedgerStore` backed by RocksDB write batches
#[derive(Clone)]
pub struct RocksLedger {
    storage: OptimizedStorage,
}

impl RocksLedger {
    pub fn new(storage: OptimizedStorage) -> Self {
        Self { storage }
    }

    fn load_instance(&self, id: Uuid) -> Result<Option<GameInstance>, StorageError> {
        match self.storage.get(&instance_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes, &format!("instance {}", id))?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl LedgerStore for RocksLedger {
    async fn create_instance(&self, instance: &GameInstance) -> PoolResult<()> {
        let bytes = encode(instance, "instance")?;
        self.storage.batch_write(&[
            (instance_key(instance.id), bytes),
            (current_key(instance.variant), instance.id.to_string().into_bytes()),
        ])?;

        tracing::debug!(instance_id = %instance.id, variant = %instance.variant, "Persisted new instance");
        Ok(())
    }

    async fn append_entry(&self, entry: &ContributionEntry, new_total: u64) -> PoolResult<()> {
        let mut instance = self.load_instance(entry.game_instance_id)?.ok_or_else(|| {
            StorageError::WriteFailed(format!("instance {} does not exist", entry.game_instance_id))
        })?;
        instance.total = new_total;

        self.storage.batch_write(&[
            (entry_key(entry.game_instance_id, entry.sequence), encode(entry, "entry")?),
            (instance_key(instance.id), encode(&instance, "instance")?),
        ])?;
        Ok(())
    }

    async fn finalize(&self, instance: &GameInstance, settlement: &SettlementRecord) -> PoolResult<()> {
        self.storage.batch_write(&[
            (instance_key(instance.id), encode(instance, "instance")?),
            (settlement_key(instance.id), encode(settlement, "settlement")?),
        ])?;

        tracing::debug!(instance_id = %instance.id, "Persisted settlement");
        Ok(())
    }

    async fn current_instance(&self, variant: GameVariant) -> PoolResult<Option<GameInstance>> {
        let Some(bytes) = self.storage.get(&current_key(variant))? else {
            return Ok(None);
        };

        let id = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                StorageError::CorruptedData(format!("Invalid current instance pointer for {}", variant))
            })?;

        let instance = self.load_instance(id)?.ok_or_else(|| {
            StorageError::CorruptedData(format!("Current {} instance {} is missing", variant, id))
        })?;
        Ok(Some(instance))
    }

    async fn instance(&self, id: Uuid) -> PoolResult<Option<GameInstance>> {
        Ok(self.load_instance(id)?)
    }

    async fn entries(&self, id: Uuid) -> PoolResult<Vec<ContributionEntry>> {
        let rows = self.storage.scan_prefix(&entry_prefix(id), usize::MAX)?;
        let entries = rows
            .iter()
            .map(|(_, value)| decode(value, "entry"))
            .collect::<Result<Vec<ContributionEntry>, StorageError>>()?;
        Ok(entries)
    }

    async fn settlement(&self, id: Uuid) -> PoolResult<Option<SettlementRecord>> {
        match self.storage.get(&settlement_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes, &format!("settlement {}", id))?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::settlement::{settle, RiskPolicy};
    use crate::games::types::{GameStatus, Multiplier};
    use chrono::Utc;

    fn entry(instance: &GameInstance, group: &str, amount: u64, sequence: u64) -> ContributionEntry {
        ContributionEntry {
            id: Uuid::new_v4(),
            game_instance_id: instance.id,
            group_id: group.to_string(),
            amount,
            requested_amount: amount,
            sequence,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_entries_come_back_in_commit_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RocksLedger::new(OptimizedStorage::new(dir.path()).unwrap());
        let instance = GameInstance::new(GameVariant::Risk, 10_000, Multiplier::from_f64(1.0).unwrap());
        ledger.create_instance(&instance).await.unwrap();

        // 256 crosses a byte boundary in the big-endian sequence
        let mut total = 0;
        for sequence in 1..=300u64 {
            total += 1;
            ledger.append_entry(&entry(&instance, "A", 1, sequence), total).await.unwrap();
        }

        let entries = ledger.entries(instance.id).await.unwrap();
        assert_eq!(entries.len(), 300);
        assert!(entries.windows(2).all(|w| w[0].sequence < w[1].sequence));
        assert_eq!(ledger.instance(instance.id).await.unwrap().unwrap().total, 300);
    }

    #[tokio::test]
    async fn test_finalize_persists_settlement() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RocksLedger::new(OptimizedStorage::new(dir.path()).unwrap());
        let mut instance = GameInstance::new(GameVariant::Risk, 500, Multiplier::from_f64(1.2).unwrap());
        ledger.create_instance(&instance).await.unwrap();

        let a = entry(&instance, "A", 300, 1);
        ledger.append_entry(&a, 300).await.unwrap();
        instance.total = 300;
        instance.status = GameStatus::Ended;

        let settlement = settle(&instance, &[a], RiskPolicy::AlwaysPay).unwrap();
        ledger.finalize(&instance, &settlement).await.unwrap();

        let current = ledger.current_instance(GameVariant::Risk).await.unwrap().unwrap();
        assert_eq!(current.status, GameStatus::Ended);
        assert_eq!(ledger.settlement(instance.id).await.unwrap(), Some(settlement));
        assert!(ledger.current_instance(GameVariant::Investment).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_entries_of_other_instances_are_not_mixed() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = RocksLedger::new(OptimizedStorage::new(dir.path()).unwrap());
        let first = GameInstance::new(GameVariant::Risk, 100, Multiplier::from_f64(1.0).unwrap());
        let second = GameInstance::new(GameVariant::Investment, 100, Multiplier::from_f64(1.0).unwrap());
        ledger.create_instance(&first).await.unwrap();
        ledger.create_instance(&second).await.unwrap();

        ledger.append_entry(&entry(&first, "A", 5, 1), 5).await.unwrap();
        ledger.append_entry(&entry(&second, "B", 7, 1), 7).await.unwrap();

        let entries = ledger.entries(first.id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].group_id, "A");
    }
}

//! Pool Accumulator
//!
//! Owns the live total of one game instance. Only the variant's worker task
//! holds an accumulator, so every admission is applied against the total left
//! by the previous one.

use crate::errors::{GameError, PoolResult};
use crate::games::{
    admission::admitted_amount,
    ledger::LedgerStore,
    types::{ContributionEntry, GameInstance, GameStatus},
};
use chrono::Utc;
use uuid::Uuid;

pub struct PoolAccumulator {
    instance: GameInstance,
    /// Number of entries committed so far
    committed: u64,
}

impl PoolAccumulator {
    pub fn new(instance: GameInstance) -> Self {
        Self { instance, committed: 0 }
    }

    /// Rebuild from persisted state, checking that the entries add up
    pub fn restore(instance: GameInstance, entries: &[ContributionEntry]) -> PoolResult<Self> {
        let sum = entries
            .iter()
            .try_fold(0u64, |acc, entry| acc.checked_add(entry.amount))
            .ok_or_else(|| GameError::InvariantViolation(format!(
                "entry sum overflows for instance {}",
                instance.id
            )))?;

        if sum != instance.total {
            return Err(GameError::InvariantViolation(format!(
                "instance {} has total {} but its {} entries sum to {}",
                instance.id,
                instance.total,
                entries.len(),
                sum
            )));
        }

        Ok(Self {
            instance,
            committed: entries.len() as u64,
        })
    }

    pub fn instance(&self) -> &GameInstance {
        &self.instance
    }

    pub fn id(&self) -> Uuid {
        self.instance.id
    }

    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Sequence of the last event this instance produced: one per entry,
    /// plus one for the end
    pub fn last_sequence(&self) -> u64 {
        match self.instance.status {
            GameStatus::Active => self.committed,
            GameStatus::Ended => self.committed + 1,
        }
    }

    pub fn is_active(&self) -> bool {
        self.instance.is_active()
    }

    pub fn is_full(&self) -> bool {
        self.instance.total >= self.instance.cap
    }

    /// Apply the cap rule and persist the entry with the new total.
    ///
    /// The in-memory total only moves after the store accepted the write, so
    /// a failed write leaves no trace.
    pub async fn admit(
        &mut self,
        store: &dyn LedgerStore,
        group_id: String,
        requested: u64,
    ) -> PoolResult<ContributionEntry> {
        if !self.is_active() {
            return Err(GameError::GameEnded {
                instance_id: self.instance.id.to_string(),
            });
        }

        let amount = admitted_amount(&self.instance, requested)?;
        let new_total = self.instance.total + amount;

        let entry = ContributionEntry {
            id: Uuid::new_v4(),
            game_instance_id: self.instance.id,
            group_id,
            amount,
            requested_amount: requested,
            sequence: self.committed + 1,
            created_at: Utc::now(),
        };

        store.append_entry(&entry, new_total).await?;

        self.instance.total = new_total;
        self.committed += 1;
        Ok(entry)
    }

    /// Copy of the instance as it will look once ended
    pub fn frozen(&self) -> GameInstance {
        let mut frozen = self.instance.clone();
        frozen.status = GameStatus::Ended;
        frozen.ended_at = Some(Utc::now());
        frozen
    }

    /// Adopt the ended instance after it has been persisted
    pub fn mark_ended(&mut self, ended: GameInstance) {
        debug_assert_eq!(ended.id, self.instance.id);
        debug_assert_eq!(ended.total, self.instance.total);
        self.instance = ended;
    }
}

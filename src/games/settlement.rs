//! Settlement Engine
//!
//! Pure payout computation over a frozen instance and its entries. Nothing here
//! touches storage; the lifecycle worker persists the resulting record.

use crate::errors::GameError;
use crate::games::types::{ContributionEntry, GameInstance, GameVariant, SettlementRecord};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a Risk game decides whether it paid out
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskPolicy {
    /// Every admitted entry is paid at the multiplier once the game ends
    #[default]
    AlwaysPay,
    /// Payouts only when the pool reached exactly its risk limit
    ForfeitUnlessFull,
}

/// Compute the settlement for an ended instance.
///
/// Fails with `InvariantViolation` when the entries do not add up to the
/// instance total or belong to another instance.
pub fn settle(
    instance: &GameInstance,
    entries: &[ContributionEntry],
    risk_policy: RiskPolicy,
) -> Result<SettlementRecord, GameError> {
    let mut stake_by_group: BTreeMap<String, u64> = BTreeMap::new();
    let mut sum: u64 = 0;

    for entry in entries {
        if entry.game_instance_id != instance.id {
            return Err(GameError::InvariantViolation(format!(
                "entry {} belongs to instance {}, not {}",
                entry.id, entry.game_instance_id, instance.id
            )));
        }
        sum = sum.checked_add(entry.amount).ok_or_else(|| {
            GameError::InvariantViolation(format!("entry sum overflows for instance {}", instance.id))
        })?;
        *stake_by_group.entry(entry.group_id.clone()).or_insert(0) += entry.amount;
    }

    if sum != instance.total {
        return Err(GameError::InvariantViolation(format!(
            "entries of instance {} sum to {} but total is {}",
            instance.id, sum, instance.total
        )));
    }

    let succeeded = match (instance.variant, risk_policy) {
        (GameVariant::Investment, _) => instance.total >= instance.cap,
        (GameVariant::Risk, RiskPolicy::AlwaysPay) => instance.total > 0,
        (GameVariant::Risk, RiskPolicy::ForfeitUnlessFull) => instance.total == instance.cap,
    };

    let pays_out = match (instance.variant, risk_policy) {
        (GameVariant::Risk, RiskPolicy::AlwaysPay) => true,
        _ => succeeded,
    };

    let mut payout_by_group = BTreeMap::new();
    for (group_id, stake) in stake_by_group {
        let payout = if pays_out {
            instance.multiplier.apply(stake).ok_or_else(|| {
                GameError::InvariantViolation(format!("payout for group {} overflows", group_id))
            })?
        } else {
            0
        };
        payout_by_group.insert(group_id, payout);
    }

    let record = SettlementRecord {
        game_instance_id: instance.id,
        variant: instance.variant,
        payout_by_group,
        succeeded,
        total: instance.total,
        settled_at: Utc::now(),
    };

    if record.total_payout().is_none() {
        return Err(GameError::InvariantViolation(format!(
            "total payout of instance {} overflows",
            instance.id
        )));
    }

    Ok(record)
}

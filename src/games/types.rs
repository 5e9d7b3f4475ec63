use crate::errors::GameError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Supported pool game variants
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum GameVariant {
    /// Soft cap: the last admitted contribution is trimmed to fill the pool
    Investment,
    /// Hard cap: contributions that would overflow the pool are rejected
    Risk,
}

impl GameVariant {
    pub const ALL: [GameVariant; 2] = [GameVariant::Investment, GameVariant::Risk];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameVariant::Investment => "investment",
            GameVariant::Risk => "risk",
        }
    }
}

impl fmt::Display for GameVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameVariant {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "investment" => Ok(GameVariant::Investment),
            "risk" => Ok(GameVariant::Risk),
            other => Err(GameError::InvalidConfig(format!("unknown game variant '{}'", other))),
        }
    }
}

/// Game instance status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    Active,
    Ended,
}

/// Payout multiplier as fixed-point basis points (10_000 = 1.0x).
///
/// Serialized as a decimal number so clients can send `1.5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Multiplier {
    basis_points: u64,
}

impl Multiplier {
    pub const SCALE: u64 = 10_000;

    pub fn from_basis_points(basis_points: u64) -> Result<Self, GameError> {
        if basis_points == 0 {
            return Err(GameError::InvalidConfig("multiplier must be positive".to_string()));
        }
        Ok(Self { basis_points })
    }

    /// Rounds to the nearest basis point
    pub fn from_f64(value: f64) -> Result<Self, GameError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(GameError::InvalidConfig(format!(
                "multiplier must be a positive number, got {}",
                value
            )));
        }
        let scaled = (value * Self::SCALE as f64).round();
        if scaled > u64::MAX as f64 {
            return Err(GameError::InvalidConfig(format!("multiplier {} is too large", value)));
        }
        Self::from_basis_points(scaled as u64)
    }

    pub fn basis_points(&self) -> u64 {
        self.basis_points
    }

    pub fn as_f64(&self) -> f64 {
        self.basis_points as f64 / Self::SCALE as f64
    }

    /// `floor(amount * multiplier)`, or `None` when the result overflows u64
    pub fn apply(&self, amount: u64) -> Option<u64> {
        let scaled = amount as u128 * self.basis_points as u128 / Self::SCALE as u128;
        u64::try_from(scaled).ok()
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.as_f64())
    }
}

impl Serialize for Multiplier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Multiplier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Multiplier::from_f64(value).map_err(serde::de::Error::custom)
    }
}

/// One run of a game variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GameInstance {
    pub id: Uuid,
    pub variant: GameVariant,
    /// Threshold for Investment, risk limit for Risk
    pub cap: u64,
    pub multiplier: Multiplier,
    pub status: GameStatus,
    pub total: u64,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameInstance {
    pub fn new(variant: GameVariant, cap: u64, multiplier: Multiplier) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant,
            cap,
            multiplier,
            status: GameStatus::Active,
            total: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == GameStatus::Active
    }
}

/// A group's admitted stake in one instance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContributionEntry {
    pub id: Uuid,
    pub game_instance_id: Uuid,
    pub group_id: String,
    /// Admitted amount, may be less than requested for Investment games
    pub amount: u64,
    pub requested_amount: u64,
    /// Position in the instance's commit order, starting at 1
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl ContributionEntry {
    pub fn is_partial(&self) -> bool {
        self.amount < self.requested_amount
    }
}

/// Payouts computed once when an instance ends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRecord {
    pub game_instance_id: Uuid,
    pub variant: GameVariant,
    pub payout_by_group: BTreeMap<String, u64>,
    pub succeeded: bool,
    pub total: u64,
    pub settled_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Sum of all payouts; `None` if it does not fit in a u64
    pub fn total_payout(&self) -> Option<u64> {
        self.payout_by_group
            .values()
            .try_fold(0u64, |acc, payout| acc.checked_add(*payout))
    }
}

/// Ended instance paired with its settlement
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettledGame {
    pub instance: GameInstance,
    pub settlement: SettlementRecord,
}

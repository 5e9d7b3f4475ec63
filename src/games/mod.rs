//! Collective pool game core
//!
//! Admission rules, the per-instance accumulator, lifecycle workers,
//! settlement and event publishing.

pub mod accumulator;
pub mod admission;
pub mod broadcast;
pub mod ledger;
pub mod lifecycle;
pub mod settlement;
pub mod types;

pub use broadcast::{BroadcastPublisher, GameEvent};
pub use ledger::{LedgerStore, MemoryLedger};
pub use lifecycle::GameEngine;
pub use settlement::RiskPolicy;
pub use types::*;

//! Poolgame - Capped Pool Games With Live Progress
//!
//! Two game variants accept contributions from groups into a capped pool.
//! An admin starts and ends each game; ending settles payouts with the
//! game's multiplier and records the result. Progress is broadcast to
//! viewers as contributions commit.

pub mod api;
pub mod config;
pub mod errors;
pub mod game_store;
pub mod games;
pub mod storage;

pub use config::{ConfigLoader, PoolConfig, StorageBackend};
pub use errors::{GameError, PoolResult};
pub use game_store::RocksLedger;
pub use games::{BroadcastPublisher, GameEngine, GameEvent, LedgerStore, MemoryLedger};
pub use storage::OptimizedStorage;

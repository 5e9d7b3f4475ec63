//! Broadcast Publisher
//!
//! Fire-and-forget fan-out of game events over a tokio broadcast channel.
//! Ordering per variant follows from the single writer that calls in here
//! after each commit; `sequence` lets subscribers detect gaps.
//!
//! The publisher also keeps the latest state of every variant. Sending an
//! event and updating that state happen under one lock, so a subscriber that
//! takes a snapshot together with its receiver sees every later commit
//! exactly once and no earlier one.

use crate::games::types::{GameInstance, GameStatus, GameVariant};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Events published to viewers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum GameEvent {
    #[serde(rename = "progressUpdate", rename_all = "camelCase")]
    ProgressUpdate {
        variant: GameVariant,
        instance_id: Uuid,
        total: u64,
        cap: u64,
        sequence: u64,
    },

    #[serde(rename = "gameStatusChanged", rename_all = "camelCase")]
    GameStatusChanged {
        variant: GameVariant,
        instance_id: Uuid,
        status: GameStatus,
        sequence: u64,
    },
}

impl GameEvent {
    pub fn progress(instance: &GameInstance, sequence: u64) -> Self {
        GameEvent::ProgressUpdate {
            variant: instance.variant,
            instance_id: instance.id,
            total: instance.total,
            cap: instance.cap,
            sequence,
        }
    }

    pub fn status_changed(instance: &GameInstance, sequence: u64) -> Self {
        GameEvent::GameStatusChanged {
            variant: instance.variant,
            instance_id: instance.id,
            status: instance.status,
            sequence,
        }
    }

    pub fn variant(&self) -> GameVariant {
        match self {
            GameEvent::ProgressUpdate { variant, .. } => *variant,
            GameEvent::GameStatusChanged { variant, .. } => *variant,
        }
    }

    pub fn sequence(&self) -> u64 {
        match self {
            GameEvent::ProgressUpdate { sequence, .. } => *sequence,
            GameEvent::GameStatusChanged { sequence, .. } => *sequence,
        }
    }

    /// Event shape the admin panel front-end listens for
    pub fn to_legacy_json(&self) -> serde_json::Value {
        match self {
            GameEvent::ProgressUpdate { variant: GameVariant::Investment, total, .. } => json!({
                "type": "investmentUpdate",
                "totalInvested": total,
            }),
            GameEvent::ProgressUpdate { variant: GameVariant::Risk, total, .. } => json!({
                "type": "riskUpdate",
                "totalRisk": total,
            }),
            GameEvent::GameStatusChanged { variant, status, .. } => json!({
                "type": "gameStatusChanged",
                "game": variant,
                "status": status,
            }),
        }
    }
}

/// Latest committed state of one variant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VariantSnapshot {
    pub variant: GameVariant,
    pub instance: Option<GameInstance>,
    /// Sequence of the last event published for `instance`
    pub sequence: u64,
}

impl VariantSnapshot {
    fn empty(variant: GameVariant) -> Self {
        Self {
            variant,
            instance: None,
            sequence: 0,
        }
    }

    /// Events that replay this state for a viewer that only knows event
    /// shapes, in the order the commits happened
    pub fn replay_events(&self) -> Vec<GameEvent> {
        let Some(instance) = &self.instance else {
            return Vec::new();
        };

        match instance.status {
            GameStatus::Active => vec![
                GameEvent::status_changed(instance, 0),
                GameEvent::progress(instance, self.sequence),
            ],
            GameStatus::Ended => vec![
                GameEvent::progress(instance, self.sequence.saturating_sub(1)),
                GameEvent::status_changed(instance, self.sequence),
            ],
        }
    }
}

/// Lifecycle events published since the process started
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishedCounts {
    pub games_started: u64,
    pub games_ended: u64,
    pub progress_updates: u64,
}

struct PublisherState {
    latest: HashMap<GameVariant, VariantSnapshot>,
    counts: PublishedCounts,
}

/// Publishes game events to every current subscriber
#[derive(Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<GameEvent>,
    state: Arc<Mutex<PublisherState>>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        let latest = GameVariant::ALL
            .into_iter()
            .map(|variant| (variant, VariantSnapshot::empty(variant)))
            .collect();

        Self {
            tx,
            state: Arc::new(Mutex::new(PublisherState {
                latest,
                counts: PublishedCounts::default(),
            })),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    /// Receiver plus the state of every variant as of the moment it was
    /// created. Each receiver yields exactly the commits its snapshot lacks.
    pub fn subscribe_with_snapshot(&self) -> (broadcast::Receiver<GameEvent>, Vec<VariantSnapshot>) {
        let state = self.lock();
        let rx = self.tx.subscribe();
        let snapshots = GameVariant::ALL
            .into_iter()
            .map(|variant| snapshot_of(&state, variant))
            .collect();
        (rx, snapshots)
    }

    pub fn snapshot(&self, variant: GameVariant) -> VariantSnapshot {
        snapshot_of(&self.lock(), variant)
    }

    pub fn counts(&self) -> PublishedCounts {
        self.lock().counts
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Seed the state of a variant recovered from the ledger, without
    /// emitting anything
    pub fn restore(&self, instance: GameInstance, sequence: u64) {
        let variant = instance.variant;
        self.lock().latest.insert(
            variant,
            VariantSnapshot {
                variant,
                instance: Some(instance),
                sequence,
            },
        );
    }

    pub fn publish_progress(&self, instance: &GameInstance, sequence: u64) {
        let mut state = self.lock();
        state.counts.progress_updates += 1;
        self.commit(&mut state, instance, GameEvent::progress(instance, sequence));
    }

    pub fn publish_status_changed(&self, instance: &GameInstance, sequence: u64) {
        let mut state = self.lock();
        match instance.status {
            GameStatus::Active => state.counts.games_started += 1,
            GameStatus::Ended => state.counts.games_ended += 1,
        }
        self.commit(&mut state, instance, GameEvent::status_changed(instance, sequence));
    }

    fn commit(&self, state: &mut PublisherState, instance: &GameInstance, event: GameEvent) {
        state.latest.insert(
            instance.variant,
            VariantSnapshot {
                variant: instance.variant,
                instance: Some(instance.clone()),
                sequence: event.sequence(),
            },
        );

        if let Err(e) = self.tx.send(event) {
            debug!("No subscribers for game event: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        // State is replaced wholesale on every commit, so a poisoned guard
        // still holds a consistent value
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn snapshot_of(state: &PublisherState, variant: GameVariant) -> VariantSnapshot {
    state
        .latest
        .get(&variant)
        .cloned()
        .unwrap_or_else(|| VariantSnapshot::empty(variant))
}

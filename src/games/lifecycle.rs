//! Game Lifecycle Manager
//!
//! `GameEngine` is the handle collaborators use. Each variant runs one worker
//! task that owns the variant's accumulator and applies start, end and admit
//! commands strictly one after another. Callers talk to it over an mpsc queue
//! and get answers on oneshot channels; dropping the answer channel never
//! interrupts a command that is already being applied. Reads of the current
//! instance come from the publisher's snapshot and never queue behind writes.

use crate::config::GamesConfig;
use crate::errors::{GameError, PoolResult};
use crate::games::{
    accumulator::PoolAccumulator,
    admission::validate_requested,
    broadcast::{BroadcastPublisher, GameEvent, VariantSnapshot},
    ledger::LedgerStore,
    settlement::settle,
    types::{
        ContributionEntry, GameInstance, GameVariant, Multiplier, SettledGame,
        SettlementRecord,
    },
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

enum Command {
    Start {
        cap: u64,
        multiplier: Multiplier,
        reply: oneshot::Sender<PoolResult<GameInstance>>,
    },
    End {
        reply: oneshot::Sender<PoolResult<SettledGame>>,
    },
    Admit {
        expected: Option<Uuid>,
        group_id: String,
        requested: u64,
        reply: oneshot::Sender<PoolResult<ContributionEntry>>,
    },
}

/// Entry point for starting, ending and contributing to pool games
#[derive(Clone)]
pub struct GameEngine {
    variants: Arc<HashMap<GameVariant, mpsc::Sender<Command>>>,
    store: Arc<dyn LedgerStore>,
    publisher: BroadcastPublisher,
}

impl GameEngine {
    /// Restore every variant from the store and start its worker.
    ///
    /// Must be called inside a tokio runtime. Fails with
    /// `InvariantViolation` when a persisted instance does not match its
    /// entries.
    pub async fn spawn(
        store: Arc<dyn LedgerStore>,
        publisher: BroadcastPublisher,
        config: GamesConfig,
    ) -> PoolResult<Self> {
        let mut variants = HashMap::new();

        for variant in GameVariant::ALL {
            let accumulator = match store.current_instance(variant).await? {
                Some(instance) => {
                    let entries = store.entries(instance.id).await?;
                    let restored = PoolAccumulator::restore(instance, &entries)?;
                    publisher.restore(restored.instance().clone(), restored.last_sequence());
                    info!(
                        variant = %variant,
                        instance_id = %restored.id(),
                        total = restored.instance().total,
                        entries = restored.committed(),
                        active = restored.is_active(),
                        "Restored game instance"
                    );
                    Some(restored)
                }
                None => None,
            };

            let (commands, rx) = mpsc::channel(config.command_buffer.max(1));

            let worker = VariantWorker {
                variant,
                store: store.clone(),
                publisher: publisher.clone(),
                config: config.clone(),
                accumulator,
            };
            tokio::spawn(worker.run(rx));

            variants.insert(variant, commands);
        }

        Ok(Self {
            variants: Arc::new(variants),
            store,
            publisher,
        })
    }

    /// Start a new instance of `variant`
    pub async fn start(&self, variant: GameVariant, cap: i64, multiplier: f64) -> PoolResult<GameInstance> {
        if cap <= 0 {
            return Err(GameError::InvalidConfig(format!("cap must be positive, got {}", cap)));
        }
        let multiplier = Multiplier::from_f64(multiplier)?;

        let (reply, rx) = oneshot::channel();
        self.dispatch(
            variant,
            Command::Start {
                cap: cap as u64,
                multiplier,
                reply,
            },
            rx,
        )
        .await
    }

    /// End the active instance of `variant` and settle it
    pub async fn end(&self, variant: GameVariant) -> PoolResult<SettledGame> {
        let (reply, rx) = oneshot::channel();
        self.dispatch(variant, Command::End { reply }, rx).await
    }

    /// Contribute `requested` on behalf of `group_id` to the active instance
    pub async fn admit(
        &self,
        variant: GameVariant,
        group_id: impl Into<String>,
        requested: i64,
    ) -> PoolResult<ContributionEntry> {
        let requested = validate_requested(requested)?;
        let expected = self.current_instance(variant).map(|instance| instance.id);

        let (reply, rx) = oneshot::channel();
        self.dispatch(
            variant,
            Command::Admit {
                expected,
                group_id: group_id.into(),
                requested,
                reply,
            },
            rx,
        )
        .await
    }

    /// Active instance of `variant`, if any
    pub fn active_instance(&self, variant: GameVariant) -> Option<GameInstance> {
        self.current_instance(variant).filter(GameInstance::is_active)
    }

    /// Latest instance of `variant`, including one that has already ended
    pub fn current_instance(&self, variant: GameVariant) -> Option<GameInstance> {
        self.publisher.snapshot(variant).instance
    }

    pub async fn instance(&self, id: Uuid) -> PoolResult<Option<GameInstance>> {
        self.store.instance(id).await
    }

    pub async fn entries(&self, id: Uuid) -> PoolResult<Vec<ContributionEntry>> {
        self.store.entries(id).await
    }

    pub async fn settlement(&self, id: Uuid) -> PoolResult<Option<SettlementRecord>> {
        self.store.settlement(id).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.publisher.subscribe()
    }

    /// Event receiver together with the state it starts from
    pub fn subscribe_with_snapshot(&self) -> (broadcast::Receiver<GameEvent>, Vec<VariantSnapshot>) {
        self.publisher.subscribe_with_snapshot()
    }

    pub fn publisher(&self) -> &BroadcastPublisher {
        &self.publisher
    }

    async fn dispatch<T>(
        &self,
        variant: GameVariant,
        command: Command,
        rx: oneshot::Receiver<PoolResult<T>>,
    ) -> PoolResult<T> {
        let commands = self
            .variants
            .get(&variant)
            .ok_or_else(|| GameError::EngineUnavailable(variant.to_string()))?;

        commands
            .send(command)
            .await
            .map_err(|_| GameError::EngineUnavailable(variant.to_string()))?;

        rx.await
            .map_err(|_| GameError::EngineUnavailable(variant.to_string()))?
    }
}

/// Single writer for one variant
struct VariantWorker {
    variant: GameVariant,
    store: Arc<dyn LedgerStore>,
    publisher: BroadcastPublisher,
    config: GamesConfig,
    accumulator: Option<PoolAccumulator>,
}

impl VariantWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(variant = %self.variant, "Game worker started");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { cap, multiplier, reply } => {
                    let result = self.start(cap, multiplier).await;
                    if reply.send(result).is_err() {
                        debug!(variant = %self.variant, "Start caller went away");
                    }
                }
                Command::End { reply } => {
                    let result = self.end().await;
                    if reply.send(result).is_err() {
                        debug!(variant = %self.variant, "End caller went away");
                    }
                }
                Command::Admit { expected, group_id, requested, reply } => {
                    let result = self.admit(expected, group_id, requested).await;
                    if reply.send(result).is_err() {
                        debug!(variant = %self.variant, "Contribution caller went away");
                    }
                }
            }
        }

        debug!(variant = %self.variant, "Game worker stopped");
    }

    async fn start(&mut self, cap: u64, multiplier: Multiplier) -> PoolResult<GameInstance> {
        if self.accumulator.as_ref().map_or(false, PoolAccumulator::is_active) {
            return Err(GameError::AlreadyActive {
                variant: self.variant.to_string(),
            });
        }

        let instance = GameInstance::new(self.variant, cap, multiplier);
        self.store.create_instance(&instance).await?;
        self.accumulator = Some(PoolAccumulator::new(instance.clone()));

        info!(
            variant = %self.variant,
            instance_id = %instance.id,
            cap,
            multiplier = %multiplier,
            "Game started"
        );

        self.publisher.publish_status_changed(&instance, 0);
        Ok(instance)
    }

    async fn end(&mut self) -> PoolResult<SettledGame> {
        let Some(accumulator) = self.accumulator.as_mut().filter(|acc| acc.is_active()) else {
            return Err(GameError::NoActiveGame {
                variant: self.variant.to_string(),
            });
        };

        let frozen = accumulator.frozen();
        let entries = self.store.entries(frozen.id).await?;

        let settlement = match settle(&frozen, &entries, self.config.risk_policy) {
            Ok(settlement) => settlement,
            Err(e) => {
                error!(
                    variant = %self.variant,
                    instance_id = %frozen.id,
                    error = %e,
                    "Settlement failed, game stays active"
                );
                return Err(e);
            }
        };

        self.store.finalize(&frozen, &settlement).await?;
        accumulator.mark_ended(frozen.clone());

        info!(
            variant = %self.variant,
            instance_id = %frozen.id,
            total = frozen.total,
            succeeded = settlement.succeeded,
            groups = settlement.payout_by_group.len(),
            total_payout = settlement.total_payout().unwrap_or_default(),
            "Game ended and settled"
        );

        self.publisher
            .publish_status_changed(&frozen, accumulator.last_sequence());

        Ok(SettledGame {
            instance: frozen,
            settlement,
        })
    }

    async fn admit(
        &mut self,
        expected: Option<Uuid>,
        group_id: String,
        requested: u64,
    ) -> PoolResult<ContributionEntry> {
        let Some(accumulator) = self.accumulator.as_mut() else {
            return Err(GameError::NoActiveGame {
                variant: self.variant.to_string(),
            });
        };

        if let Some(expected) = expected.filter(|id| *id != accumulator.id()) {
            // Caller targeted an instance that ended and was replaced meanwhile
            return Err(GameError::GameEnded {
                instance_id: expected.to_string(),
            });
        }

        let entry = accumulator
            .admit(self.store.as_ref(), group_id, requested)
            .await?;
        let instance = accumulator.instance().clone();
        let full = accumulator.is_full();

        debug!(
            variant = %self.variant,
            instance_id = %instance.id,
            group_id = %entry.group_id,
            requested,
            admitted = entry.amount,
            total = instance.total,
            "Contribution admitted"
        );

        self.publisher.publish_progress(&instance, entry.sequence);

        if full && self.config.auto_end_on_cap {
            match self.end().await {
                Ok(settled) => info!(
                    variant = %self.variant,
                    instance_id = %settled.instance.id,
                    "Cap reached, game ended automatically"
                ),
                Err(e) => warn!(
                    variant = %self.variant,
                    error = %e,
                    "Automatic end after reaching cap failed"
                ),
            }
        }

        Ok(entry)
    }
}

//! WebSocket Support for Live Game Progress
//!
//! Each viewer gets the current state of the games it follows on connect,
//! then every matching event as the engine publishes it. A viewer whose
//! receiver fell behind drops its receiver and starts over from a fresh
//! snapshot, so it never sees a total older than one already shown.

use super::{handlers::AppState, monitoring::MetricsRegistry};
use crate::games::{
    broadcast::VariantSnapshot,
    types::GameVariant,
    GameEngine, GameEvent,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    time::interval,
};
use tracing::{debug, info, warn};

/// Frames the server sends besides game events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsFrame {
    /// Full state of one variant; events that follow continue from its
    /// `sequence`
    #[serde(rename = "snapshot")]
    Snapshot(VariantSnapshot),

    /// Keeps idle connections open
    #[serde(rename = "heartbeat")]
    Heartbeat { timestamp: i64 },
}

/// Which events a viewer receives
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    /// Only this variant; both when absent
    #[serde(default)]
    pub variant: Option<GameVariant>,

    /// Use the admin panel's original event names
    #[serde(default)]
    pub legacy: bool,
}

impl WsQuery {
    fn follows(&self, variant: GameVariant) -> bool {
        self.variant.map_or(true, |v| v == variant)
    }
}

/// Encoded frames for one viewer, in commit order
pub struct ViewerFeed {
    engine: GameEngine,
    query: WsQuery,
    events: broadcast::Receiver<GameEvent>,
}

impl ViewerFeed {
    /// Subscribe and return the frames describing the current state
    pub fn open(engine: GameEngine, query: WsQuery) -> (Self, Vec<String>) {
        let (events, snapshots) = engine.subscribe_with_snapshot();
        let feed = Self {
            engine,
            query,
            events,
        };
        let frames = feed.snapshot_frames(snapshots);
        (feed, frames)
    }

    /// Frames for the next relevant commit, or a full resync after lag.
    /// `None` once the engine is gone. Cancel safe.
    pub async fn next(&mut self) -> Option<Vec<String>> {
        loop {
            match self.events.recv().await {
                Ok(event) if self.query.follows(event.variant()) => {
                    return Some(self.event_frame(&event).into_iter().collect());
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "WebSocket viewer lagged, resending snapshot");
                    let (events, snapshots) = self.engine.subscribe_with_snapshot();
                    self.events = events;
                    return Some(self.snapshot_frames(snapshots));
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    fn snapshot_frames(&self, snapshots: Vec<VariantSnapshot>) -> Vec<String> {
        let mut frames = Vec::new();
        for snapshot in snapshots.into_iter().filter(|s| self.query.follows(s.variant)) {
            if self.query.legacy {
                for event in snapshot.replay_events() {
                    frames.extend(self.event_frame(&event));
                }
            } else {
                frames.extend(encode(&WsFrame::Snapshot(snapshot)));
            }
        }
        frames
    }

    fn event_frame(&self, event: &GameEvent) -> Option<String> {
        if self.query.legacy {
            encode(&event.to_legacy_json())
        } else {
            encode(event)
        }
    }
}

fn encode<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket frame");
            None
        }
    }
}

type WsSender = SplitSink<WebSocket, Message>;

/// WebSocket connection manager
pub struct WebSocketManager {
    engine: GameEngine,
    metrics: Arc<MetricsRegistry>,
    heartbeat: Duration,
    next_client_id: AtomicU64,
}

impl WebSocketManager {
    pub fn new(engine: GameEngine, metrics: Arc<MetricsRegistry>, heartbeat: Duration) -> Self {
        Self {
            engine,
            metrics,
            heartbeat,
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Handle WebSocket upgrade
    pub fn handle_upgrade(self: Arc<Self>, ws: WebSocketUpgrade, query: WsQuery) -> Response {
        ws.on_upgrade(move |socket| async move { self.handle_connection(socket, query).await })
    }

    async fn handle_connection(&self, socket: WebSocket, query: WsQuery) {
        let client_id = format!("ws_{}", self.next_client_id.fetch_add(1, Ordering::Relaxed));
        self.metrics.websocket_connected();
        info!(client_id = %client_id, variant = ?query.variant, legacy = query.legacy, "WebSocket client connected");

        let (mut sender, mut receiver) = socket.split();
        let (mut feed, initial) = ViewerFeed::open(self.engine.clone(), query);

        if self.send_all(&mut sender, initial).await {
            let mut heartbeat = interval(self.heartbeat);
            heartbeat.tick().await;

            loop {
                tokio::select! {
                    frames = feed.next() => match frames {
                        Some(frames) => {
                            if !self.send_all(&mut sender, frames).await {
                                break;
                            }
                        }
                        None => break,
                    },
                    message = receiver.next() => match message {
                        Some(Ok(Message::Close(_))) | None => {
                            debug!(client_id = %client_id, "Client requested close");
                            break;
                        }
                        Some(Err(e)) => {
                            warn!(client_id = %client_id, error = %e, "WebSocket error");
                            break;
                        }
                        Some(Ok(_)) => {}
                    },
                    _ = heartbeat.tick() => {
                        let frame = WsFrame::Heartbeat { timestamp: chrono::Utc::now().timestamp() };
                        if !self.send_all(&mut sender, encode(&frame).into_iter().collect()).await {
                            break;
                        }
                    }
                }
            }
        }

        self.metrics.websocket_disconnected();
        info!(client_id = %client_id, "WebSocket client disconnected");
    }

    async fn send_all(&self, sender: &mut WsSender, frames: Vec<String>) -> bool {
        for text in frames {
            if sender.send(Message::Text(text)).await.is_err() {
                return false;
            }
            self.metrics.record_websocket_message();
        }
        true
    }
}

/// WebSocket endpoint handler
/// GET /ws?variant=risk&legacy=true
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    state.websocket_manager.clone().handle_upgrade(ws, query)
}

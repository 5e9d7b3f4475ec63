//! Request Handlers
//!
//! Thin adapters from HTTP to the game engine. Every rejection is returned to
//! the caller with its error code and counted in the metrics registry.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
    monitoring::MetricsRegistry,
    websocket::WebSocketManager,
};
use crate::{
    errors::GameError,
    games::{
        types::{ContributionEntry, GameInstance, GameVariant, SettledGame, SettlementRecord},
        GameEngine,
    },
};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state
pub struct AppState {
    pub engine: GameEngine,
    pub node_id: String,
    pub version: String,
    pub websocket_manager: Arc<WebSocketManager>,
    pub metrics: Arc<MetricsRegistry>,
}

impl AppState {
    fn reject(&self, request_id: &RequestId, error: GameError) -> ApiError {
        self.metrics.record_rejection(&error);
        ApiError::game(request_id.0.clone(), error)
    }
}

/// Unwrap a JSON body, reporting malformed input in the API error format
fn body<T>(request_id: &RequestId, payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(request_id.0.clone(), rejection.body_text()))
}

fn path<T>(request_id: &RequestId, param: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| ApiError::bad_request(request_id.0.clone(), rejection.body_text()))
}

/// Health check handler
/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        node_id: state.node_id.clone(),
        version: state.version.clone(),
    })
}

/// Start a game
/// POST /games/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StartGameRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GameInstance>), ApiError> {
    let request = body(&request_id, payload)?;
    let instance = state
        .engine
        .start(request.variant, request.cap, request.multiplier)
        .await
        .map_err(|e| state.reject(&request_id, e))?;

    Ok((StatusCode::CREATED, Json(instance)))
}

/// End and settle a game
/// POST /games/end
pub async fn end_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EndGameRequest>, JsonRejection>,
) -> Result<Json<SettledGame>, ApiError> {
    let request = body(&request_id, payload)?;
    let settled = state
        .engine
        .end(request.variant)
        .await
        .map_err(|e| state.reject(&request_id, e))?;

    Ok(Json(settled))
}

/// Contribute to the active game
/// POST /games/contribute
pub async fn contribute_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ContributeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ContributionEntry>), ApiError> {
    let request = body(&request_id, payload)?;
    let group_id = request.group_id.trim();
    if group_id.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0,
            "groupId must not be empty".to_string(),
        ));
    }

    let entry = state
        .engine
        .admit(request.variant, group_id, request.amount)
        .await
        .map_err(|e| state.reject(&request_id, e))?;

    state.metrics.record_admission(&entry);
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Active instance of a variant
/// GET /games/:variant
pub async fn game_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    variant: Result<Path<GameVariant>, PathRejection>,
) -> Result<Json<GameStatusResponse>, ApiError> {
    let variant = path(&request_id, variant)?;
    Ok(Json(GameStatusResponse {
        variant,
        instance: state.engine.active_instance(variant),
    }))
}

/// Entries of an instance in commit order
/// GET /instances/:id/entries
pub async fn entries_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<ContributionEntry>>, ApiError> {
    let id = path(&request_id, id)?;
    let instance = state
        .engine
        .instance(id)
        .await
        .map_err(|e| ApiError::game(request_id.0.clone(), e))?;

    if instance.is_none() {
        return Err(ApiError::not_found(request_id.0, format!("Game instance {} not found", id)));
    }

    let entries = state
        .engine
        .entries(id)
        .await
        .map_err(|e| ApiError::game(request_id.0.clone(), e))?;
    Ok(Json(entries))
}

/// Settlement of an ended instance
/// GET /instances/:id/settlement
pub async fn settlement_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<SettlementRecord>, ApiError> {
    let id = path(&request_id, id)?;
    state
        .engine
        .settlement(id)
        .await
        .map_err(|e| ApiError::game(request_id.0.clone(), e))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(request_id.0, format!("No settlement for instance {}", id)))
}

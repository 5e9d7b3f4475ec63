//! API Request and Response Models

use crate::games::types::{GameInstance, GameVariant};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub version: String,
}

/// POST /games/start
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGameRequest {
    pub variant: GameVariant,
    pub cap: i64,
    pub multiplier: f64,
}

/// POST /games/end
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndGameRequest {
    pub variant: GameVariant,
}

/// POST /games/contribute
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributeRequest {
    pub variant: GameVariant,
    pub group_id: String,
    pub amount: i64,
}

/// GET /games/:variant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStatusResponse {
    pub variant: GameVariant,
    pub instance: Option<GameInstance>,
}

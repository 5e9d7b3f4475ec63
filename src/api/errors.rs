//! API Error Handling
//!
//! Structured error responses with proper HTTP status codes and request tracking.

use crate::errors::GameError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level API error response with request tracking
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub request_id: String,
    pub error: ErrorBody,
}

/// Error body with structured information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error code (CAP_EXCEEDED, NOT_FOUND, BAD_REQUEST, etc.)
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error with request tracking
#[derive(Debug)]
pub struct ApiError {
    pub kind: ApiErrorKind,
    pub request_id: String,
}

#[derive(Debug)]
pub enum ApiErrorKind {
    NotFound(String),
    BadRequest(String),
    /// Rejected game operation
    Game(GameError),
}

impl ApiError {
    pub fn not_found(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::NotFound(message),
            request_id,
        }
    }

    pub fn bad_request(request_id: String, message: String) -> Self {
        Self {
            kind: ApiErrorKind::BadRequest(message),
            request_id,
        }
    }

    pub fn game(request_id: String, error: GameError) -> Self {
        Self {
            kind: ApiErrorKind::Game(error),
            request_id,
        }
    }

    /// Machine-readable code sent in the body
    pub fn code(&self) -> &'static str {
        match &self.kind {
            ApiErrorKind::NotFound(_) => "NOT_FOUND",
            ApiErrorKind::BadRequest(_) => "BAD_REQUEST",
            ApiErrorKind::Game(e) => e.code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.kind {
            ApiErrorKind::NotFound(_) => StatusCode::NOT_FOUND,
            ApiErrorKind::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiErrorKind::Game(e) => match e {
                GameError::InvalidConfig(_) | GameError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
                GameError::AlreadyActive { .. }
                | GameError::NoActiveGame { .. }
                | GameError::CapExceeded { .. }
                | GameError::GameEnded { .. } => StatusCode::CONFLICT,
                GameError::InvariantViolation(_) | GameError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                GameError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::NotFound(msg) => write!(f, "[{}] Not Found: {}", self.request_id, msg),
            ApiErrorKind::BadRequest(msg) => write!(f, "[{}] Bad Request: {}", self.request_id, msg),
            ApiErrorKind::Game(e) => write!(f, "[{}] {}: {}", self.request_id, e.code(), e),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self.kind {
            ApiErrorKind::NotFound(msg) | ApiErrorKind::BadRequest(msg) => msg.clone(),
            ApiErrorKind::Game(e) => e.to_string(),
        };

        if status.is_server_error() {
            tracing::error!(request_id = %self.request_id, code = self.code(), "{}", message);
        }

        let body = Json(ErrorResponse {
            request_id: self.request_id.clone(),
            error: ErrorBody {
                code: self.code().to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

//! Pool Game HTTP API
//!
//! Admin endpoints for starting and ending games, the contribution endpoint,
//! ledger reads, a WebSocket feed of live progress and Prometheus metrics.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod monitoring;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::ApiServer;

//! API Server
//!
//! Wires the game engine, WebSocket manager and metrics into one axum app.

use super::{
    handlers::AppState,
    middleware::{create_cors_layer, request_id_middleware},
    monitoring::MetricsRegistry,
    routes::create_router,
    websocket::WebSocketManager,
};
use crate::config::PoolConfig;
use crate::games::GameEngine;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};

/// HTTP and WebSocket front end for a running engine
pub struct ApiServer {
    config: PoolConfig,
    engine: GameEngine,
    metrics: Arc<MetricsRegistry>,
}

impl ApiServer {
    pub fn new(config: PoolConfig, engine: GameEngine) -> Self {
        Self {
            config,
            engine,
            metrics: Arc::new(MetricsRegistry::new()),
        }
    }

    /// Serve until Ctrl+C or SIGTERM
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_app();
        let addr = self.get_socket_addr()?;

        info!(listen = %addr, "Starting pool game API server");
        self.log_server_info();

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("API server stopped gracefully");
        Ok(())
    }

    /// Shared state handed to every handler
    pub fn app_state(&self) -> Arc<AppState> {
        let heartbeat = Duration::from_secs(self.config.broadcast.heartbeat_interval_secs.max(1));
        let websocket_manager = Arc::new(WebSocketManager::new(
            self.engine.clone(),
            self.metrics.clone(),
            heartbeat,
        ));

        Arc::new(AppState {
            engine: self.engine.clone(),
            node_id: self.config.server.node_id.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            websocket_manager,
            metrics: self.metrics.clone(),
        })
    }

    /// Router with the full middleware stack
    pub fn create_app(&self) -> axum::Router {
        create_router(self.app_state())
            // Request ID middleware (first for tracing)
            .layer(axum::middleware::from_fn(request_id_middleware))

            // CORS layer (before timeout to handle preflight)
            .layer(create_cors_layer(self.config.server.allowed_origins.clone()))

            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.server.request_timeout_secs,
            )))

            // Tracing layer (last for complete request tracing)
            .layer(TraceLayer::new_for_http())
    }

    fn get_socket_addr(&self) -> Result<SocketAddr, Box<dyn std::error::Error>> {
        Ok(SocketAddr::from((
            self.config.server.host.parse::<std::net::IpAddr>()?,
            self.config.server.port,
        )))
    }

    fn log_server_info(&self) {
        info!(
            node_id = %self.config.server.node_id,
            version = env!("CARGO_PKG_VERSION"),
            cors = ?self.config.server.allowed_origins,
            request_timeout_secs = self.config.server.request_timeout_secs,
            "Server configuration"
        );
        info!(
            auto_end_on_cap = self.config.games.auto_end_on_cap,
            risk_policy = ?self.config.games.risk_policy,
            "Game policies"
        );
        info!("Available endpoints:");
        info!("   GET  /health                    - Health check");
        info!("   POST /games/start               - Start a game");
        info!("   POST /games/end                 - End and settle a game");
        info!("   POST /games/contribute          - Contribute to the active game");
        info!("   GET  /games/:variant            - Active instance");
        info!("   GET  /instances/:id/entries     - Contributions in commit order");
        info!("   GET  /instances/:id/settlement  - Settlement record");
        info!("   GET  /ws                        - Live progress");
        info!("   GET  /metrics                   - Prometheus metrics");
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

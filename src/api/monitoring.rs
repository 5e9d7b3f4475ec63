//! Metrics Registry
//!
//! Atomic counters rendered in the Prometheus text exposition format.

use crate::errors::GameError;
use crate::games::{broadcast::PublishedCounts, types::ContributionEntry};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Prometheus-compatible metrics registry
#[derive(Default)]
pub struct MetricsRegistry {
    pub http_requests_total: AtomicU64,
    pub http_requests_active: AtomicU64,
    pub http_errors_total: AtomicU64,
    pub http_request_micros_total: AtomicU64,

    pub contributions_admitted_total: AtomicU64,
    pub contributions_partial_total: AtomicU64,
    pub contributed_amount_total: AtomicU64,

    pub websocket_connections_active: AtomicU64,
    pub websocket_messages_sent: AtomicU64,

    /// Rejections keyed by error code
    rejections: Mutex<BTreeMap<&'static str, u64>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_started(&self) {
        self.http_requests_total.fetch_add(1, Ordering::Relaxed);
        self.http_requests_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_finished(&self, duration: Duration, success: bool) {
        self.http_requests_active.fetch_sub(1, Ordering::Relaxed);
        self.http_request_micros_total
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        if !success {
            self.http_errors_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_admission(&self, entry: &ContributionEntry) {
        self.contributions_admitted_total.fetch_add(1, Ordering::Relaxed);
        self.contributed_amount_total.fetch_add(entry.amount, Ordering::Relaxed);
        if entry.is_partial() {
            self.contributions_partial_total.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rejection(&self, error: &GameError) {
        if let Ok(mut rejections) = self.rejections.lock() {
            *rejections.entry(error.code()).or_insert(0) += 1;
        }
    }

    pub fn rejections(&self, code: &str) -> u64 {
        self.rejections
            .lock()
            .map(|r| r.get(code).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn websocket_connected(&self) {
        self.websocket_connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn websocket_disconnected(&self) {
        self.websocket_connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_websocket_message(&self) {
        self.websocket_messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Generate Prometheus metrics format.
    ///
    /// Game lifecycle counts come from the publisher so games ended by the
    /// cap are counted the same as games ended over HTTP.
    pub fn to_prometheus_format(&self, games: PublishedCounts) -> String {
        let mut output = String::new();

        let counters: [(&str, &str, &str, &AtomicU64); 9] = [
            ("poolgame_http_requests_total", "counter", "Total number of HTTP requests", &self.http_requests_total),
            ("poolgame_http_requests_active", "gauge", "Currently active HTTP requests", &self.http_requests_active),
            ("poolgame_http_errors_total", "counter", "HTTP requests answered with a server error", &self.http_errors_total),
            ("poolgame_http_request_micros_total", "counter", "Cumulative HTTP request latency in microseconds", &self.http_request_micros_total),
            ("poolgame_contributions_admitted_total", "counter", "Contributions admitted", &self.contributions_admitted_total),
            ("poolgame_contributions_partial_total", "counter", "Contributions admitted below the requested amount", &self.contributions_partial_total),
            ("poolgame_contributed_amount_total", "counter", "Sum of admitted contribution amounts", &self.contributed_amount_total),
            ("poolgame_websocket_connections_active", "gauge", "Connected WebSocket viewers", &self.websocket_connections_active),
            ("poolgame_websocket_messages_sent_total", "counter", "Messages sent to WebSocket viewers", &self.websocket_messages_sent),
        ];

        for (name, kind, help, value) in counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} {kind}\n{name} {}\n\n",
                value.load(Ordering::Relaxed)
            ));
        }

        let game_counters = [
            ("poolgame_games_started_total", "Game instances started", games.games_started),
            ("poolgame_games_ended_total", "Game instances ended and settled", games.games_ended),
            ("poolgame_progress_updates_total", "Progress events published", games.progress_updates),
        ];
        for (name, help, value) in game_counters {
            output.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n"
            ));
        }

        output.push_str(
            "# HELP poolgame_rejections_total Rejected game operations by error code\n\
             # TYPE poolgame_rejections_total counter\n",
        );
        if let Ok(rejections) = self.rejections.lock() {
            for (code, count) in rejections.iter() {
                output.push_str(&format!("poolgame_rejections_total{{code=\"{}\"}} {}\n", code, count));
            }
        }

        output
    }
}

/// Axum handler for Prometheus metrics endpoint
pub async fn metrics_handler(State(state): State<Arc<super::handlers::AppState>>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state
            .metrics
            .to_prometheus_format(state.engine.publisher().counts()),
    )
        .into_response()
}

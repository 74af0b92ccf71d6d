//! HTTP gateway.
//!
//! Routes:
//! - `GET /health`
//! - `GET /activities?cursor&kind&limit`: history, newest first
//! - `GET /activities/stream?lastId=N`: live text event stream with catch-up
//! - `POST /activities`: submit, requires a key or an allowed origin
//!
//! Every route answers CORS preflights for any origin and is traced.

mod activities;
mod auth;
mod error;

pub use auth::ApiKey;
pub use error::ApiError;

use crate::broadcast::Broadcaster;
use crate::feed::Feed;
use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub feed: Arc<Feed>,
    pub auth: Arc<ApiKey>,
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
        tracing::info_span!(
            "http.request",
            method = %request.method(),
            uri = %request.uri(),
        )
    });

    Router::new()
        .route("/health", get(activities::health))
        .route(
            "/activities",
            get(activities::list_activities).post(activities::create_activity),
        )
        .route("/activities/stream", get(activities::stream_activities))
        .layer(cors)
        .layer(trace)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway listening");
    }

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

/// Wait for `signal`, then cancel `shutdown` and close every open stream.
///
/// If the signal cannot be listened for, the error is logged and nothing is
/// cancelled; the server keeps running.
pub async fn watch_shutdown<F>(
    signal: F,
    shutdown: CancellationToken,
    broadcaster: Arc<Broadcaster>,
) where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }

    tracing::info!("shutting down");
    shutdown.cancel();
    // Open streams would otherwise hold the server open.
    broadcaster.close_all();
}

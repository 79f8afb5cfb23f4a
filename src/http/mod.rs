//! HTTP facade over the session manager.

mod error;
mod handlers;

pub use error::ApiError;

use crate::session::SessionManager;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub service_name: Arc<str>,
    pub version: &'static str,
}

impl AppState {
    pub fn new(session: Arc<SessionManager>, service_name: impl Into<Arc<str>>) -> Self {
        Self {
            session,
            service_name: service_name.into(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Build the relay router (shared between the binary and tests).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/qr", get(handlers::qr))
        .route("/status", get(handlers::status))
        .route("/send", post(handlers::send))
        .route("/webhook", post(handlers::webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

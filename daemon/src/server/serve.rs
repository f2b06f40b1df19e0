//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::DaemonError;
use crate::server::handlers::{health_handler, root_handler, webhook_handler};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Routes: `GET /`, `GET /health`, and the webhook receiver on `POST /` and
/// `POST {webhook_path}`
pub fn build_router(state: Arc<ServerState>) -> Router {
    let webhook_path = state.settings.server.webhook_path.clone();

    let mut app = Router::new()
        .route("/", get(root_handler).post(webhook_handler))
        .route("/health", get(health_handler));
    if webhook_path != "/" && webhook_path != "/health" && webhook_path.starts_with('/') {
        app = app.route(&webhook_path, post(webhook_handler));
    }

    app.with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    app: Router,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), DaemonError>>, DaemonError> {
    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| DaemonError::ServerError(format!("{}: {}", addr, e)))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| DaemonError::ServerError(e.to_string()))
    });

    Ok(handle)
}

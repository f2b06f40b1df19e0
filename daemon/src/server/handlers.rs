//! HTTP request handlers

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use server_models::{HealthResponse, RootResponse, WebhookResponse};
use tracing::{debug, warn};

use crate::errors::RejectReason;
use crate::server::state::ServerState;
use crate::utils::version_info;
use crate::webhook::classify::{classify, parse_payload};
use crate::webhook::validate::{validate_delivery, validate_headers, WebhookHeaders};

/// Root handler
pub async fn root_handler() -> impl IntoResponse {
    Json(RootResponse::default())
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
        started_at: state.started_at.to_rfc3339(),
    })
}

/// Webhook receiver
///
/// Always answers `200 OK`; rejections carry their reason in the body and
/// accepted deliveries are handled after the response is sent.
pub async fn webhook_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    body: Body,
) -> Json<WebhookResponse> {
    match accept(&state, &headers, body).await {
        Ok(()) => Json(WebhookResponse::ok()),
        Err(reason) => {
            warn!("Webhook rejected: {}", reason);
            Json(WebhookResponse::rejected(reason.to_string()))
        }
    }
}

async fn accept(state: &ServerState, headers: &HeaderMap, body: Body) -> Result<(), RejectReason> {
    let settings = &state.settings;
    let headers = WebhookHeaders::from_header_map(headers);
    validate_headers(&headers, &settings.webhook)?;

    let limit = usize::try_from(settings.webhook.max_payload_bytes).unwrap_or(usize::MAX);
    let body = to_bytes(body, limit).await.map_err(|e| {
        debug!("Failed to read webhook body: {}", e);
        RejectReason::PayloadTooLarge
    })?;
    validate_delivery(&headers, &body, &settings.webhook, settings.github_secret_bytes())?;

    let payload = parse_payload(&body)?;
    state.deployer.dispatch(classify(&payload, settings));
    Ok(())
}

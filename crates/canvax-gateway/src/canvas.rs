//! HTTP handlers: canvas creation, join probe, WebSocket upgrade, health.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, warn};

use canvax_core::error::CanvaxError;
use canvax_core::protocol::CreateResponse;

use crate::adapter::Adapter;
use crate::connection::handle_client;
use crate::state::GatewayState;

/// Map a gateway error to an HTTP response with a plain-text body.
pub fn error_response(err: &CanvaxError) -> Response {
    match err {
        CanvaxError::NotFound(_) => (StatusCode::NOT_FOUND, "Canvas not found").into_response(),
        CanvaxError::InvalidArgument(msg) => (StatusCode::BAD_REQUEST, msg.clone()).into_response(),
        other => {
            warn!(%other, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}

/// `GET|POST /create`
pub async fn create_handler(State(state): State<Arc<GatewayState>>) -> Json<CreateResponse> {
    let code = state.registry.create().await;
    #[cfg(feature = "metrics")]
    crate::metrics::record_session_created();
    Json(CreateResponse { code })
}

/// `GET /join?code=`
pub async fn join_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    match state.registry.resolve(params.get("code").map(String::as_str)).await {
        Ok(session) => Json(json!({
            "code": session.code(),
            "clients": session.client_count().await,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// `GET /ws/canva?code=`
///
/// The code is resolved before the upgrade so unknown canvases get a plain
/// 404 instead of an opened-then-closed socket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let session = match state.registry.resolve(params.get("code").map(String::as_str)).await {
        Ok(session) => session,
        Err(e) => {
            debug!(%e, "Rejecting WebSocket upgrade");
            return error_response(&e);
        }
    };

    let code = session.code().to_string();
    let tracker = state.tasks.clone();
    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            tracker
                .track_future(handle_client(state, code, Adapter::Socket(socket)))
                .await;
        })
        .into_response()
}

/// `GET /health`
pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "canvax",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.len().await,
        "connections": state.active_connections(),
    }))
}

/// `GET /metrics`
#[cfg(feature = "metrics")]
pub async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "Metrics recorder not installed").into_response(),
    }
}

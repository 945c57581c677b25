//! Axum HTTP/WebSocket server plus the TCP stream listener.

use std::future::Future;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::canvas::{create_handler, health_handler, join_handler, ws_handler};
use crate::state::GatewayState;
use crate::stream::accept_loop;

/// Build the HTTP router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route("/create", get(create_handler).post(create_handler))
        .route("/join", get(join_handler))
        .route("/ws/canva", get(ws_handler))
        .route("/health", get(health_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(crate::canvas::metrics_handler));

    app.layer(TraceLayer::new_for_http()).with_state(state)
}

/// Bind both listeners from config and serve until ctrl-c or SIGTERM.
pub async fn start_gateway(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();

    let http_addr = format!("{bind_addr}:{}", state.config.port());
    let http_listener = TcpListener::bind(&http_addr).await?;
    info!("Gateway listening on {http_addr}");

    let stream_addr = format!("{bind_addr}:{}", state.config.stream_port());
    let stream_listener = TcpListener::bind(&stream_addr).await?;

    serve(state, http_listener, stream_listener, shutdown_signal()).await
}

/// Serve on already-bound listeners until `signal` resolves, then shut down.
///
/// Shutdown cancels every connection, empties the registry, and waits for
/// tracked connection tasks up to the configured grace period.
pub async fn serve<F>(
    state: Arc<GatewayState>,
    http_listener: TcpListener,
    stream_listener: TcpListener,
    signal: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let reaper = state.registry.spawn_reaper(state.shutdown.clone());
    let acceptor = tokio::spawn(accept_loop(state.clone(), stream_listener));

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = signal => shutdown.cancel(),
            _ = shutdown.cancelled() => {}
        }
    });

    let shutdown = state.shutdown.clone();
    let served = axum::serve(http_listener, router(state.clone()))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await;
    // An HTTP failure still has to tear the rest down.
    state.shutdown.cancel();

    let closed = state.registry.shutdown().await;
    info!(sessions = closed, "Canvas sessions closed");

    state.tasks.close();
    let grace = state.config.shutdown_grace();
    if tokio::time::timeout(grace, state.tasks.wait()).await.is_err() {
        warn!(
            remaining = state.tasks.len(),
            "Connections still open after {}s grace period",
            grace.as_secs()
        );
    }

    if let Err(e) = reaper.await {
        warn!(%e, "Session reaper task failed");
    }
    if let Err(e) = acceptor.await {
        warn!(%e, "Stream accept task failed");
    }

    info!("Gateway stopped");
    served.map_err(Into::into)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(%e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(%e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use canvax_core::config::Config;
    use canvax_core::protocol::CreateResponse;
    use tower::ServiceExt;

    fn test_state() -> Arc<GatewayState> {
        Arc::new(GatewayState::new(Arc::new(Config::default())))
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1 << 20).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_create_returns_code() {
        let state = test_state();
        let (status, body) = get(router(state.clone()), "/create").await;
        assert_eq!(status, StatusCode::OK);

        let created: CreateResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(created.code.len(), 6);
        assert!(state.registry.contains(&created.code).await);
    }

    #[tokio::test]
    async fn test_create_accepts_post() {
        let state = test_state();
        let response = router(state.clone())
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_join_probe_statuses() {
        let state = test_state();
        let code = state.registry.create().await;

        let (status, _) = get(router(state.clone()), &format!("/join?code={code}")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(router(state.clone()), "/join?code=nope00").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"Canvas not found");

        let (status, _) = get(router(state.clone()), "/join").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = get(router(state), "/join?code=").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health_reports_counts() {
        let state = test_state();
        state.registry.create().await;
        state.registry.create().await;

        let (status, body) = get(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["service"], "canvax");
        assert_eq!(health["sessions"], 2);
        assert_eq!(health["connections"], 0);
    }

    #[tokio::test]
    async fn test_serve_stops_on_signal() {
        let state = test_state();
        let http = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let stream = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let task = tokio::spawn(serve(state.clone(), http, stream, async move {
            let _ = rx.await;
        }));
        let code = state.registry.create().await;
        assert!(state.registry.contains(&code).await);

        tx.send(()).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(state.registry.is_empty().await);
        assert!(state.shutdown.is_cancelled());
    }
}

//! Client connection lifecycle: attach, history replay, receive loop, teardown.
//!
//! Each connection moves through `Connecting → Registered → Streaming →
//! Closed`. Both transports share this path once their adapter is built.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use canvax_canvas::{process, CanvasSession, Outcome};
use canvax_core::error::CanvaxError;
use canvax_core::protocol::{decode_request, ClientResponse};

use crate::adapter::{Adapter, AdapterSource, Inbound};
use crate::dispatch::run_dispatch;
use crate::state::GatewayState;

/// Replies addressed to one client that may wait behind a slow writer.
/// Further replies are dropped while the queue is full.
pub(crate) const DIRECT_QUEUE_CAPACITY: usize = 16;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connecting,
    Registered,
    Streaming,
    Closed,
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Registered => "registered",
            Self::Streaming => "streaming",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Serve one client on `adapter` for the canvas `code` until either side
/// closes or the gateway shuts down.
pub async fn handle_client(
    state: Arc<GatewayState>,
    code: String,
    mut adapter: Adapter,
) -> ConnectionPhase {
    let transport = adapter.kind();
    let cancel = state.shutdown.child_token();
    debug!(code = %code, %transport, phase = %ConnectionPhase::Connecting, "Client connecting");

    let (session, handle) = match state.registry.attach(&code, transport, cancel.clone()).await {
        Ok(attached) => attached,
        Err(e) => {
            warn!(code = %code, %transport, %e, "Rejecting client");
            if let Err(send_err) = adapter.send_response(&ClientResponse::error(&e)).await {
                debug!(%send_err, "Could not deliver rejection");
            }
            adapter.close().await;
            return ConnectionPhase::Closed;
        }
    };
    let client_id = handle.client_id.clone();
    state.connection_opened();
    #[cfg(feature = "metrics")]
    crate::metrics::record_client_connect(transport.as_str());

    let subscription = session.subscribe_with_history().await;
    let (mut sink, source) = adapter.split();
    let history_len = subscription.history.len();

    if let Err(e) = sink
        .send_response(&ClientResponse::history(subscription.history))
        .await
    {
        warn!(code = %code, client_id = %client_id, %e, "Failed to send initial history");
        sink.close().await;
        teardown(&state, &session, &client_id, transport.as_str()).await;
        return ConnectionPhase::Closed;
    }
    debug!(
        code = %code,
        client_id = %client_id,
        history_len,
        phase = %ConnectionPhase::Registered,
        "Initial history sent"
    );

    let (direct_tx, direct_rx) = mpsc::channel(DIRECT_QUEUE_CAPACITY);
    let dispatch = state.tasks.spawn(run_dispatch(
        client_id.clone(),
        sink,
        subscription.feed,
        direct_rx,
        cancel.clone(),
    ));

    debug!(code = %code, client_id = %client_id, phase = %ConnectionPhase::Streaming, "Streaming");
    receive_loop(&session, &client_id, source, direct_tx, &cancel).await;

    cancel.cancel();
    if let Err(e) = dispatch.await {
        warn!(client_id = %client_id, %e, "Dispatch task failed");
    }
    teardown(&state, &session, &client_id, transport.as_str()).await;
    ConnectionPhase::Closed
}

/// Read, decode, and process frames until the peer closes, the transport
/// fails, or `cancel` fires. Undecodable frames are skipped.
async fn receive_loop(
    session: &CanvasSession,
    client_id: &str,
    mut source: AdapterSource,
    direct: mpsc::Sender<ClientResponse>,
    cancel: &CancellationToken,
) {
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(client_id, "Connection cancelled");
                break;
            }
            received = source.receive() => received,
        };

        let frame = match received {
            Ok(Inbound::Frame(frame)) => frame,
            Ok(Inbound::Closed) => {
                debug!(client_id, "Client closed the connection");
                break;
            }
            Err(CanvaxError::Decode(e)) => {
                warn!(client_id, %e, "Discarding undecodable frame");
                #[cfg(feature = "metrics")]
                crate::metrics::record_decode_error();
                continue;
            }
            Err(e) => {
                warn!(client_id, %e, "Transport error");
                break;
            }
        };

        let request = match decode_request(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(client_id, %e, "Discarding undecodable frame");
                #[cfg(feature = "metrics")]
                crate::metrics::record_decode_error();
                continue;
            }
        };

        match process(session, client_id, request).await {
            Outcome::Pong(pong) => {
                if !offer_direct(&direct, client_id, ClientResponse::event(pong)) {
                    break;
                }
            }
            #[cfg(feature = "metrics")]
            Outcome::Recorded { event, .. } => crate::metrics::record_event(event.classify()),
            #[cfg(not(feature = "metrics"))]
            Outcome::Recorded { .. } => {}
            Outcome::Ignored => {}
        }
    }
}

/// Queue a reply for the sender without waiting. A full queue drops the
/// reply; returns `false` only when the dispatch side is gone.
pub(crate) fn offer_direct(
    direct: &mpsc::Sender<ClientResponse>,
    client_id: &str,
    response: ClientResponse,
) -> bool {
    match direct.try_send(response) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            debug!(client_id, "Reply queue full, dropping reply");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn teardown(
    state: &GatewayState,
    session: &CanvasSession,
    client_id: &str,
    transport: &str,
) {
    session.unregister(client_id).await;
    let remaining = state.connection_closed();
    #[cfg(feature = "metrics")]
    crate::metrics::record_client_disconnect(transport);
    info!(
        code = %session.code(),
        client_id,
        transport,
        connections = remaining,
        phase = %ConnectionPhase::Closed,
        "Client disconnected"
    );
}

//! Newline-delimited JSON transport over raw TCP.
//!
//! The first line a client sends is `{"code":"<canvas code>"}`. After that
//! the connection speaks the same envelopes as the WebSocket transport, one
//! per line.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use canvax_core::error::{CanvaxError, Result};
use canvax_core::protocol::{ClientResponse, JoinRequest};

use crate::adapter::{line_framed, read_line, Adapter, AsyncIo, Inbound, LineFramed};
use crate::connection::handle_client;
use crate::state::GatewayState;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept stream clients until shutdown. Each connection runs on the
/// gateway's task tracker.
pub async fn accept_loop(state: Arc<GatewayState>, listener: TcpListener) {
    if let Ok(addr) = listener.local_addr() {
        info!("Stream transport listening on {addr}");
    }

    loop {
        let accepted = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((socket, peer)) => {
                debug!(%peer, "Stream client connected");
                if let Err(e) = socket.set_nodelay(true) {
                    debug!(%peer, %e, "Could not set TCP_NODELAY");
                }
                state.tasks.spawn(handle_stream_io(state.clone(), socket));
            }
            Err(e) => {
                warn!(%e, "Stream accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    debug!("Stream accept loop stopped");
}

/// Run the join handshake on `io`, then hand the connection to the shared
/// client lifecycle. A rejected handshake gets one error frame.
pub async fn handle_stream_io<T: AsyncIo + 'static>(state: Arc<GatewayState>, io: T) {
    let mut framed = line_framed(io, state.max_frame_bytes);

    let code = match handshake(&state, &mut framed, HANDSHAKE_TIMEOUT).await {
        Ok(code) => code,
        Err(e) => {
            warn!(%e, "Stream handshake rejected");
            let mut adapter = Adapter::Stream(framed);
            if let Err(send_err) = adapter.send_response(&ClientResponse::error(&e)).await {
                debug!(%send_err, "Could not deliver rejection");
            }
            adapter.close().await;
            return;
        }
    };

    handle_client(state, code, Adapter::Stream(framed)).await;
}

async fn handshake(
    state: &GatewayState,
    framed: &mut LineFramed,
    timeout: Duration,
) -> Result<String> {
    let mut skipping_error = false;
    let first_line = read_line(framed, &mut skipping_error);
    let first = tokio::select! {
        _ = state.shutdown.cancelled() => {
            return Err(CanvaxError::Transport("gateway shutting down".into()));
        }
        first = tokio::time::timeout(timeout, first_line) => first,
    };

    let line = match first {
        Err(_) => return Err(CanvaxError::Transport("handshake timed out".into())),
        Ok(Ok(Inbound::Frame(line))) => line,
        Ok(Ok(Inbound::Closed)) => {
            return Err(CanvaxError::Transport("closed before handshake".into()));
        }
        Ok(Err(e)) => return Err(e),
    };

    parse_join(&line)
}

/// Extract the canvas code from a handshake line.
pub(crate) fn parse_join(line: &str) -> Result<String> {
    let join: JoinRequest = serde_json::from_str(line)
        .map_err(|e| CanvaxError::Decode(format!("invalid handshake: {e}")))?;
    let code = join.code.trim();
    if code.is_empty() {
        return Err(CanvaxError::InvalidArgument("Missing canvas code".into()));
    }
    Ok(code.to_string())
}

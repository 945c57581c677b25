//! Per-client dispatch loop: relays the session feed and direct replies to
//! one client's sink.

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use canvax_core::protocol::{ClientResponse, DrawEvent};

use crate::adapter::AdapterSink;

/// Drain `feed` and `direct` into `sink` until `cancel` fires, the feed
/// closes, or a write fails. The sink is closed on exit.
///
/// Events originating from `client_id` are not echoed back. A write failure
/// cancels `cancel` so the receive loop stops too.
pub async fn run_dispatch(
    client_id: String,
    mut sink: AdapterSink,
    mut feed: broadcast::Receiver<DrawEvent>,
    mut direct: mpsc::Receiver<ClientResponse>,
    cancel: CancellationToken,
) {
    loop {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            reply = direct.recv() => match reply {
                Some(reply) => reply,
                None => break,
            },
            event = feed.recv() => match event {
                Ok(event) if event.client_id == client_id => continue,
                Ok(event) => ClientResponse::event(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        client_id = %client_id,
                        skipped,
                        "Client fell behind the feed, events dropped"
                    );
                    #[cfg(feature = "metrics")]
                    crate::metrics::record_feed_lag(skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if let Err(e) = sink.send_response(&response).await {
            warn!(client_id = %client_id, %e, "Send to client failed");
            cancel.cancel();
            break;
        }
    }

    sink.close().await;
    debug!(client_id = %client_id, "Dispatch loop exited");
}

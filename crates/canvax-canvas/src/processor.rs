//! Inbound event classification.

use canvax_core::protocol::{ClientRequest, DrawEvent, EventKind};
use tracing::debug;

use crate::session::CanvasSession;

/// What happened to one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The request carried no event.
    Ignored,
    /// A ping; the pong goes straight back to the sender.
    Pong(DrawEvent),
    /// Appended to history and published; `cleared` when it was a clear.
    Recorded { event: DrawEvent, cleared: bool },
}

/// Apply one decoded request from `client_id` to `session`.
///
/// The event's `client_id` is always replaced with the sender's id.
pub async fn process(session: &CanvasSession, client_id: &str, request: ClientRequest) -> Outcome {
    let Some(mut event) = request.draw_event else {
        debug!(code = %session.code(), client_id, "Request without draw event");
        return Outcome::Ignored;
    };
    event.client_id = client_id.to_string();

    match event.classify() {
        EventKind::Ping => {
            debug!(code = %session.code(), client_id, "Ping");
            Outcome::Pong(DrawEvent::pong(client_id))
        }
        kind => {
            let event = session.record(event).await;
            Outcome::Recorded {
                event,
                cleared: kind == EventKind::Clear,
            }
        }
    }
}

//! Canvas wire protocol.
//!
//! Both transports carry the same JSON envelopes: clients send
//! [`ClientRequest`] frames, the server answers with [`ClientResponse`]
//! frames. The socket transport uses one WebSocket text frame per envelope,
//! the stream transport uses one line per envelope.

use serde::{Deserialize, Serialize};

use crate::error::{CanvaxError, Result};

pub const EVENT_PING: &str = "ping";
pub const EVENT_PONG: &str = "pong";
pub const EVENT_CLEAR: &str = "clear";

/// One user action on a canvas.
///
/// `client_id` and `time` are owned by the server: whatever the client sends
/// is overwritten on receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub color: String,
    /// Stroke size.
    pub size: i32,
    pub prev_x: i32,
    pub prev_y: i32,
    pub curr_x: i32,
    pub curr_y: i32,
    pub client_id: String,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
}

/// How the server treats an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Keepalive; answered with a pong, never recorded.
    Ping,
    /// Recorded and broadcast, then the history collapses to this event.
    Clear,
    /// Everything else, including "draw".
    Stroke,
}

impl EventKind {
    /// Fixed label for this kind. Unlike the raw `type` tag it has only
    /// three values, so it is safe to use as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Clear => "clear",
            Self::Stroke => "stroke",
        }
    }
}

impl DrawEvent {
    /// A stroke segment from `start` to `end`.
    pub fn stroke(color: impl Into<String>, size: i32, start: (i32, i32), end: (i32, i32)) -> Self {
        Self {
            kind: "draw".into(),
            color: color.into(),
            size,
            prev_x: start.0,
            prev_y: start.1,
            curr_x: end.0,
            curr_y: end.1,
            ..Self::default()
        }
    }

    /// An event carrying only a type tag.
    pub fn of_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    /// Pong reply addressed to `client_id`.
    pub fn pong(client_id: impl Into<String>) -> Self {
        Self {
            kind: EVENT_PONG.into(),
            client_id: client_id.into(),
            time: chrono::Utc::now().timestamp_millis(),
            ..Self::default()
        }
    }

    pub fn classify(&self) -> EventKind {
        match self.kind.as_str() {
            EVENT_PING => EventKind::Ping,
            EVENT_CLEAR => EventKind::Clear,
            _ => EventKind::Stroke,
        }
    }

    pub fn start(&self) -> (i32, i32) {
        (self.prev_x, self.prev_y)
    }

    pub fn end(&self) -> (i32, i32) {
        (self.curr_x, self.curr_y)
    }

    /// Reject events missing their type tag.
    pub fn validate(&self) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(CanvaxError::Decode("draw event has no type".into()));
        }
        Ok(())
    }
}

/// Ordered record of a session's events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    #[serde(default)]
    pub events: Vec<DrawEvent>,
}

impl History {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl From<Vec<DrawEvent>> for History {
    fn from(events: Vec<DrawEvent>) -> Self {
        Self { events }
    }
}

/// Client -> Server envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_event: Option<DrawEvent>,
}

impl ClientRequest {
    pub fn draw(event: DrawEvent) -> Self {
        Self {
            draw_event: Some(event),
        }
    }
}

/// Error shape carried in response frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub code: String,
    pub message: String,
}

/// Server -> Client envelope: a broadcast event, the join-time history
/// snapshot, or an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draw_event: Option<DrawEvent>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_history: Option<History>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorShape>,
}

impl ClientResponse {
    pub fn event(event: DrawEvent) -> Self {
        Self {
            draw_event: Some(event),
            ..Self::default()
        }
    }

    pub fn history(history: History) -> Self {
        Self {
            initial_history: Some(history),
            ..Self::default()
        }
    }

    pub fn error(err: &CanvaxError) -> Self {
        Self {
            error: Some(ErrorShape {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            ..Self::default()
        }
    }
}

/// First line a stream-transport client sends to pick its canvas.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    #[serde(default)]
    pub code: String,
}

/// Body returned by canvas creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateResponse {
    pub code: String,
}

/// Decode one inbound frame.
///
/// A request carrying an event without a type tag is a decode error; a
/// request with no event at all is valid and simply ignored downstream.
pub fn decode_request(frame: &str) -> Result<ClientRequest> {
    let request: ClientRequest =
        serde_json::from_str(frame).map_err(|e| CanvaxError::Decode(e.to_string()))?;
    if let Some(event) = &request.draw_event {
        event.validate()?;
    }
    Ok(request)
}

/// Encode one outbound frame.
pub fn encode_response(response: &ClientResponse) -> Result<String> {
    Ok(serde_json::to_string(response)?)
}

//! Canvas session: attached clients, bounded history, and the broadcast feed.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use canvax_core::protocol::{DrawEvent, EventKind, History};

use crate::history::HistoryBuffer;
use crate::ids::random_alphanumeric;
use crate::settings::SessionSettings;

/// Which transport a client is attached through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// WebSocket, one JSON envelope per frame.
    Socket,
    /// Raw TCP, one JSON envelope per line.
    Stream,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Socket => "websocket",
            Self::Stream => "stream",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A session's view of one attached client.
///
/// The transport itself is owned by the connection tasks; the session only
/// keeps the token that tears them down.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    pub client_id: String,
    pub transport: TransportKind,
    pub joined_at: DateTime<Utc>,
    cancel: CancellationToken,
}

impl ClientHandle {
    pub fn new(client_id: String, transport: TransportKind, cancel: CancellationToken) -> Self {
        Self {
            client_id,
            transport,
            joined_at: Utc::now(),
            cancel,
        }
    }

    /// Ask the client's connection tasks to stop.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a joining client needs to start streaming.
pub struct Subscription {
    /// History as of the join; sent as the first message.
    pub history: History,
    /// Every event recorded after `history` was taken.
    pub feed: broadcast::Receiver<DrawEvent>,
}

/// One collaborative canvas.
///
/// `clients` and `history` are locked independently so joins and appends do
/// not contend. Recording publishes while the history write lock is held, so
/// feed order always equals history order.
pub struct CanvasSession {
    code: String,
    created_at: DateTime<Utc>,
    clients: RwLock<HashMap<String, ClientHandle>>,
    history: RwLock<HistoryBuffer>,
    feed: broadcast::Sender<DrawEvent>,
    last_active_ms: AtomicI64,
    client_id_length: usize,
}

impl fmt::Debug for CanvasSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanvasSession")
            .field("code", &self.code)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

impl CanvasSession {
    pub fn new(code: String, settings: &SessionSettings) -> Self {
        let (feed, _) = broadcast::channel(settings.feed_capacity.max(1));
        let now = Utc::now();
        Self {
            code,
            created_at: now,
            clients: RwLock::new(HashMap::new()),
            history: RwLock::new(HistoryBuffer::new(settings.history_limit)),
            feed,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
            client_id_length: settings.client_id_length,
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_active_ms.load(Ordering::SeqCst))
            .unwrap_or(self.created_at)
    }

    fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    /// Fresh client id for this session. Collisions are not checked.
    pub fn new_client_id(&self) -> String {
        random_alphanumeric(self.client_id_length)
    }

    /// Attach a client. Reusing an id replaces the previous entry.
    pub async fn register(&self, handle: ClientHandle) {
        let mut clients = self.clients.write().await;
        let client_id = handle.client_id.clone();
        let transport = handle.transport;
        clients.insert(client_id.clone(), handle);
        self.touch();
        info!(
            code = %self.code,
            client_id = %client_id,
            %transport,
            active = clients.len(),
            "Client registered"
        );
    }

    /// Detach a client. Absent ids are fine.
    pub async fn unregister(&self, client_id: &str) -> bool {
        let mut clients = self.clients.write().await;
        let removed = clients.remove(client_id).is_some();
        self.touch();
        if removed {
            info!(
                code = %self.code,
                client_id = %client_id,
                active = clients.len(),
                "Client unregistered"
            );
        }
        removed
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn client_ids(&self) -> Vec<String> {
        self.clients.read().await.keys().cloned().collect()
    }

    /// Copy of the current history.
    pub async fn snapshot_history(&self) -> History {
        self.history.read().await.snapshot()
    }

    /// Append one event, stamping its server time. Returns the stored event.
    pub async fn append(&self, event: DrawEvent) -> DrawEvent {
        let stored = {
            let mut history = self.history.write().await;
            Self::push_stamped(&mut history, event)
        };
        self.touch();
        stored
    }

    /// Collapse the history to the single `event`.
    pub async fn clear_retaining(&self, event: DrawEvent) {
        let mut history = self.history.write().await;
        self.collapse_to(&mut history, event);
    }

    fn push_stamped(history: &mut HistoryBuffer, mut event: DrawEvent) -> DrawEvent {
        event.time = Utc::now().timestamp_millis();
        history.push(event.clone());
        event
    }

    fn collapse_to(&self, history: &mut HistoryBuffer, event: DrawEvent) {
        info!(code = %self.code, client_id = %event.client_id, "Canvas history cleared");
        history.reset_to(event);
    }

    /// Offer `event` to every subscriber without waiting.
    ///
    /// Returns how many subscribers it was queued for. A subscriber that falls
    /// more than the feed capacity behind loses the oldest queued events.
    pub fn publish(&self, event: DrawEvent) -> usize {
        self.feed.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrawEvent> {
        self.feed.subscribe()
    }

    /// Append, publish, and apply clear semantics as one step under the
    /// history write lock. Pings are not recorded; callers filter them.
    pub async fn record(&self, event: DrawEvent) -> DrawEvent {
        let stored = {
            let mut history = self.history.write().await;
            let stored = Self::push_stamped(&mut history, event);
            let receivers = self.publish(stored.clone());
            if stored.classify() == EventKind::Clear {
                self.collapse_to(&mut history, stored.clone());
            }
            debug!(code = %self.code, kind = %stored.kind, receivers, "Event recorded");
            stored
        };
        self.touch();
        stored
    }

    /// Snapshot the history and subscribe to the feed with no gap between them.
    pub async fn subscribe_with_history(&self) -> Subscription {
        let history = self.history.read().await;
        let feed = self.feed.subscribe();
        Subscription {
            history: history.snapshot(),
            feed,
        }
    }

    /// Cancel every attached client's connection tasks.
    pub async fn disconnect_all(&self) -> usize {
        let clients = self.clients.read().await;
        for handle in clients.values() {
            handle.disconnect();
        }
        clients.len()
    }

    /// Whether the reaper may remove this session at `now`.
    pub async fn is_expired(&self, now: DateTime<Utc>, idle_timeout: std::time::Duration) -> bool {
        if self.client_count().await > 0 {
            return false;
        }
        let idle_ms = (now - self.last_active()).num_milliseconds();
        idle_ms > idle_timeout.as_millis() as i64
    }
}

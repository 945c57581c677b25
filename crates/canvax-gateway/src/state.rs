//! Gateway shared state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use canvax_canvas::{SessionRegistry, SessionSettings};
use canvax_core::config::Config;

/// Shared gateway state accessible from all connections and handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub registry: Arc<SessionRegistry>,
    /// Fired once on process shutdown; every connection token is a child.
    pub shutdown: CancellationToken,
    /// Tracks connection tasks so shutdown can wait for them.
    pub tasks: TaskTracker,
    pub max_frame_bytes: usize,
    connections: AtomicU64,
    #[cfg(feature = "metrics")]
    pub metrics: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    pub fn new(config: Arc<Config>) -> Self {
        let session_config = config.session();
        let registry = Arc::new(SessionRegistry::new(SessionSettings::from(&session_config)));

        Self {
            config,
            registry,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            max_frame_bytes: session_config.max_frame_bytes,
            connections: AtomicU64::new(0),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, handle: metrics_exporter_prometheus::PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Currently open client connections across both transports.
    pub fn active_connections(&self) -> u64 {
        self.connections.load(Ordering::SeqCst)
    }

    pub(crate) fn connection_opened(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn connection_closed(&self) -> u64 {
        self.connections.fetch_sub(1, Ordering::SeqCst).saturating_sub(1)
    }
}

//! Session registry: creation by code, lookup, and idle reaping.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use canvax_core::error::{CanvaxError, Result};

use crate::ids::random_alphanumeric;
use crate::session::{CanvasSession, ClientHandle, TransportKind};
use crate::settings::SessionSettings;

/// Owns every live canvas session in this process.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<CanvasSession>>>,
    settings: SessionSettings,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

impl SessionRegistry {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Create an empty session and return its code.
    ///
    /// Codes are random and not checked against live ones.
    pub async fn create(&self) -> String {
        let code = random_alphanumeric(self.settings.code_length);
        let session = Arc::new(CanvasSession::new(code.clone(), &self.settings));
        self.sessions.write().await.insert(code.clone(), session);
        info!(code = %code, "Canvas session created");
        code
    }

    pub async fn lookup(&self, code: &str) -> Result<Arc<CanvasSession>> {
        self.sessions
            .read()
            .await
            .get(code)
            .cloned()
            .ok_or_else(|| CanvaxError::NotFound(code.to_string()))
    }

    /// Lookup that first rejects a missing or empty code.
    pub async fn resolve(&self, code: Option<&str>) -> Result<Arc<CanvasSession>> {
        match code.map(str::trim) {
            Some(code) if !code.is_empty() => self.lookup(code).await,
            _ => Err(CanvaxError::InvalidArgument("Missing canvas code".into())),
        }
    }

    pub async fn contains(&self, code: &str) -> bool {
        self.sessions.read().await.contains_key(code)
    }

    /// Resolve `code` and register a new client with a fresh id.
    ///
    /// The registry read lock is held across registration so the reaper
    /// cannot remove the session between lookup and attach.
    pub async fn attach(
        &self,
        code: &str,
        transport: TransportKind,
        cancel: CancellationToken,
    ) -> Result<(Arc<CanvasSession>, ClientHandle)> {
        let sessions = self.sessions.read().await;
        let session = sessions
            .get(code)
            .cloned()
            .ok_or_else(|| CanvaxError::NotFound(code.to_string()))?;

        let handle = ClientHandle::new(session.new_client_id(), transport, cancel);
        session.register(handle.clone()).await;
        info!(code = %code, client_id = %handle.client_id, %transport, "Client joined canvas");
        Ok((session, handle))
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn codes(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    /// Total attached clients across all sessions.
    pub async fn client_count(&self) -> usize {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut total = 0;
        for session in sessions {
            total += session.client_count().await;
        }
        total
    }

    /// Remove sessions that are clientless and idle past the timeout.
    pub async fn reap(&self) -> Vec<String> {
        self.reap_at(Utc::now()).await
    }

    /// [`reap`](Self::reap) evaluated at an explicit instant.
    pub async fn reap_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (code, session) in sessions.iter() {
            if session.is_expired(now, self.settings.idle_timeout).await {
                expired.push(code.clone());
            }
        }
        for code in &expired {
            sessions.remove(code);
            info!(code = %code, "Canvas session expired and removed");
        }
        debug!(remaining = sessions.len(), reaped = expired.len(), "Reaper pass");
        expired
    }

    /// Run [`reap`](Self::reap) every `reap_interval` until `shutdown` fires.
    pub fn spawn_reaper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let registry = Arc::clone(self);
        let period = registry.settings.reap_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Session reaper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        registry.reap().await;
                    }
                }
            }
        })
    }

    /// Disconnect every client and drop every session.
    pub async fn shutdown(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut clients = 0;
        for session in sessions.values() {
            clients += session.disconnect_all().await;
        }
        let count = sessions.len();
        sessions.clear();
        info!(sessions = count, clients, "Session registry shut down");
        count
    }
}

//! SessionManager for pending and active sessions
//!
//! SessionManager owns the registry and everything needed to build, restore
//! and tear down a session. Pairing, event dispatch, reconnection, health
//! checks and startup loading are implemented in sibling modules as further
//! `impl SessionManager` blocks.

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::registry::SessionRegistry;
use super::state::{Session, SessionInfo};
use crate::client::{ClientFactory, MessagingClient};
use crate::config::LifecycleConfig;
use crate::error::SessionError;
use crate::events::{LifecycleEvent, RemovalReason};
use crate::storage::SessionLayout;
use crate::store::StoreOpener;

/// Manages every sub-session of one host process
///
/// SessionManager provides:
/// - Pairing of new sessions against a phone number
/// - Restoration of persisted sessions at startup
/// - Automatic reconnection and periodic health checks
/// - Lifecycle events for observers
///
/// Methods that spawn background work take `self: &Arc<Self>`.
pub struct SessionManager {
    pub(super) config: LifecycleConfig,
    pub(super) layout: SessionLayout,
    pub(super) registry: SessionRegistry,
    pub(super) stores: Arc<dyn StoreOpener>,
    pub(super) clients: Arc<dyn ClientFactory>,
    /// The host's own client, used for notifications that outlive a session
    main_client: RwLock<Option<Arc<dyn MessagingClient>>>,
    event_tx: broadcast::Sender<LifecycleEvent>,
    pub(super) shutdown: CancellationToken,
    pub(super) health_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a new SessionManager
    pub fn new(
        config: LifecycleConfig,
        stores: Arc<dyn StoreOpener>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            layout: SessionLayout::new(config.root_dir.clone()),
            config,
            registry: SessionRegistry::new(),
            stores,
            clients,
            main_client: RwLock::new(None),
            event_tx,
            shutdown: CancellationToken::new(),
            health_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }

    /// Remember the host's client for notifications
    pub async fn set_main_client(&self, client: Arc<dyn MessagingClient>) {
        *self.main_client.write().await = Some(client);
    }

    pub(super) async fn main_client(&self) -> Option<Arc<dyn MessagingClient>> {
        self.main_client.read().await.clone()
    }

    /// Whether `id` is active, pending, or mid-setup
    pub async fn session_exists(&self, id: &str) -> bool {
        self.registry.exists(id).await
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.registry.is_active(id).await
    }

    pub async fn is_pending(&self, id: &str) -> bool {
        self.registry.is_pending(id).await
    }

    /// Client handle of an active or pending session
    pub async fn session_client(&self, id: &str) -> Option<Arc<dyn MessagingClient>> {
        self.registry
            .get(id)
            .await
            .map(|session| Arc::clone(session.client()))
    }

    /// Copy of the registry entry for `id`
    pub async fn session(&self, id: &str) -> Option<Session> {
        self.registry.get(id).await
    }

    /// Summaries of every active session, ordered by id
    pub async fn list_active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions = self.registry.snapshot_active(Session::info).await;
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        sessions
    }

    pub async fn active_count(&self) -> usize {
        self.registry.active_count().await
    }

    /// Tear down a session on request and delete its files
    pub async fn remove_session(&self, id: &str) -> Result<(), SessionError> {
        if self.discard(id, RemovalReason::Requested).await {
            Ok(())
        } else {
            Err(SessionError::NotFound(id.to_string()))
        }
    }

    /// Stop background work and disconnect every session
    ///
    /// Sessions keep their files so the next start can restore them.
    pub async fn shutdown(&self) {
        info!("Shutting down session manager");
        self.shutdown.cancel();
        let health = self
            .health_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = health {
            if let Err(e) = handle.await {
                warn!(error = %e, "Health monitor task failed");
            }
        }

        let sessions = self.registry.drain().await;
        for session in &sessions {
            self.release_handles(session).await;
        }
        info!(sessions = sessions.len(), "Session manager stopped");
    }

    pub(super) fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }

    /// Remove `id` from the registry and tear it down
    ///
    /// Returns `false` when some other path already took the session, in
    /// which case that path owns the teardown.
    pub(super) async fn discard(&self, id: &str, reason: RemovalReason) -> bool {
        let session = self.registry.remove(id).await;
        self.finish_discard(id, session, reason).await
    }

    /// [`SessionManager::discard`], unless `id` now names a newer session
    pub(super) async fn discard_current(&self, id: &str, epoch: u64, reason: RemovalReason) -> bool {
        let session = self.registry.remove_current(id, epoch).await;
        self.finish_discard(id, session, reason).await
    }

    async fn finish_discard(&self, id: &str, session: Option<Session>, reason: RemovalReason) -> bool {
        let Some(session) = session else {
            debug!(session_id = %id, reason = %reason, "Session already gone");
            return false;
        };
        self.teardown(&session).await;
        self.registry.release(id).await;
        info!(session_id = %id, reason = %reason, "Session removed");
        self.emit(LifecycleEvent::Removed {
            id: id.to_string(),
            reason,
        });
        true
    }

    /// Disconnect, close the store and delete the session directory
    pub(super) async fn teardown(&self, session: &Session) {
        self.release_handles(session).await;
        if let Err(e) = self.layout.remove_session_dir(session.id()).await {
            error!(session_id = %session.id(), error = %e, "Failed to delete session files");
        }
    }

    /// Disconnect and close the store, leaving files in place
    pub(super) async fn release_handles(&self, session: &Session) {
        session.events_token().cancel();
        session.client().disconnect().await;
        if let Err(e) = session.store().close().await {
            warn!(session_id = %session.id(), error = %e, "Failed to close credential store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Identity, MockClientFactory};
    use crate::store::{MemoryStoreOpener, MockDevices};
    use tempfile::TempDir;

    const ID: &str = "6281234567890";

    fn create_test_manager() -> (Arc<SessionManager>, MockDevices, TempDir) {
        let root = tempfile::tempdir().unwrap();
        let devices = MockDevices::new();
        let manager = SessionManager::new(
            LifecycleConfig::with_root(root.path()),
            Arc::new(MemoryStoreOpener::new(devices.clone())),
            Arc::new(MockClientFactory::new(devices.clone())),
        );
        (Arc::new(manager), devices, root)
    }

    async fn restore(manager: &Arc<SessionManager>, devices: &MockDevices, id: &str) {
        manager.layout.create_session_dir(id).await.unwrap();
        std::fs::write(manager.layout.store_path(id), b"").unwrap();
        devices.pair(id, Identity::new(format!("{id}@s.whatsapp.net")));
        manager.load_existing().await;
    }

    #[tokio::test]
    async fn empty_manager_lists_nothing() {
        let (manager, _, _root) = create_test_manager();

        assert!(manager.list_active_sessions().await.is_empty());
        assert_eq!(manager.active_count().await, 0);
        assert!(!manager.session_exists(ID).await);
        assert!(manager.session_client(ID).await.is_none());
    }

    #[tokio::test]
    async fn remove_unknown_session_is_not_found() {
        let (manager, _, _root) = create_test_manager();

        let result = manager.remove_session(ID).await;

        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_session_deletes_directory_and_emits() {
        let (manager, devices, _root) = create_test_manager();
        restore(&manager, &devices, ID).await;
        let mut rx = manager.subscribe();
        let client = manager.session_client(ID).await.unwrap();

        manager.remove_session(ID).await.unwrap();

        assert!(!manager.session_exists(ID).await);
        assert!(!manager.layout.session_dir(ID).exists());
        assert!(!client.is_connected());
        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Removed {
                id: ID.to_string(),
                reason: RemovalReason::Requested,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn list_active_sessions_is_sorted() {
        let (manager, devices, _root) = create_test_manager();
        restore(&manager, &devices, "6280000000002").await;
        restore(&manager, &devices, "6280000000001").await;

        let ids: Vec<_> = manager
            .list_active_sessions()
            .await
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(ids, vec!["6280000000001", "6280000000002"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_keeps_files_and_empties_registry() {
        let (manager, devices, _root) = create_test_manager();
        restore(&manager, &devices, ID).await;

        manager.shutdown().await;

        assert_eq!(manager.active_count().await, 0);
        assert!(manager.layout.store_path(ID).exists());
    }
}

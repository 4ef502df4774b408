//! Per-session event pump and dispatcher

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::manager::SessionManager;
use super::notify;
use super::state::Session;
use crate::client::{ClientEvent, MessagingClient, Presence};
use crate::events::{LifecycleEvent, RemovalReason};

impl SessionManager {
    /// Forward the session's client events to [`SessionManager::dispatch`]
    ///
    /// Subscribes before returning so nothing emitted by a following
    /// `connect()` is missed. The pump stops when the session's event token
    /// is cancelled, on shutdown, or once the manager is dropped.
    pub(super) fn spawn_event_pump(self: &Arc<Self>, session: &Session) {
        let id = session.id().to_string();
        let client = Arc::clone(session.client());
        let token = session.events_token().clone();
        let shutdown = self.shutdown.clone();
        let weak = Arc::downgrade(self);
        let mut rx = client.subscribe();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = token.cancelled() => break,
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => event,
                };
                match event {
                    Ok(event) => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.dispatch(&id, &client, event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session_id = %id, skipped, "Event pump lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(session_id = %id, "Event pump stopped");
        });
    }

    /// React to one client event for session `id`
    pub(super) async fn dispatch(
        self: &Arc<Self>,
        id: &str,
        client: &Arc<dyn MessagingClient>,
        event: ClientEvent,
    ) {
        let presence = &self.config.presence;
        match event {
            ClientEvent::PairSucceeded { identity } => {
                info!(session_id = %id, identity = %identity, "Pairing accepted");
                self.complete_pairing(id).await;
                announce(client, presence.paired_repeats, presence.paired_gap_ms).await;
            }
            ClientEvent::Connected => {
                debug!(session_id = %id, "Client connected");
                let promoted = client.identity().is_some() && self.complete_pairing(id).await;
                if !promoted {
                    self.registry
                        .with_active(id, |s| s.set_connected(true))
                        .await;
                }
                announce(client, presence.connected_repeats, presence.connected_gap_ms).await;
            }
            ClientEvent::LoggedOut => {
                warn!(session_id = %id, "Session logged out remotely");
                self.discard(id, RemovalReason::LoggedOut).await;
            }
            ClientEvent::Disconnected => {
                let tracked = self
                    .registry
                    .with_active(id, |s| s.set_connected(false))
                    .await
                    .is_some();
                if tracked {
                    warn!(session_id = %id, "Session disconnected");
                    self.spawn_reconnect(id);
                }
            }
            ClientEvent::Message(message) => {
                self.emit(LifecycleEvent::Message {
                    id: id.to_string(),
                    message,
                });
            }
        }
    }

    /// Promote a pending session once pairing has succeeded
    ///
    /// Returns `false` when `id` was not pending, e.g. because a timeout
    /// or an earlier event already settled it.
    pub(super) async fn complete_pairing(&self, id: &str) -> bool {
        let Some(session) = self.registry.promote(id).await else {
            return false;
        };

        if let Err(e) = self.layout.save_metadata(id, session.started_at()).await {
            warn!(session_id = %id, error = %e, "Failed to save session metadata");
        }

        let identity = session.client().identity();
        info!(session_id = %id, "Session paired");
        if let Some(owner) = session.owner() {
            self.notify_owner(
                Arc::clone(session.client()),
                owner,
                notify::paired(id, identity.as_ref()),
            );
        }
        self.emit(LifecycleEvent::Paired { id: id.to_string() });
        true
    }
}

/// Announce availability `repeats` times, `gap_ms` apart
async fn announce(client: &Arc<dyn MessagingClient>, repeats: u32, gap_ms: u64) {
    for i in 0..repeats {
        if i > 0 {
            sleep(Duration::from_millis(gap_ms)).await;
        }
        if let Err(e) = client.send_presence(Presence::Available).await {
            debug!(error = %e, "Presence announcement failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::client::{Identity, IncomingMessage, MockClient, MockClientFactory, MockScript};
    use crate::config::LifecycleConfig;
    use crate::store::{MemoryStoreOpener, MockDevices};
    use tempfile::TempDir;

    const ID: &str = "6281234567890";
    const OWNER: &str = "6280000000000@s.whatsapp.net";

    fn create_test_manager() -> (Arc<SessionManager>, MockDevices, Arc<MockClientFactory>, TempDir) {
        let root = tempfile::tempdir().unwrap();
        let devices = MockDevices::new();
        let clients = Arc::new(MockClientFactory::new(devices.clone()));
        let mut config = LifecycleConfig::with_root(root.path());
        config.reconnect.max_attempts = 0;
        let manager = Arc::new(SessionManager::new(
            config,
            Arc::new(MemoryStoreOpener::new(devices.clone())),
            clients.clone(),
        ));
        (manager, devices, clients, root)
    }

    async fn pending(
        manager: &Arc<SessionManager>,
        devices: &MockDevices,
        clients: &MockClientFactory,
    ) -> Arc<MockClient> {
        let main = Arc::new(MockClient::new("6280000000000", devices.clone(), MockScript::default()));
        manager.create_pairing_session(ID, OWNER, main).await.unwrap();
        clients.client(ID).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn pair_succeeded_promotes_and_persists() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;
        let mut rx = manager.subscribe();
        let identity = Identity::new("6281234567890@s.whatsapp.net");
        devices.pair(ID, identity.clone());

        client.emit(ClientEvent::PairSucceeded { identity });

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Paired { id: ID.to_string() });
        assert!(manager.is_active(ID).await);
        assert!(manager.layout().metadata_path(ID).exists());
        sleep(Duration::from_secs(1)).await;
        let sent = client.sent_texts();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, OWNER);
        assert!(client.presence_calls() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_with_identity_promotes_once() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;
        let mut rx = manager.subscribe();
        devices.pair(ID, Identity::new("6281234567890@s.whatsapp.net"));

        client.emit(ClientEvent::Connected);
        client.emit(ClientEvent::Connected);

        assert_eq!(rx.recv().await.unwrap(), LifecycleEvent::Paired { id: ID.to_string() });
        sleep(Duration::from_secs(2)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(manager.active_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_without_identity_stays_pending() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;

        client.emit(ClientEvent::Connected);
        sleep(Duration::from_secs(1)).await;

        assert!(manager.is_pending(ID).await);
    }

    #[tokio::test(start_paused = true)]
    async fn logged_out_removes_session() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;
        let mut rx = manager.subscribe();

        client.emit(ClientEvent::LoggedOut);

        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Removed {
                id: ID.to_string(),
                reason: RemovalReason::LoggedOut,
            }
        );
        assert!(!manager.session_exists(ID).await);
        assert!(!manager.layout().session_dir(ID).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnected_marks_active_session_offline() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;
        devices.pair(ID, Identity::new("6281234567890@s.whatsapp.net"));
        let mut rx = manager.subscribe();
        client.emit(ClientEvent::PairSucceeded {
            identity: Identity::new("6281234567890@s.whatsapp.net"),
        });
        rx.recv().await.unwrap();

        client.drop_link();
        sleep(Duration::from_secs(1)).await;

        let session = manager.session(ID).await.unwrap();
        assert!(!session.connected());
        assert!(manager.is_active(ID).await);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_are_republished() {
        let (manager, devices, clients, _root) = create_test_manager();
        let client = pending(&manager, &devices, &clients).await;
        let mut rx = manager.subscribe();
        let message = IncomingMessage {
            message_id: "3EB0C767D26B".to_string(),
            chat: "status@broadcast".to_string(),
            sender: "6289999999999@s.whatsapp.net".to_string(),
            is_broadcast: true,
            timestamp: Utc::now(),
        };

        client.emit(ClientEvent::Message(message.clone()));

        assert_eq!(
            rx.recv().await.unwrap(),
            LifecycleEvent::Message {
                id: ID.to_string(),
                message,
            }
        );
    }
}

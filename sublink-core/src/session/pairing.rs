//! Pairing workflow: create a pending session and wait for the code to be used

use std::sync::Arc;

use tokio::time::{interval_at, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::manager::SessionManager;
use super::notify;
use super::state::Session;
use crate::client::MessagingClient;
use crate::error::{SessionError, StorageError};
use crate::events::{LifecycleEvent, RemovalReason};
use crate::storage::is_valid_session_id;

/// How a pairing wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The session went active
    Paired,
    /// The session was removed by someone else
    Vanished,
    /// The deadline passed and the session was torn down
    TimedOut,
}

impl SessionManager {
    /// Start pairing `id` and return the code the user must enter
    ///
    /// `owner` is the chat that receives notifications about the session.
    /// The session stays pending until the client reports a successful
    /// pairing or the pairing timeout elapses.
    pub async fn create_pairing_session(
        self: &Arc<Self>,
        id: &str,
        owner: &str,
        main_client: Arc<dyn MessagingClient>,
    ) -> Result<String, SessionError> {
        if !is_valid_session_id(id) {
            return Err(SessionError::InvalidId(id.to_string()));
        }
        self.registry.reserve(id).await?;
        self.set_main_client(main_client).await;

        let session = match self.prepare_pending(id, owner).await {
            Ok(session) => session,
            Err(e) => {
                self.registry.release(id).await;
                return Err(e);
            }
        };
        let client = Arc::clone(session.client());

        if let Err(e) = client.connect().await {
            warn!(session_id = %id, error = %e, "Pairing connect failed");
            self.discard(id, RemovalReason::PairingFailed).await;
            return Err(SessionError::Connect(e));
        }

        // The server needs a moment after connect before it accepts code requests
        sleep(self.config.pairing.code_request_delay()).await;

        let code = match client.request_pairing_code(id).await {
            Ok(code) => code,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Pairing code request failed");
                self.discard(id, RemovalReason::PairingFailed).await;
                return Err(SessionError::PairingCode(e));
            }
        };

        info!(session_id = %id, owner = %owner, "Pairing code issued");
        self.emit(LifecycleEvent::PairingStarted { id: id.to_string() });

        let manager = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            manager.wait_for_pairing(&id).await;
        });

        Ok(code)
    }

    /// Create the directory, store and client, and register the session as pending
    async fn prepare_pending(self: &Arc<Self>, id: &str, owner: &str) -> Result<Session, SessionError> {
        self.layout.create_session_dir(id).await?;

        let store = match self.stores.open(&self.layout.store_uri(id)).await {
            Ok(store) => store,
            Err(e) => {
                if let Err(e) = self.layout.remove_session_dir(id).await {
                    warn!(session_id = %id, error = %e, "Failed to clean up session directory");
                }
                return Err(StorageError::from(e).into());
            }
        };

        let client = self.clients.create(id, Arc::clone(&store));
        let session = Session::new(id, client, store).with_owner(owner);
        self.spawn_event_pump(&session);

        if let Err(e) = self.registry.register_pending(session.clone()).await {
            self.teardown(&session).await;
            return Err(e);
        }
        debug!(session_id = %id, "Pending session registered");
        Ok(session)
    }

    /// Poll until `id` leaves the pending map or the pairing timeout elapses
    pub(super) async fn wait_for_pairing(&self, id: &str) -> PairingOutcome {
        let poll = self.config.pairing.poll_interval();
        let deadline = sleep_until(Instant::now() + self.config.pairing.timeout());
        tokio::pin!(deadline);
        let mut ticker = interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => break,
                _ = ticker.tick() => {
                    if !self.registry.is_pending(id).await {
                        return self.settled(id).await;
                    }
                }
            }
        }

        self.expire_pairing(id).await
    }

    async fn settled(&self, id: &str) -> PairingOutcome {
        if self.registry.is_active(id).await {
            debug!(session_id = %id, "Pairing wait finished");
            PairingOutcome::Paired
        } else {
            debug!(session_id = %id, "Pending session vanished");
            PairingOutcome::Vanished
        }
    }

    async fn expire_pairing(&self, id: &str) -> PairingOutcome {
        let Some(session) = self.registry.take_pending(id).await else {
            return self.settled(id).await;
        };

        let timeout = self.config.pairing.timeout();
        warn!(session_id = %id, timeout_secs = timeout.as_secs(), "Pairing timed out");
        if let Some(owner) = session.owner() {
            let minutes = timeout.as_secs().div_ceil(60);
            self.notify_via_main(owner, notify::pairing_timeout(id, minutes))
                .await;
        }

        self.teardown(&session).await;
        self.registry.release(id).await;
        self.emit(LifecycleEvent::PairingTimedOut { id: id.to_string() });
        self.emit(LifecycleEvent::Removed {
            id: id.to_string(),
            reason: RemovalReason::PairingTimeout,
        });
        PairingOutcome::TimedOut
    }
}

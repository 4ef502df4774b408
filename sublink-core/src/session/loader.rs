//! Startup restoration of persisted sessions

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::manager::SessionManager;
use super::state::Session;
use crate::client::Presence;
use crate::error::{ClientError, SessionError, StoreError};
use crate::events::LifecycleEvent;

/// Why a persisted session could not be restored
#[derive(Error, Debug)]
enum LoadError {
    #[error("credential store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("no stored identity")]
    NoIdentity,

    #[error("connect failed: {0}")]
    Connect(#[from] ClientError),

    #[error("link did not come up")]
    NotLive,

    #[error(transparent)]
    Register(#[from] SessionError),
}

/// What a startup load did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Sessions now active
    pub loaded: Vec<String>,
    /// Sessions whose files were deleted
    pub discarded: Vec<String>,
    /// Directories left alone because the id was already tracked
    pub skipped: Vec<String>,
}

impl SessionManager {
    /// Restore every persisted session, then start the health monitor
    pub async fn start(self: &Arc<Self>) -> LoadReport {
        let report = self.load_existing().await;
        self.start_health_monitor();
        report
    }

    /// Restore every session directory under the storage root
    ///
    /// At most `loader.max_concurrent` sessions are being restored at once.
    /// A session that cannot be restored has its directory deleted.
    pub async fn load_existing(self: &Arc<Self>) -> LoadReport {
        let ids = match self.layout.list_session_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to scan session directories");
                return LoadReport::default();
            }
        };
        info!(count = ids.len(), root = %self.layout.root().display(), "Loading persisted sessions");

        let limit = Arc::new(Semaphore::new(self.config.loader.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();
        for id in ids {
            let manager = Arc::clone(self);
            let limit = Arc::clone(&limit);
            tasks.spawn(async move {
                let outcome = match limit.acquire_owned().await {
                    Ok(_permit) => manager.load_one(&id).await,
                    Err(_) => Ok(false),
                };
                (id, outcome)
            });
        }

        let mut report = LoadReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, Ok(true))) => report.loaded.push(id),
                Ok((id, Ok(false))) => report.skipped.push(id),
                Ok((id, Err(e))) => {
                    warn!(session_id = %id, error = %e, "Discarded persisted session");
                    report.discarded.push(id);
                }
                Err(e) => error!(error = %e, "Session load task failed"),
            }
        }
        report.loaded.sort();
        report.discarded.sort();
        report.skipped.sort();

        info!(
            loaded = report.loaded.len(),
            discarded = report.discarded.len(),
            skipped = report.skipped.len(),
            "Finished loading sessions"
        );
        report
    }

    /// Restore one session; `Ok(false)` when the id is already tracked
    async fn load_one(self: &Arc<Self>, id: &str) -> Result<bool, LoadError> {
        if self.registry.reserve(id).await.is_err() {
            debug!(session_id = %id, "Session already tracked, not loading");
            return Ok(false);
        }

        let result = self.restore(id).await;
        if result.is_err() {
            if let Err(e) = self.layout.remove_session_dir(id).await {
                error!(session_id = %id, error = %e, "Failed to delete session files");
            }
            self.registry.release(id).await;
        }
        result.map(|()| true)
    }

    async fn restore(self: &Arc<Self>, id: &str) -> Result<(), LoadError> {
        let store = self.stores.open(&self.layout.store_uri(id)).await?;
        let identity = match store.first_identity().await {
            Ok(Some(identity)) => identity,
            other => {
                if let Err(e) = store.close().await {
                    debug!(session_id = %id, error = %e, "Failed to close store");
                }
                return match other {
                    Err(e) => Err(e.into()),
                    _ => Err(LoadError::NoIdentity),
                };
            }
        };

        let client = self.clients.create(id, Arc::clone(&store));
        let started_at = self.layout.load_started_at(id).await;
        let mut session = Session::new(id, client, store).with_started_at(started_at);
        self.spawn_event_pump(&session);
        let client = Arc::clone(session.client());

        if let Err(e) = client.connect().await {
            self.release_handles(&session).await;
            return Err(e.into());
        }
        sleep(self.config.loader.settle()).await;
        if client.identity().is_none() || !client.is_connected() {
            self.release_handles(&session).await;
            return Err(LoadError::NotLive);
        }

        session.set_connected(true);
        if let Err(e) = self.registry.register_active(session.clone()).await {
            self.release_handles(&session).await;
            return Err(e.into());
        }
        if let Err(e) = client.send_presence(Presence::Available).await {
            debug!(session_id = %id, error = %e, "Presence announcement failed");
        }

        info!(session_id = %id, identity = %identity, "Session restored");
        self.emit(LifecycleEvent::Loaded { id: id.to_string() });
        Ok(())
    }
}

//! Session record and its serializable summary

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::client::MessagingClient;
use crate::store::CredentialStore;

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// One tenant's managed connection
///
/// Clones share the client and store handles and the reconnect flag; the
/// copy inside the registry is the only one whose other flags and counters
/// matter.
#[derive(Clone)]
pub struct Session {
    id: String,
    /// Distinguishes this session from a later one registered under the same id
    epoch: u64,
    client: Arc<dyn MessagingClient>,
    store: Arc<dyn CredentialStore>,
    connected: bool,
    started_at: DateTime<Utc>,
    owner: Option<String>,
    reconnecting: Arc<AtomicBool>,
    fail_count: u32,
    last_failure: Option<Instant>,
    events: CancellationToken,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        client: Arc<dyn MessagingClient>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            id: id.into(),
            epoch: NEXT_EPOCH.fetch_add(1, Ordering::Relaxed),
            client,
            store,
            connected: false,
            started_at: Utc::now(),
            owner: None,
            reconnecting: Arc::new(AtomicBool::new(false)),
            fail_count: 0,
            last_failure: None,
            events: CancellationToken::new(),
        }
    }

    /// Chat that receives notifications about this session
    #[must_use]
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    #[must_use]
    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn client(&self) -> &Arc<dyn MessagingClient> {
        &self.client
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The session flag; see [`Session::is_live`] for the link state
    pub fn connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Marked connected and the client agrees
    pub fn is_live(&self) -> bool {
        self.connected && self.client.is_connected()
    }

    pub fn has_identity(&self) -> bool {
        self.client.identity().is_some()
    }

    pub fn reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::SeqCst)
    }

    /// Claim the reconnect slot; `None` when a reconnect already runs
    ///
    /// The slot is released when the returned claim is dropped.
    pub fn begin_reconnect(&self) -> Option<ReconnectClaim> {
        self.reconnecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ReconnectClaim(Arc::clone(&self.reconnecting)))
    }

    pub fn fail_count(&self) -> u32 {
        self.fail_count
    }

    pub fn last_failure(&self) -> Option<Instant> {
        self.last_failure
    }

    /// Count a failure and return the new total
    pub fn record_failure(&mut self, at: Instant) -> u32 {
        self.fail_count += 1;
        self.last_failure = Some(at);
        self.fail_count
    }

    pub fn reset_failures(&mut self) {
        self.fail_count = 0;
    }

    /// Token that stops this session's event pump
    pub fn events_token(&self) -> &CancellationToken {
        &self.events
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            connected: self.is_live(),
            started_at: self.started_at,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected", &self.connected)
            .field("started_at", &self.started_at)
            .field("owner", &self.owner)
            .field("epoch", &self.epoch)
            .field("reconnecting", &self.reconnecting())
            .field("fail_count", &self.fail_count)
            .finish_non_exhaustive()
    }
}

/// Held by a running reconnect; clears the session's flag on drop
#[must_use = "dropping the claim releases the reconnect slot"]
#[derive(Debug)]
pub struct ReconnectClaim(Arc<AtomicBool>);

impl Drop for ReconnectClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Summary of an active session for command handlers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub connected: bool,
    pub started_at: DateTime<Utc>,
}

impl SessionInfo {
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

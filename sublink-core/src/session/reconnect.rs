//! Reconnection engine for dropped sessions

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::manager::SessionManager;
use super::notify;
use crate::client::Presence;
use crate::config::ReconnectConfig;
use crate::events::{LifecycleEvent, RemovalReason};

/// Delay schedule for reconnect attempts
///
/// Attempts past the end of the table reuse its last delay.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    delays: Vec<Duration>,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(delays: Vec<Duration>, max_attempts: u32) -> Self {
        Self {
            delays,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            config
                .delays_secs
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            config.max_attempts,
        )
    }

    /// Delay before the next attempt, `None` once every attempt is used
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self
            .delays
            .get(self.attempts as usize)
            .or(self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO);
        self.attempts += 1;
        Some(delay)
    }

    /// Attempts handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// How a reconnect run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// Reconnection is disabled, the session is not active, or another
    /// run already owns it
    Skipped,
    /// The session left the registry mid-run
    Vanished,
    /// The client came back on its own
    AlreadyConnected,
    /// An attempt succeeded and the link was verified
    Reconnected,
    /// The session was torn down
    Removed,
}

impl SessionManager {
    /// Reconnect `id` in the background
    pub(super) fn spawn_reconnect(self: &Arc<Self>, id: &str) {
        let manager = Arc::clone(self);
        let id = id.to_string();
        tokio::spawn(async move {
            let outcome = manager.reconnect(&id).await;
            debug!(session_id = %id, ?outcome, "Reconnect finished");
        });
    }

    /// Try to bring an active session back online
    ///
    /// At most one run per session is in flight; a second call while one is
    /// running returns [`ReconnectOutcome::Skipped`]. Each attempt waits out
    /// its backoff delay, then re-reads the registry, so removing the session
    /// is enough to stop the run. The run only ever touches the session it
    /// started on, never a later one registered under the same id, and the
    /// in-flight flag is released even when the future is dropped.
    pub async fn reconnect(self: &Arc<Self>, id: &str) -> ReconnectOutcome {
        let mut policy = ReconnectPolicy::from_config(&self.config.reconnect);
        if policy.max_attempts() == 0 {
            return ReconnectOutcome::Skipped;
        }

        let claimed = self
            .registry
            .with_active(id, |s| s.begin_reconnect().map(|claim| (claim, s.epoch())))
            .await;
        let (_claim, epoch) = match claimed {
            Some(Some(claimed)) => claimed,
            Some(None) => {
                debug!(session_id = %id, "Reconnect already running");
                return ReconnectOutcome::Skipped;
            }
            None => {
                debug!(session_id = %id, "No active session to reconnect");
                return ReconnectOutcome::Skipped;
            }
        };

        self.run_reconnect(id, epoch, &mut policy).await
    }

    async fn run_reconnect(
        &self,
        id: &str,
        epoch: u64,
        policy: &mut ReconnectPolicy,
    ) -> ReconnectOutcome {
        let verify_delay = self.config.reconnect.verify_delay();
        let mut owner = None;

        while let Some(delay) = policy.next_delay() {
            let attempt = policy.attempts();
            sleep(delay).await;

            let Some(session) = self
                .registry
                .get_active(id)
                .await
                .filter(|s| s.epoch() == epoch)
            else {
                debug!(session_id = %id, "Session gone, abandoning reconnect");
                return ReconnectOutcome::Vanished;
            };
            owner = session.owner().map(str::to_string);
            let client = Arc::clone(session.client());

            if client.is_connected() {
                let tracked = self
                    .registry
                    .with_current(id, epoch, |s| {
                        s.set_connected(true);
                        s.reset_failures();
                    })
                    .await;
                if tracked.is_none() {
                    return ReconnectOutcome::Vanished;
                }
                info!(session_id = %id, "Session came back on its own");
                return ReconnectOutcome::AlreadyConnected;
            }

            if client.identity().is_none() {
                warn!(session_id = %id, "No stored identity, removing instead of reconnecting");
                return if self
                    .discard_current(id, epoch, RemovalReason::MissingIdentity)
                    .await
                {
                    ReconnectOutcome::Removed
                } else {
                    ReconnectOutcome::Vanished
                };
            }

            info!(session_id = %id, attempt, max_attempts = policy.max_attempts(), "Reconnecting");
            let result = client.connect().await;
            if !self.registry.is_current(id, epoch).await {
                // Torn down while connecting; the handle must not stay online
                client.disconnect().await;
                debug!(session_id = %id, "Session replaced mid-connect, dropping link");
                return ReconnectOutcome::Vanished;
            }
            let failure = match result {
                Ok(()) => {
                    sleep(verify_delay).await;
                    if client.is_connected() {
                        None
                    } else {
                        Some("link did not come up".to_string())
                    }
                }
                Err(e) => Some(e.to_string()),
            };

            match failure {
                None => {
                    let tracked = self
                        .registry
                        .with_current(id, epoch, |s| {
                            s.set_connected(true);
                            s.reset_failures();
                        })
                        .await;
                    if tracked.is_none() {
                        client.disconnect().await;
                        return ReconnectOutcome::Vanished;
                    }
                    if let Err(e) = client.send_presence(Presence::Available).await {
                        debug!(session_id = %id, error = %e, "Presence announcement failed");
                    }
                    info!(session_id = %id, attempt, "Session reconnected");
                    self.emit(LifecycleEvent::Reconnected { id: id.to_string() });
                    return ReconnectOutcome::Reconnected;
                }
                Some(reason) => {
                    warn!(session_id = %id, attempt, reason = %reason, "Reconnect attempt failed");
                    let recorded = self
                        .registry
                        .with_current(id, epoch, |s| s.record_failure(Instant::now()))
                        .await;
                    if recorded.is_none() {
                        return ReconnectOutcome::Vanished;
                    }
                }
            }
        }

        let attempts = policy.attempts();
        warn!(session_id = %id, attempts, "Reconnect attempts exhausted");
        if let Some(owner) = owner {
            self.notify_via_main(&owner, notify::reconnect_exhausted(id, attempts))
                .await;
        }
        if self
            .discard_current(id, epoch, RemovalReason::ReconnectExhausted)
            .await
        {
            ReconnectOutcome::Removed
        } else {
            ReconnectOutcome::Vanished
        }
    }
}

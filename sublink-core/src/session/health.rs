//! Periodic health sweep and orphan cleanup

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::manager::SessionManager;
use super::state::Session;
use crate::events::RemovalReason;

/// Point-in-time view of one active session, taken under the registry lock
#[derive(Debug, Clone)]
struct HealthSnapshot {
    id: String,
    epoch: u64,
    has_identity: bool,
    link_up: bool,
    reconnecting: bool,
    fail_count: u32,
    last_failure: Option<Instant>,
}

impl HealthSnapshot {
    fn of(session: &Session) -> Self {
        Self {
            id: session.id().to_string(),
            epoch: session.epoch(),
            has_identity: session.has_identity(),
            link_up: session.client().is_connected(),
            reconnecting: session.reconnecting(),
            fail_count: session.fail_count(),
            last_failure: session.last_failure(),
        }
    }
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Sessions torn down by this sweep
    pub removed: Vec<String>,
    /// Sessions handed to the reconnection engine
    pub reconnecting: Vec<String>,
    /// Sessions whose failure counter was cleared
    pub reset: Vec<String>,
    /// Untracked directories deleted because they hold no identity
    pub orphans_deleted: Vec<String>,
}

impl SessionManager {
    /// Run [`SessionManager::sweep`] every health interval until shutdown
    ///
    /// Calling this again while the monitor runs does nothing.
    pub fn start_health_monitor(self: &Arc<Self>) {
        let mut slot = self
            .health_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            debug!("Health monitor already running");
            return;
        }

        let period = self.config.health.interval();
        let shutdown = self.shutdown.clone();
        let weak = Arc::downgrade(self);
        info!(interval_secs = period.as_secs(), "Starting health monitor");

        *slot = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(manager) = weak.upgrade() else {
                            break;
                        };
                        manager.sweep().await;
                    }
                }
            }
            info!("Health monitor stopped");
        }));
    }

    /// Check every active session once
    ///
    /// Sessions without an identity are removed. Sessions whose link is down
    /// get a failure counted and a reconnect scheduled, or are removed once
    /// the counter reaches the configured maximum. Counters are cleared for
    /// sessions that are back up, and for sessions whose last failure is
    /// older than the reset window. Sessions with a reconnect in flight are
    /// left alone.
    pub async fn sweep(self: &Arc<Self>) -> SweepReport {
        let health = &self.config.health;
        let snapshots = self.registry.snapshot_active(HealthSnapshot::of).await;
        let now = Instant::now();
        let mut report = SweepReport::default();
        let mut doomed = Vec::new();

        for snapshot in snapshots {
            let (id, epoch) = (snapshot.id, snapshot.epoch);
            if !snapshot.has_identity {
                warn!(session_id = %id, "Active session has no identity");
                doomed.push((id, epoch, RemovalReason::MissingIdentity));
                continue;
            }
            if snapshot.reconnecting {
                continue;
            }

            let stale = snapshot.fail_count > 0
                && match snapshot.last_failure {
                    Some(at) => now.duration_since(at) > health.fail_reset(),
                    None => true,
                };
            if stale {
                self.registry
                    .with_current(&id, epoch, |s| s.reset_failures())
                    .await;
                report.reset.push(id.clone());
            }

            if !snapshot.link_up {
                let count = self
                    .registry
                    .with_current(&id, epoch, |s| {
                        s.set_connected(false);
                        s.record_failure(now)
                    })
                    .await;
                let Some(count) = count else {
                    continue;
                };
                if count >= health.max_consecutive_failures {
                    warn!(session_id = %id, failures = count, "Too many failed health checks");
                    doomed.push((id, epoch, RemovalReason::HealthEscalation));
                } else {
                    info!(session_id = %id, failures = count, "Session offline, reconnecting");
                    self.spawn_reconnect(&id);
                    report.reconnecting.push(id);
                }
            } else if snapshot.fail_count > 0 && !stale {
                self.registry
                    .with_current(&id, epoch, |s| s.reset_failures())
                    .await;
                report.reset.push(id);
            }
        }

        for (id, epoch, reason) in doomed {
            if self.discard_current(&id, epoch, reason).await {
                report.removed.push(id);
            }
        }

        if health.orphan_sweep {
            report.orphans_deleted = self.sweep_orphans().await;
        }

        debug!(
            removed = report.removed.len(),
            reconnecting = report.reconnecting.len(),
            reset = report.reset.len(),
            orphans = report.orphans_deleted.len(),
            "Health sweep complete"
        );
        report
    }

    /// Delete session directories nobody tracks and that hold no identity
    async fn sweep_orphans(&self) -> Vec<String> {
        let ids = match self.layout.list_session_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Failed to scan session directories");
                return Vec::new();
            }
        };
        let tracked = self.registry.tracked_ids().await;
        let mut deleted = Vec::new();

        for id in ids.into_iter().filter(|id| !tracked.contains(id)) {
            if !self.layout.has_store(&id).await {
                continue;
            }
            if self.has_stored_identity(&id).await {
                debug!(session_id = %id, "Untracked session still has an identity");
                continue;
            }

            // A pairing that started since the scan owns the id now
            if self.registry.reserve(&id).await.is_err() {
                continue;
            }
            match self.layout.remove_session_dir(&id).await {
                Ok(_) => {
                    info!(session_id = %id, "Deleted orphaned session files");
                    deleted.push(id.clone());
                }
                Err(e) => error!(session_id = %id, error = %e, "Failed to delete orphaned session"),
            }
            self.registry.release(&id).await;
        }
        deleted
    }

    /// Open the store read-only and look for a device identity
    async fn has_stored_identity(&self, id: &str) -> bool {
        let store = match self.stores.open(&self.layout.store_uri_read_only(id)).await {
            Ok(store) => store,
            Err(e) => {
                warn!(session_id = %id, error = %e, "Cannot open orphaned store");
                return false;
            }
        };
        let identity = store.first_identity().await;
        if let Err(e) = store.close().await {
            debug!(session_id = %id, error = %e, "Failed to close probed store");
        }
        matches!(identity, Ok(Some(_)))
    }
}

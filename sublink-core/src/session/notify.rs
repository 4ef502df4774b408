//! Best-effort notifications to session owners

use std::sync::Arc;

use tracing::{debug, warn};

use super::manager::SessionManager;
use crate::client::{Identity, MessagingClient};

pub(super) fn paired(id: &str, identity: Option<&Identity>) -> String {
    match identity {
        Some(identity) => format!("Session {id} is paired and online as {identity}."),
        None => format!("Session {id} is paired and online."),
    }
}

pub(super) fn pairing_timeout(id: &str, minutes: u64) -> String {
    format!("Pairing for {id} expired after {minutes} minutes. Request a new code to try again.")
}

pub(super) fn reconnect_exhausted(id: &str, attempts: u32) -> String {
    format!("Session {id} could not reconnect after {attempts} attempts and was removed.")
}

impl SessionManager {
    /// Send `text` to `owner` through `via` without waiting for delivery
    pub(super) fn notify_owner(&self, via: Arc<dyn MessagingClient>, owner: &str, text: String) {
        let owner = owner.to_string();
        tokio::spawn(async move {
            match via.send_text(&owner, &text).await {
                Ok(()) => debug!(owner = %owner, "Owner notified"),
                Err(e) => warn!(owner = %owner, error = %e, "Failed to notify owner"),
            }
        });
    }

    /// Notify `owner` through the host's client, if it is online
    pub(super) async fn notify_via_main(&self, owner: &str, text: String) {
        match self.main_client().await {
            Some(main) if main.is_connected() => self.notify_owner(main, owner, text),
            _ => debug!(owner = %owner, "Main client offline, notification dropped"),
        }
    }
}

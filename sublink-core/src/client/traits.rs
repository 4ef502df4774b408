//! MessagingClient trait and related types
//!
//! The messaging client is an external collaborator: it speaks the network
//! protocol over a credential store and reports what happens on the link as
//! [`ClientEvent`]s. The lifecycle manager only drives it through this trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::ClientError;
use crate::store::CredentialStore;

/// Durable device identity proving a session was paired
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity(pub String);

impl Identity {
    pub fn new(jid: impl Into<String>) -> Self {
        Self(jid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Presence states a session can announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Available,
    Unavailable,
}

/// An inbound message observed on a sub-session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: String,
    pub chat: String,
    pub sender: String,
    /// Status broadcasts arrive on a dedicated chat
    pub is_broadcast: bool,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle events emitted by a messaging client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The pairing code was accepted on the phone
    PairSucceeded { identity: Identity },
    /// The transport is up
    Connected,
    /// The device was unlinked remotely
    LoggedOut,
    /// The transport dropped
    Disconnected,
    Message(IncomingMessage),
}

/// A connectable client session bound to one credential store
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn connect(&self) -> Result<(), ClientError>;

    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Identity currently held by the client's device store, if paired
    fn identity(&self) -> Option<Identity>;

    /// Ask the network for a code linking `phone` to this client
    async fn request_pairing_code(&self, phone: &str) -> Result<String, ClientError>;

    async fn send_presence(&self, presence: Presence) -> Result<(), ClientError>;

    /// Send a plain text message to a chat
    async fn send_text(&self, target: &str, text: &str) -> Result<(), ClientError>;

    /// Subscribe to events from this client
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Factory for creating messaging clients
///
/// Enables dependency injection of client implementations.
pub trait ClientFactory: Send + Sync {
    /// Create a client for session `id` over an open credential store
    fn create(&self, id: &str, store: Arc<dyn CredentialStore>) -> Arc<dyn MessagingClient>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_displays_raw_jid() {
        let identity = Identity::new("6281234567890:12@s.whatsapp.net");
        assert_eq!(identity.to_string(), "6281234567890:12@s.whatsapp.net");
        assert_eq!(identity.as_str(), identity.0);
    }

    #[test]
    fn client_event_serializes_with_type_tag() {
        let event = ClientEvent::PairSucceeded {
            identity: Identity::new("628@s.whatsapp.net"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pair_succeeded");
        assert_eq!(json["identity"], "628@s.whatsapp.net");
    }

    #[test]
    fn presence_uses_snake_case() {
        let json = serde_json::to_string(&Presence::Available).unwrap();
        assert_eq!(json, "\"available\"");
    }
}

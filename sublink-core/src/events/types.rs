//! Lifecycle event definitions

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::client::IncomingMessage;

/// Why a session was torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// A command handler asked for it
    Requested,
    /// Connecting or requesting a code failed during pairing
    PairingFailed,
    /// Nobody entered the code in time
    PairingTimeout,
    /// The remote side revoked the credentials
    LoggedOut,
    /// The credential store holds no identity
    MissingIdentity,
    /// Every reconnect attempt failed
    ReconnectExhausted,
    /// Too many failed health checks in a row
    HealthEscalation,
}

impl RemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::PairingFailed => "pairing_failed",
            Self::PairingTimeout => "pairing_timeout",
            Self::LoggedOut => "logged_out",
            Self::MissingIdentity => "missing_identity",
            Self::ReconnectExhausted => "reconnect_exhausted",
            Self::HealthEscalation => "health_escalation",
        }
    }
}

impl fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by the session manager
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A pairing code was handed out
    PairingStarted { id: String },
    /// A pending session completed pairing and went active
    Paired { id: String },
    /// A pending session expired before pairing completed
    PairingTimedOut { id: String },
    /// A persisted session was restored at startup
    Loaded { id: String },
    /// A dropped session came back
    Reconnected { id: String },
    /// A session was torn down and its files deleted
    Removed { id: String, reason: RemovalReason },
    /// A message arrived on a session
    Message { id: String, message: IncomingMessage },
}

impl LifecycleEvent {
    pub fn session_id(&self) -> &str {
        match self {
            Self::PairingStarted { id }
            | Self::Paired { id }
            | Self::PairingTimedOut { id }
            | Self::Loaded { id }
            | Self::Reconnected { id }
            | Self::Removed { id, .. }
            | Self::Message { id, .. } => id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removed_serializes_with_reason() {
        let event = LifecycleEvent::Removed {
            id: "6281234567890".to_string(),
            reason: RemovalReason::ReconnectExhausted,
        };

        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains(r#""type":"removed""#));
        assert!(json.contains(r#""reason":"reconnect_exhausted""#));
    }

    #[test]
    fn session_id_covers_every_variant() {
        let event = LifecycleEvent::PairingTimedOut {
            id: "6281234567890".to_string(),
        };
        assert_eq!(event.session_id(), "6281234567890");
    }

    #[test]
    fn reason_display_matches_serde_name() {
        let json = serde_json::to_string(&RemovalReason::HealthEscalation).unwrap();
        assert_eq!(json, format!("\"{}\"", RemovalReason::HealthEscalation));
    }
}

//! sublink-core: supervises many paired messaging sub-sessions
//!
//! This crate provides the building blocks of the session lifecycle:
//!
//! - **Session management** - [`SessionManager`] pairs new sessions, restores
//!   persisted ones, reconnects dropped ones and sweeps unhealthy ones
//! - **Registry** - [`SessionRegistry`] holds pending and active sessions
//! - **Client abstraction** - [`MessagingClient`] and [`ClientFactory`] with
//!   [`MockClient`] for tests
//! - **Credential stores** - [`CredentialStore`] and [`StoreOpener`]
//! - **Storage layout** - [`SessionLayout`] for per-session directories
//! - **Lifecycle events** - [`LifecycleEvent`] broadcast to observers
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sublink_core::{
//!     LifecycleConfig, MemoryStoreOpener, MockClient, MockClientFactory, MockDevices,
//!     MockScript, SessionManager,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let devices = MockDevices::new();
//!     let manager = Arc::new(SessionManager::new(
//!         LifecycleConfig::default(),
//!         Arc::new(MemoryStoreOpener::new(devices.clone())),
//!         Arc::new(MockClientFactory::new(devices.clone())),
//!     ));
//!
//!     // Restore persisted sessions and start health checks
//!     manager.start().await;
//!
//!     // Pair a new session; the owner enters the code on their phone
//!     let main = Arc::new(MockClient::new("6280000000000", devices, MockScript::default()));
//!     let code = manager
//!         .create_pairing_session("6281234567890", "6280000000000@s.whatsapp.net", main)
//!         .await?;
//!     println!("Pairing code: {code}");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod store;

// Re-export key types for convenience
pub use client::{
    ClientEvent, ClientFactory, ConnectGauge, Identity, IncomingMessage, MessagingClient,
    MockClient, MockClientFactory, MockScript, Presence,
};
pub use config::{
    HealthConfig, LifecycleConfig, LoaderConfig, PairingConfig, PresenceConfig, ReconnectConfig,
};
pub use error::{ClientError, SessionError, StorageError, StoreError, SublinkError};
pub use events::{LifecycleEvent, RemovalReason};
pub use session::{
    LoadReport, PairingOutcome, ReconnectClaim, ReconnectOutcome, ReconnectPolicy, Session,
    SessionInfo, SessionManager, SessionRegistry, SweepReport,
};
pub use storage::{SessionLayout, SessionMetadata, is_valid_session_id};
pub use store::{CredentialStore, MemoryStore, MemoryStoreOpener, MockDevices, StoreOpener};

//! Session records, the registry that owns them, and the manager that
//! drives their lifecycle
//!
//! ```text
//!   create_pairing_session ──► pending ──(pair succeeded)──► active
//!            │                    │                           │  ▲
//!            │              (timeout / logout)   (disconnected) │  │ (reconnected)
//!            ▼                    ▼                           ▼  │
//!         removed ◄───────────────┴──────(exhausted / no identity)── reconnecting
//!
//!   load_existing ──────────────────────────────────────────► active
//! ```

mod dispatch;
pub mod health;
pub mod loader;
pub mod manager;
mod notify;
pub mod pairing;
pub mod reconnect;
pub mod registry;
pub mod state;

// Re-export key types for convenience
pub use health::SweepReport;
pub use loader::LoadReport;
pub use manager::SessionManager;
pub use pairing::PairingOutcome;
pub use reconnect::{ReconnectOutcome, ReconnectPolicy};
pub use registry::SessionRegistry;
pub use state::{ReconnectClaim, Session, SessionInfo};

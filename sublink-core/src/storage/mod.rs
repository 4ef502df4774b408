//! Per-session storage directories
//!
//! ```text
//! <root>/
//! ├── 6289681234567/
//! │   ├── 6289681234567.db       credential store
//! │   ├── 6289681234567.db-shm
//! │   ├── 6289681234567.db-wal
//! │   └── metadata.json          pairing start time
//! └── 6289687654321/
//!     └── ...
//! ```

pub mod layout;
pub mod metadata;

pub use layout::{SessionLayout, is_valid_session_id};
pub use metadata::{METADATA_FILE, SessionMetadata};

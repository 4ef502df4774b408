//! Credential store adapter traits
//!
//! The store's on-disk format belongs to an external storage component; the
//! lifecycle manager only opens it by URI, asks for the first identity and
//! closes it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::client::Identity;
use crate::error::StoreError;

/// An open per-session credential store
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Identity of the first device in the store, `None` when never paired
    async fn first_identity(&self) -> Result<Option<Identity>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Opens (creating if needed) credential stores
#[async_trait]
pub trait StoreOpener: Send + Sync {
    async fn open(&self, uri: &str) -> Result<Arc<dyn CredentialStore>, StoreError>;
}

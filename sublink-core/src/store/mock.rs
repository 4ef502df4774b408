//! In-memory credential store for testing
//!
//! `MemoryStoreOpener` touches the store file on disk so directory handling
//! behaves like a real SQLite-backed store, but keeps identities in memory.
//! Identities live in a shared [`MockDevices`] table that the mock client
//! reads too, the same way a real client reads its device from the store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::traits::{CredentialStore, StoreOpener};
use crate::client::Identity;
use crate::error::StoreError;

/// Paired devices keyed by session id
#[derive(Clone, Default)]
pub struct MockDevices {
    inner: Arc<Mutex<HashMap<String, Identity>>>,
}

impl MockDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` has completed pairing
    pub fn pair(&self, id: &str, identity: Identity) {
        self.lock().insert(id.to_string(), identity);
    }

    /// Forget the identity for `id`
    pub fn unpair(&self, id: &str) {
        self.lock().remove(id);
    }

    pub fn identity(&self, id: &str) -> Option<Identity> {
        self.lock().get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Identity>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Opens [`MemoryStore`]s from `file:` URIs
pub struct MemoryStoreOpener {
    devices: MockDevices,
    failing: Mutex<HashSet<String>>,
    opened: AtomicUsize,
}

impl MemoryStoreOpener {
    pub fn new(devices: MockDevices) -> Self {
        Self {
            devices,
            failing: Mutex::new(HashSet::new()),
            opened: AtomicUsize::new(0),
        }
    }

    /// Make every open of the store for `id` fail
    pub fn fail_open(&self, id: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string());
    }

    /// Number of successful opens
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn devices(&self) -> &MockDevices {
        &self.devices
    }
}

#[async_trait]
impl StoreOpener for MemoryStoreOpener {
    async fn open(&self, uri: &str) -> Result<Arc<dyn CredentialStore>, StoreError> {
        let (path, read_only) = parse_uri(uri).ok_or_else(|| StoreError::Open {
            uri: uri.to_string(),
            message: "not a file: URI".to_string(),
        })?;
        let id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&id);
        if failing {
            return Err(StoreError::Open {
                uri: uri.to_string(),
                message: "scripted failure".to_string(),
            });
        }

        if read_only {
            if !path.exists() {
                return Err(StoreError::Open {
                    uri: uri.to_string(),
                    message: "no such file".to_string(),
                });
            }
        } else {
            touch(&path).map_err(|e| StoreError::Open {
                uri: uri.to_string(),
                message: e.to_string(),
            })?;
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryStore::new(id, self.devices.clone())))
    }
}

/// A credential store whose identity lives in [`MockDevices`]
pub struct MemoryStore {
    id: String,
    devices: MockDevices,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(id: impl Into<String>, devices: MockDevices) -> Self {
        Self {
            id: id.into(),
            devices,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn first_identity(&self) -> Result<Option<Identity>, StoreError> {
        if self.is_closed() {
            return Err(StoreError::Query("store is closed".to_string()));
        }
        Ok(self.devices.identity(&self.id))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Split `file:<path>?<params>` into the path and whether `mode=ro` is set
fn parse_uri(uri: &str) -> Option<(PathBuf, bool)> {
    let rest = uri.strip_prefix("file:")?;
    let (path, params) = rest.split_once('?').unwrap_or((rest, ""));
    let read_only = params.split('&').any(|p| p == "mode=ro");
    Some((PathBuf::from(path), read_only))
}

fn touch(path: &Path) -> std::io::Result<()> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn open_creates_store_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("6281234567890.db");
        let opener = MemoryStoreOpener::new(MockDevices::new());

        let uri = format!("file:{}?_pragma=journal_mode(WAL)", path.display());
        let store = opener.open(&uri).await.unwrap();

        assert!(path.exists());
        assert_eq!(store.first_identity().await.unwrap(), None);
        assert_eq!(opener.open_count(), 1);
    }

    #[tokio::test]
    async fn read_only_open_requires_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("6281234567890.db");
        let opener = MemoryStoreOpener::new(MockDevices::new());

        let uri = format!("file:{}?mode=ro", path.display());
        assert!(opener.open(&uri).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn identity_comes_from_shared_devices() {
        let dir = tempdir().unwrap();
        let devices = MockDevices::new();
        devices.pair("6281234567890", Identity::new("6281234567890@s.whatsapp.net"));
        let opener = MemoryStoreOpener::new(devices);

        let uri = format!("file:{}", dir.path().join("6281234567890.db").display());
        let store = opener.open(&uri).await.unwrap();

        let identity = store.first_identity().await.unwrap();
        assert_eq!(
            identity,
            Some(Identity::new("6281234567890@s.whatsapp.net"))
        );
    }

    #[tokio::test]
    async fn scripted_failure_rejects_open() {
        let dir = tempdir().unwrap();
        let opener = MemoryStoreOpener::new(MockDevices::new());
        opener.fail_open("6281234567890");

        let uri = format!("file:{}", dir.path().join("6281234567890.db").display());
        let result = opener.open(&uri).await;

        assert!(matches!(result, Err(StoreError::Open { .. })));
    }

    #[test]
    fn parse_uri_detects_read_only_mode() {
        let (path, ro) = parse_uri("file:/a/b.db?_pragma=x&mode=ro").unwrap();
        assert_eq!(path, PathBuf::from("/a/b.db"));
        assert!(ro);
        assert!(parse_uri("/a/b.db").is_none());
    }
}

//! Directory layout and artifact removal for session storage

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, warn};

use super::metadata::{METADATA_FILE, SessionMetadata};
use crate::error::StorageError;

/// SQLite pragmas the credential store is opened with
const STORE_PRAGMAS: &str = "_pragma=journal_mode(WAL)&_pragma=busy_timeout(10000)&_pragma=synchronous(FULL)&_pragma=wal_autocheckpoint(100)";

/// Session ids are phone numbers and double as directory names
pub fn is_valid_session_id(id: &str) -> bool {
    (10..=15).contains(&id.len()) && id.bytes().all(|b| b.is_ascii_digit())
}

/// Paths of everything a session keeps on disk
#[derive(Debug, Clone)]
pub struct SessionLayout {
    root: PathBuf,
}

impl SessionLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// `<root>/<id>/<id>.db`
    pub fn store_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join(format!("{id}.db"))
    }

    pub fn store_uri(&self, id: &str) -> String {
        format!("file:{}?{}", self.store_path(id).display(), STORE_PRAGMAS)
    }

    /// URI for inspecting a store without taking ownership of it
    pub fn store_uri_read_only(&self, id: &str) -> String {
        format!("{}&mode=ro", self.store_uri(id))
    }

    pub fn metadata_path(&self, id: &str) -> PathBuf {
        self.session_dir(id).join(METADATA_FILE)
    }

    /// Create the session directory (and the root) if missing
    pub async fn create_session_dir(&self, id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.session_dir(id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::CreateDir {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Delete the session directory and everything in it
    ///
    /// Returns `false` when there was nothing to delete.
    pub async fn remove_session_dir(&self, id: &str) -> Result<bool, StorageError> {
        let dir = self.session_dir(id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(session_id = %id, path = %dir.display(), "Removed session directory");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StorageError::Remove { path: dir, source }),
        }
    }

    pub async fn has_store(&self, id: &str) -> bool {
        fs::try_exists(self.store_path(id)).await.unwrap_or(false)
    }

    /// Ids of every session directory under the root, sorted
    ///
    /// Entries that are not directories or not valid ids are ignored. A
    /// missing root means there is nothing persisted yet.
    pub async fn list_session_ids(&self) -> Result<Vec<String>, StorageError> {
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::Read {
                path: self.root.clone(),
                source,
            })?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) if is_valid_session_id(&name) => ids.push(name),
                Ok(name) => debug!(name = %name, "Skipping non-session directory"),
                Err(_) => {}
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Write the metadata record for a freshly paired session
    pub async fn save_metadata(
        &self,
        id: &str,
        started_at: DateTime<Utc>,
    ) -> Result<(), StorageError> {
        let metadata = SessionMetadata::new(id, started_at);
        let content = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::Metadata(e.to_string()))?;
        fs::write(self.metadata_path(id), content)
            .await
            .map_err(|e| StorageError::Metadata(e.to_string()))
    }

    /// Read the metadata record, `None` when absent
    pub async fn read_metadata(&self, id: &str) -> Result<Option<SessionMetadata>, StorageError> {
        let path = self.metadata_path(id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Read { path, source }),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Metadata(e.to_string()))
    }

    /// Pairing start time of a persisted session, now when unknown
    pub async fn load_started_at(&self, id: &str) -> DateTime<Utc> {
        match self.read_metadata(id).await {
            Ok(Some(metadata)) => metadata.started_at().unwrap_or_else(Utc::now),
            Ok(None) => Utc::now(),
            Err(e) => {
                warn!(session_id = %id, error = %e, "Unreadable session metadata");
                Utc::now()
            }
        }
    }
}

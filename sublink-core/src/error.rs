//! Error types for sublink-core

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for sublink-core
#[derive(Error, Debug)]
pub enum SublinkError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Errors returned to command handlers by the session manager
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid session id: {0}")]
    InvalidId(String),

    #[error("Session already active: {0}")]
    DuplicateActive(String),

    #[error("Pairing already in progress: {0}")]
    DuplicatePending(String),

    #[error("Session already registered: {0}")]
    AlreadyExists(String),

    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Failed to prepare session storage: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to connect: {0}")]
    Connect(#[source] ClientError),

    #[error("Failed to request pairing code: {0}")]
    PairingCode(#[source] ClientError),
}

/// Errors reported by a messaging client
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("client is not connected")]
    NotConnected,

    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("request failed: {0}")]
    RequestFailed(String),
}

/// Errors reported by a credential store
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("failed to open credential store {uri}: {message}")]
    Open { uri: String, message: String },

    #[error("credential store query failed: {0}")]
    Query(String),

    #[error("failed to close credential store: {0}")]
    Close(String),
}

/// Errors from the per-session directory layout
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed to create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write metadata: {0}")]
    Metadata(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

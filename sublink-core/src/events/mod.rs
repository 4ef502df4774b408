//! Lifecycle events published by the session manager

pub mod types;

pub use types::{LifecycleEvent, RemovalReason};

//! Credential store adapter

pub mod mock;
pub mod traits;

pub use mock::{MemoryStore, MemoryStoreOpener, MockDevices};
pub use traits::{CredentialStore, StoreOpener};

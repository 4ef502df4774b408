//! Shared fixtures for lifecycle integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sublink_core::{
    Identity, LifecycleConfig, LifecycleEvent, MemoryStoreOpener, MockClient, MockClientFactory,
    MockDevices, MockScript, RemovalReason, SessionManager,
};
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const OWNER: &str = "6280000000000@s.whatsapp.net";

/// A manager wired to mock clients and stores under a temp directory
pub struct Harness {
    pub manager: Arc<SessionManager>,
    pub devices: MockDevices,
    pub clients: Arc<MockClientFactory>,
    pub stores: Arc<MemoryStoreOpener>,
    /// The host's own client, online unless a test says otherwise
    pub main: Arc<MockClient>,
    pub root: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(|_| {}, MockScript::default())
    }

    pub fn with_config(configure: impl FnOnce(&mut LifecycleConfig)) -> Self {
        Self::build(configure, MockScript::default())
    }

    pub fn build(configure: impl FnOnce(&mut LifecycleConfig), script: MockScript) -> Self {
        let root = tempfile::tempdir().unwrap();
        let mut config = LifecycleConfig::with_root(root.path().join("sessions"));
        configure(&mut config);

        let devices = MockDevices::new();
        let clients = Arc::new(MockClientFactory::new(devices.clone()).with_default_script(script));
        let stores = Arc::new(MemoryStoreOpener::new(devices.clone()));
        let manager = Arc::new(SessionManager::new(config, stores.clone(), clients.clone()));
        let main = Arc::new(MockClient::new(
            "6280000000000",
            devices.clone(),
            MockScript::default(),
        ));
        main.set_connected(true);

        Self {
            manager,
            devices,
            clients,
            stores,
            main,
            root,
        }
    }

    pub fn dir(&self, id: &str) -> PathBuf {
        self.manager.layout().session_dir(id)
    }

    /// Leave a session on disk as a previous run would have
    pub fn persist(&self, id: &str, paired: bool) {
        let layout = self.manager.layout();
        std::fs::create_dir_all(layout.session_dir(id)).unwrap();
        std::fs::write(layout.store_path(id), b"").unwrap();
        if paired {
            self.devices.pair(id, identity(id));
        }
    }

    /// Persist a paired session and restore it through the loader
    pub async fn activate(&self, id: &str) -> Arc<MockClient> {
        self.persist(id, true);
        let report = self.manager.load_existing().await;
        assert!(report.loaded.iter().any(|loaded| loaded == id));
        self.clients.client(id).unwrap()
    }

    /// Start pairing `id` with the harness owner and main client
    pub async fn pair(&self, id: &str) -> Arc<MockClient> {
        self.manager
            .create_pairing_session(id, OWNER, self.main.clone())
            .await
            .unwrap();
        self.clients.client(id).unwrap()
    }
}

pub fn identity(id: &str) -> Identity {
    Identity::new(format!("{id}@s.whatsapp.net"))
}

/// Wait for the next removal of `id`, collecting the events seen on the way
pub async fn next_removal(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    id: &str,
) -> (RemovalReason, Vec<LifecycleEvent>) {
    let mut seen = Vec::new();
    let wait = async {
        loop {
            let event = rx.recv().await.unwrap();
            if let LifecycleEvent::Removed { id: removed, reason } = &event {
                if removed == id {
                    return *reason;
                }
            }
            seen.push(event);
        }
    };
    let reason = tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("session was not removed");
    (reason, seen)
}

/// Wait for the first event matching `pred`
pub async fn next_event(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    pred: impl Fn(&LifecycleEvent) -> bool,
) -> LifecycleEvent {
    let wait = async {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(600), wait)
        .await
        .expect("event never arrived")
}

//! Mock messaging client for testing
//!
//! MockClient lets tests script connect outcomes and pairing codes, drop the
//! link on demand and inject events, enabling fast, deterministic tests of
//! the lifecycle manager without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::traits::{ClientEvent, ClientFactory, Identity, MessagingClient, Presence};
use crate::error::ClientError;
use crate::store::{CredentialStore, MockDevices};

/// Pairing code handed out when a script does not provide one
pub const MOCK_PAIRING_CODE: &str = "ABCD-EFGH";

/// Scripted behaviour for one mock client
#[derive(Debug, Clone, Default)]
pub struct MockScript {
    /// Results of successive `connect()` calls; once drained, connects succeed
    pub connect_results: VecDeque<Result<(), ClientError>>,
    /// A successful `connect()` leaves the link down
    pub stays_offline: bool,
    /// Time spent inside every `connect()`
    pub connect_delay: Duration,
    /// Result of `request_pairing_code()`, `MOCK_PAIRING_CODE` when unset
    pub pairing_code: Option<Result<String, ClientError>>,
}

impl MockScript {
    /// Every connect attempt fails
    pub fn refusing(attempts: usize) -> Self {
        Self {
            connect_results: (0..attempts)
                .map(|_| Err(ClientError::ConnectFailed("refused".to_string())))
                .collect(),
            ..Self::default()
        }
    }
}

/// Tracks how many `connect()` calls run at once across all mock clients
#[derive(Debug, Default)]
pub struct ConnectGauge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ConnectGauge {
    /// Highest number of simultaneous connects observed
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard(self)
    }
}

struct GaugeGuard<'a>(&'a ConnectGauge);

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of MessagingClient
pub struct MockClient {
    id: String,
    devices: MockDevices,
    gauge: Arc<ConnectGauge>,
    script: Mutex<MockScript>,
    connected: AtomicBool,
    tx: broadcast::Sender<ClientEvent>,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    presence_calls: AtomicUsize,
    sent: Mutex<Vec<(String, String)>>,
}

impl MockClient {
    pub fn new(id: impl Into<String>, devices: MockDevices, script: MockScript) -> Self {
        Self::with_gauge(id, devices, script, Arc::new(ConnectGauge::default()))
    }

    fn with_gauge(
        id: impl Into<String>,
        devices: MockDevices,
        script: MockScript,
        gauge: Arc<ConnectGauge>,
    ) -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            id: id.into(),
            devices,
            gauge,
            script: Mutex::new(script),
            connected: AtomicBool::new(false),
            tx,
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            presence_calls: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Broadcast an event to subscribers
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    /// Flip the link state without emitting anything
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Drop the link the way the network does: state goes down, then an event
    pub fn drop_link(&self) {
        self.set_connected(false);
        self.emit(ClientEvent::Disconnected);
    }

    /// Replace the script for future calls
    pub fn rescript(&self, script: MockScript) {
        *self.script() = script;
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_calls(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn presence_calls(&self) -> usize {
        self.presence_calls.load(Ordering::SeqCst)
    }

    /// Text messages sent through this client as (target, text)
    pub fn sent_texts(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn script(&self) -> MutexGuard<'_, MockScript> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MessagingClient for MockClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.script().connect_delay;
        {
            let _guard = self.gauge.enter();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let (result, stays_offline) = {
            let mut script = self.script();
            let result = script.connect_results.pop_front().unwrap_or(Ok(()));
            (result, script.stays_offline)
        };
        result?;

        if !stays_offline {
            self.set_connected(true);
            self.emit(ClientEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.set_connected(false);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn identity(&self) -> Option<Identity> {
        self.devices.identity(&self.id)
    }

    async fn request_pairing_code(&self, _phone: &str) -> Result<String, ClientError> {
        self.script()
            .pairing_code
            .clone()
            .unwrap_or_else(|| Ok(MOCK_PAIRING_CODE.to_string()))
    }

    async fn send_presence(&self, _presence: Presence) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.presence_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send_text(&self, target: &str, text: &str) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((target.to_string(), text.to_string()));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}

/// Factory for creating MockClient instances
///
/// Keeps the most recent client per session id so tests can drive it.
pub struct MockClientFactory {
    devices: MockDevices,
    gauge: Arc<ConnectGauge>,
    default_script: MockScript,
    scripts: Mutex<HashMap<String, MockScript>>,
    clients: Mutex<HashMap<String, Arc<MockClient>>>,
}

impl MockClientFactory {
    pub fn new(devices: MockDevices) -> Self {
        Self {
            devices,
            gauge: Arc::new(ConnectGauge::default()),
            default_script: MockScript::default(),
            scripts: Mutex::new(HashMap::new()),
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Script used for ids without a dedicated script
    #[must_use]
    pub fn with_default_script(mut self, script: MockScript) -> Self {
        self.default_script = script;
        self
    }

    /// Script the next clients created for `id`
    pub fn script(&self, id: &str, script: MockScript) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), script);
    }

    /// Most recently created client for `id`
    pub fn client(&self, id: &str) -> Option<Arc<MockClient>> {
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    pub fn gauge(&self) -> &ConnectGauge {
        &self.gauge
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, id: &str, _store: Arc<dyn CredentialStore>) -> Arc<dyn MessagingClient> {
        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
            .unwrap_or_else(|| self.default_script.clone());
        let client = Arc::new(MockClient::with_gauge(
            id,
            self.devices.clone(),
            script,
            Arc::clone(&self.gauge),
        ));
        self.clients
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), Arc::clone(&client));
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(script: MockScript) -> MockClient {
        MockClient::new("6281234567890", MockDevices::new(), script)
    }

    #[tokio::test]
    async fn connect_succeeds_by_default_and_emits_connected() {
        let client = client(MockScript::default());
        let mut rx = client.subscribe();

        client.connect().await.unwrap();

        assert!(client.is_connected());
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::Connected);
    }

    #[tokio::test]
    async fn scripted_failures_are_consumed_in_order() {
        let client = client(MockScript::refusing(2));

        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_err());
        assert!(client.connect().await.is_ok());
        assert_eq!(client.connect_calls(), 3);
    }

    #[tokio::test]
    async fn stays_offline_reports_success_without_link() {
        let client = client(MockScript {
            stays_offline: true,
            ..MockScript::default()
        });

        client.connect().await.unwrap();

        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn drop_link_emits_disconnected() {
        let client = client(MockScript::default());
        client.connect().await.unwrap();
        let mut rx = client.subscribe();

        client.drop_link();

        assert!(!client.is_connected());
        assert_eq!(rx.recv().await.unwrap(), ClientEvent::Disconnected);
    }

    #[tokio::test]
    async fn send_text_requires_link() {
        let client = client(MockScript::default());
        assert_eq!(
            client.send_text("owner", "hi").await,
            Err(ClientError::NotConnected)
        );

        client.connect().await.unwrap();
        client.send_text("owner", "hi").await.unwrap();
        assert_eq!(
            client.sent_texts(),
            vec![("owner".to_string(), "hi".to_string())]
        );
    }

    #[tokio::test]
    async fn identity_follows_shared_devices() {
        let devices = MockDevices::new();
        let client = MockClient::new("6281234567890", devices.clone(), MockScript::default());
        assert!(client.identity().is_none());

        devices.pair("6281234567890", Identity::new("628@s.whatsapp.net"));
        assert_eq!(client.identity(), Some(Identity::new("628@s.whatsapp.net")));
    }

    #[tokio::test(start_paused = true)]
    async fn gauge_tracks_peak_concurrency() {
        let devices = MockDevices::new();
        let factory = Arc::new(MockClientFactory::new(devices.clone()).with_default_script(
            MockScript {
                connect_delay: Duration::from_millis(100),
                ..MockScript::default()
            },
        ));
        let store: Arc<dyn CredentialStore> =
            Arc::new(crate::store::MemoryStore::new("x", devices));

        let a = factory.create("6280000000001", Arc::clone(&store));
        let b = factory.create("6280000000002", Arc::clone(&store));
        let (ra, rb) = tokio::join!(a.connect(), b.connect());

        assert!(ra.is_ok() && rb.is_ok());
        assert_eq!(factory.gauge().peak(), 2);
        assert!(factory.client("6280000000001").is_some());
    }
}

//! Messaging client abstraction

pub mod mock;
pub mod traits;

pub use mock::{ConnectGauge, MockClient, MockClientFactory, MockScript};
pub use traits::{ClientEvent, ClientFactory, Identity, IncomingMessage, MessagingClient, Presence};

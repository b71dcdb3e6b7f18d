pub mod mqtt;

use std::time::Duration;

use building_client::domain::WireError;

pub use mqtt::{mqtt_options, resolve_broker, MqttTransport};

#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    #[error("transport is not connected")]
    NotConnected,
    #[error("no acknowledgement from transport within {0:?}")]
    Timeout(Duration),
    #[error("transport client error: {0}")]
    Client(String),
    #[error("failed to encode event: {0}")]
    Encode(#[from] WireError),
}

/// Topic/payload sender the event publisher talks to.
#[async_trait::async_trait]
pub trait MessageTransport: Send + Sync {
    /// Returns once the transport has acknowledged the send, or with an error
    /// after a bounded wait.
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError>;

    async fn close(&self);
}

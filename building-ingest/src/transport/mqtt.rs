use std::{net::SocketAddr, time::Duration};

use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::{
    sync::{mpsc, watch, Mutex},
    task::JoinHandle,
};

use super::{MessageTransport, PublishError};
use crate::config::MqttConfig;

/// How long `close` waits for the disconnect to go out before dropping the
/// connection.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Resolve the configured broker host once, at startup.
pub async fn resolve_broker(cfg: &MqttConfig) -> anyhow::Result<SocketAddr> {
    let target = format!("{}:{}", cfg.host, cfg.port);
    tokio::net::lookup_host((cfg.host.as_str(), cfg.port))
        .await
        .map_err(|e| anyhow::anyhow!("failed to resolve MQTT broker {target}: {e}"))?
        .next()
        .ok_or_else(|| anyhow::anyhow!("MQTT broker {target} resolved to no addresses"))
}

pub fn mqtt_options(cfg: &MqttConfig, client_id: &str, broker: SocketAddr) -> MqttOptions {
    let mut opts = MqttOptions::new(client_id, broker.ip().to_string(), broker.port());
    opts.set_keep_alive(Duration::from_secs(cfg.keep_alive_secs));
    opts.set_clean_session(true);
    opts
}

pub(crate) fn qos(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        _ => QoS::AtLeastOnce,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    /// Publish written to the socket; carries the packet id (0 for QoS 0).
    Sent(u16),
    /// Broker PUBACK for a QoS 1 publish.
    Acked(u16),
}

/// Publishing side of the MQTT connection.
///
/// A background task drives the rumqttc event loop, tracks whether the
/// broker connection is up and reports sends/acks back to `send`, which
/// waits for them with a bound. Sends are serialised.
pub struct MqttTransport {
    client: AsyncClient,
    qos: QoS,
    ack_timeout: Duration,
    connected: watch::Receiver<bool>,
    deliveries: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl MqttTransport {
    pub fn start(cfg: &MqttConfig, broker: SocketAddr) -> Self {
        let opts = mqtt_options(cfg, &cfg.publisher_client_id, broker);
        let (client, eventloop) = AsyncClient::new(opts, cfg.channel_capacity);

        let (connected_tx, connected_rx) = watch::channel(false);
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let backoff = cfg.reconnect_backoff();

        let driver = tokio::spawn(drive(eventloop, connected_tx, delivery_tx, backoff));

        Self {
            client,
            qos: qos(cfg.qos),
            ack_timeout: cfg.ack_timeout(),
            connected: connected_rx,
            deliveries: Mutex::new(delivery_rx),
            driver: Mutex::new(Some(driver)),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait up to `timeout` for the first successful CONNACK.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut rx = self.connected.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|up| *up)).await;
        matches!(waited, Ok(Ok(_)))
    }

    async fn await_delivery(
        &self,
        rx: &mut mpsc::UnboundedReceiver<Delivery>,
    ) -> Result<(), PublishError> {
        let mut pending: Option<u16> = None;
        loop {
            match rx.recv().await {
                Some(Delivery::Sent(_)) if self.qos == QoS::AtMostOnce => return Ok(()),
                Some(Delivery::Sent(pkid)) => pending = Some(pkid),
                Some(Delivery::Acked(pkid)) if pending == Some(pkid) => return Ok(()),
                Some(Delivery::Acked(_)) => {}
                None => return Err(PublishError::NotConnected),
            }
        }
    }
}

#[async_trait::async_trait]
impl MessageTransport for MqttTransport {
    async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
        if !self.is_connected() {
            return Err(PublishError::NotConnected);
        }

        let mut rx = self.deliveries.lock().await;
        // Late signals from an earlier send that timed out.
        while rx.try_recv().is_ok() {}

        self.client
            .publish(topic, self.qos, false, payload)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))?;

        tokio::time::timeout(self.ack_timeout, self.await_delivery(&mut rx))
            .await
            .map_err(|_| PublishError::Timeout(self.ack_timeout))?
    }

    async fn close(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "MQTT disconnect request failed");
        }

        if let Some(mut driver) = self.driver.lock().await.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut driver).await.is_err() {
                driver.abort();
            }
        }
        tracing::info!("MQTT publisher closed");
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        // Paths that never reach `close` must not leave the driver polling.
        if let Some(driver) = self.driver.get_mut().take() {
            driver.abort();
        }
    }
}

async fn drive(
    mut eventloop: EventLoop,
    connected: watch::Sender<bool>,
    deliveries: mpsc::UnboundedSender<Delivery>,
    backoff: Duration,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    tracing::info!("MQTT publisher connected");
                    connected.send_replace(true);
                } else {
                    tracing::warn!(code = ?ack.code, "MQTT broker refused publisher connection");
                }
            }
            Ok(Event::Incoming(Packet::PubAck(ack))) => {
                let _ = deliveries.send(Delivery::Acked(ack.pkid));
            }
            Ok(Event::Outgoing(Outgoing::Publish(pkid))) => {
                let _ = deliveries.send(Delivery::Sent(pkid));
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                connected.send_replace(false);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if connected.send_replace(false) {
                    tracing::warn!(error = %e, "MQTT publisher connection lost, reconnecting");
                } else {
                    tracing::warn!(error = %e, "MQTT publisher connection attempt failed");
                }
                metrics::counter!("mqtt_reconnects_total", "client" => "publisher").increment(1);
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> MqttConfig {
        crate::config::AppConfig::from_toml(
            r#"
            [mqtt]
            host = "localhost"
            keep_alive_secs = 15
            qos = 0

            [store]
            kind = "memory"

            [api]
            bind_addr = "127.0.0.1:0"
            "#,
        )
        .unwrap()
        .mqtt
    }

    #[test]
    fn options_carry_client_id_and_keep_alive() {
        let broker: SocketAddr = "127.0.0.1:1883".parse().unwrap();
        let opts = mqtt_options(&cfg(), "store_writer", broker);
        assert_eq!(opts.client_id(), "store_writer");
        assert_eq!(opts.broker_address(), ("127.0.0.1".to_string(), 1883));
        assert_eq!(opts.keep_alive(), Duration::from_secs(15));
        assert!(opts.clean_session());
    }

    #[test]
    fn qos_levels_map() {
        assert_eq!(qos(0), QoS::AtMostOnce);
        assert_eq!(qos(1), QoS::AtLeastOnce);
    }

    #[tokio::test]
    async fn resolves_localhost() {
        let addr = resolve_broker(&cfg()).await.unwrap();
        assert_eq!(addr.port(), 1883);
        assert!(addr.ip().is_loopback());
    }

    #[tokio::test]
    async fn send_is_refused_while_disconnected() {
        // Nothing listens on port 1 so the connection never comes up.
        let broker: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let transport = MqttTransport::start(&cfg(), broker);

        assert!(!transport.wait_connected(Duration::from_millis(50)).await);
        let res = transport.send("building/site_metrics", b"{}".to_vec()).await;
        assert!(matches!(res, Err(PublishError::NotConnected)));

        transport.close().await;
    }

    /// Transport whose connected flag is driven by the test, with no driver task.
    fn detached(connected: bool) -> (MqttTransport, watch::Sender<bool>) {
        let broker: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let (client, _eventloop) = AsyncClient::new(mqtt_options(&cfg(), "detached", broker), 10);
        let (connected_tx, connected_rx) = watch::channel(connected);
        let (_delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        let transport = MqttTransport {
            client,
            qos: QoS::AtMostOnce,
            ack_timeout: Duration::from_millis(50),
            connected: connected_rx,
            deliveries: Mutex::new(delivery_rx),
            driver: Mutex::new(None),
        };
        (transport, connected_tx)
    }

    #[tokio::test]
    async fn wait_connected_sees_a_later_connack() {
        let (transport, connected) = detached(false);

        let flip = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            connected.send_replace(true);
            connected
        });

        assert!(transport.wait_connected(Duration::from_secs(2)).await);
        assert!(transport.is_connected());
        drop(flip.await.unwrap());
    }

    #[tokio::test]
    async fn wait_connected_returns_at_once_when_already_up() {
        let (transport, _connected) = detached(true);
        assert!(transport.wait_connected(Duration::from_millis(1)).await);
    }

    #[tokio::test]
    async fn dropping_the_transport_stops_the_driver() {
        let broker: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let transport = MqttTransport::start(&cfg(), broker);
        let mut connected = transport.connected.clone();

        drop(transport);

        // The driver owns the sender; once it is gone `changed` errors.
        let stopped = tokio::time::timeout(Duration::from_secs(2), async {
            while connected.changed().await.is_ok() {}
        })
        .await;
        assert!(stopped.is_ok());
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let broker: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let transport = MqttTransport::start(&cfg(), broker);

        transport.close().await;
        transport.close().await;
        assert!(!transport.is_connected());
    }
}

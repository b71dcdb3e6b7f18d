use std::{net::SocketAddr, sync::Mutex, time::Duration};

use building_client::domain::{decode_event, Family, MeasurementEvent};
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, Packet, QoS};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{
    config::MqttConfig,
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
    transport::{mqtt::qos, mqtt_options},
};

type Delivered = Result<Envelope<MeasurementEvent>, PipelineError>;

/// Decode one delivered message into a pipeline item.
///
/// This is the whole per-message consume step short of the store write, so
/// it is usable without a broker.
pub fn handle_message(topic: &str, payload: &[u8]) -> Delivered {
    metrics::counter!("mqtt_messages_received_total").increment(1);
    decode_event(topic, payload)
        .map(Envelope::new)
        .map_err(|e| {
            metrics::counter!("mqtt_messages_dropped_total").increment(1);
            PipelineError::Source(format!("dropped message on '{topic}': {e}"))
        })
}

/// The one client call the CONNACK handler needs.
pub(crate) trait TopicSubscriber {
    fn subscribe_topic(&self, topic: &'static str, qos: QoS) -> Result<(), String>;
}

impl TopicSubscriber for AsyncClient {
    fn subscribe_topic(&self, topic: &'static str, qos: QoS) -> Result<(), String> {
        // try_subscribe: the event loop is the one that drains the request channel.
        self.try_subscribe(topic, qos).map_err(|e| e.to_string())
    }
}

/// React to a CONNACK: on success subscribe to every family topic again.
/// Returns the topics whose subscription was queued.
pub(crate) fn on_connack(
    code: ConnectReturnCode,
    client: &impl TopicSubscriber,
    qos: QoS,
) -> Vec<&'static str> {
    if code != ConnectReturnCode::Success {
        tracing::warn!(?code, "MQTT broker refused subscriber connection");
        return Vec::new();
    }

    let mut subscribed = Vec::with_capacity(Family::ALL.len());
    for family in Family::ALL {
        match client.subscribe_topic(family.topic(), qos) {
            Ok(()) => subscribed.push(family.topic()),
            Err(e) => tracing::error!(error = %e, topic = family.topic(), "failed to subscribe"),
        }
    }
    tracing::info!(topics = ?subscribed, "MQTT subscriber connected");
    subscribed
}

/// Subscribe-path source: a live subscription to both family topics.
///
/// The subscription is (re)issued on every successful CONNACK, since the
/// broker session does not survive a reconnect. The stream ends when the
/// cancellation token fires.
pub struct MqttSubscriptionSource {
    client: AsyncClient,
    parts: Mutex<Option<(EventLoop, mpsc::Sender<Delivered>, mpsc::Receiver<Delivered>)>>,
    qos: QoS,
    backoff: Duration,
    cancel: CancellationToken,
}

impl MqttSubscriptionSource {
    pub fn new(cfg: &MqttConfig, broker: SocketAddr, cancel: CancellationToken) -> Self {
        let opts = mqtt_options(cfg, &cfg.subscriber_client_id, broker);
        let (client, eventloop) = AsyncClient::new(opts, cfg.channel_capacity);
        let (tx, rx) = mpsc::channel(cfg.channel_capacity);

        Self {
            client,
            parts: Mutex::new(Some((eventloop, tx, rx))),
            qos: qos(cfg.qos),
            backoff: cfg.reconnect_backoff(),
            cancel,
        }
    }
}

#[async_trait::async_trait]
impl Source<MeasurementEvent> for MqttSubscriptionSource {
    async fn stream(&self) -> EnvelopeStream<MeasurementEvent> {
        let parts = self.parts.lock().ok().and_then(|mut guard| guard.take());
        let Some((eventloop, tx, rx)) = parts else {
            let err = PipelineError::Source("MQTT subscription already started".to_string());
            return Box::pin(futures::stream::once(async move { Err(err) }));
        };

        tokio::spawn(subscribe_loop(
            self.client.clone(),
            eventloop,
            tx,
            self.qos,
            self.backoff,
            self.cancel.clone(),
        ));

        Box::pin(ReceiverStream::new(rx))
    }
}

async fn subscribe_loop(
    client: AsyncClient,
    mut eventloop: EventLoop,
    tx: mpsc::Sender<Delivered>,
    qos: QoS,
    backoff: Duration,
    cancel: CancellationToken,
) {
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = eventloop.poll() => polled,
        };

        match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                on_connack(ack.code, &client, qos);
            }
            Ok(Event::Incoming(Packet::Publish(p))) => {
                if tx.send(handle_message(&p.topic, &p.payload)).await.is_err() {
                    // Consumer gone.
                    break;
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "MQTT subscriber connection lost, reconnecting");
                metrics::counter!("mqtt_reconnects_total", "client" => "subscriber").increment(1);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            }
        }
    }

    if let Err(e) = client.try_disconnect() {
        tracing::debug!(error = %e, "MQTT subscriber disconnect request failed");
    }
    // One more poll flushes the DISCONNECT if the connection is still up.
    let _ = tokio::time::timeout(Duration::from_millis(500), eventloop.poll()).await;
    tracing::info!("MQTT subscriber closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use building_client::domain::{encode_event, Field};
    use futures::StreamExt;
    use time::macros::datetime;

    #[test]
    fn decodes_valid_message() {
        let event = MeasurementEvent::site_metrics(datetime!(2005-01-15 01:00:00 UTC))
            .with_field(Field::OutdoorAirTemp, -1.5);
        let payload = encode_event(&event).unwrap();

        let env = handle_message(Family::SiteMetrics.topic(), &payload).unwrap();
        assert_eq!(env.payload, event);
    }

    #[test]
    fn malformed_message_becomes_error_item() {
        let res = handle_message(Family::ThermalZone.topic(), b"{not json");
        assert!(matches!(
            res,
            Err(PipelineError::Source(msg)) if msg.contains("thermal_zones_metrics")
        ));

        let res = handle_message(
            Family::SiteMetrics.topic(),
            br#"{
                "measurement": "site_metrics",
                "time": "2005-01-15T01:00:00Z",
                "fields": {"bogus": 1.0}
            }"#,
        );
        assert!(res.is_err());
    }

    #[derive(Default)]
    struct RecordingSubscriber {
        topics: Mutex<Vec<(&'static str, QoS)>>,
        refuse: bool,
    }

    impl TopicSubscriber for RecordingSubscriber {
        fn subscribe_topic(&self, topic: &'static str, qos: QoS) -> Result<(), String> {
            if self.refuse {
                return Err("request channel full".to_string());
            }
            self.topics.lock().unwrap().push((topic, qos));
            Ok(())
        }
    }

    #[test]
    fn every_connack_resubscribes_both_topics() {
        let client = RecordingSubscriber::default();

        let first = on_connack(ConnectReturnCode::Success, &client, QoS::AtLeastOnce);
        let after_reconnect = on_connack(ConnectReturnCode::Success, &client, QoS::AtLeastOnce);

        let expected = vec!["building/thermal_zones_metrics", "building/site_metrics"];
        assert_eq!(first, expected);
        assert_eq!(after_reconnect, expected);

        let topics = client.topics.lock().unwrap();
        assert_eq!(
            topics.iter().map(|(t, _)| *t).collect::<Vec<_>>(),
            [expected.clone(), expected].concat()
        );
        assert!(topics.iter().all(|(_, q)| *q == QoS::AtLeastOnce));
    }

    #[test]
    fn refused_connack_subscribes_nothing() {
        let client = RecordingSubscriber::default();

        let subscribed = on_connack(ConnectReturnCode::NotAuthorized, &client, QoS::AtMostOnce);

        assert!(subscribed.is_empty());
        assert!(client.topics.lock().unwrap().is_empty());
    }

    #[test]
    fn failed_subscribe_request_is_not_reported_as_subscribed() {
        let client = RecordingSubscriber {
            refuse: true,
            ..Default::default()
        };

        assert!(on_connack(ConnectReturnCode::Success, &client, QoS::AtMostOnce).is_empty());
    }

    #[tokio::test]
    async fn stream_ends_on_cancel() {
        let cfg = crate::config::AppConfig::from_toml(
            r#"
            [mqtt]
            host = "localhost"
            reconnect_backoff_ms = 10

            [store]
            kind = "memory"

            [api]
            bind_addr = "127.0.0.1:0"
            "#,
        )
        .unwrap()
        .mqtt;
        let cancel = CancellationToken::new();
        let broker = "127.0.0.1:1".parse().unwrap();
        let source = MqttSubscriptionSource::new(&cfg, broker, cancel.clone());

        let mut stream = source.stream().await;
        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(5), stream.next()).await.unwrap();
        assert!(next.is_none());

        let mut again = source.stream().await;
        assert!(again.next().await.unwrap().is_err());
    }
}

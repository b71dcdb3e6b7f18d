use std::sync::Arc;

use building_client::domain::{encode_event, MeasurementEvent};
use futures::StreamExt;

use crate::{
    pipeline::{Envelope, PipelineError, Sink},
    transport::{MessageTransport, PublishError},
};

/// Serialises events and sends each on its family topic.
pub struct EventPublisher<T> {
    transport: Arc<T>,
}

impl<T: MessageTransport> EventPublisher<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// Publish one event; returns after the transport acknowledged the send.
    pub async fn publish(&self, event: &MeasurementEvent) -> Result<(), PublishError> {
        let payload = encode_event(event)?;
        self.transport.send(event.family.topic(), payload).await
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Publish-path sink. Every failure is logged and counted and the next
/// event is processed; the transport is closed when the input ends.
pub struct PublisherSink<T> {
    publisher: EventPublisher<T>,
}

impl<T: MessageTransport> PublisherSink<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            publisher: EventPublisher::new(transport),
        }
    }

    /// Shared handle on the transport, for closing it when the sink never runs to the end.
    pub fn transport(&self) -> Arc<T> {
        self.publisher.transport.clone()
    }

    pub async fn drain<S>(&self, mut input: S) -> PublishSummary
    where
        S: futures::Stream<Item = Result<Envelope<MeasurementEvent>, PipelineError>> + Send + Unpin,
    {
        let mut summary = PublishSummary::default();

        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    summary.skipped += 1;
                    tracing::warn!(error = %e, "skipping event from publish pipeline");
                    continue;
                }
            };

            let topic = env.payload.family.topic();
            match self.publisher.publish(&env.payload).await {
                Ok(()) => {
                    summary.published += 1;
                    metrics::counter!("mqtt_messages_published_total", "topic" => topic)
                        .increment(1);
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::counter!("mqtt_publish_failures_total", "topic" => topic).increment(1);
                    tracing::warn!(
                        error = %e,
                        topic,
                        zone_id = env.payload.zone_id().unwrap_or("-"),
                        ts = %env.payload.timestamp,
                        "failed to publish event, continuing"
                    );
                }
            }
        }

        summary
    }
}

#[async_trait::async_trait]
impl<T: MessageTransport + 'static> Sink<MeasurementEvent> for PublisherSink<T> {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<MeasurementEvent>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        let summary = self.drain(input).await;
        self.publisher.transport.close().await;

        tracing::info!(
            published = summary.published,
            failed = summary.failed,
            skipped = summary.skipped,
            "publish path finished"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use building_client::domain::{decode_event, Field};
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };
    use time::macros::datetime;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(String, Vec<u8>)>>,
        fail_every_other: bool,
        calls: AtomicUsize,
        closed: AtomicBool,
    }

    #[async_trait::async_trait]
    impl MessageTransport for RecordingTransport {
        async fn send(&self, topic: &str, payload: Vec<u8>) -> Result<(), PublishError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_every_other && n % 2 == 0 {
                return Err(PublishError::NotConnected);
            }
            self.sent.lock().unwrap().push((topic.to_string(), payload));
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn zone(id: &str, t: f64) -> MeasurementEvent {
        MeasurementEvent::thermal_zone(id, datetime!(2005-01-15 01:00:00 UTC))
            .with_field(Field::MeanAirTemperature, t)
    }

    fn site() -> MeasurementEvent {
        MeasurementEvent::site_metrics(datetime!(2005-01-15 01:00:00 UTC))
            .with_field(Field::OutdoorAirTemp, 2.0)
    }

    #[tokio::test]
    async fn topic_is_chosen_by_family_only() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = EventPublisher::new(transport.clone());

        publisher.publish(&zone("BLOCK1:CORRIDOR:X1F", 20.0)).await.unwrap();
        publisher.publish(&site()).await.unwrap();

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].0, "building/thermal_zones_metrics");
        assert_eq!(sent[1].0, "building/site_metrics");
        let decoded = decode_event(&sent[0].0, &sent[0].1).unwrap();
        assert_eq!(decoded, zone("BLOCK1:CORRIDOR:X1F", 20.0));
    }

    #[tokio::test]
    async fn invalid_event_is_not_sent() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = EventPublisher::new(transport.clone());

        let empty = MeasurementEvent::site_metrics(datetime!(2005-01-15 01:00:00 UTC));
        assert!(matches!(publisher.publish(&empty).await, Err(PublishError::Encode(_))));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sink_continues_past_failures_and_closes_transport() {
        let transport = Arc::new(RecordingTransport {
            fail_every_other: true,
            ..Default::default()
        });
        let sink = PublisherSink::new(transport.clone());

        let items = vec![
            Ok(Envelope::new(zone("BLOCK1:CORRIDOR:X1F", 20.0))),
            Err(PipelineError::Source("line 3: row skipped".to_string())),
            Ok(Envelope::new(zone("BLOCK1:CORRIDOR:X2F", 21.0))),
            Ok(Envelope::new(site())),
        ];

        let summary = sink.drain(futures::stream::iter(items)).await;
        assert_eq!(
            summary,
            PublishSummary {
                published: 1,
                failed: 2,
                skipped: 1
            }
        );
        assert_eq!(transport.sent.lock().unwrap().len(), 1);

        let nothing: Vec<Result<Envelope<MeasurementEvent>, PipelineError>> = Vec::new();
        sink.run(futures::stream::iter(nothing)).await.unwrap();
        assert!(transport.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transport_handle_closes_an_abandoned_sink() {
        let transport = Arc::new(RecordingTransport::default());
        let sink = PublisherSink::new(transport.clone());

        let handle = sink.transport();
        drop(sink);
        handle.close().await;

        assert!(Arc::ptr_eq(&handle, &transport));
        assert!(transport.closed.load(Ordering::SeqCst));
    }
}

use std::sync::Arc;

use building_client::{
    db::{StoreError, TimeSeriesStore},
    domain::{MeasurementEvent, Point},
};
use futures::StreamExt;

use crate::pipeline::{Envelope, PipelineError, Sink};

/// Persist one event. Values are rounded to 4 decimals on the way in.
pub async fn write_event(
    store: &dyn TimeSeriesStore,
    event: MeasurementEvent,
) -> Result<Point, StoreError> {
    let point = Point::from(event);
    store.write_point(&point).await?;
    Ok(point)
}

/// Subscribe-path sink: one store write per event, no retry.
///
/// A failed write is logged and the event is dropped; redelivery of the same
/// message overwrites the same point.
pub struct StoreWriterSink {
    store: Arc<dyn TimeSeriesStore>,
}

impl StoreWriterSink {
    pub fn new(store: Arc<dyn TimeSeriesStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl Sink<MeasurementEvent> for StoreWriterSink {
    async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
    where
        S: futures::Stream<Item = Result<Envelope<MeasurementEvent>, PipelineError>>
            + Send
            + Unpin
            + 'static,
    {
        while let Some(item) = input.next().await {
            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping message from subscribe pipeline");
                    continue;
                }
            };

            let received_at = env.received_at;
            let family = env.payload.family.measurement();
            match write_event(self.store.as_ref(), env.payload).await {
                Ok(point) => {
                    metrics::counter!("store_points_written_total", "family" => family)
                        .increment(1);
                    if let Ok(dur) = std::time::SystemTime::now().duration_since(received_at) {
                        metrics::histogram!("ingest_end_to_end_latency_seconds")
                            .record(dur.as_secs_f64());
                    }
                    tracing::debug!(
                        family,
                        zone_id = point.zone_id().unwrap_or("-"),
                        ts = %point.timestamp,
                        "point written"
                    );
                }
                Err(e) => {
                    metrics::counter!("store_write_failures_total", "family" => family)
                        .increment(1);
                    tracing::error!(error = %e, family, "failed to write point, dropping");
                }
            }
        }

        tracing::info!("subscribe path finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use building_client::{
        db::MemoryStore,
        domain::{Field, TimeRange},
    };
    use time::macros::datetime;

    struct BrokenStore;

    #[async_trait::async_trait]
    impl TimeSeriesStore for BrokenStore {
        async fn write_point(&self, _point: &Point) -> Result<(), StoreError> {
            Err(StoreError::Write("connection refused".to_string()))
        }
        async fn thermal_zone_records(
            &self,
            _range: &TimeRange,
            _zone_id: Option<&str>,
        ) -> Result<Vec<building_client::domain::ThermalZoneRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn site_metrics_records(
            &self,
            _range: &TimeRange,
        ) -> Result<Vec<building_client::domain::SiteMetricsRecord>, StoreError> {
            Ok(Vec::new())
        }
        async fn indoor_temperatures(
            &self,
            _range: &TimeRange,
            _zone_id: Option<&str>,
        ) -> Result<Vec<building_client::domain::ZoneTemperature>, StoreError> {
            Ok(Vec::new())
        }
        async fn outdoor_temperatures(
            &self,
            _range: &TimeRange,
        ) -> Result<Vec<building_client::domain::OutdoorTemperature>, StoreError> {
            Ok(Vec::new())
        }
        async fn delete_all(&self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn event(t: f64) -> MeasurementEvent {
        MeasurementEvent::thermal_zone("BLOCK1:OFFICEXNE:X2F", datetime!(2005-01-15 01:00:00 UTC))
            .with_field(Field::MeanAirTemperature, t)
    }

    #[tokio::test]
    async fn write_event_rounds_values() {
        let store = MemoryStore::new();
        let point = write_event(&store, event(21.123456)).await.unwrap();
        assert_eq!(point.fields[&Field::MeanAirTemperature], 21.1235);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn redelivery_overwrites_the_same_point() {
        let store = Arc::new(MemoryStore::new());
        let sink = StoreWriterSink::new(store.clone());

        let items = vec![
            Ok(Envelope::new(event(20.0))),
            Err(PipelineError::Source("dropped message".to_string())),
            Ok(Envelope::new(event(22.5))),
        ];
        sink.run(futures::stream::iter(items)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let rows = store
            .thermal_zone_records(&TimeRange::until(datetime!(2006-01-01 00:00:00 UTC)), None)
            .await
            .unwrap();
        assert_eq!(rows[0].mean_air_temperature, Some(22.5));
    }

    #[tokio::test]
    async fn write_failures_do_not_stop_the_sink() {
        let sink = StoreWriterSink::new(Arc::new(BrokenStore));
        let items = vec![Ok(Envelope::new(event(20.0))), Ok(Envelope::new(event(21.0)))];
        assert!(sink.run(futures::stream::iter(items)).await.is_ok());
    }
}

use std::collections::BTreeMap;

use time::OffsetDateTime;
use tokio::sync::RwLock;

use super::{StoreError, TimeSeriesStore};
use crate::domain::{
    Family, Field, OutdoorTemperature, Point, SiteMetricsRecord, ThermalZoneRecord, TimeRange,
    ZoneTemperature, ZONE_ID_TAG,
};

type PointKey = (Family, OffsetDateTime, BTreeMap<String, String>);

/// Process-local store with the same point-key semantics as QuestDB's
/// deduplicated tables. Used by tests and single-process demos.
#[derive(Default)]
pub struct MemoryStore {
    points: RwLock<BTreeMap<PointKey, BTreeMap<Field, f64>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }

    async fn scan(&self, family: Family, range: &TimeRange, zone_id: Option<&str>) -> Vec<Point> {
        let points = self.points.read().await;
        points
            .iter()
            .filter(|((f, ts, tags), _)| {
                *f == family
                    && range.contains(*ts)
                    && zone_id
                        .map_or(true, |z| tags.get(ZONE_ID_TAG).map(String::as_str) == Some(z))
            })
            .map(|((family, ts, tags), fields)| Point {
                family: *family,
                tags: tags.clone(),
                timestamp: *ts,
                fields: fields.clone(),
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for MemoryStore {
    async fn write_point(&self, point: &Point) -> Result<(), StoreError> {
        let key = (point.family, point.timestamp, point.tags.clone());
        self.points.write().await.insert(key, point.fields.clone());
        Ok(())
    }

    async fn thermal_zone_records(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ThermalZoneRecord>, StoreError> {
        Ok(self
            .scan(Family::ThermalZone, range, zone_id)
            .await
            .iter()
            .filter_map(ThermalZoneRecord::from_point)
            .collect())
    }

    async fn site_metrics_records(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<SiteMetricsRecord>, StoreError> {
        Ok(self
            .scan(Family::SiteMetrics, range, None)
            .await
            .iter()
            .filter_map(SiteMetricsRecord::from_point)
            .collect())
    }

    async fn indoor_temperatures(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ZoneTemperature>, StoreError> {
        Ok(self
            .scan(Family::ThermalZone, range, zone_id)
            .await
            .into_iter()
            .filter_map(|p| {
                let temperature = *p.fields.get(&Field::MeanAirTemperature)?;
                Some(ZoneTemperature {
                    time: p.timestamp,
                    zone_id: p.zone_id()?.to_string(),
                    temperature,
                })
            })
            .collect())
    }

    async fn outdoor_temperatures(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<OutdoorTemperature>, StoreError> {
        Ok(self
            .scan(Family::SiteMetrics, range, None)
            .await
            .into_iter()
            .filter_map(|p| {
                Some(OutdoorTemperature {
                    time: p.timestamp,
                    temperature: *p.fields.get(&Field::OutdoorAirTemp)?,
                })
            })
            .collect())
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.points.write().await.clear();
        Ok(())
    }
}

pub mod ilp;
pub mod measurement_queries;
pub mod memory;
pub mod questdb;

pub use memory::MemoryStore;
pub use questdb::{QuestDbSettings, QuestDbStore};

use crate::domain::{
    OutdoorTemperature, Point, SiteMetricsRecord, ThermalZoneRecord, TimeRange, ZoneTemperature,
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connect(String),
    #[error("store write failed: {0}")]
    Write(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

/// Tagged time-series store holding `thermal_zone` and `site_metrics` points.
///
/// Writes under an existing `(family, tags, timestamp)` key replace the old
/// point. Every operation is bounded by the implementation's timeout.
#[async_trait::async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn write_point(&self, point: &Point) -> Result<(), StoreError>;

    /// `thermal_zone` points in `range`, ordered by time then zone.
    async fn thermal_zone_records(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ThermalZoneRecord>, StoreError>;

    /// `site_metrics` points in `range`, ordered by time.
    async fn site_metrics_records(&self, range: &TimeRange)
        -> Result<Vec<SiteMetricsRecord>, StoreError>;

    /// `mean_air_temperature` per zone; points without it are skipped.
    async fn indoor_temperatures(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ZoneTemperature>, StoreError>;

    /// `outdoor_air_temp` readings; points without it are skipped.
    async fn outdoor_temperatures(&self, range: &TimeRange)
        -> Result<Vec<OutdoorTemperature>, StoreError>;

    /// Remove every point of both families. Succeeds on an empty store.
    async fn delete_all(&self) -> Result<(), StoreError>;

    /// Release connections. Called once on shutdown.
    async fn close(&self) {}
}

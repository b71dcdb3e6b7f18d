use std::{future::Future, net::SocketAddr, time::Duration};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio::{io::AsyncWriteExt, net::TcpStream, sync::Mutex};

use super::{ilp, measurement_queries as queries, StoreError, TimeSeriesStore};
use crate::domain::{
    OutdoorTemperature, Point, SiteMetricsRecord, ThermalZoneRecord, TimeRange, ZoneTemperature,
};

#[derive(Debug, Clone)]
pub struct QuestDbSettings {
    /// PostgreSQL wire URI used for reads, DDL and truncation.
    pub uri: String,
    pub max_connections: u32,
    /// ILP/TCP endpoint used for writes.
    pub ilp_addr: SocketAddr,
    /// Upper bound for any single store operation.
    pub timeout: Duration,
}

/// QuestDB-backed store: points go in over ILP, queries come back over pgwire.
pub struct QuestDbStore {
    pool: PgPool,
    ilp_addr: SocketAddr,
    ilp: Mutex<Option<TcpStream>>,
    timeout: Duration,
}

impl QuestDbStore {
    /// Open the pgwire pool and create the measurement tables if needed.
    pub async fn connect(settings: &QuestDbSettings) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.timeout)
            .connect(&settings.uri)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        queries::ensure_schema(&pool).await?;
        tracing::info!(ilp_addr = %settings.ilp_addr, "questdb store ready");

        Ok(Self {
            pool,
            ilp_addr: settings.ilp_addr,
            ilp: Mutex::new(None),
            timeout: settings.timeout,
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    async fn connect_ilp(&self) -> Result<TcpStream, StoreError> {
        let stream = TcpStream::connect(self.ilp_addr)
            .await
            .map_err(|e| StoreError::Connect(format!("failed to connect to QuestDB ILP: {e}")))?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

#[async_trait::async_trait]
impl TimeSeriesStore for QuestDbStore {
    async fn write_point(&self, point: &Point) -> Result<(), StoreError> {
        let mut line = String::with_capacity(256);
        ilp::write_point_line(point, &mut line);
        line.push('\n');

        let mut guard = self.ilp.lock().await;
        let result = self
            .bounded(async {
                if guard.is_none() {
                    *guard = Some(self.connect_ilp().await?);
                }
                match guard.as_mut() {
                    Some(stream) => stream
                        .write_all(line.as_bytes())
                        .await
                        .map_err(|e| StoreError::Write(format!("ilp write failed: {e}"))),
                    None => Err(StoreError::Write("ilp connection unavailable".to_string())),
                }
            })
            .await;

        if result.is_err() {
            // Reconnect on the next write.
            *guard = None;
        }
        result
    }

    async fn thermal_zone_records(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ThermalZoneRecord>, StoreError> {
        self.bounded(async { Ok(queries::thermal_zone_records(&self.pool, range, zone_id).await?) })
            .await
    }

    async fn site_metrics_records(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<SiteMetricsRecord>, StoreError> {
        self.bounded(async { Ok(queries::site_metrics_records(&self.pool, range).await?) })
            .await
    }

    async fn indoor_temperatures(
        &self,
        range: &TimeRange,
        zone_id: Option<&str>,
    ) -> Result<Vec<ZoneTemperature>, StoreError> {
        self.bounded(async { Ok(queries::indoor_temperatures(&self.pool, range, zone_id).await?) })
            .await
    }

    async fn outdoor_temperatures(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<OutdoorTemperature>, StoreError> {
        self.bounded(async { Ok(queries::outdoor_temperatures(&self.pool, range).await?) })
            .await
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.bounded(async { Ok(queries::truncate_measurements(&self.pool).await?) })
            .await
    }

    async fn close(&self) {
        if let Some(mut stream) = self.ilp.lock().await.take() {
            // Best-effort flush.
            let _ = stream.shutdown().await;
        }
        self.pool.close().await;
        tracing::info!("questdb store closed");
    }
}

//! Read-only HTTP surface over the store, plus the administrative delete.
//!
//! - `GET /data/?data_type&zone_id&start_time&end_time`
//! - `GET /temperatures/?zone_id&start_time&end_time&aggregate`
//! - `DELETE /data/`
//!
//! Errors are `{"detail": "..."}` with 400 for bad parameters and 500 for
//! store failures.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use building_client::{
    db::{StoreError, TimeSeriesStore},
    domain::{DataRecord, TemperatureRow, TimeRange, TimeRangeError},
    query,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

pub type SharedStore = Arc<dyn TimeSeriesStore>;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Range(#[from] TimeRangeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Range(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "query failed");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }
        (status, Json(ErrorBody { detail: self.to_string() })).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DataParams {
    pub data_type: Option<String>,
    pub zone_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TemperatureParams {
    pub zone_id: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub aggregate: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteResponse {
    message: &'static str,
}

fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn parse_range(start: &Option<String>, end: &Option<String>) -> Result<TimeRange, ApiError> {
    Ok(TimeRange::parse(non_empty(start), non_empty(end), OffsetDateTime::now_utc())?)
}

fn parse_flag(name: &str, value: Option<&str>) -> Result<bool, ApiError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(other) => Err(ApiError::BadRequest(format!(
            "invalid boolean for '{name}': '{other}'"
        ))),
    }
}

async fn get_data(
    State(store): State<SharedStore>,
    Query(params): Query<DataParams>,
) -> Result<Json<Vec<DataRecord>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "get_data").increment(1);

    let range = parse_range(&params.start_time, &params.end_time)?;

    let records = query::fetch_data(
        store.as_ref(),
        non_empty(&params.data_type),
        non_empty(&params.zone_id),
        &range,
    )
    .await?;
    Ok(Json(records))
}

async fn get_temperatures(
    State(store): State<SharedStore>,
    Query(params): Query<TemperatureParams>,
) -> Result<Json<Vec<TemperatureRow>>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "get_temperatures").increment(1);

    let aggregate = parse_flag("aggregate", non_empty(&params.aggregate))?;
    let range = parse_range(&params.start_time, &params.end_time)?;

    let rows =
        query::fetch_temperatures(store.as_ref(), non_empty(&params.zone_id), &range, aggregate)
            .await?;
    Ok(Json(rows))
}

async fn delete_data(State(store): State<SharedStore>) -> Result<Json<DeleteResponse>, ApiError> {
    metrics::counter!("api_requests_total", "endpoint" => "delete_data").increment(1);

    query::delete_all(store.as_ref()).await?;
    tracing::info!("all measurement data deleted");
    Ok(Json(DeleteResponse {
        message: "All data has been deleted successfully",
    }))
}

pub fn router(store: SharedStore) -> Router {
    Router::new()
        .route("/data/", get(get_data).delete(delete_data))
        .route("/temperatures/", get(get_temperatures))
        .with_state(store)
}

/// Serve the query API on `bind_addr` until `cancel` fires.
pub async fn serve(
    bind_addr: &str,
    store: SharedStore,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind query API on '{bind_addr}': {e}"))?;
    tracing::info!(addr = %listener.local_addr()?, "query API listening");

    axum::serve(listener, router(store))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    tracing::info!("query API stopped");
    Ok(())
}

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::domain::{
    Family, OutdoorTemperature, SiteMetricsRecord, ThermalZoneRecord, TimeRange, ZoneTemperature,
};

/// DDL for both measurement tables. `DEDUP UPSERT KEYS` makes a rewrite of
/// the same `(ts, tags)` replace the stored row.
pub const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS thermal_zone (
        zone_id SYMBOL,
        mean_air_temperature DOUBLE,
        operative_temperature DOUBLE,
        air_relative_humidity DOUBLE,
        air_co2_concentration DOUBLE,
        infiltration_air_change_rate DOUBLE,
        mech_ventilation_air_changes DOUBLE,
        internal_latent_gain DOUBLE,
        cooling_rate DOUBLE,
        heating_rate DOUBLE,
        people_sensible_heat DOUBLE,
        thermal_comfort_pmv DOUBLE,
        thermal_comfort_ppd DOUBLE,
        ts TIMESTAMP
    ) TIMESTAMP(ts) PARTITION BY DAY WAL
    DEDUP UPSERT KEYS(ts, zone_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS site_metrics (
        interior_lights_electricity DOUBLE,
        facility_electricity DOUBLE,
        outdoor_air_temp DOUBLE,
        diffuse_solar_radiation DOUBLE,
        direct_solar_radiation DOUBLE,
        ts TIMESTAMP
    ) TIMESTAMP(ts) PARTITION BY DAY WAL
    DEDUP UPSERT KEYS(ts)
    "#,
];

pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for ddl in SCHEMA {
        sqlx::query(ddl).execute(pool).await?;
    }
    Ok(())
}

fn field_columns(family: Family) -> String {
    family
        .fields()
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn push_range(builder: &mut QueryBuilder<'_, Postgres>, range: &TimeRange) {
    builder
        .push(" WHERE ts >= ")
        .push_bind(range.start)
        .push(" AND ts < ")
        .push_bind(range.end);
}

/// Raw `thermal_zone` rows, optionally restricted to one zone.
pub async fn thermal_zone_records(
    pool: &PgPool,
    range: &TimeRange,
    zone_id: Option<&str>,
) -> Result<Vec<ThermalZoneRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT ts, zone_id, {} FROM thermal_zone",
        field_columns(Family::ThermalZone)
    ));
    push_range(&mut builder, range);
    if let Some(zone_id) = zone_id {
        builder.push(" AND zone_id = ").push_bind(zone_id.to_string());
    }
    builder.push(" ORDER BY ts, zone_id");

    builder.build_query_as::<ThermalZoneRecord>().fetch_all(pool).await
}

pub async fn site_metrics_records(
    pool: &PgPool,
    range: &TimeRange,
) -> Result<Vec<SiteMetricsRecord>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(format!(
        "SELECT ts, {} FROM site_metrics",
        field_columns(Family::SiteMetrics)
    ));
    push_range(&mut builder, range);
    builder.push(" ORDER BY ts");

    builder.build_query_as::<SiteMetricsRecord>().fetch_all(pool).await
}

pub async fn indoor_temperatures(
    pool: &PgPool,
    range: &TimeRange,
    zone_id: Option<&str>,
) -> Result<Vec<ZoneTemperature>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT ts, zone_id, mean_air_temperature AS temperature FROM thermal_zone",
    );
    push_range(&mut builder, range);
    builder.push(" AND mean_air_temperature IS NOT NULL");
    if let Some(zone_id) = zone_id {
        builder.push(" AND zone_id = ").push_bind(zone_id.to_string());
    }
    builder.push(" ORDER BY ts, zone_id");

    builder.build_query_as::<ZoneTemperature>().fetch_all(pool).await
}

pub async fn outdoor_temperatures(
    pool: &PgPool,
    range: &TimeRange,
) -> Result<Vec<OutdoorTemperature>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new(
        "SELECT ts, outdoor_air_temp AS temperature FROM site_metrics",
    );
    push_range(&mut builder, range);
    builder.push(" AND outdoor_air_temp IS NOT NULL ORDER BY ts");

    builder.build_query_as::<OutdoorTemperature>().fetch_all(pool).await
}

/// Remove every row of both measurement tables across all time.
pub async fn truncate_measurements(pool: &PgPool) -> Result<(), sqlx::Error> {
    for family in Family::ALL {
        sqlx::query(&format!("TRUNCATE TABLE {}", family.measurement()))
            .execute(pool)
            .await?;
    }
    Ok(())
}

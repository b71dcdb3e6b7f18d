//! Read side: raw fetches, aligned temperature series and the administrative
//! delete, all expressed over [`TimeSeriesStore`].

use std::{collections::BTreeMap, str::FromStr};

use time::OffsetDateTime;

use crate::db::{StoreError, TimeSeriesStore};
use crate::domain::{
    DataRecord, IndoorTemps, OutdoorTemperature, TemperatureRow, TimeRange, ZoneTemperature,
};

/// `data_type` selector of a raw fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    ThermalZone,
    SiteMetrics,
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "thermal_zone" => Ok(DataType::ThermalZone),
            "site_metrics" => Ok(DataType::SiteMetrics),
            other => Err(format!(
                "unknown data_type '{other}', expected 'thermal_zone' or 'site_metrics'"
            )),
        }
    }
}

/// Families a `data_type` selector reads, as `(thermal_zone, site_metrics)`.
/// Absent selects both; an unrecognised name selects neither.
fn selected_families(data_type: Option<&str>) -> (bool, bool) {
    match data_type.map(str::parse::<DataType>) {
        None => (true, true),
        Some(Ok(DataType::ThermalZone)) => (true, false),
        Some(Ok(DataType::SiteMetrics)) => (false, true),
        Some(Err(_)) => (false, false),
    }
}

/// Raw fetch. With no `data_type` both families are returned, thermal-zone
/// records first; an unknown `data_type` matches no family and yields an
/// empty list. `zone_id` only narrows thermal-zone records.
pub async fn fetch_data(
    store: &dyn TimeSeriesStore,
    data_type: Option<&str>,
    zone_id: Option<&str>,
    range: &TimeRange,
) -> Result<Vec<DataRecord>, StoreError> {
    let (zones, sites) = selected_families(data_type);
    let mut out = Vec::new();

    if zones {
        out.extend(
            store
                .thermal_zone_records(range, zone_id)
                .await?
                .into_iter()
                .map(DataRecord::ThermalZone),
        );
    }

    if sites {
        out.extend(
            store
                .site_metrics_records(range)
                .await?
                .into_iter()
                .map(DataRecord::SiteMetrics),
        );
    }

    Ok(out)
}

/// Aligned temperature fetch over `range`.
pub async fn fetch_temperatures(
    store: &dyn TimeSeriesStore,
    zone_id: Option<&str>,
    range: &TimeRange,
    aggregate: bool,
) -> Result<Vec<TemperatureRow>, StoreError> {
    let outdoor = store.outdoor_temperatures(range).await?;
    let indoor = store.indoor_temperatures(range, zone_id).await?;
    Ok(align_temperatures(&outdoor, &indoor, aggregate))
}

/// Join outdoor and per-zone indoor readings on timestamp.
///
/// One row per timestamp in the union of both series, ascending. A timestamp
/// with no indoor readings has `indoor_temps == None`; with `aggregate` the
/// indoor value is the mean over the zones present at that timestamp.
pub fn align_temperatures(
    outdoor: &[OutdoorTemperature],
    indoor: &[ZoneTemperature],
    aggregate: bool,
) -> Vec<TemperatureRow> {
    let outdoor_by_time: BTreeMap<OffsetDateTime, f64> =
        outdoor.iter().map(|o| (o.time, o.temperature)).collect();

    let mut indoor_by_time: BTreeMap<OffsetDateTime, BTreeMap<String, f64>> = BTreeMap::new();
    for reading in indoor {
        indoor_by_time
            .entry(reading.time)
            .or_default()
            .insert(reading.zone_id.clone(), reading.temperature);
    }

    let mut timestamps: Vec<OffsetDateTime> = outdoor_by_time.keys().copied().collect();
    timestamps.extend(indoor_by_time.keys().copied());
    timestamps.sort();
    timestamps.dedup();

    timestamps
        .into_iter()
        .map(|time| {
            let indoor_temps = indoor_by_time.remove(&time).and_then(|zones| {
                if aggregate {
                    mean(zones.values().copied()).map(IndoorTemps::Mean)
                } else {
                    Some(IndoorTemps::Zones(zones))
                }
            });

            TemperatureRow {
                time,
                outdoor_temp: outdoor_by_time.get(&time).copied(),
                indoor_temps,
            }
        })
        .collect()
}

/// Arithmetic mean; `None` for an empty input.
fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Delete every point in both families.
pub async fn delete_all(store: &dyn TimeSeriesStore) -> Result<(), StoreError> {
    store.delete_all().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::domain::{Field, MeasurementEvent, Point};
    use time::macros::datetime;

    const T1: OffsetDateTime = datetime!(2005-01-15 01:00:00 UTC);
    const T2: OffsetDateTime = datetime!(2005-01-15 02:00:00 UTC);

    fn outdoor(time: OffsetDateTime, temperature: f64) -> OutdoorTemperature {
        OutdoorTemperature { time, temperature }
    }

    fn zone(time: OffsetDateTime, zone_id: &str, temperature: f64) -> ZoneTemperature {
        ZoneTemperature {
            time,
            zone_id: zone_id.to_string(),
            temperature,
        }
    }

    #[test]
    fn alignment_is_a_union_of_timestamps() {
        let rows = align_temperatures(
            &[outdoor(T1, 4.0), outdoor(T2, 5.0)],
            &[zone(T1, "A", 20.0), zone(T1, "B", 22.0)],
            false,
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, T1);
        assert_eq!(rows[0].outdoor_temp, Some(4.0));
        match &rows[0].indoor_temps {
            Some(IndoorTemps::Zones(z)) => {
                assert_eq!(z.len(), 2);
                assert_eq!(z["A"], 20.0);
            }
            other => panic!("unexpected indoor temps: {other:?}"),
        }
        assert_eq!(rows[1].time, T2);
        assert_eq!(rows[1].indoor_temps, None);
    }

    #[test]
    fn aggregate_reports_mean_of_zones() {
        let rows = align_temperatures(
            &[outdoor(T1, 4.0), outdoor(T2, 5.0)],
            &[zone(T1, "A", 20.0), zone(T1, "B", 22.0)],
            true,
        );
        assert_eq!(rows[0].indoor_temps, Some(IndoorTemps::Mean(21.0)));
        assert_eq!(rows[1].indoor_temps, None);
    }

    #[test]
    fn indoor_only_timestamp_has_no_outdoor_reading() {
        let rows = align_temperatures(&[outdoor(T2, 5.0)], &[zone(T1, "A", 20.0)], true);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].time, T1);
        assert_eq!(rows[0].outdoor_temp, None);
        assert_eq!(rows[0].indoor_temps, Some(IndoorTemps::Mean(20.0)));
    }

    #[test]
    fn mean_of_nothing_is_absent() {
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([1.0, 2.0].into_iter()), Some(1.5));
    }

    #[test]
    fn data_type_parses_known_names_only() {
        assert_eq!("thermal_zone".parse::<DataType>(), Ok(DataType::ThermalZone));
        assert_eq!("site_metrics".parse::<DataType>(), Ok(DataType::SiteMetrics));
        assert!("both".parse::<DataType>().is_err());
    }

    #[tokio::test]
    async fn fetch_data_filters_and_orders_families() {
        let store = MemoryStore::new();
        let site = MeasurementEvent::site_metrics(T1).with_field(Field::OutdoorAirTemp, 4.0);
        let zone = MeasurementEvent::thermal_zone("BLOCK1:CORRIDOR:X1F", T2)
            .with_field(Field::MeanAirTemperature, 20.0);
        store.write_point(&Point::from(site)).await.unwrap();
        store.write_point(&Point::from(zone)).await.unwrap();

        let range = TimeRange::until(datetime!(2030-01-01 00:00:00 UTC));

        let all = fetch_data(&store, None, None, &range).await.unwrap();
        let families: Vec<_> = all.iter().map(DataRecord::family).collect();
        assert_eq!(
            families,
            vec![crate::domain::Family::ThermalZone, crate::domain::Family::SiteMetrics]
        );

        let zones = fetch_data(&store, Some("thermal_zone"), None, &range).await.unwrap();
        assert!(zones.iter().all(|r| matches!(r, DataRecord::ThermalZone(_))));
        let sites = fetch_data(&store, Some("site_metrics"), None, &range).await.unwrap();
        assert!(sites.iter().all(|r| matches!(r, DataRecord::SiteMetrics(_))));
        assert_eq!(sites.len(), 1);
    }

    #[tokio::test]
    async fn unknown_data_type_matches_no_family() {
        let store = MemoryStore::new();
        let site = MeasurementEvent::site_metrics(T1).with_field(Field::OutdoorAirTemp, 4.0);
        let zone = MeasurementEvent::thermal_zone("BLOCK1:CORRIDOR:X1F", T2)
            .with_field(Field::MeanAirTemperature, 20.0);
        store.write_point(&Point::from(site)).await.unwrap();
        store.write_point(&Point::from(zone)).await.unwrap();

        let range = TimeRange::until(datetime!(2030-01-01 00:00:00 UTC));
        assert!(fetch_data(&store, Some("weather"), None, &range).await.unwrap().is_empty());
        assert_eq!(selected_families(Some("both")), (false, false));
        assert_eq!(selected_families(None), (true, true));
    }

    #[tokio::test]
    async fn delete_all_empties_both_families() {
        let store = MemoryStore::new();
        let site = MeasurementEvent::site_metrics(T1).with_field(Field::OutdoorAirTemp, 4.0);
        store.write_point(&Point::from(site)).await.unwrap();

        delete_all(&store).await.unwrap();
        let range = TimeRange::until(OffsetDateTime::now_utc());
        assert!(fetch_data(&store, None, None, &range).await.unwrap().is_empty());
        assert!(fetch_temperatures(&store, None, &range, false).await.unwrap().is_empty());
    }
}

//! Wide simulation rows → discrete measurement events.
//!
//! One CSV row is one simulation timestep. It carries a `DateTime` column,
//! a block of columns per thermal zone (`<block>:<zone><floor>:<metric>`)
//! and a handful of site-wide columns.

use std::collections::HashMap;

use building_client::domain::{Field, MeasurementEvent};
use time::{macros::format_description, Date, OffsetDateTime, PrimitiveDateTime, Time};

use crate::config::TopologyConfig;

pub const TIME_COLUMN: &str = "DateTime";

/// Hour value the simulation uses for "midnight at the end of this day".
const END_OF_DAY: &str = "24:00:00";

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowError {
    #[error("row has no 'DateTime' column")]
    MissingTime,
    #[error("invalid DateTime '{value}': {reason}")]
    Timestamp { value: String, reason: String },
    #[error("{event}: missing required column '{column}'")]
    MissingField { event: String, column: String },
    #[error("{event}: column '{column}' has non-numeric value '{value}'")]
    NonNumeric {
        event: String,
        column: String,
        value: String,
    },
}

/// One CSV row as a column-name → raw-value mapping.
#[derive(Debug, Clone, Default)]
pub struct SimulationRow {
    columns: HashMap<String, String>,
}

impl SimulationRow {
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns.get(column).map(String::as_str)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for SimulationRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            columns: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// How a zone metric's column name is built from the zone prefix.
#[derive(Debug, Clone, Copy)]
enum ZoneColumn {
    /// `<prefix>:<metric>`
    Zone(&'static str),
    /// `<prefix> IDEAL LOADS AIR:<metric>`
    IdealLoads(&'static str),
    /// `PEOPLE <prefix>:<metric>`
    People(&'static str),
}

impl ZoneColumn {
    fn column(self, prefix: &str) -> String {
        match self {
            ZoneColumn::Zone(metric) => format!("{prefix}:{metric}"),
            ZoneColumn::IdealLoads(metric) => format!("{prefix} IDEAL LOADS AIR:{metric}"),
            ZoneColumn::People(metric) => format!("PEOPLE {prefix}:{metric}"),
        }
    }
}

const ZONE_TEMPERATURE: ZoneColumn = ZoneColumn::Zone("Zone Mean Air Temperature");

const ZONE_COLUMNS: [(Field, ZoneColumn); 12] = [
    (Field::MeanAirTemperature, ZONE_TEMPERATURE),
    (Field::OperativeTemperature, ZoneColumn::Zone("Zone Operative Temperature")),
    (Field::AirRelativeHumidity, ZoneColumn::Zone("Zone Air Relative Humidity")),
    (Field::AirCo2Concentration, ZoneColumn::Zone("Zone Air CO2 Concentration")),
    (Field::InfiltrationAirChangeRate, ZoneColumn::Zone("Zone Infiltration Air Change Rate")),
    (
        Field::MechVentilationAirChanges,
        ZoneColumn::Zone("Zone Mechanical Ventilation Air Changes per Hour"),
    ),
    (Field::InternalLatentGain, ZoneColumn::Zone("Zone Total Internal Latent Gain Energy")),
    (
        Field::CoolingRate,
        ZoneColumn::IdealLoads("Zone Ideal Loads Supply Air Total Cooling Rate"),
    ),
    (
        Field::HeatingRate,
        ZoneColumn::IdealLoads("Zone Ideal Loads Supply Air Total Heating Rate"),
    ),
    (Field::PeopleSensibleHeat, ZoneColumn::Zone("Zone People Sensible Heating Rate")),
    (Field::ThermalComfortPmv, ZoneColumn::People("Zone Thermal Comfort Fanger Model PMV")),
    (Field::ThermalComfortPpd, ZoneColumn::People("Zone Thermal Comfort Fanger Model PPD")),
];

const SITE_COLUMNS: [(Field, &str); 5] = [
    (Field::InteriorLightsElectricity, "InteriorLights:Electricity"),
    (Field::FacilityElectricity, "Electricity:Facility"),
    (Field::OutdoorAirTemp, "Site Site Outdoor Air Drybulb Temperature"),
    (Field::DiffuseSolarRadiation, "Site Site Diffuse Solar Radiation Rate per Area"),
    (Field::DirectSolarRadiation, "Site Site Direct Solar Radiation Rate per Area"),
];

#[derive(Debug, Clone, PartialEq)]
struct ZoneSlot {
    zone_id: String,
    prefix: String,
}

/// Parse a simulation `month/day hour:minute:second` stamp into `year`.
///
/// `24:00:00` is midnight of the following day, kept inside `year`.
pub fn parse_simulation_timestamp(value: &str, year: i32) -> Result<OffsetDateTime, RowError> {
    let invalid = |reason: String| RowError::Timestamp {
        value: value.to_string(),
        reason,
    };

    let mut parts = value.split_whitespace();
    let (date_part, time_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(d), Some(t), None) => (d, t),
        _ => return Err(invalid("expected 'MM/DD HH:MM:SS'".to_string())),
    };

    let date = Date::parse(
        &format!("{year:04}/{date_part}"),
        format_description!("[year]/[month]/[day]"),
    )
    .map_err(|e| invalid(e.to_string()))?;

    let datetime = if time_part == END_OF_DAY {
        // The simulation calendar is a single year; Dec 31 24:00 wraps to Jan 1 of it.
        let next = date
            .next_day()
            .ok_or_else(|| invalid("date out of range".to_string()))?
            .replace_year(year)
            .map_err(|e| invalid(e.to_string()))?;
        next.midnight()
    } else {
        let time = Time::parse(time_part, format_description!("[hour]:[minute]:[second]"))
            .map_err(|e| invalid(e.to_string()))?;
        PrimitiveDateTime::new(date, time)
    };

    Ok(datetime.assume_utc())
}

fn parse_number(event: &str, column: &str, raw: &str) -> Result<f64, RowError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RowError::NonNumeric {
            event: event.to_string(),
            column: column.to_string(),
            value: raw.to_string(),
        })
}

/// Turns rows into events for a fixed zone topology and reference year.
#[derive(Debug, Clone)]
pub struct RowTransformer {
    slots: Vec<ZoneSlot>,
    reference_year: i32,
}

impl RowTransformer {
    pub fn new(topology: &TopologyConfig, reference_year: i32) -> Self {
        let mut slots = Vec::new();
        for block in &topology.blocks {
            for orientation in &topology.orientations {
                for floor in &topology.floors {
                    slots.push(ZoneSlot {
                        zone_id: format!("{block}:{orientation}:{floor}"),
                        prefix: format!("{block}:{orientation}{floor}"),
                    });
                }
            }
        }
        Self { slots, reference_year }
    }

    /// Events for one row: thermal-zone events in topology order (block, then
    /// orientation, then floor) followed by the single site event.
    ///
    /// A bad timestamp fails the whole row. Otherwise each event succeeds or
    /// fails on its own; zones whose temperature column is absent are skipped
    /// silently.
    pub fn transform(
        &self,
        row: &SimulationRow,
    ) -> Result<Vec<Result<MeasurementEvent, RowError>>, RowError> {
        let raw_time = row.get(TIME_COLUMN).ok_or(RowError::MissingTime)?;
        let timestamp = parse_simulation_timestamp(raw_time, self.reference_year)?;

        let mut events: Vec<_> = self
            .slots
            .iter()
            .filter(|slot| row.get(&ZONE_TEMPERATURE.column(&slot.prefix)).is_some())
            .map(|slot| zone_event(row, slot, timestamp))
            .collect();

        events.push(site_event(row, timestamp));
        Ok(events)
    }
}

fn zone_event(
    row: &SimulationRow,
    slot: &ZoneSlot,
    timestamp: OffsetDateTime,
) -> Result<MeasurementEvent, RowError> {
    let mut event = MeasurementEvent::thermal_zone(slot.zone_id.clone(), timestamp);

    for (field, pattern) in ZONE_COLUMNS {
        let column = pattern.column(&slot.prefix);
        let raw = row.get(&column).ok_or_else(|| RowError::MissingField {
            event: slot.zone_id.clone(),
            column: column.clone(),
        })?;
        event.fields.insert(field, parse_number(&slot.zone_id, &column, raw)?);
    }

    Ok(event)
}

fn site_event(
    row: &SimulationRow,
    timestamp: OffsetDateTime,
) -> Result<MeasurementEvent, RowError> {
    let mut event = MeasurementEvent::site_metrics(timestamp);

    for (field, column) in SITE_COLUMNS {
        if let Some(raw) = row.get(column) {
            event.fields.insert(field, parse_number("site_metrics", column, raw)?);
        }
    }

    Ok(event)
}

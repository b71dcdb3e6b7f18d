use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use super::event::Point;
use super::family::{Family, Field};

/// One `thermal_zone` point as returned by a raw fetch. Absent fields stay
/// absent; nothing is zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ThermalZoneRecord {
    pub zone_id: String,
    #[sqlx(rename = "ts")]
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_air_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operative_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_relative_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub air_co2_concentration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infiltration_air_change_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mech_ventilation_air_changes: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_latent_gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooling_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heating_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub people_sensible_heat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_comfort_pmv: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thermal_comfort_ppd: Option<f64>,
}

impl ThermalZoneRecord {
    pub fn empty(zone_id: impl Into<String>, time: OffsetDateTime) -> Self {
        Self {
            zone_id: zone_id.into(),
            time,
            mean_air_temperature: None,
            operative_temperature: None,
            air_relative_humidity: None,
            air_co2_concentration: None,
            infiltration_air_change_rate: None,
            mech_ventilation_air_changes: None,
            internal_latent_gain: None,
            cooling_rate: None,
            heating_rate: None,
            people_sensible_heat: None,
            thermal_comfort_pmv: None,
            thermal_comfort_ppd: None,
        }
    }

    fn slot(&mut self, field: Field) -> Option<&mut Option<f64>> {
        Some(match field {
            Field::MeanAirTemperature => &mut self.mean_air_temperature,
            Field::OperativeTemperature => &mut self.operative_temperature,
            Field::AirRelativeHumidity => &mut self.air_relative_humidity,
            Field::AirCo2Concentration => &mut self.air_co2_concentration,
            Field::InfiltrationAirChangeRate => &mut self.infiltration_air_change_rate,
            Field::MechVentilationAirChanges => &mut self.mech_ventilation_air_changes,
            Field::InternalLatentGain => &mut self.internal_latent_gain,
            Field::CoolingRate => &mut self.cooling_rate,
            Field::HeatingRate => &mut self.heating_rate,
            Field::PeopleSensibleHeat => &mut self.people_sensible_heat,
            Field::ThermalComfortPmv => &mut self.thermal_comfort_pmv,
            Field::ThermalComfortPpd => &mut self.thermal_comfort_ppd,
            _ => return None,
        })
    }

    pub fn from_point(point: &Point) -> Option<Self> {
        if point.family != Family::ThermalZone {
            return None;
        }
        let mut record = Self::empty(point.zone_id()?, point.timestamp);
        for (&field, &value) in &point.fields {
            if let Some(slot) = record.slot(field) {
                *slot = Some(value);
            }
        }
        Some(record)
    }
}

/// One `site_metrics` point as returned by a raw fetch.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SiteMetricsRecord {
    #[sqlx(rename = "ts")]
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interior_lights_electricity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility_electricity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdoor_air_temp: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diffuse_solar_radiation: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_solar_radiation: Option<f64>,
}

impl SiteMetricsRecord {
    pub fn from_point(point: &Point) -> Option<Self> {
        if point.family != Family::SiteMetrics {
            return None;
        }
        let get = |f: Field| point.fields.get(&f).copied();
        Some(Self {
            time: point.timestamp,
            interior_lights_electricity: get(Field::InteriorLightsElectricity),
            facility_electricity: get(Field::FacilityElectricity),
            outdoor_air_temp: get(Field::OutdoorAirTemp),
            diffuse_solar_radiation: get(Field::DiffuseSolarRadiation),
            direct_solar_radiation: get(Field::DirectSolarRadiation),
        })
    }
}

/// Either kind of raw-fetch row; serialized without a discriminator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DataRecord {
    ThermalZone(ThermalZoneRecord),
    SiteMetrics(SiteMetricsRecord),
}

impl DataRecord {
    pub fn family(&self) -> Family {
        match self {
            DataRecord::ThermalZone(_) => Family::ThermalZone,
            DataRecord::SiteMetrics(_) => Family::SiteMetrics,
        }
    }
}

/// Indoor mean air temperature of one zone at one instant.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ZoneTemperature {
    #[sqlx(rename = "ts")]
    pub time: OffsetDateTime,
    pub zone_id: String,
    pub temperature: f64,
}

/// Outdoor dry-bulb temperature at one instant.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct OutdoorTemperature {
    #[sqlx(rename = "ts")]
    pub time: OffsetDateTime,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IndoorTemps {
    Zones(BTreeMap<String, f64>),
    Mean(f64),
}

/// One timestep of an aligned temperature fetch. Built per request and never
/// persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemperatureRow {
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub outdoor_temp: Option<f64>,
    pub indoor_temps: Option<IndoorTemps>,
}

use std::{fmt, str::FromStr};

/// Tag carrying the composite `block:zone:floor` identifier of a thermal zone.
pub const ZONE_ID_TAG: &str = "zone_id";

/// The two fixed measurement schemas moved through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Family {
    ThermalZone,
    SiteMetrics,
}

impl Family {
    pub const ALL: [Family; 2] = [Family::ThermalZone, Family::SiteMetrics];

    /// Measurement (table) name in payloads and in the store.
    pub fn measurement(self) -> &'static str {
        match self {
            Family::ThermalZone => "thermal_zone",
            Family::SiteMetrics => "site_metrics",
        }
    }

    /// Transport topic; one per family, tags never appear in it.
    pub fn topic(self) -> &'static str {
        match self {
            Family::ThermalZone => "building/thermal_zones_metrics",
            Family::SiteMetrics => "building/site_metrics",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Family> {
        Family::ALL.into_iter().find(|f| f.topic() == topic)
    }

    pub fn from_measurement(name: &str) -> Option<Family> {
        Family::ALL.into_iter().find(|f| f.measurement() == name)
    }

    /// Closed field vocabulary of this family, in column order.
    pub fn fields(self) -> &'static [Field] {
        match self {
            Family::ThermalZone => &THERMAL_ZONE_FIELDS,
            Family::SiteMetrics => &SITE_METRICS_FIELDS,
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.measurement())
    }
}

/// Every field name either family may carry.
///
/// Anything not listed here is a schema violation and is rejected at the
/// publish and consume boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    // thermal_zone
    MeanAirTemperature,
    OperativeTemperature,
    AirRelativeHumidity,
    AirCo2Concentration,
    InfiltrationAirChangeRate,
    MechVentilationAirChanges,
    InternalLatentGain,
    CoolingRate,
    HeatingRate,
    PeopleSensibleHeat,
    ThermalComfortPmv,
    ThermalComfortPpd,
    // site_metrics
    InteriorLightsElectricity,
    FacilityElectricity,
    OutdoorAirTemp,
    DiffuseSolarRadiation,
    DirectSolarRadiation,
}

const THERMAL_ZONE_FIELDS: [Field; 12] = [
    Field::MeanAirTemperature,
    Field::OperativeTemperature,
    Field::AirRelativeHumidity,
    Field::AirCo2Concentration,
    Field::InfiltrationAirChangeRate,
    Field::MechVentilationAirChanges,
    Field::InternalLatentGain,
    Field::CoolingRate,
    Field::HeatingRate,
    Field::PeopleSensibleHeat,
    Field::ThermalComfortPmv,
    Field::ThermalComfortPpd,
];

const SITE_METRICS_FIELDS: [Field; 5] = [
    Field::InteriorLightsElectricity,
    Field::FacilityElectricity,
    Field::OutdoorAirTemp,
    Field::DiffuseSolarRadiation,
    Field::DirectSolarRadiation,
];

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::MeanAirTemperature => "mean_air_temperature",
            Field::OperativeTemperature => "operative_temperature",
            Field::AirRelativeHumidity => "air_relative_humidity",
            Field::AirCo2Concentration => "air_co2_concentration",
            Field::InfiltrationAirChangeRate => "infiltration_air_change_rate",
            Field::MechVentilationAirChanges => "mech_ventilation_air_changes",
            Field::InternalLatentGain => "internal_latent_gain",
            Field::CoolingRate => "cooling_rate",
            Field::HeatingRate => "heating_rate",
            Field::PeopleSensibleHeat => "people_sensible_heat",
            Field::ThermalComfortPmv => "thermal_comfort_pmv",
            Field::ThermalComfortPpd => "thermal_comfort_ppd",
            Field::InteriorLightsElectricity => "interior_lights_electricity",
            Field::FacilityElectricity => "facility_electricity",
            Field::OutdoorAirTemp => "outdoor_air_temp",
            Field::DiffuseSolarRadiation => "diffuse_solar_radiation",
            Field::DirectSolarRadiation => "direct_solar_radiation",
        }
    }

    pub fn family(self) -> Family {
        if SITE_METRICS_FIELDS.contains(&self) {
            Family::SiteMetrics
        } else {
            Family::ThermalZone
        }
    }

    /// Look a field name up in one family's vocabulary.
    pub fn parse_for(family: Family, name: &str) -> Option<Field> {
        family.fields().iter().copied().find(|f| f.as_str() == name)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Family::ALL
            .into_iter()
            .find_map(|family| Field::parse_for(family, s))
            .ok_or_else(|| format!("unknown field '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabularies_have_fixed_sizes_and_do_not_overlap() {
        assert_eq!(Family::ThermalZone.fields().len(), 12);
        assert_eq!(Family::SiteMetrics.fields().len(), 5);
        for f in Family::ThermalZone.fields() {
            assert_eq!(f.family(), Family::ThermalZone);
            assert!(Field::parse_for(Family::SiteMetrics, f.as_str()).is_none());
        }
        for f in Family::SiteMetrics.fields() {
            assert_eq!(f.family(), Family::SiteMetrics);
        }
    }

    #[test]
    fn topics_and_measurements_map_back_to_family() {
        for family in Family::ALL {
            assert_eq!(Family::from_topic(family.topic()), Some(family));
            assert_eq!(Family::from_measurement(family.measurement()), Some(family));
        }
        assert_eq!(Family::from_topic("building/other"), None);
    }

    #[test]
    fn field_parse_respects_family() {
        assert_eq!(
            Field::parse_for(Family::SiteMetrics, "outdoor_air_temp"),
            Some(Field::OutdoorAirTemp)
        );
        assert_eq!(Field::parse_for(Family::ThermalZone, "outdoor_air_temp"), None);
        assert!("not_a_field".parse::<Field>().is_err());
    }
}

use std::collections::BTreeMap;

use time::{OffsetDateTime, UtcOffset};

use super::family::{Family, Field, ZONE_ID_TAG};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("field '{field}' does not belong to {family}")]
    ForeignField { family: Family, field: Field },
    #[error("field '{field}' is not a finite number")]
    NonFinite { field: Field },
    #[error("{0} event has no fields")]
    NoFields(Family),
    #[error("thermal_zone event requires exactly one non-empty 'zone_id' tag")]
    ZoneTag,
    #[error("site_metrics event must not carry tags")]
    UnexpectedTags,
}

/// One measurement moved over the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementEvent {
    pub family: Family,
    pub timestamp: OffsetDateTime,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<Field, f64>,
}

impl MeasurementEvent {
    pub fn thermal_zone(zone_id: impl Into<String>, timestamp: OffsetDateTime) -> Self {
        let mut tags = BTreeMap::new();
        tags.insert(ZONE_ID_TAG.to_string(), zone_id.into());
        Self {
            family: Family::ThermalZone,
            timestamp: timestamp.to_offset(UtcOffset::UTC),
            tags,
            fields: BTreeMap::new(),
        }
    }

    pub fn site_metrics(timestamp: OffsetDateTime) -> Self {
        Self {
            family: Family::SiteMetrics,
            timestamp: timestamp.to_offset(UtcOffset::UTC),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, field: Field, value: f64) -> Self {
        self.fields.insert(field, value);
        self
    }

    pub fn zone_id(&self) -> Option<&str> {
        self.tags.get(ZONE_ID_TAG).map(String::as_str)
    }

    /// Check the per-family invariants on tags and fields.
    pub fn validate(&self) -> Result<(), EventError> {
        match self.family {
            Family::ThermalZone => {
                let ok = self.tags.len() == 1 && self.zone_id().is_some_and(|z| !z.is_empty());
                if !ok {
                    return Err(EventError::ZoneTag);
                }
            }
            Family::SiteMetrics => {
                if !self.tags.is_empty() {
                    return Err(EventError::UnexpectedTags);
                }
            }
        }

        if self.fields.is_empty() {
            return Err(EventError::NoFields(self.family));
        }

        for (&field, value) in &self.fields {
            if field.family() != self.family {
                return Err(EventError::ForeignField {
                    family: self.family,
                    field,
                });
            }
            if !value.is_finite() {
                return Err(EventError::NonFinite { field });
            }
        }

        Ok(())
    }
}

/// Round to the 4 decimal places points are stored with.
pub fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// What the store holds. `(family, tags, timestamp)` is the point key; a
/// second write under the same key replaces the first.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub family: Family,
    pub tags: BTreeMap<String, String>,
    pub timestamp: OffsetDateTime,
    pub fields: BTreeMap<Field, f64>,
}

impl Point {
    pub fn zone_id(&self) -> Option<&str> {
        self.tags.get(ZONE_ID_TAG).map(String::as_str)
    }
}

impl From<MeasurementEvent> for Point {
    fn from(event: MeasurementEvent) -> Self {
        Point {
            family: event.family,
            tags: event.tags,
            timestamp: event.timestamp.to_offset(UtcOffset::UTC),
            fields: event
                .fields
                .into_iter()
                .map(|(field, value)| (field, round4(value)))
                .collect(),
        }
    }
}

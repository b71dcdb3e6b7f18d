pub mod event;
pub mod family;
pub mod records;
pub mod time_range;
pub mod wire;

pub use event::{round4, EventError, MeasurementEvent, Point};
pub use family::{Family, Field, ZONE_ID_TAG};
pub use records::{
    DataRecord, IndoorTemps, OutdoorTemperature, SiteMetricsRecord, TemperatureRow,
    ThermalZoneRecord, ZoneTemperature,
};
pub use time_range::{TimeRange, TimeRangeError};
pub use wire::{decode_event, encode_event, WireError};

pub mod row;

pub use row::{parse_simulation_timestamp, RowError, RowTransformer, SimulationRow, TIME_COLUMN};

use crate::pipeline::{Envelope, PipelineError, Transform};
use building_client::domain::MeasurementEvent;
use time::macros::datetime;

/// Pure validation of a `MeasurementEvent`.
///
/// Rules:
/// - family invariants on tags and fields hold (see `MeasurementEvent::validate`).
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01).
pub fn validate_measurement(
    env: Envelope<MeasurementEvent>,
) -> Result<Envelope<MeasurementEvent>, PipelineError> {
    let event = &env.payload;

    event
        .validate()
        .map_err(|e| PipelineError::Transform(e.to_string()))?;

    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if event.timestamp < min_ts || event.timestamp >= max_ts {
        return Err(PipelineError::Transform(format!(
            "timestamp {} out of allowed range",
            event.timestamp
        )));
    }

    Ok(env)
}

#[derive(Clone, Default)]
pub struct MeasurementValidation;

#[async_trait::async_trait]
impl Transform<MeasurementEvent, MeasurementEvent> for MeasurementValidation {
    async fn apply(
        &self,
        input: Envelope<MeasurementEvent>,
    ) -> Result<Envelope<MeasurementEvent>, PipelineError> {
        let family = input.payload.family.measurement();
        match validate_measurement(input) {
            Ok(env) => Ok(env),
            Err(e) => {
                metrics::counter!("validation_measurement_rejected_total", "family" => family)
                    .increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use building_client::domain::Field;

    fn zone_event(ts: time::OffsetDateTime) -> Envelope<MeasurementEvent> {
        Envelope::new(
            MeasurementEvent::thermal_zone("BLOCK1:CORRIDOR:X1F", ts)
                .with_field(Field::MeanAirTemperature, 21.5),
        )
    }

    #[test]
    fn accepts_valid_event() {
        assert!(validate_measurement(zone_event(datetime!(2005-01-15 01:00:00 UTC))).is_ok());
    }

    #[test]
    fn rejects_out_of_range_timestamp() {
        for ts in [datetime!(1800-01-01 00:00:00 UTC), datetime!(2100-01-01 00:00:00 UTC)] {
            let res = validate_measurement(zone_event(ts));
            assert!(matches!(res, Err(PipelineError::Transform(_))));
        }
    }

    #[test]
    fn rejects_event_with_no_fields() {
        let env = Envelope::new(MeasurementEvent::site_metrics(datetime!(2005-01-15 01:00:00 UTC)));
        let res = validate_measurement(env);
        assert!(matches!(res, Err(PipelineError::Transform(msg)) if msg.contains("no fields")));
    }

    #[test]
    fn rejects_field_from_other_family() {
        let env = Envelope::new(
            MeasurementEvent::site_metrics(datetime!(2005-01-15 01:00:00 UTC))
                .with_field(Field::CoolingRate, 1.0),
        );
        assert!(validate_measurement(env).is_err());
    }
}

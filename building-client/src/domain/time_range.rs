use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TimeRangeError {
    #[error("invalid {which} '{value}': expected an ISO-8601 date-time")]
    Invalid { which: &'static str, value: String },
    #[error("start_time {start} is after end_time {end}")]
    Inverted { start: String, end: String },
}

/// Half-open query window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        Self {
            start: start.to_offset(UtcOffset::UTC),
            end: end.to_offset(UtcOffset::UTC),
        }
    }

    /// Everything from the epoch up to `now`.
    pub fn until(now: OffsetDateTime) -> Self {
        Self::new(OffsetDateTime::UNIX_EPOCH, now)
    }

    /// Build a range from optional query-string bounds. A missing lower bound
    /// is the epoch and a missing upper bound is `now`.
    pub fn parse(
        start: Option<&str>,
        end: Option<&str>,
        now: OffsetDateTime,
    ) -> Result<Self, TimeRangeError> {
        let start = match start.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => parse_bound("start_time", s)?,
            None => OffsetDateTime::UNIX_EPOCH,
        };
        let end = match end.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => parse_bound("end_time", s)?,
            None => now,
        };

        if start > end {
            return Err(TimeRangeError::Inverted {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        Ok(Self::new(start, end))
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Accepts RFC 3339 (`Z` or numeric offset) and offset-less ISO date-times,
/// the latter read as UTC.
fn parse_bound(which: &'static str, value: &str) -> Result<OffsetDateTime, TimeRangeError> {
    if let Ok(ts) = OffsetDateTime::parse(value, &Rfc3339) {
        return Ok(ts.to_offset(UtcOffset::UTC));
    }

    let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
    PrimitiveDateTime::parse(value, naive)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|_| TimeRangeError::Invalid {
            which,
            value: value.to_string(),
        })
}

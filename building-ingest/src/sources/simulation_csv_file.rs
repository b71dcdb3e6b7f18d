use std::{fs::File, path::Path, sync::Mutex};

use building_client::domain::MeasurementEvent;
use csv::StringRecord;
use tokio_util::sync::CancellationToken;

use crate::{
    pipeline::{Envelope, EnvelopeStream, PipelineError, Source},
    transform::{RowTransformer, SimulationRow, TIME_COLUMN},
};

/// Clean an EnergyPlus output header into the column names the row
/// transformer looks up.
///
/// `BLOCK1:CORRIDORX1F:Zone Mean Air Temperature [C](TimeStep)` becomes
/// `BLOCK1:CORRIDORX1F:Zone Mean Air Temperature`,
/// `Environment:Site Outdoor Air Drybulb Temperature [C](TimeStep)` becomes
/// `Site Site Outdoor Air Drybulb Temperature` and `Date/Time` becomes
/// `DateTime`. Already-clean names pass through untouched.
pub fn normalize_header(raw: &str) -> String {
    let mut stripped = String::with_capacity(raw.len());
    let mut depth = 0usize;
    for c in raw.chars() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' if depth > 0 => depth -= 1,
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    let cleaned = stripped
        .trim_matches(|c: char| c.is_whitespace() || c == ':')
        .replace("Environment:", "Site ");

    if cleaned == "Date/Time" {
        TIME_COLUMN.to_string()
    } else {
        cleaned
    }
}

fn to_row(headers: &StringRecord, record: &StringRecord) -> SimulationRow {
    headers.iter().zip(record.iter()).collect()
}

/// Publish-path source: reads an EnergyPlus CSV export row by row and emits
/// the measurement events of each row.
///
/// The file and its header are read when the source is opened so that an
/// unreadable input fails at startup. Afterwards a bad row or a bad event is
/// yielded as an error and reading continues.
pub struct SimulationCsvSource {
    reader: Mutex<Option<csv::Reader<File>>>,
    headers: StringRecord,
    transformer: RowTransformer,
    cancel: CancellationToken,
}

impl SimulationCsvSource {
    pub fn open(
        path: impl AsRef<Path>,
        transformer: RowTransformer,
        cancel: CancellationToken,
    ) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            PipelineError::Source(format!("failed to open CSV file '{}': {e}", path.display()))
        })?;

        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(file);
        let headers: StringRecord = rdr
            .headers()
            .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
            .iter()
            .map(normalize_header)
            .collect();

        if !headers.iter().any(|h| h == TIME_COLUMN) {
            return Err(PipelineError::Source(format!(
                "CSV file '{}' has no '{TIME_COLUMN}' column",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), columns = headers.len(), "opened simulation CSV");

        Ok(Self {
            reader: Mutex::new(Some(rdr)),
            headers,
            transformer,
            cancel,
        })
    }
}

#[async_trait::async_trait]
impl Source<MeasurementEvent> for SimulationCsvSource {
    async fn stream(&self) -> EnvelopeStream<MeasurementEvent> {
        let reader = self.reader.lock().ok().and_then(|mut guard| guard.take());
        let headers = self.headers.clone();
        let transformer = self.transformer.clone();
        let cancel = self.cancel.clone();

        let s = async_stream::stream! {
            let Some(mut rdr) = reader else {
                yield Err(PipelineError::Source("simulation CSV already consumed".to_string()));
                return;
            };

            let mut rows: u64 = 0;
            let mut rows_skipped: u64 = 0;
            let mut events_skipped: u64 = 0;
            let mut events: u64 = 0;

            for (idx, result) in rdr.records().enumerate() {
                if cancel.is_cancelled() {
                    tracing::info!(rows, "simulation CSV read cancelled");
                    break;
                }

                // Header is line 1.
                let line = idx + 2;
                rows += 1;
                metrics::counter!("simulation_rows_total").increment(1);

                let record = match result {
                    Ok(r) => r,
                    Err(e) => {
                        rows_skipped += 1;
                        metrics::counter!("simulation_rows_skipped_total").increment(1);
                        let msg = format!("line {line}: failed to read CSV record: {e}");
                        yield Err(PipelineError::Source(msg));
                        continue;
                    }
                };

                let row_events = match transformer.transform(&to_row(&headers, &record)) {
                    Ok(evs) => evs,
                    Err(e) => {
                        rows_skipped += 1;
                        metrics::counter!("simulation_rows_skipped_total").increment(1);
                        yield Err(PipelineError::Source(format!("line {line}: row skipped: {e}")));
                        continue;
                    }
                };

                for event in row_events {
                    match event {
                        Ok(ev) => {
                            events += 1;
                            yield Ok(Envelope::new(ev));
                        }
                        Err(e) => {
                            events_skipped += 1;
                            metrics::counter!("simulation_events_skipped_total").increment(1);
                            let msg = format!("line {line}: event skipped: {e}");
                            yield Err(PipelineError::Source(msg));
                        }
                    }
                }
            }

            tracing::info!(rows, rows_skipped, events, events_skipped, "simulation CSV exhausted");
        };

        Box::pin(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_units_and_frequency() {
        assert_eq!(
            normalize_header("BLOCK1:OFFICEXSWX1F:Zone Mean Air Temperature [C](TimeStep)"),
            "BLOCK1:OFFICEXSWX1F:Zone Mean Air Temperature"
        );
        assert_eq!(normalize_header("Electricity:Facility [J](Hourly)"), "Electricity:Facility");
        assert_eq!(
            normalize_header(
                "PEOPLE BLOCK2:CORRIDORX2F:Zone Thermal Comfort Fanger Model PPD [%](TimeStep) "
            ),
            "PEOPLE BLOCK2:CORRIDORX2F:Zone Thermal Comfort Fanger Model PPD"
        );
    }

    #[test]
    fn renames_environment_and_date_columns() {
        assert_eq!(
            normalize_header("Environment:Site Outdoor Air Drybulb Temperature [C](TimeStep)"),
            "Site Site Outdoor Air Drybulb Temperature"
        );
        assert_eq!(normalize_header("Date/Time"), "DateTime");
    }

    #[test]
    fn clean_headers_pass_through() {
        let clean = [
            "DateTime",
            "Electricity:Facility",
            "Site Site Direct Solar Radiation Rate per Area",
        ];
        for h in clean {
            assert_eq!(normalize_header(h), h);
        }
    }

    #[test]
    fn open_fails_without_time_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_time.csv");
        std::fs::write(&path, "Electricity:Facility\n1.0\n").unwrap();

        let res = SimulationCsvSource::open(
            &path,
            RowTransformer::new(&Default::default(), 2005),
            CancellationToken::new(),
        );
        assert!(matches!(res, Err(PipelineError::Source(msg)) if msg.contains("DateTime")));
    }

    #[test]
    fn open_fails_for_missing_file() {
        let res = SimulationCsvSource::open(
            "/definitely/not/here.csv",
            RowTransformer::new(&Default::default(), 2005),
            CancellationToken::new(),
        );
        assert!(res.is_err());
    }
}

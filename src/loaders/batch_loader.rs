use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::loaders::supabase::{create_table_sql, SupabaseClient};
use crate::utils::progress::ProgressReporter;
use crate::utils::retry::RetryPolicy;

/// Rows per insert call.
pub const BATCH_SIZE: usize = 200;

/// A staged CSV row as the loader sees it: categorical fields stay strings
/// and pass through untouched, numerics get sanitized for JSON transport.
#[derive(Debug, Deserialize)]
pub struct StagedRow {
    pub city: Option<String>,
    pub time: Option<String>,
    pub hour: Option<i64>,
    pub pm10: Option<f64>,
    pub pm2_5: Option<f64>,
    pub carbon_monoxide: Option<f64>,
    pub nitrogen_dioxide: Option<f64>,
    pub sulphur_dioxide: Option<f64>,
    pub ozone: Option<f64>,
    pub uv_index: Option<f64>,
    pub aqi_category: Option<String>,
    pub severity_score: Option<f64>,
    pub risk_classification: Option<String>,
}

/// Non-finite numerics are not representable in JSON; they become null.
fn clean_f64(value: Option<f64>) -> Value {
    match value {
        Some(v) if v.is_finite() => Value::from(v),
        _ => Value::Null,
    }
}

fn clean_string(value: &Option<String>) -> Value {
    match value {
        Some(s) => Value::String(s.clone()),
        None => Value::Null,
    }
}

/// A timestamp whose string form is a not-a-number token (a pandas-style
/// `nan` artifact in hand-edited files) counts as missing.
fn clean_time(value: &Option<String>) -> Value {
    match value {
        Some(s) if !s.trim().is_empty() && s.trim().to_lowercase() != "nan" => {
            Value::String(s.clone())
        }
        _ => Value::Null,
    }
}

/// Sanitize one staged row for transport, renaming `risk_classification` to
/// the remote table's `risk_flag`.
pub fn to_remote_record(row: &StagedRow) -> Value {
    let mut map = Map::new();
    map.insert("city".to_string(), clean_string(&row.city));
    map.insert("time".to_string(), clean_time(&row.time));
    map.insert(
        "hour".to_string(),
        row.hour.map(Value::from).unwrap_or(Value::Null),
    );
    map.insert("pm10".to_string(), clean_f64(row.pm10));
    map.insert("pm2_5".to_string(), clean_f64(row.pm2_5));
    map.insert("carbon_monoxide".to_string(), clean_f64(row.carbon_monoxide));
    map.insert(
        "nitrogen_dioxide".to_string(),
        clean_f64(row.nitrogen_dioxide),
    );
    map.insert("sulphur_dioxide".to_string(), clean_f64(row.sulphur_dioxide));
    map.insert("ozone".to_string(), clean_f64(row.ozone));
    map.insert("uv_index".to_string(), clean_f64(row.uv_index));
    map.insert("aqi_category".to_string(), clean_string(&row.aqi_category));
    map.insert("severity_score".to_string(), clean_f64(row.severity_score));
    map.insert(
        "risk_flag".to_string(),
        clean_string(&row.risk_classification),
    );
    Value::Object(map)
}

/// Outcome of one load run.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub total_rows: usize,
    pub inserted_rows: usize,
    pub failed_batches: usize,
}

/// Load stage: staged CSV rows into the remote table, 200 at a time, each
/// batch retried a bounded number of times then skipped.
///
/// There is no deduplication key: running the loader twice against the same
/// staged file inserts every row twice. That mirrors the upstream system and
/// is a documented limitation, not an oversight to fix here.
pub struct BatchLoader<'a> {
    client: &'a SupabaseClient,
    table: String,
    retry: RetryPolicy,
    silent: bool,
}

impl<'a> BatchLoader<'a> {
    pub fn new(client: &'a SupabaseClient, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
            retry: RetryPolicy::new(2, Duration::from_secs(2)),
            silent: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Best-effort schema creation. The `execute_sql` RPC is not available
    /// on every project; on failure the statement is logged for manual use
    /// and the load proceeds anyway.
    pub async fn ensure_table(&self) {
        let sql = create_table_sql(&self.table);
        match self.client.execute_sql(&sql).await {
            Ok(()) => tracing::info!("Table '{}' ready", self.table),
            Err(e) => {
                tracing::warn!("Schema RPC failed ({}); run the SQL manually:\n{}", e, sql);
            }
        }
    }

    pub async fn run(&self, staged_csv: &Path) -> Result<LoadReport> {
        if !staged_csv.exists() {
            return Err(PipelineError::Config(format!(
                "Staged file missing: {}",
                staged_csv.display()
            )));
        }

        tracing::info!(
            "Loading {} into '{}'...",
            staged_csv.display(),
            self.table
        );

        let records: Vec<Value> = read_staged_rows(staged_csv)?
            .iter()
            .map(to_remote_record)
            .collect();

        let mut report = LoadReport {
            total_rows: records.len(),
            ..Default::default()
        };

        let batches: Vec<&[Value]> = records.chunks(BATCH_SIZE).collect();
        let progress =
            ProgressReporter::bar(batches.len() as u64, "Inserting batches", self.silent);

        for (index, batch) in batches.iter().enumerate() {
            let first_row = index * BATCH_SIZE + 1;
            let last_row = first_row + batch.len() - 1;

            let client = self.client;
            let table = self.table.as_str();
            let rows: &[Value] = batch;
            let outcome = self.retry.run(move |_| client.insert_rows(table, rows)).await;

            match outcome {
                Ok(()) => {
                    tracing::info!("Inserted rows {}-{}", first_row, last_row);
                    report.inserted_rows += batch.len();
                }
                Err(e) => {
                    // Partial-failure tolerant: later batches still run
                    tracing::warn!(
                        "Skipping batch starting at row {} after repeated errors: {}",
                        first_row,
                        e
                    );
                    report.failed_batches += 1;
                }
            }

            progress.inc();
        }

        progress.finish(&format!(
            "Load complete: {}/{} rows",
            report.inserted_rows, report.total_rows
        ));
        Ok(report)
    }
}

pub fn read_staged_rows(path: &Path) -> Result<Vec<StagedRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn staged_row() -> StagedRow {
        StagedRow {
            city: Some("Delhi".to_string()),
            time: Some("2026-03-01T00:00:00".to_string()),
            hour: Some(0),
            pm10: Some(80.0),
            pm2_5: Some(f64::NAN),
            carbon_monoxide: Some(f64::INFINITY),
            nitrogen_dioxide: None,
            sulphur_dioxide: Some(12.0),
            ozone: Some(30.0),
            uv_index: Some(1.0),
            aqi_category: Some("Moderate".to_string()),
            severity_score: Some(250.0),
            risk_classification: Some("Moderate Risk".to_string()),
        }
    }

    #[test]
    fn test_sanitize_non_finite_to_null() {
        let record = to_remote_record(&staged_row());

        assert_eq!(record["pm2_5"], Value::Null);
        assert_eq!(record["carbon_monoxide"], Value::Null);
        assert_eq!(record["nitrogen_dioxide"], Value::Null);
        assert_eq!(record["pm10"], 80.0);
        assert_eq!(record["city"], "Delhi");
    }

    #[test]
    fn test_sanitize_renames_risk_flag() {
        let record = to_remote_record(&staged_row());

        assert_eq!(record["risk_flag"], "Moderate Risk");
        assert!(record.get("risk_classification").is_none());
    }

    #[test]
    fn test_sanitize_nan_time_token() {
        let mut row = staged_row();
        row.time = Some("NaN".to_string());
        assert_eq!(to_remote_record(&row)["time"], Value::Null);

        row.time = None;
        assert_eq!(to_remote_record(&row)["time"], Value::Null);

        row.time = Some("2026-03-01T00:00:00".to_string());
        assert_eq!(to_remote_record(&row)["time"], "2026-03-01T00:00:00");
    }

    #[test]
    fn test_batch_arithmetic() {
        let rows: Vec<Value> = (0..450).map(|_| Value::Null).collect();
        let batches: Vec<&[Value]> = rows.chunks(BATCH_SIZE).collect();

        // ceil(450 / 200) = 3, last batch holds the remainder
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 200);
        assert_eq!(batches[2].len(), 50);

        let exact: Vec<Value> = (0..400).map(|_| Value::Null).collect();
        let batches: Vec<&[Value]> = exact.chunks(BATCH_SIZE).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].len(), 200);
    }

    #[test]
    fn test_read_staged_rows_handles_missing_fields() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "city,time,hour,pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,\
             sulphur_dioxide,ozone,uv_index,aqi_category,severity_score,\
             risk_classification"
        )
        .unwrap();
        writeln!(
            file,
            "Delhi,2026-03-01T00:00:00,0,80.0,,,,12.0,30.0,1.0,,,Low Risk"
        )
        .unwrap();
        writeln!(file, "Mumbai,,,NaN,,,,,,2.0,,,Low Risk").unwrap();

        let rows = read_staged_rows(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pm2_5, None);
        assert_eq!(rows[0].sulphur_dioxide, Some(12.0));
        assert!(rows[1].pm10.unwrap().is_nan());
        assert_eq!(rows[1].time, None);
    }
}

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{HourlyRecord, RiskLevel};
use crate::utils::filename::staged_path;

/// Raw Open-Meteo payload as captured by the extractor. Only the fields the
/// transform needs; everything else in the response is ignored.
#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    hourly: Option<HourlySeries>,
}

/// Parallel hourly arrays keyed by metric name. Values are kept as raw JSON
/// so unparseable entries coerce to missing, not errors.
#[derive(Debug, Default, Deserialize)]
struct HourlySeries {
    #[serde(default)]
    time: Vec<Value>,
    #[serde(default)]
    pm10: Vec<Value>,
    #[serde(default)]
    pm2_5: Vec<Value>,
    #[serde(default)]
    carbon_monoxide: Vec<Value>,
    #[serde(default)]
    nitrogen_dioxide: Vec<Value>,
    #[serde(default)]
    sulphur_dioxide: Vec<Value>,
    #[serde(default)]
    ozone: Vec<Value>,
    #[serde(default)]
    uv_index: Vec<Value>,
}

/// Coerce a JSON value to f64, treating anything unparseable as missing.
fn coerce_numeric(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Open-Meteo emits minute-resolution local times (`2026-03-01T14:00`);
/// accept a seconds-bearing variant as well.
fn parse_time(value: Option<&Value>) -> Option<NaiveDateTime> {
    let s = value?.as_str()?;
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M"))
        .ok()
}

/// Flatten one city's parallel hourly arrays into row-per-hour records with
/// derived features, dropping rows where every pollutant is missing.
fn flatten_payload(payload: &RawPayload) -> Vec<HourlyRecord> {
    let hourly = match payload.hourly {
        Some(ref h) if !h.time.is_empty() => h,
        _ => return Vec::new(),
    };
    let city = payload
        .city_name
        .clone()
        .unwrap_or_else(|| "Unknown".to_string());

    let mut rows = Vec::with_capacity(hourly.time.len());
    for i in 0..hourly.time.len() {
        let mut record = HourlyRecord {
            city: city.clone(),
            time: parse_time(hourly.time.get(i)),
            hour: None,
            pm10: coerce_numeric(hourly.pm10.get(i)),
            pm2_5: coerce_numeric(hourly.pm2_5.get(i)),
            carbon_monoxide: coerce_numeric(hourly.carbon_monoxide.get(i)),
            nitrogen_dioxide: coerce_numeric(hourly.nitrogen_dioxide.get(i)),
            sulphur_dioxide: coerce_numeric(hourly.sulphur_dioxide.get(i)),
            ozone: coerce_numeric(hourly.ozone.get(i)),
            uv_index: coerce_numeric(hourly.uv_index.get(i)),
            aqi_category: None,
            severity_score: None,
            risk_classification: RiskLevel::Low,
        };

        if record.all_pollutants_missing() {
            continue;
        }

        record.derive_features();
        rows.push(record);
    }

    rows
}

/// Transformation stage: raw per-city JSON captures in, one combined staged
/// CSV out. Row order follows file-list order, then per-file hourly order;
/// nothing is re-sorted.
pub struct Transformer {
    staged_dir: PathBuf,
}

impl Transformer {
    pub fn new(staged_dir: impl Into<PathBuf>) -> Self {
        Self {
            staged_dir: staged_dir.into(),
        }
    }

    /// Returns the staged CSV path, or `None` if no input file yielded
    /// usable rows (fatal to a pipeline run, decided by the caller).
    pub fn run(&self, raw_files: &[PathBuf], timestamp: &str) -> Result<Option<PathBuf>> {
        let rows = self.collect_rows(raw_files);
        if rows.is_empty() {
            tracing::warn!("No data to transform");
            return Ok(None);
        }

        std::fs::create_dir_all(&self.staged_dir)?;
        let path = staged_path(&self.staged_dir, timestamp);
        write_staged_csv(&path, &rows)?;

        tracing::info!("Transformed {} rows -> {}", rows.len(), path.display());
        Ok(Some(path))
    }

    /// Parse and flatten every raw file. Per-file failures are logged and
    /// skipped; they never abort the stage.
    fn collect_rows(&self, raw_files: &[PathBuf]) -> Vec<HourlyRecord> {
        let mut rows = Vec::new();

        for path in raw_files {
            match read_payload(path) {
                Ok(payload) => {
                    let city_rows = flatten_payload(&payload);
                    if city_rows.is_empty() {
                        tracing::warn!("No hourly data in {}, skipping", path.display());
                    } else {
                        rows.extend(city_rows);
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to process {}: {}", path.display(), e);
                }
            }
        }

        rows
    }
}

fn read_payload(path: &Path) -> Result<RawPayload> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn write_staged_csv(path: &Path, rows: &[HourlyRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

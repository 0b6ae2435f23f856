use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::analyzers::charts;
use crate::error::Result;
use crate::loaders::SupabaseClient;

/// Row cap for the analysis fetch. Rows come back in the service's default
/// order; no KPI below depends on ordering.
pub const FETCH_LIMIT: usize = 5000;

/// Accept numbers, numeric strings, or null for a numeric column. The
/// remote table should only hold numbers, but the analyzer re-coerces
/// defensively rather than failing the whole fetch on one odd value.
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// A measurement row as stored remotely (note `risk_flag`, the loader-side
/// rename of the staged `risk_classification`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteRecord {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hour: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pm10: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pm2_5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub carbon_monoxide: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub nitrogen_dioxide: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub sulphur_dioxide: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ozone: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub uv_index: Option<f64>,
    #[serde(default)]
    pub aqi_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub severity_score: Option<f64>,
    #[serde(default)]
    pub risk_flag: Option<String>,
}

/// Headline KPIs for one analysis run. Fields are optional because a fetch
/// can return rows with no usable pm2_5 or severity values at all.
#[derive(Debug, Default, PartialEq)]
pub struct SummaryMetrics {
    pub worst_city: Option<String>,
    pub worst_city_pm2_5: Option<f64>,
    pub highest_severity_city: Option<String>,
    pub highest_severity_score: Option<f64>,
    pub worst_hour: Option<i64>,
    pub high_risk_pct: f64,
    pub moderate_risk_pct: f64,
}

fn mean_by_key<K: Ord>(pairs: impl Iterator<Item = (K, f64)>) -> BTreeMap<K, f64> {
    let mut acc: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for (key, value) in pairs {
        let entry = acc.entry(key).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    acc.into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

fn max_entry<K: Clone + Ord>(means: &BTreeMap<K, f64>) -> Option<(K, f64)> {
    means
        .iter()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, v)| (k.clone(), *v))
}

/// Compute the headline KPIs over the fetched rows. Risk percentages use
/// every row in the denominator, including rows with a null flag.
pub fn summarize(records: &[RemoteRecord]) -> SummaryMetrics {
    let mut metrics = SummaryMetrics::default();
    if records.is_empty() {
        return metrics;
    }

    let city_means = mean_by_key(records.iter().filter_map(|r| {
        Some((r.city.clone()?, r.pm2_5?))
    }));
    if let Some((city, value)) = max_entry(&city_means) {
        metrics.worst_city = Some(city);
        metrics.worst_city_pm2_5 = Some(value);
    }

    if let Some(peak) = records
        .iter()
        .filter(|r| r.severity_score.is_some())
        .max_by(|a, b| {
            a.severity_score
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&b.severity_score.unwrap_or(f64::NEG_INFINITY))
        })
    {
        metrics.highest_severity_city = peak.city.clone();
        metrics.highest_severity_score = peak.severity_score;
    }

    let hour_means = mean_by_key(records.iter().filter_map(|r| {
        Some((r.hour? as i64, r.pm2_5?))
    }));
    metrics.worst_hour = max_entry(&hour_means).map(|(hour, _)| hour);

    let total = records.len() as f64;
    let count_flag = |flag: &str| {
        records
            .iter()
            .filter(|r| r.risk_flag.as_deref() == Some(flag))
            .count() as f64
    };
    metrics.high_risk_pct = count_flag("High Risk") / total * 100.0;
    metrics.moderate_risk_pct = count_flag("Moderate Risk") / total * 100.0;

    metrics
}

/// City × risk-flag contingency counts. Categories a city never hit are
/// implicitly zero when the table is written out.
pub fn risk_distribution(records: &[RemoteRecord]) -> BTreeMap<String, BTreeMap<String, usize>> {
    let mut dist: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
    for record in records {
        let (Some(city), Some(flag)) = (&record.city, &record.risk_flag) else {
            continue;
        };
        *dist
            .entry(city.clone())
            .or_default()
            .entry(flag.clone())
            .or_insert(0) += 1;
    }
    dist
}

/// Analysis stage: fetch remote rows, write KPI and report CSVs, render
/// charts. An empty remote table is logged and produces no output.
pub struct Analyzer<'a> {
    client: &'a SupabaseClient,
    table: String,
    processed_dir: PathBuf,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        client: &'a SupabaseClient,
        table: impl Into<String>,
        processed_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            table: table.into(),
            processed_dir: processed_dir.into(),
        }
    }

    pub async fn run(&self) -> Result<()> {
        tracing::info!("Fetching data from '{}'...", self.table);
        let rows = self.client.select_rows(&self.table, FETCH_LIMIT).await?;
        if rows.is_empty() {
            tracing::warn!("No data found in remote table");
            return Ok(());
        }

        let records: Vec<RemoteRecord> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed remote row: {}", e);
                    None
                }
            })
            .collect();

        tracing::info!("Analyzing {} rows...", records.len());
        std::fs::create_dir_all(&self.processed_dir)?;

        let metrics = summarize(&records);
        write_summary_csv(&self.processed_dir.join("summary_metrics.csv"), &metrics)?;

        write_trends_csv(&self.processed_dir.join("pollution_trends.csv"), &records)?;

        let dist = risk_distribution(&records);
        write_risk_distribution_csv(
            &self.processed_dir.join("city_risk_distribution.csv"),
            &dist,
        )?;

        charts::render_all(&records, &dist, &self.processed_dir)?;

        tracing::info!("Analysis outputs written to {}", self.processed_dir.display());
        Ok(())
    }
}

fn fmt_opt_f64(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn write_summary_csv(path: &Path, metrics: &SummaryMetrics) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "Worst City (Avg PM2.5)",
        "Worst City PM2.5 Value",
        "Highest Severity Event City",
        "Highest Severity Score",
        "Worst Hour of Day",
        "High Risk %",
        "Moderate Risk %",
    ])?;
    writer.write_record([
        metrics.worst_city.clone().unwrap_or_default(),
        fmt_opt_f64(metrics.worst_city_pm2_5),
        metrics.highest_severity_city.clone().unwrap_or_default(),
        fmt_opt_f64(metrics.highest_severity_score),
        metrics
            .worst_hour
            .map(|h| h.to_string())
            .unwrap_or_default(),
        metrics.high_risk_pct.to_string(),
        metrics.moderate_risk_pct.to_string(),
    ])?;
    writer.flush()?;
    Ok(())
}

/// Raw-column subset used for downstream trend inspection.
fn write_trends_csv(path: &Path, records: &[RemoteRecord]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["city", "time", "pm2_5", "pm10", "ozone"])?;
    for record in records {
        writer.write_record([
            record.city.clone().unwrap_or_default(),
            record.time.clone().unwrap_or_default(),
            fmt_opt_f64(record.pm2_5),
            fmt_opt_f64(record.pm10),
            fmt_opt_f64(record.ozone),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn write_risk_distribution_csv(
    path: &Path,
    dist: &BTreeMap<String, BTreeMap<String, usize>>,
) -> Result<()> {
    let flags: Vec<String> = {
        let mut set: Vec<String> = dist
            .values()
            .flat_map(|counts| counts.keys().cloned())
            .collect();
        set.sort();
        set.dedup();
        set
    };

    let mut writer = csv::Writer::from_path(path)?;
    let mut header = vec!["city".to_string()];
    header.extend(flags.iter().cloned());
    writer.write_record(&header)?;

    for (city, counts) in dist {
        let mut row = vec![city.clone()];
        for flag in &flags {
            row.push(counts.get(flag).copied().unwrap_or(0).to_string());
        }
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

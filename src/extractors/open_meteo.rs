use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::models::City;
use crate::utils::filename::raw_path;
use crate::utils::pacing::FixedDelayPacer;
use crate::utils::progress::ProgressReporter;

/// Open-Meteo air-quality endpoint. No API key required.
pub const DEFAULT_API_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

/// Hourly metrics requested from the API, comma-joined as the `hourly`
/// query parameter.
pub const HOURLY_METRICS: &str =
    "pm10,pm2_5,carbon_monoxide,nitrogen_dioxide,ozone,sulphur_dioxide,uv_index";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Key under which the raw payload is tagged with its source city.
pub const CITY_TAG_KEY: &str = "city_name";

/// HTTP client for the Open-Meteo air-quality API.
pub struct OpenMeteoClient {
    http: reqwest::Client,
    api_url: String,
}

impl OpenMeteoClient {
    pub fn new() -> Result<Self> {
        Self::with_api_url(DEFAULT_API_URL)
    }

    pub fn with_api_url(api_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    /// Fetch the hourly air-quality payload for one city.
    pub async fn fetch_city(&self, city: &City) -> Result<Value> {
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("latitude", city.latitude.to_string()),
                ("longitude", city.longitude.to_string()),
                ("hourly", HOURLY_METRICS.to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

/// Extraction stage: one GET per configured city, raw JSON persisted per
/// city under a shared run timestamp. Per-city failures are logged and
/// skipped; an empty result set is the caller's signal of total failure.
pub struct Extractor {
    client: OpenMeteoClient,
    raw_dir: PathBuf,
    pacer: FixedDelayPacer,
    silent: bool,
}

impl Extractor {
    pub fn new(client: OpenMeteoClient, raw_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            raw_dir: raw_dir.into(),
            pacer: FixedDelayPacer::new(Duration::from_secs(1)),
            silent: false,
        }
    }

    /// Replace the courtesy pause between city requests (tests use
    /// [`FixedDelayPacer::disabled`]).
    pub fn with_pacer(mut self, pacer: FixedDelayPacer) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub async fn run(&self, cities: &[City], timestamp: &str) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.raw_dir)?;

        let progress =
            ProgressReporter::bar(cities.len() as u64, "Fetching city data", self.silent);
        let mut saved = Vec::new();

        for city in cities {
            tracing::info!("Fetching data for {}...", city.name);

            match self.client.fetch_city(city).await {
                Ok(payload) => {
                    let path = persist_payload(&self.raw_dir, city, payload, timestamp)?;
                    tracing::info!("Saved {}", path.display());
                    saved.push(path);
                }
                Err(e) => {
                    // Not fatal to the run; the city is simply absent
                    tracing::warn!("Error fetching {}: {}", city.name, e);
                }
            }

            progress.inc();
            self.pacer.pause().await;
        }

        progress.finish(&format!("Fetched {}/{} cities", saved.len(), cities.len()));
        Ok(saved)
    }
}

/// Tag the payload with its city and write it, pretty-printed, to the raw
/// directory.
fn persist_payload(raw_dir: &Path, city: &City, mut payload: Value, timestamp: &str) -> Result<PathBuf> {
    if let Value::Object(ref mut map) = payload {
        map.insert(CITY_TAG_KEY.to_string(), Value::String(city.name.clone()));
    }

    let path = raw_path(raw_dir, &city.file_slug(), timestamp);
    std::fs::write(&path, serde_json::to_string_pretty(&payload)?)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_persist_payload_tags_city() {
        let dir = TempDir::new().unwrap();
        let city = City::new("Delhi", 28.7041, 77.1025);
        let payload = json!({
            "hourly": { "time": ["2026-03-01T00:00"], "pm2_5": [42.0] }
        });

        let path = persist_payload(dir.path(), &city, payload, "20260301_000000").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "delhi_raw_20260301_000000.json"
        );

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[CITY_TAG_KEY], "Delhi");
        assert_eq!(written["hourly"]["pm2_5"][0], 42.0);
    }

    #[test]
    fn test_metric_list_matches_contract() {
        let metrics: Vec<&str> = HOURLY_METRICS.split(',').collect();
        assert_eq!(metrics.len(), 7);
        assert!(metrics.contains(&"pm2_5"));
        assert!(metrics.contains(&"sulphur_dioxide"));
    }
}

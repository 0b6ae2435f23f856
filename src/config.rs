//! Runtime configuration, loaded from environment variables (with `.env`
//! support provided by the caller).
//!
//! Required:
//! - `SUPABASE_URL` – Supabase project URL
//! - `SUPABASE_KEY` – Supabase service/anon key
//!
//! Optional:
//! - `ATMOS_DATA_DIR` – root for raw/staged/processed files (default: `data`)
//! - `ATMOS_TABLE`    – remote table name (default: `air_quality_data`)

use std::env;
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone)]
pub struct Config {
    /// Supabase project base URL.
    pub supabase_url: String,

    /// Supabase API key, sent as both `apikey` and bearer token.
    pub supabase_key: String,

    /// Root data directory; raw/staged/processed live beneath it.
    pub data_dir: PathBuf,

    /// Remote table receiving staged rows.
    pub table_name: String,
}

fn require_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| {
        PipelineError::Config(format!("{} must be set in .env or environment", name))
    })
}

impl Config {
    /// Load the full configuration, including the remote credentials.
    /// Missing credentials are a fatal startup condition for the loader
    /// and analyzer stages.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            supabase_url: require_env("SUPABASE_URL")?,
            supabase_key: require_env("SUPABASE_KEY")?,
            data_dir: data_dir_from_env(),
            table_name: env::var("ATMOS_TABLE")
                .unwrap_or_else(|_| "air_quality_data".to_string()),
        })
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn staged_dir(&self) -> PathBuf {
        self.data_dir.join("staged")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    /// Log the loaded configuration, masking the key.
    pub fn log_config(&self) {
        let masked_key = if self.supabase_key.len() > 8 {
            format!("{}****", &self.supabase_key[..4])
        } else {
            "****".to_string()
        };
        tracing::info!("Configuration loaded:");
        tracing::info!("  SUPABASE_URL : {}", self.supabase_url);
        tracing::info!("  SUPABASE_KEY : {}", masked_key);
        tracing::info!("  data dir     : {}", self.data_dir.display());
        tracing::info!("  table        : {}", self.table_name);
    }
}

/// Data directory for the extract/transform stages, which do not need
/// remote credentials.
pub fn data_dir_from_env() -> PathBuf {
    env::var("ATMOS_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "atmostrack")]
#[command(about = "Air-quality ETL pipeline: Open-Meteo -> staged CSV -> Supabase -> reports")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline: extract, transform, load, analyze
    Run,

    /// Fetch raw hourly data for the configured cities
    Extract,

    /// Transform raw captures from one extraction run into a staged CSV
    Transform {
        #[arg(
            short,
            long,
            help = "Run timestamp (YYYYMMDD_HHMMSS) [default: latest raw run]"
        )]
        timestamp: Option<String>,
    },

    /// Load a staged CSV into the remote table
    Load {
        #[arg(short, long, help = "Staged CSV path [default: newest staged file]")]
        file: Option<PathBuf>,
    },

    /// Compute summary metrics, reports, and charts from the remote table
    Analyze,
}

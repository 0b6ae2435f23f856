use std::path::PathBuf;
use std::time::Duration;

use crate::analyzers::Analyzer;
use crate::cli::args::{Cli, Commands};
use crate::config::{self, Config};
use crate::error::{PipelineError, Result};
use crate::extractors::{Extractor, OpenMeteoClient};
use crate::loaders::{BatchLoader, SupabaseClient};
use crate::models::default_cities;
use crate::transformers::Transformer;
use crate::utils::filename;

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run => run_pipeline().await,
        Commands::Extract => {
            let (files, _) = extract_stage().await?;
            println!("Extracted {} raw file(s)", files.len());
            Ok(())
        }
        Commands::Transform { timestamp } => {
            let staged = transform_stage(timestamp).await?;
            match staged {
                Some(path) => println!("Staged: {}", path.display()),
                None => println!("No usable raw data found"),
            }
            Ok(())
        }
        Commands::Load { file } => {
            let config = Config::from_env()?;
            config.log_config();
            load_stage(&config, file).await?;
            Ok(())
        }
        Commands::Analyze => {
            let config = Config::from_env()?;
            analyze_stage(&config).await
        }
    }
}

/// The orchestrator: four stages in order with fixed inter-stage pauses.
/// A stage-level failure aborts the whole run with a nonzero exit; the
/// failing stage is named in the error.
async fn run_pipeline() -> Result<()> {
    println!("===================================================");
    println!("STARTING ATMOSTRACK ETL PIPELINE");
    println!("===================================================");

    // Credentials are required by the later stages; fail before doing any
    // work rather than after a full extraction.
    let config = Config::from_env()?;
    config.log_config();

    println!("\n[1/4] Extracting data from Open-Meteo...");
    let (raw_files, timestamp) = extract_stage()
        .await
        .map_err(|e| PipelineError::stage("extract", e.to_string()))?;
    if raw_files.is_empty() {
        return Err(PipelineError::stage(
            "extract",
            "no raw files were written; nothing to transform",
        ));
    }

    // Pause to let the filesystem settle; not correctness-critical
    tokio::time::sleep(Duration::from_secs(1)).await;

    println!("\n[2/4] Transforming raw JSON to staged CSV...");
    let transformer = Transformer::new(config.staged_dir());
    let staged = transformer
        .run(&raw_files, &timestamp)
        .map_err(|e| PipelineError::stage("transform", e.to_string()))?;
    let staged = staged.ok_or_else(|| {
        PipelineError::stage("transform", "no input file yielded usable rows")
    })?;

    tokio::time::sleep(Duration::from_secs(1)).await;

    println!("\n[3/4] Loading staged rows into '{}'...", config.table_name);
    load_stage(&config, Some(staged))
        .await
        .map_err(|e| PipelineError::stage("load", e.to_string()))?;

    // Give the remote index a moment before reading back
    tokio::time::sleep(Duration::from_secs(2)).await;

    println!("\n[4/4] Running analysis and generating reports...");
    analyze_stage(&config)
        .await
        .map_err(|e| PipelineError::stage("analyze", e.to_string()))?;

    println!("\n===================================================");
    println!("PIPELINE COMPLETED SUCCESSFULLY");
    println!("===================================================");
    Ok(())
}

async fn extract_stage() -> Result<(Vec<PathBuf>, String)> {
    let data_dir = config::data_dir_from_env();
    let timestamp = filename::run_timestamp();

    let client = OpenMeteoClient::new()?;
    let extractor = Extractor::new(client, data_dir.join("raw"));
    let files = extractor.run(&default_cities(), &timestamp).await?;

    Ok((files, timestamp))
}

async fn transform_stage(timestamp: Option<String>) -> Result<Option<PathBuf>> {
    let data_dir = config::data_dir_from_env();
    let raw_dir = data_dir.join("raw");

    let timestamp = match timestamp {
        Some(t) => t,
        None => filename::latest_raw_run(&raw_dir)?.ok_or_else(|| {
            PipelineError::Config(format!("no raw runs found in {}", raw_dir.display()))
        })?,
    };

    let raw_files = filename::raw_files_for_run(&raw_dir, &timestamp)?;
    let transformer = Transformer::new(data_dir.join("staged"));
    transformer.run(&raw_files, &timestamp)
}

async fn load_stage(config: &Config, file: Option<PathBuf>) -> Result<()> {
    let staged = match file {
        Some(path) => path,
        None => filename::latest_staged_file(&config.staged_dir())?.ok_or_else(|| {
            PipelineError::Config(format!(
                "no staged files found in {}",
                config.staged_dir().display()
            ))
        })?,
    };

    let client = SupabaseClient::new(&config.supabase_url, &config.supabase_key)?;
    let loader = BatchLoader::new(&client, &config.table_name);

    loader.ensure_table().await;
    let report = loader.run(&staged).await?;

    println!(
        "Load complete: {} rows processed, {} inserted, {} batch(es) skipped",
        report.total_rows, report.inserted_rows, report.failed_batches
    );
    Ok(())
}

async fn analyze_stage(config: &Config) -> Result<()> {
    let client = SupabaseClient::new(&config.supabase_url, &config.supabase_key)?;
    let analyzer = Analyzer::new(&client, &config.table_name, config.processed_dir());
    analyzer.run().await
}

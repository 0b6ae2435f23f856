pub mod analyzers;
pub mod cli;
pub mod config;
pub mod error;
pub mod extractors;
pub mod loaders;
pub mod models;
pub mod transformers;
pub mod utils;

pub use config::Config;
pub use error::{PipelineError, Result};

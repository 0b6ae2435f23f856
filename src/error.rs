use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Remote table error (status {status}): {body}")]
    Remote { status: u16, body: String },

    #[error("Chart rendering error: {0}")]
    Chart(String),

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: &'static str, message: String },
}

impl PipelineError {
    pub fn stage(stage: &'static str, message: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage,
            message: message.into(),
        }
    }
}

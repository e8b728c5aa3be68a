use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid normalization pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Contact store error: {message}")]
    Store { message: String },

    #[error("Grouping failed for batch {batch_index}: {message}")]
    Grouping { batch_index: usize, message: String },

    #[error("Merge failed: {0}")]
    Merge(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

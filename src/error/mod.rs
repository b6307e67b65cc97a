use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("API response error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid object name: {0}")]
    InvalidObjectName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Invalid record in {object} line {line}: {message}")]
    InvalidRecord {
        object: String,
        line: usize,
        message: String,
    },

    #[error("No objects match {0}")]
    NoMatchingObjects(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Table is not empty: {0}")]
    TableNotEmpty(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

//! Error types for the ingestion engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("Configuration error: {}", .problems.join("; "))]
    Configuration { problems: Vec<String> },

    #[error("Rate limiter misuse: {0}")]
    RateLimitMisuse(String),

    #[error("Source error ({source_name}): {message}")]
    TransientSource {
        source_name: String,
        message: String,
    },

    #[error("Source error ({source_name}): HTTP {status}")]
    HttpStatus { source_name: String, status: u16 },

    #[error("Storage error after {attempts} attempt(s): {source}")]
    Storage {
        attempts: u32,
        #[source]
        source: Box<FabricError>,
    },

    #[error("Document store error: {0}")]
    Store(String),

    #[error("Alert delivery error: {0}")]
    Alert(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl FabricError {
    /// Shorthand for a configuration error with a single problem
    pub fn config(problem: impl Into<String>) -> Self {
        FabricError::Configuration {
            problems: vec![problem.into()],
        }
    }

    pub fn source_failure(source_name: &str, message: impl Into<String>) -> Self {
        FabricError::TransientSource {
            source_name: source_name.to_string(),
            message: message.into(),
        }
    }

    /// Errors that indicate a bad deployment rather than a bad moment
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FabricError::Configuration { .. } | FabricError::RateLimitMisuse(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FabricError>;

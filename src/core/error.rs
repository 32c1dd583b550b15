use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SprintdeskError {
    #[error("{entity} '{term}' not found")]
    EntityNotFound { entity: &'static str, term: String },

    #[error("Unsupported query subject: {0}")]
    UnsupportedSubject(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Batch timed out after {0}s")]
    Timeout(u64),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SprintdeskError>;
